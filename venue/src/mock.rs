//! Mock venue for testing: fixed exchange rates with configurable behavior.
//!
//! ```
//! use basketbook::Address;
//! use basketbook_venue::{ExchangeAdapter, SwapKind};
//! use basketbook_venue::mock::{FillMode, MockVenue};
//!
//! let dai = Address::new("dai");
//! let weth = Address::new("weth");
//! // 1 dai = 0.0005 weth
//! let mut venue = MockVenue::builder()
//!     .with_rate(dai, weth, 500_000_000_000_000)
//!     .fill_mode(FillMode::Quoted)
//!     .build();
//!
//! let fill = venue.execute(dai, weth, 2_000, SwapKind::ExactInput, 1).unwrap();
//! assert_eq!(fill.amount_out, 1);
//! assert_eq!(venue.recorded_swaps().len(), 1);
//! ```

use basketbook::Address;
use basketbook::math::{PRECISE_UNIT_U, mul_div_ceil_u, mul_div_floor_u};
use rustc_hash::FxHashMap;

use crate::error::{Result, VenueError};
use crate::{ExchangeAdapter, Fill, Quote, SwapKind, check_bound};

/// How the mock venue fills executed swaps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillMode {
    /// Fill exactly at the quoted price.
    Quoted,
    /// Fill worse than quoted by the given basis points (less output for
    /// exact-input, more input for exact-output).
    Slipped(u32),
    /// Reject every swap.
    Reject,
}

/// A recorded swap for assertion in tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedSwap {
    pub asset_in: Address,
    pub asset_out: Address,
    pub amount: u128,
    pub kind: SwapKind,
    pub bound: u128,
}

/// Builder for `MockVenue`.
pub struct MockVenueBuilder {
    fill_mode: FillMode,
    rates: FxHashMap<(Address, Address), u128>,
}

impl MockVenueBuilder {
    pub fn fill_mode(mut self, mode: FillMode) -> Self {
        self.fill_mode = mode;
        self
    }

    /// Units of `asset_out` per unit of `asset_in`, scaled by 1e18. The
    /// reverse direction is derived unless set explicitly.
    pub fn with_rate(mut self, asset_in: Address, asset_out: Address, rate: u128) -> Self {
        self.rates.insert((asset_in, asset_out), rate);
        self
    }

    pub fn build(self) -> MockVenue {
        MockVenue {
            fill_mode: self.fill_mode,
            rates: self.rates,
            swaps: Vec::new(),
        }
    }
}

/// A venue that trades at fixed rates and records every execution.
#[derive(Clone, Debug)]
pub struct MockVenue {
    fill_mode: FillMode,
    rates: FxHashMap<(Address, Address), u128>,
    swaps: Vec<RecordedSwap>,
}

impl MockVenue {
    pub fn builder() -> MockVenueBuilder {
        MockVenueBuilder {
            fill_mode: FillMode::Quoted,
            rates: FxHashMap::default(),
        }
    }

    /// Get all swaps that were executed (for assertion in tests).
    pub fn recorded_swaps(&self) -> &[RecordedSwap] {
        &self.swaps
    }

    pub fn set_fill_mode(&mut self, mode: FillMode) {
        self.fill_mode = mode;
    }

    fn rate(&self, asset_in: Address, asset_out: Address) -> Result<u128> {
        if let Some(rate) = self.rates.get(&(asset_in, asset_out)) {
            return Ok(*rate);
        }
        self.rates
            .get(&(asset_out, asset_in))
            .filter(|r| **r > 0)
            .map(|r| mul_div_floor_u(PRECISE_UNIT_U, PRECISE_UNIT_U, *r))
            .and_then(|r| r.filter(|r| *r > 0))
            .ok_or(VenueError::UnknownPair { asset_in, asset_out })
    }

    fn price(&self, asset_in: Address, asset_out: Address, amount: u128, kind: SwapKind) -> Result<Quote> {
        if amount == 0 {
            return Err(VenueError::ZeroAmount);
        }
        let rate = self.rate(asset_in, asset_out)?;
        match kind {
            SwapKind::ExactInput => Ok(Quote {
                amount_in: amount,
                amount_out: mul_div_floor_u(amount, rate, PRECISE_UNIT_U).ok_or(VenueError::Overflow)?,
            }),
            SwapKind::ExactOutput => Ok(Quote {
                amount_in: mul_div_ceil_u(amount, PRECISE_UNIT_U, rate).ok_or(VenueError::Overflow)?,
                amount_out: amount,
            }),
        }
    }
}

impl ExchangeAdapter for MockVenue {
    fn quote(&self, asset_in: Address, asset_out: Address, amount: u128, kind: SwapKind) -> Result<Quote> {
        self.price(asset_in, asset_out, amount, kind)
    }

    fn execute(
        &mut self,
        asset_in: Address,
        asset_out: Address,
        amount: u128,
        kind: SwapKind,
        bound: u128,
    ) -> Result<Fill> {
        self.swaps.push(RecordedSwap {
            asset_in,
            asset_out,
            amount,
            kind,
            bound,
        });
        let quoted = self.price(asset_in, asset_out, amount, kind)?;
        let realized = match self.fill_mode {
            FillMode::Reject => return Err(VenueError::Rejected("mock: swap rejected".into())),
            FillMode::Quoted => quoted,
            FillMode::Slipped(bps) => {
                let bps = bps as u128;
                match kind {
                    SwapKind::ExactInput => Quote {
                        amount_out: mul_div_floor_u(quoted.amount_out, 10_000u128.saturating_sub(bps), 10_000)
                            .ok_or(VenueError::Overflow)?,
                        ..quoted
                    },
                    SwapKind::ExactOutput => Quote {
                        amount_in: mul_div_ceil_u(quoted.amount_in, 10_000 + bps, 10_000)
                            .ok_or(VenueError::Overflow)?,
                        ..quoted
                    },
                }
            }
        };
        check_bound(kind, realized, bound)?;
        Ok(Fill {
            amount_in: realized.amount_in,
            amount_out: realized.amount_out,
        })
    }
}
