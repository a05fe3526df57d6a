//! Exchange adapters for basketbook.
//!
//! Provides a uniform `ExchangeAdapter` trait over liquidity venues.
//! Implementations:
//!
//! - **AmmRouter**: constant-product pools (the Uniswap- and Sushiswap-style venues)
//! - **SplitRouter**: splits one order across up to three pools (the Balancer-style venue)
//! - **MockVenue**: fixed-rate venue with scripted failures, for tests

pub mod amm;
pub mod error;
pub mod mock;
pub mod pool;
pub mod registry;
pub mod split;

pub use amm::AmmRouter;
pub use error::VenueError;
pub use mock::{FillMode, MockVenue};
pub use pool::Pool;
pub use registry::{Venue, VenueRegistry};
pub use split::{SplitLeg, SplitQuote, SplitRouter};

use std::fmt;

use basketbook::Address;

/// Which venue routes a component's trades.
///
/// `None` means routing has not been configured; trading such a component
/// is rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExchangeId {
    #[default]
    None,
    Uniswap,
    Sushiswap,
    Balancer,
}

impl ExchangeId {
    pub fn as_u8(self) -> u8 {
        match self {
            ExchangeId::None => 0,
            ExchangeId::Uniswap => 1,
            ExchangeId::Sushiswap => 2,
            ExchangeId::Balancer => 3,
        }
    }

    pub fn is_none(self) -> bool {
        self == ExchangeId::None
    }
}

impl TryFrom<u8> for ExchangeId {
    type Error = VenueError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ExchangeId::None),
            1 => Ok(ExchangeId::Uniswap),
            2 => Ok(ExchangeId::Sushiswap),
            3 => Ok(ExchangeId::Balancer),
            other => Err(VenueError::InvalidExchange(other)),
        }
    }
}

impl std::str::FromStr for ExchangeId {
    type Err = VenueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ExchangeId::None),
            "uniswap" => Ok(ExchangeId::Uniswap),
            "sushiswap" => Ok(ExchangeId::Sushiswap),
            "balancer" => Ok(ExchangeId::Balancer),
            other => other
                .parse::<u8>()
                .map_err(|_| VenueError::UnknownExchange(s.to_string()))
                .and_then(ExchangeId::try_from),
        }
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeId::None => write!(f, "none"),
            ExchangeId::Uniswap => write!(f, "uniswap"),
            ExchangeId::Sushiswap => write!(f, "sushiswap"),
            ExchangeId::Balancer => write!(f, "balancer"),
        }
    }
}

/// Which side of a swap is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapKind {
    /// Spend exactly `amount` of the input asset.
    ExactInput,
    /// Receive exactly `amount` of the output asset.
    ExactOutput,
}

/// Expected amounts for a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub amount_in: u128,
    pub amount_out: u128,
}

/// Amounts actually transferred by an executed swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fill {
    pub amount_in: u128,
    pub amount_out: u128,
}

/// A liquidity venue that can price and execute swaps.
pub trait ExchangeAdapter {
    /// Price a swap without executing it.
    fn quote(
        &self,
        asset_in: Address,
        asset_out: Address,
        amount: u128,
        kind: SwapKind,
    ) -> error::Result<Quote>;

    /// Execute a swap.
    ///
    /// For [`SwapKind::ExactInput`], `bound` is the minimum acceptable output;
    /// for [`SwapKind::ExactOutput`], the maximum acceptable input. A fill
    /// outside the bound fails with [`VenueError::SlippageExceeded`] and
    /// leaves the venue unchanged.
    fn execute(
        &mut self,
        asset_in: Address,
        asset_out: Address,
        amount: u128,
        kind: SwapKind,
        bound: u128,
    ) -> error::Result<Fill>;
}

/// Check a realized swap against the caller's bound.
pub(crate) fn check_bound(kind: SwapKind, quote: Quote, bound: u128) -> error::Result<()> {
    match kind {
        SwapKind::ExactInput if quote.amount_out < bound => Err(VenueError::SlippageExceeded {
            bound,
            actual: quote.amount_out,
        }),
        SwapKind::ExactOutput if quote.amount_in > bound => Err(VenueError::SlippageExceeded {
            bound,
            actual: quote.amount_in,
        }),
        _ => Ok(()),
    }
}
