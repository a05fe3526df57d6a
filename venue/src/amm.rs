//! Direct-pair constant-product router.
//!
//! One pool per unordered asset pair. Used for the Uniswap- and
//! Sushiswap-style venues.

use basketbook::Address;
use rustc_hash::FxHashMap;

use crate::error::{Result, VenueError};
use crate::pool::Pool;
use crate::{ExchangeAdapter, Fill, Quote, SwapKind, check_bound};

/// Routes swaps through a single pool per pair.
#[derive(Debug, Clone, Default)]
pub struct AmmRouter {
    pools: FxHashMap<(Address, Address), Pool>,
}

fn pair_key(a: Address, b: Address) -> (Address, Address) {
    if a <= b { (a, b) } else { (b, a) }
}

impl AmmRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pool, replacing any existing pool for the same pair.
    pub fn add_pool(&mut self, asset_a: Address, reserve_a: u128, asset_b: Address, reserve_b: u128, fee_bps: u32) {
        self.pools.insert(
            pair_key(asset_a, asset_b),
            Pool::new(asset_a, reserve_a, asset_b, reserve_b, fee_bps),
        );
    }

    /// Builder form of [`add_pool`](Self::add_pool).
    pub fn with_pool(mut self, asset_a: Address, reserve_a: u128, asset_b: Address, reserve_b: u128, fee_bps: u32) -> Self {
        self.add_pool(asset_a, reserve_a, asset_b, reserve_b, fee_bps);
        self
    }

    pub fn pool(&self, asset_a: Address, asset_b: Address) -> Option<&Pool> {
        self.pools.get(&pair_key(asset_a, asset_b))
    }

    fn pool_for(&self, asset_in: Address, asset_out: Address) -> Result<&Pool> {
        self.pool(asset_in, asset_out)
            .ok_or(VenueError::UnknownPair { asset_in, asset_out })
    }
}

fn price(pool: &Pool, asset_in: &Address, asset_out: &Address, amount: u128, kind: SwapKind) -> Result<Quote> {
    match kind {
        SwapKind::ExactInput => Ok(Quote {
            amount_in: amount,
            amount_out: pool.amount_out(asset_in, asset_out, amount)?,
        }),
        SwapKind::ExactOutput => Ok(Quote {
            amount_in: pool.amount_in(asset_in, asset_out, amount)?,
            amount_out: amount,
        }),
    }
}

impl ExchangeAdapter for AmmRouter {
    fn quote(&self, asset_in: Address, asset_out: Address, amount: u128, kind: SwapKind) -> Result<Quote> {
        price(self.pool_for(asset_in, asset_out)?, &asset_in, &asset_out, amount, kind)
    }

    fn execute(
        &mut self,
        asset_in: Address,
        asset_out: Address,
        amount: u128,
        kind: SwapKind,
        bound: u128,
    ) -> Result<Fill> {
        let pool = self
            .pools
            .get_mut(&pair_key(asset_in, asset_out))
            .ok_or(VenueError::UnknownPair { asset_in, asset_out })?;
        let quote = price(pool, &asset_in, &asset_out, amount, kind)?;
        check_bound(kind, quote, bound)?;
        pool.apply(&asset_in, &asset_out, quote.amount_in, quote.amount_out)?;
        log::debug!(
            "amm swap {} {} -> {} {}",
            quote.amount_in,
            asset_in,
            quote.amount_out,
            asset_out
        );
        Ok(Fill {
            amount_in: quote.amount_in,
            amount_out: quote.amount_out,
        })
    }
}
