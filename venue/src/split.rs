//! Split router: divides one order across up to three pools for the same
//! pair (the Balancer-style venue).
//!
//! The order is cut into equal slices and each slice is sent greedily to the
//! pool with the best marginal price. The resulting per-pool allocation is
//! then priced as one swap per pool, which is also exactly what `execute`
//! replays, so a quote taken immediately before execution is the fill.

use basketbook::Address;
use rustc_hash::FxHashMap;

use crate::error::{Result, VenueError};
use crate::pool::Pool;
use crate::{ExchangeAdapter, Fill, Quote, SwapKind, check_bound};

/// Maximum number of pools considered for one pair.
pub const MAX_POOLS_PER_PAIR: usize = 3;

/// Number of slices an order is cut into when allocating across pools.
const SLICES: u128 = 64;

/// One pool's share of a split order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitLeg {
    /// Index of the pool within the pair's pool list.
    pub pool: usize,
    pub amount_in: u128,
    pub amount_out: u128,
}

/// A priced split order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitQuote {
    pub legs: Vec<SplitLeg>,
    pub total_input: u128,
    pub total_output: u128,
}

impl SplitQuote {
    fn as_quote(&self) -> Quote {
        Quote {
            amount_in: self.total_input,
            amount_out: self.total_output,
        }
    }
}

/// Routes a pair's swaps across several pools.
#[derive(Debug, Clone, Default)]
pub struct SplitRouter {
    pools: FxHashMap<(Address, Address), Vec<Pool>>,
}

fn pair_key(a: Address, b: Address) -> (Address, Address) {
    if a <= b { (a, b) } else { (b, a) }
}

impl SplitRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pool for a pair. Fails once the pair already has
    /// [`MAX_POOLS_PER_PAIR`] pools.
    pub fn add_pool(
        &mut self,
        asset_a: Address,
        reserve_a: u128,
        asset_b: Address,
        reserve_b: u128,
        fee_bps: u32,
    ) -> Result<()> {
        let pools = self.pools.entry(pair_key(asset_a, asset_b)).or_default();
        if pools.len() >= MAX_POOLS_PER_PAIR {
            return Err(VenueError::Rejected(format!(
                "pair {asset_a}/{asset_b} already has {MAX_POOLS_PER_PAIR} pools"
            )));
        }
        pools.push(Pool::new(asset_a, reserve_a, asset_b, reserve_b, fee_bps));
        Ok(())
    }

    pub fn pools(&self, asset_a: Address, asset_b: Address) -> &[Pool] {
        self.pools
            .get(&pair_key(asset_a, asset_b))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Price a split order and return the per-pool allocation.
    pub fn quote_split(&self, asset_in: Address, asset_out: Address, amount: u128, kind: SwapKind) -> Result<SplitQuote> {
        if amount == 0 {
            return Err(VenueError::ZeroAmount);
        }
        let pools = self.pools(asset_in, asset_out);
        if pools.is_empty() {
            return Err(VenueError::UnknownPair { asset_in, asset_out });
        }
        let allocation = allocate(pools, &asset_in, &asset_out, amount, kind)?;

        let mut legs = Vec::new();
        let mut total_input: u128 = 0;
        let mut total_output: u128 = 0;
        for (index, share) in allocation.into_iter().enumerate() {
            if share == 0 {
                continue;
            }
            let pool = &pools[index];
            let (amount_in, amount_out) = match kind {
                SwapKind::ExactInput => (share, pool.amount_out(&asset_in, &asset_out, share)?),
                SwapKind::ExactOutput => (pool.amount_in(&asset_in, &asset_out, share)?, share),
            };
            total_input = total_input.checked_add(amount_in).ok_or(VenueError::Overflow)?;
            total_output = total_output.checked_add(amount_out).ok_or(VenueError::Overflow)?;
            legs.push(SplitLeg {
                pool: index,
                amount_in,
                amount_out,
            });
        }
        Ok(SplitQuote {
            legs,
            total_input,
            total_output,
        })
    }
}

/// Greedy slice allocation. Returns the fixed-side amount assigned to each
/// pool (input for exact-input orders, output for exact-output orders).
fn allocate(pools: &[Pool], asset_in: &Address, asset_out: &Address, amount: u128, kind: SwapKind) -> Result<Vec<u128>> {
    let slices = SLICES.min(amount);
    let slice = amount / slices;
    let mut remainder = amount - slice * slices;

    let mut scratch: Vec<Pool> = pools.to_vec();
    let mut shares = vec![0u128; pools.len()];

    for _ in 0..slices {
        let size = slice + std::mem::take(&mut remainder);
        let mut best: Option<(usize, u128, u128)> = None;
        for (index, pool) in scratch.iter().enumerate() {
            let priced = match kind {
                SwapKind::ExactInput => pool.amount_out(asset_in, asset_out, size).map(|out| (size, out)),
                SwapKind::ExactOutput => pool.amount_in(asset_in, asset_out, size).map(|inp| (inp, size)),
            };
            let Ok((slice_in, slice_out)) = priced else {
                continue;
            };
            let better = match (kind, best) {
                (_, None) => true,
                (SwapKind::ExactInput, Some((_, _, out))) => slice_out > out,
                (SwapKind::ExactOutput, Some((_, inp, _))) => slice_in < inp,
            };
            if better {
                best = Some((index, slice_in, slice_out));
            }
        }
        let (index, slice_in, slice_out) = best.ok_or(VenueError::InsufficientLiquidity)?;
        scratch[index].apply(asset_in, asset_out, slice_in, slice_out)?;
        shares[index] += size;
    }
    Ok(shares)
}

impl ExchangeAdapter for SplitRouter {
    fn quote(&self, asset_in: Address, asset_out: Address, amount: u128, kind: SwapKind) -> Result<Quote> {
        Ok(self.quote_split(asset_in, asset_out, amount, kind)?.as_quote())
    }

    fn execute(
        &mut self,
        asset_in: Address,
        asset_out: Address,
        amount: u128,
        kind: SwapKind,
        bound: u128,
    ) -> Result<Fill> {
        let plan = self.quote_split(asset_in, asset_out, amount, kind)?;
        check_bound(kind, plan.as_quote(), bound)?;

        let pools = self
            .pools
            .get_mut(&pair_key(asset_in, asset_out))
            .ok_or(VenueError::UnknownPair { asset_in, asset_out })?;
        let mut updated = pools.clone();
        for leg in &plan.legs {
            updated[leg.pool].apply(&asset_in, &asset_out, leg.amount_in, leg.amount_out)?;
        }
        *pools = updated;

        log::debug!(
            "split swap {} {} -> {} {} across {} pools",
            plan.total_input,
            asset_in,
            plan.total_output,
            asset_out,
            plan.legs.len()
        );
        Ok(Fill {
            amount_in: plan.total_input,
            amount_out: plan.total_output,
        })
    }
}
