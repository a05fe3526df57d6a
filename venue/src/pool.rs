//! Constant-product liquidity pool (`x * y = k` with a swap fee).

use basketbook::Address;
use basketbook::math::mul_div_floor_u;

use crate::error::{Result, VenueError};

/// Basis-point denominator for swap fees.
pub const FEE_DENOMINATOR: u128 = 10_000;

/// A two-asset pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    asset_a: Address,
    asset_b: Address,
    reserve_a: u128,
    reserve_b: u128,
    fee_bps: u32,
}

impl Pool {
    /// Create a pool. `fee_bps` is charged on the input amount (30 = 0.3%).
    pub fn new(asset_a: Address, reserve_a: u128, asset_b: Address, reserve_b: u128, fee_bps: u32) -> Self {
        Self {
            asset_a,
            asset_b,
            reserve_a,
            reserve_b,
            fee_bps: fee_bps.min(FEE_DENOMINATOR as u32),
        }
    }

    /// True if this pool swaps `asset_in` for `asset_out`.
    pub fn trades(&self, asset_in: &Address, asset_out: &Address) -> bool {
        (self.asset_a == *asset_in && self.asset_b == *asset_out)
            || (self.asset_b == *asset_in && self.asset_a == *asset_out)
    }

    /// Reserve of `asset`, or `None` if the pool does not hold it.
    pub fn reserve(&self, asset: &Address) -> Option<u128> {
        if self.asset_a == *asset {
            Some(self.reserve_a)
        } else if self.asset_b == *asset {
            Some(self.reserve_b)
        } else {
            None
        }
    }

    pub fn fee_bps(&self) -> u32 {
        self.fee_bps
    }

    fn reserves_for(&self, asset_in: &Address, asset_out: &Address) -> Result<(u128, u128)> {
        if !self.trades(asset_in, asset_out) {
            return Err(VenueError::UnknownPair {
                asset_in: *asset_in,
                asset_out: *asset_out,
            });
        }
        let (reserve_in, reserve_out) = if self.asset_a == *asset_in {
            (self.reserve_a, self.reserve_b)
        } else {
            (self.reserve_b, self.reserve_a)
        };
        if reserve_in == 0 || reserve_out == 0 {
            return Err(VenueError::InsufficientLiquidity);
        }
        Ok((reserve_in, reserve_out))
    }

    fn fee_multiplier(&self) -> u128 {
        FEE_DENOMINATOR - self.fee_bps as u128
    }

    /// Output received for spending exactly `amount_in` of `asset_in`.
    pub fn amount_out(&self, asset_in: &Address, asset_out: &Address, amount_in: u128) -> Result<u128> {
        if amount_in == 0 {
            return Err(VenueError::ZeroAmount);
        }
        let (reserve_in, reserve_out) = self.reserves_for(asset_in, asset_out)?;
        let with_fee = amount_in
            .checked_mul(self.fee_multiplier())
            .ok_or(VenueError::Overflow)?;
        let denominator = reserve_in
            .checked_mul(FEE_DENOMINATOR)
            .and_then(|d| d.checked_add(with_fee))
            .ok_or(VenueError::Overflow)?;
        mul_div_floor_u(with_fee, reserve_out, denominator).ok_or(VenueError::Overflow)
    }

    /// Input required to receive exactly `amount_out` when paying with
    /// `asset_in`. Rounds in the pool's favor.
    pub fn amount_in(&self, asset_in: &Address, asset_out: &Address, amount_out: u128) -> Result<u128> {
        if amount_out == 0 {
            return Err(VenueError::ZeroAmount);
        }
        let (reserve_in, reserve_out) = self.reserves_for(asset_in, asset_out)?;
        if amount_out >= reserve_out {
            return Err(VenueError::InsufficientLiquidity);
        }
        let scaled_out = amount_out
            .checked_mul(FEE_DENOMINATOR)
            .ok_or(VenueError::Overflow)?;
        let denominator = (reserve_out - amount_out)
            .checked_mul(self.fee_multiplier())
            .ok_or(VenueError::Overflow)?;
        if denominator == 0 {
            return Err(VenueError::InsufficientLiquidity);
        }
        mul_div_floor_u(reserve_in, scaled_out, denominator)
            .and_then(|q| q.checked_add(1))
            .ok_or(VenueError::Overflow)
    }

    /// Move reserves for a completed swap.
    pub fn apply(&mut self, asset_in: &Address, asset_out: &Address, amount_in: u128, amount_out: u128) -> Result<()> {
        let (reserve_in, reserve_out) = self.reserves_for(asset_in, asset_out)?;
        let new_in = reserve_in.checked_add(amount_in).ok_or(VenueError::Overflow)?;
        let new_out = reserve_out
            .checked_sub(amount_out)
            .ok_or(VenueError::InsufficientLiquidity)?;
        if self.asset_a == *asset_in {
            self.reserve_a = new_in;
            self.reserve_b = new_out;
        } else {
            self.reserve_b = new_in;
            self.reserve_a = new_out;
        }
        Ok(())
    }
}
