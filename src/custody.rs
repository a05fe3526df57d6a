//! Custody balances: how much of each asset every holder actually owns.
//!
//! Stands in for the component tokens' `balanceOf`. Unit accounting in the
//! ledger is per basket token; these are absolute quantities.

use rustc_hash::FxHashMap;

use crate::error::{LedgerError, Result};
use crate::types::Address;

/// Per-holder, per-asset balances.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TokenBalances {
    balances: FxHashMap<Address, FxHashMap<Address, u128>>,
}

impl TokenBalances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `asset` held by `holder`.
    pub fn balance_of(&self, holder: &Address, asset: &Address) -> u128 {
        self.balances
            .get(holder)
            .and_then(|assets| assets.get(asset))
            .copied()
            .unwrap_or(0)
    }

    /// Add `amount` of `asset` to `holder` from outside the system
    /// (issuance deposits, airdrops, test setup).
    pub fn credit(&mut self, holder: Address, asset: Address, amount: u128) -> Result<()> {
        let updated = self
            .balance_of(&holder, &asset)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        self.set(holder, asset, updated);
        Ok(())
    }

    /// Remove `amount` of `asset` from `holder` to outside the system.
    pub fn debit(&mut self, holder: Address, asset: Address, amount: u128) -> Result<()> {
        let current = self.balance_of(&holder, &asset);
        let remaining = current
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance { holder, asset })?;
        self.set(holder, asset, remaining);
        Ok(())
    }

    /// Move `amount` of `asset` from `from` to `to`. All-or-nothing.
    pub fn transfer(&mut self, asset: Address, from: Address, to: Address, amount: u128) -> Result<()> {
        let from_balance = self.balance_of(&from, &asset);
        let from_after = from_balance
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance { holder: from, asset })?;
        if from == to {
            return Ok(());
        }
        let to_after = self
            .balance_of(&to, &asset)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        self.set(from, asset, from_after);
        self.set(to, asset, to_after);
        Ok(())
    }

    fn set(&mut self, holder: Address, asset: Address, amount: u128) {
        if amount == 0 {
            if let Some(assets) = self.balances.get_mut(&holder) {
                assets.remove(&asset);
                if assets.is_empty() {
                    self.balances.remove(&holder);
                }
            }
        } else {
            self.balances.entry(holder).or_default().insert(asset, amount);
        }
    }
}
