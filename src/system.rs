//! System-wide configuration: which baskets and modules are valid, and where
//! protocol fees go.
//!
//! Passed into modules as an explicit `Arc<SystemConfig>` capability.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{LedgerError, Result};
use crate::math::{PRECISE_UNIT_U, precise_mul_u};
use crate::types::Address;

/// Registry of valid baskets, enabled modules and protocol fee settings.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SystemConfig {
    baskets: FxHashSet<Address>,
    modules: FxHashSet<Address>,
    fee_recipient: Address,
    /// (module, fee index) -> fee percentage, 18 decimals (1e18 = 100%).
    module_fees: FxHashMap<Address, FxHashMap<usize, u128>>,
}

impl SystemConfig {
    /// Create a config whose protocol fees go to `fee_recipient`.
    pub fn new(fee_recipient: Address) -> Self {
        Self {
            baskets: FxHashSet::default(),
            modules: FxHashSet::default(),
            fee_recipient,
            module_fees: FxHashMap::default(),
        }
    }

    /// Register a basket.
    pub fn with_basket(mut self, basket: Address) -> Self {
        self.baskets.insert(basket);
        self
    }

    /// Enable a module.
    pub fn with_module(mut self, module: Address) -> Self {
        self.modules.insert(module);
        self
    }

    /// Set the fee percentage charged by `module` at `fee_index`.
    pub fn set_module_fee(&mut self, module: Address, fee_index: usize, percentage: u128) -> Result<()> {
        if percentage > PRECISE_UNIT_U {
            return Err(LedgerError::FeeTooHigh);
        }
        self.module_fees
            .entry(module)
            .or_default()
            .insert(fee_index, percentage);
        Ok(())
    }

    pub fn is_valid_basket(&self, basket: &Address) -> bool {
        self.baskets.contains(basket)
    }

    pub fn is_enabled_module(&self, module: &Address) -> bool {
        self.modules.contains(module)
    }

    pub fn fee_recipient(&self) -> Address {
        self.fee_recipient
    }

    /// Fee percentage for `module` at `fee_index`; 0 if unset.
    pub fn module_fee(&self, module: &Address, fee_index: usize) -> u128 {
        self.module_fees
            .get(module)
            .and_then(|fees| fees.get(&fee_index))
            .copied()
            .unwrap_or(0)
    }

    /// Fee owed on `quantity` for `module` at `fee_index`, floored.
    pub fn module_fee_amount(&self, module: &Address, fee_index: usize, quantity: u128) -> Result<u128> {
        precise_mul_u(quantity, self.module_fee(module, fee_index)).ok_or(LedgerError::Overflow)
    }
}
