//! The basket: a position ledger plus its manager, module registry and
//! total supply.

use log::info;
use rustc_hash::FxHashMap;

use crate::error::{LedgerError, Result};
use crate::ledger::PositionLedger;
use crate::math::{PRECISE_UNIT_U, mul_div_floor_u};
use crate::system::SystemConfig;
use crate::types::Address;

/// Lifecycle of a module on a basket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModuleState {
    #[default]
    None,
    Pending,
    Initialized,
}

/// A tokenized basket of components.
///
/// `total_supply` is owned by the basket token itself; issuance and
/// redemption report changes through [`Basket::set_total_supply`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Basket {
    address: Address,
    manager: Address,
    ledger: PositionLedger,
    modules: FxHashMap<Address, ModuleState>,
    total_supply: u128,
}

impl Basket {
    /// Create a basket with initial default positions at multiplier 1.0.
    pub fn new(
        address: Address,
        manager: Address,
        positions: &[(Address, i128)],
        total_supply: u128,
    ) -> Result<Self> {
        Ok(Self {
            address,
            manager,
            ledger: PositionLedger::with_positions(positions)?,
            modules: FxHashMap::default(),
            total_supply,
        })
    }

    // === Queries ===

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn manager(&self) -> Address {
        self.manager
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    /// Mutable ledger access for modules editing positions.
    pub fn ledger_mut(&mut self) -> &mut PositionLedger {
        &mut self.ledger
    }

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    pub fn components(&self) -> &[Address] {
        self.ledger.components()
    }

    pub fn position_multiplier(&self) -> i128 {
        self.ledger.position_multiplier()
    }

    pub fn default_position_real_unit(&self, component: &Address) -> i128 {
        self.ledger.default_position_real_unit(component)
    }

    /// Absolute quantity of `component` the default position accounts for:
    /// `floor(real_unit * total_supply / 1e18)`. Negative units report 0.
    pub fn default_position_notional(&self, component: &Address) -> Result<u128> {
        let unit = self.default_position_real_unit(component);
        if unit <= 0 {
            return Ok(0);
        }
        mul_div_floor_u(unit as u128, self.total_supply, PRECISE_UNIT_U).ok_or(LedgerError::Overflow)
    }

    pub fn module_state(&self, module: &Address) -> ModuleState {
        self.modules.get(module).copied().unwrap_or_default()
    }

    pub fn is_initialized_module(&self, module: &Address) -> bool {
        self.module_state(module) == ModuleState::Initialized
    }

    pub fn is_pending_module(&self, module: &Address) -> bool {
        self.module_state(module) == ModuleState::Pending
    }

    // === Supply hooks ===

    /// Record a new total supply after issuance or redemption.
    pub fn set_total_supply(&mut self, total_supply: u128) {
        self.total_supply = total_supply;
    }

    // === Manager operations ===

    /// Queue `module` for initialization. Manager only; the module must be
    /// enabled on the system.
    pub fn add_module(&mut self, system: &SystemConfig, caller: Address, module: Address) -> Result<()> {
        self.only_manager(caller)?;
        if self.module_state(&module) != ModuleState::None {
            return Err(LedgerError::ModuleAlreadyAdded(module));
        }
        if !system.is_enabled_module(&module) {
            return Err(LedgerError::ModuleNotEnabled(module));
        }
        info!("basket {}: module {module} pending", self.address);
        self.modules.insert(module, ModuleState::Pending);
        Ok(())
    }

    /// Move a pending module to initialized. Called by the module itself.
    pub fn initialize_module(&mut self, module: Address) -> Result<()> {
        if !self.is_pending_module(&module) {
            return Err(LedgerError::ModuleNotPending(module));
        }
        info!("basket {}: module {module} initialized", self.address);
        self.modules.insert(module, ModuleState::Initialized);
        Ok(())
    }

    /// Detach an initialized module. Manager only.
    pub fn remove_module(&mut self, caller: Address, module: Address) -> Result<()> {
        self.only_manager(caller)?;
        if !self.is_initialized_module(&module) {
            return Err(LedgerError::ModuleNotInitialized(module));
        }
        self.modules.remove(&module);
        Ok(())
    }

    /// Hand the basket to a new manager. Manager only.
    pub fn set_manager(&mut self, caller: Address, manager: Address) -> Result<()> {
        self.only_manager(caller)?;
        self.manager = manager;
        Ok(())
    }

    fn only_manager(&self, caller: Address) -> Result<()> {
        if caller != self.manager {
            return Err(LedgerError::OnlyManager);
        }
        Ok(())
    }
}
