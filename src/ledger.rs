//! Position ledger: virtual units behind a single position multiplier.
//!
//! Every stored unit is *virtual*. The *real* unit a consumer sees is
//! `floor(virtual * multiplier / PRECISE_UNIT)`. Changing the multiplier
//! rescales every position at once without touching per-component state,
//! which is what keeps mint/burn dilution O(1) in the number of components.

use log::debug;
use rustc_hash::FxHashMap;

use crate::error::{LedgerError, Result};
use crate::math::{PRECISE_UNIT, mul_div_floor_u, precise_div, precise_mul};
use crate::types::Address;

/// Whether a [`Position`] is custodied directly or attributed by a module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PositionState {
    Default,
    External,
}

/// A materialized position as reported by [`PositionLedger::positions`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub component: Address,
    /// Attributing module; `None` for default positions.
    pub module: Option<Address>,
    /// Real unit (per basket token, 18 decimals).
    pub unit: i128,
    pub state: PositionState,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct ExternalEntry {
    virtual_unit: i128,
    data: Vec<u8>,
}

/// External positions of one component, keyed by attributing module.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct ExternalPositions {
    /// Attribution order.
    modules: Vec<Address>,
    entries: FxHashMap<Address, ExternalEntry>,
}

/// Components, the position multiplier and all virtual units of a basket.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PositionLedger {
    components: Vec<Address>,
    multiplier: i128,
    default_units: FxHashMap<Address, i128>,
    external: FxHashMap<Address, ExternalPositions>,
}

impl Default for PositionLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionLedger {
    /// Create an empty ledger with multiplier 1.0.
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
            multiplier: PRECISE_UNIT,
            default_units: FxHashMap::default(),
            external: FxHashMap::default(),
        }
    }

    /// Create a ledger holding `positions` as default positions at
    /// multiplier 1.0.
    ///
    /// Components must be unique; zero units are skipped.
    pub fn with_positions(positions: &[(Address, i128)]) -> Result<Self> {
        let mut ledger = Self::new();
        for &(component, unit) in positions {
            if ledger.is_component(&component) {
                return Err(LedgerError::DuplicateComponent(component));
            }
            if unit == 0 {
                continue;
            }
            ledger.add_component(component)?;
            ledger.edit_default_position_unit(component, unit)?;
        }
        Ok(ledger)
    }

    // === Queries ===

    /// Components in enumeration order.
    pub fn components(&self) -> &[Address] {
        &self.components
    }

    pub fn is_component(&self, component: &Address) -> bool {
        self.components.contains(component)
    }

    /// Current position multiplier (18 decimals, always > 0).
    #[inline]
    pub fn position_multiplier(&self) -> i128 {
        self.multiplier
    }

    /// Real default unit of `component`; 0 if it has none.
    pub fn default_position_real_unit(&self, component: &Address) -> i128 {
        self.default_units
            .get(component)
            .map_or(0, |&v| self.to_real(v))
    }

    /// Stored virtual default unit of `component`.
    pub fn default_position_virtual_unit(&self, component: &Address) -> i128 {
        self.default_units.get(component).copied().unwrap_or(0)
    }

    /// Real external unit attributed to `component` by `module`; 0 if none.
    pub fn external_position_real_unit(&self, component: &Address, module: &Address) -> i128 {
        self.external_entry(component, module)
            .map_or(0, |e| self.to_real(e.virtual_unit))
    }

    /// Modules attributing an external position to `component`.
    pub fn external_position_modules(&self, component: &Address) -> &[Address] {
        self.external
            .get(component)
            .map(|ext| ext.modules.as_slice())
            .unwrap_or(&[])
    }

    /// Opaque data stored alongside an external position.
    pub fn external_position_data(&self, component: &Address, module: &Address) -> &[u8] {
        self.external_entry(component, module)
            .map(|e| e.data.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_external_position_module(&self, component: &Address, module: &Address) -> bool {
        self.external_entry(component, module).is_some()
    }

    /// True if `component` has a positive default real unit.
    pub fn has_default_position(&self, component: &Address) -> bool {
        self.default_position_real_unit(component) > 0
    }

    /// True if any module attributes an external position to `component`.
    pub fn has_external_position(&self, component: &Address) -> bool {
        !self.external_position_modules(component).is_empty()
    }

    /// True if the default real unit of `component` is at least `unit`.
    pub fn has_sufficient_default_units(&self, component: &Address, unit: i128) -> bool {
        self.default_position_real_unit(component) >= unit
    }

    /// Default plus every external real unit of `component`.
    pub fn total_component_real_units(&self, component: &Address) -> i128 {
        self.external_position_modules(component)
            .iter()
            .map(|m| self.external_position_real_unit(component, m))
            .fold(self.default_position_real_unit(component), i128::saturating_add)
    }

    /// All positions: for each component its default position (if nonzero)
    /// followed by its external positions in attribution order.
    pub fn positions(&self) -> Vec<Position> {
        let mut out = Vec::new();
        for component in &self.components {
            let unit = self.default_position_real_unit(component);
            if unit != 0 {
                out.push(Position {
                    component: *component,
                    module: None,
                    unit,
                    state: PositionState::Default,
                    data: Vec::new(),
                });
            }
            if let Some(ext) = self.external.get(component) {
                for (module, entry) in ext
                    .modules
                    .iter()
                    .filter_map(|m| ext.entries.get(m).map(|e| (m, e)))
                {
                    out.push(Position {
                        component: *component,
                        module: Some(*module),
                        unit: self.to_real(entry.virtual_unit),
                        state: PositionState::External,
                        data: entry.data.clone(),
                    });
                }
            }
        }
        out
    }

    // === Component set ===

    pub fn add_component(&mut self, component: Address) -> Result<()> {
        if self.is_component(&component) {
            return Err(LedgerError::ComponentExists(component));
        }
        debug!("component {component} added");
        self.components.push(component);
        Ok(())
    }

    pub fn remove_component(&mut self, component: Address) -> Result<()> {
        let idx = self
            .components
            .iter()
            .position(|c| *c == component)
            .ok_or(LedgerError::ComponentNotFound(component))?;
        debug!("component {component} removed");
        self.components.remove(idx);
        Ok(())
    }

    // === Unit edits ===

    /// Store `new_real_unit` as the default position of `component`.
    pub fn edit_default_position_unit(&mut self, component: Address, new_real_unit: i128) -> Result<()> {
        let virtual_unit = self.to_virtual(component, new_real_unit)?;
        self.store_default(component, virtual_unit);
        Ok(())
    }

    /// Edit the default position and keep the component set consistent:
    /// a new positive position adds the component, a position edited to zero
    /// removes it unless a module still attributes an external position.
    pub fn edit_default_position(&mut self, component: Address, new_real_unit: i128) -> Result<()> {
        let virtual_unit = self.to_virtual(component, new_real_unit)?;
        let has_external = self.has_external_position(&component);

        if !self.is_component(&component) && new_real_unit > 0 && !has_external {
            self.add_component(component)?;
        } else if self.is_component(&component) && new_real_unit == 0 && !has_external {
            self.remove_component(component)?;
        }
        self.store_default(component, virtual_unit);
        Ok(())
    }

    pub fn add_external_position_module(&mut self, component: Address, module: Address) -> Result<()> {
        let ext = self.external.entry(component).or_default();
        if ext.entries.contains_key(&module) {
            return Err(LedgerError::ModuleAlreadyAttributed { component, module });
        }
        ext.modules.push(module);
        ext.entries.insert(module, ExternalEntry::default());
        Ok(())
    }

    /// Drop `module`'s attribution, clearing its unit and data.
    pub fn remove_external_position_module(&mut self, component: Address, module: Address) -> Result<()> {
        let ext = self
            .external
            .get_mut(&component)
            .filter(|ext| ext.entries.contains_key(&module))
            .ok_or(LedgerError::ModuleNotAttributed { component, module })?;
        ext.entries.remove(&module);
        ext.modules.retain(|m| *m != module);
        if ext.modules.is_empty() {
            self.external.remove(&component);
        }
        Ok(())
    }

    /// Store `new_real_unit` as `module`'s external position in `component`.
    /// Editing to zero keeps the attribution.
    pub fn edit_external_position_unit(
        &mut self,
        component: Address,
        module: Address,
        new_real_unit: i128,
    ) -> Result<()> {
        let virtual_unit = self.to_virtual(component, new_real_unit)?;
        let entry = self
            .external_entry_mut(&component, &module)
            .ok_or(LedgerError::ModuleNotAttributed { component, module })?;
        entry.virtual_unit = virtual_unit;
        Ok(())
    }

    pub fn edit_external_position_data(
        &mut self,
        component: Address,
        module: Address,
        data: Vec<u8>,
    ) -> Result<()> {
        let entry = self
            .external_entry_mut(&component, &module)
            .ok_or(LedgerError::ModuleNotAttributed { component, module })?;
        entry.data = data;
        Ok(())
    }

    /// Edit an external position and keep attribution and the component set
    /// consistent. A nonzero unit attributes the module (adding the component
    /// if needed); zero removes the attribution and, if nothing else holds
    /// the component, the component.
    pub fn edit_external_position(
        &mut self,
        component: Address,
        module: Address,
        new_real_unit: i128,
        data: Vec<u8>,
    ) -> Result<()> {
        if new_real_unit != 0 {
            let virtual_unit = self.to_virtual(component, new_real_unit)?;
            if !self.is_component(&component) {
                self.add_component(component)?;
            }
            if !self.is_external_position_module(&component, &module) {
                self.add_external_position_module(component, module)?;
            }
            if let Some(entry) = self.external_entry_mut(&component, &module) {
                entry.virtual_unit = virtual_unit;
                entry.data = data;
            }
        } else if self.is_external_position_module(&component, &module) {
            self.remove_external_position_module(component, module)?;
            if !self.has_external_position(&component)
                && self.default_position_real_unit(&component) == 0
                && self.is_component(&component)
            {
                self.remove_component(component)?;
            }
        }
        Ok(())
    }

    /// Replace the position multiplier.
    ///
    /// O(1) in the number of components for the rebase itself; validation
    /// scans stored units so no nonzero position reads back as zero.
    pub fn edit_position_multiplier(&mut self, new_multiplier: i128) -> Result<()> {
        if new_multiplier <= 0 {
            return Err(LedgerError::MultiplierTooSmall);
        }

        let mut min_positive: Option<u128> = None;
        let mut max_abs: u128 = 0;
        for v in self.virtual_units() {
            let abs = v.unsigned_abs();
            max_abs = max_abs.max(abs);
            if v > 0 {
                min_positive = Some(min_positive.map_or(abs, |m| m.min(abs)));
            }
        }

        let multiplier = new_multiplier as u128;
        let scale = PRECISE_UNIT as u128;
        if let Some(min) = min_positive {
            let smallest = mul_div_floor_u(min, multiplier, scale).ok_or(LedgerError::Overflow)?;
            if smallest == 0 {
                return Err(LedgerError::MultiplierTooSmall);
            }
        }
        let largest = mul_div_floor_u(max_abs, multiplier, scale).ok_or(LedgerError::Overflow)?;
        if largest > i128::MAX as u128 {
            return Err(LedgerError::Overflow);
        }

        debug!("position multiplier {} -> {}", self.multiplier, new_multiplier);
        self.multiplier = new_multiplier;
        Ok(())
    }

    // === Internals ===

    fn virtual_units(&self) -> impl Iterator<Item = i128> + '_ {
        self.default_units.values().copied().chain(
            self.external
                .values()
                .flat_map(|ext| ext.entries.values().map(|e| e.virtual_unit)),
        )
    }

    fn external_entry(&self, component: &Address, module: &Address) -> Option<&ExternalEntry> {
        self.external.get(component)?.entries.get(module)
    }

    fn external_entry_mut(&mut self, component: &Address, module: &Address) -> Option<&mut ExternalEntry> {
        self.external.get_mut(component)?.entries.get_mut(module)
    }

    fn store_default(&mut self, component: Address, virtual_unit: i128) {
        if virtual_unit == 0 {
            self.default_units.remove(&component);
        } else {
            self.default_units.insert(component, virtual_unit);
        }
    }

    fn to_virtual(&self, component: Address, real_unit: i128) -> Result<i128> {
        let virtual_unit = precise_div(real_unit, self.multiplier).ok_or(LedgerError::Overflow)?;
        if real_unit != 0 && (virtual_unit == 0 || self.to_real(virtual_unit) == 0) {
            return Err(LedgerError::InvalidVirtualUnit { component });
        }
        Ok(virtual_unit)
    }

    /// Edits keep every `virtual * multiplier` within range, so the
    /// saturation never triggers on stored units.
    fn to_real(&self, virtual_unit: i128) -> i128 {
        precise_mul(virtual_unit, self.multiplier).unwrap_or(if virtual_unit < 0 {
            i128::MIN
        } else {
            i128::MAX
        })
    }
}
