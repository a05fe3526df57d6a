//! Rebalance scenario (scenario.json) loading and engine construction.
//!
//! A scenario describes one basket, the venues it can trade on and the
//! rebalance the manager wants to run. Quantities are decimal strings with
//! up to 18 fractional digits and are parsed exactly.

use std::path::Path;
use std::sync::Arc;

use basketbook::math::{PRECISE_UNIT_U, mul_div_floor_u, parse_fixed};
use basketbook::{Address, Basket, CallContext, SystemConfig, Timestamp, TokenBalances};
use basketbook_venue::mock::FillMode;
use basketbook_venue::{AmmRouter, ExchangeId, MockVenue, SplitRouter, VenueRegistry};
use log::info;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;

use crate::config::Config;
use crate::engine::{RebalanceEngine, TRADE_FEE_INDEX};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub basket: String,
    pub manager: String,
    pub total_supply: String,
    #[serde(default)]
    pub start_time: Timestamp,
    pub positions: Vec<PositionSpec>,
    /// Untracked balances held on top of the positions.
    #[serde(default)]
    pub excess: Vec<BalanceSpec>,
    pub venues: Vec<VenueSpec>,
    #[serde(default)]
    pub assets: Vec<AssetSpec>,
    #[serde(default)]
    pub traders: Vec<String>,
    #[serde(default)]
    pub anyone_trade: bool,
    pub rebalance: RebalanceSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PositionSpec {
    pub asset: String,
    pub unit: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceSpec {
    pub asset: String,
    pub amount: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VenueSpec {
    Amm { exchange: String, pools: Vec<PoolSpec> },
    Split { exchange: String, pools: Vec<PoolSpec> },
    Mock {
        exchange: String,
        rates: Vec<RateSpec>,
        #[serde(default)]
        slippage_bps: Option<u32>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolSpec {
    pub asset_a: String,
    pub reserve_a: String,
    pub asset_b: String,
    pub reserve_b: String,
    #[serde(default = "default_pool_fee")]
    pub fee_bps: u32,
}

fn default_pool_fee() -> u32 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateSpec {
    pub asset_in: String,
    pub asset_out: String,
    /// Units of `asset_out` per unit of `asset_in`.
    pub rate: String,
}

/// Trading parameters for one asset.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetSpec {
    pub asset: String,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub max_size: Option<String>,
    #[serde(default)]
    pub cool_off_period: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RebalanceSpec {
    /// Targets for currently held components, by asset.
    pub targets: Vec<TargetSpec>,
    #[serde(default)]
    pub new_components: Vec<TargetSpec>,
    /// Multiplier the targets are expressed at; the live one if omitted.
    #[serde(default)]
    pub position_multiplier: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetSpec {
    pub asset: String,
    pub target: String,
}

impl Scenario {
    /// Load and validate a scenario file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ScenarioRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&contents)
    }

    /// Parse from a JSON string (useful for testing).
    pub fn from_json(json: &str) -> Result<Self> {
        let scenario: Scenario = serde_json::from_str(json)?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<()> {
        address(&self.basket)?;
        address(&self.manager)?;
        if amount(&self.total_supply)? == 0 {
            return Err(Error::Scenario("total_supply must be > 0".into()));
        }
        if self.positions.is_empty() {
            return Err(Error::Scenario("positions list is empty".into()));
        }
        let mut seen = FxHashSet::default();
        for p in &self.positions {
            if !seen.insert(address(&p.asset)?) {
                return Err(Error::Scenario(format!("duplicate position: {}", p.asset)));
            }
            if unit(&p.unit)? <= 0 {
                return Err(Error::Scenario(format!("unit for {} must be > 0", p.asset)));
            }
        }
        for b in &self.excess {
            address(&b.asset)?;
            amount(&b.amount)?;
        }
        let mut exchanges = FxHashSet::default();
        for v in &self.venues {
            let id = exchange(v.exchange())?;
            if id.is_none() || !exchanges.insert(id) {
                return Err(Error::Scenario(format!("venue '{}' is invalid or duplicated", v.exchange())));
            }
        }
        let mut seen = FxHashSet::default();
        for t in self.rebalance.targets.iter().chain(&self.rebalance.new_components) {
            if !seen.insert(address(&t.asset)?) {
                return Err(Error::Scenario(format!("duplicate target: {}", t.asset)));
            }
            unit(&t.target)?;
        }
        Ok(())
    }

    pub fn basket_address(&self) -> Result<Address> {
        address(&self.basket)
    }

    pub fn manager_address(&self) -> Result<Address> {
        address(&self.manager)
    }

    /// Every asset the rebalance touches, in target order.
    pub fn rebalance_assets(&self) -> Result<Vec<Address>> {
        self.rebalance
            .targets
            .iter()
            .chain(&self.rebalance.new_components)
            .map(|t| address(&t.asset))
            .collect()
    }

    /// Build the engine: system config, basket with custody balances,
    /// venues, then run the manager's setup calls and `start_rebalance`
    /// at `start_time`.
    pub fn build(&self, config: &Config) -> Result<RebalanceEngine> {
        let settings = config.engine_settings()?;
        let basket_addr = self.basket_address()?;
        let manager = self.manager_address()?;
        let supply = amount(&self.total_supply)?;

        let mut system = SystemConfig::new(config.fee_recipient()?)
            .with_basket(basket_addr)
            .with_module(settings.module);
        system.set_module_fee(settings.module, TRADE_FEE_INDEX, config.protocol_fee()?)?;

        let positions = self
            .positions
            .iter()
            .map(|p| Ok((address(&p.asset)?, unit(&p.unit)?)))
            .collect::<Result<Vec<_>>>()?;
        let mut basket = Basket::new(basket_addr, manager, &positions, supply)?;
        basket.add_module(&system, manager, settings.module)?;

        let mut balances = TokenBalances::new();
        for (asset, unit) in &positions {
            let notional = mul_div_floor_u(*unit as u128, supply, PRECISE_UNIT_U)
                .ok_or_else(|| Error::Scenario(format!("notional of {asset} overflows")))?;
            balances.credit(basket_addr, *asset, notional)?;
        }
        for b in &self.excess {
            balances.credit(basket_addr, address(&b.asset)?, amount(&b.amount)?)?;
        }

        let mut engine = RebalanceEngine::new(
            Arc::new(system),
            settings,
            basket,
            balances,
            self.venue_registry()?,
        );

        let ctx = CallContext::external(manager, self.start_time);
        engine.initialize(&ctx)?;

        let traders = self.traders.iter().map(|t| address(t)).collect::<Result<Vec<_>>>()?;
        if !traders.is_empty() {
            engine.update_trader_status(&ctx, &traders, &vec![true; traders.len()])?;
        }
        if self.anyone_trade {
            engine.update_anyone_trade(&ctx, true)?;
        }
        self.apply_asset_settings(&mut engine, &ctx)?;

        let (new_components, new_targets) = self.rebalance_new()?;
        let old_targets = self.old_targets(&engine)?;
        let multiplier = match &self.rebalance.position_multiplier {
            Some(m) => unit(m)?,
            None => engine.basket().position_multiplier(),
        };
        engine.start_rebalance(&ctx, &new_components, &new_targets, &old_targets, multiplier)?;

        info!(
            "scenario {}: {} components, {} venues",
            basket_addr,
            engine.rebalance_components().len(),
            engine.venues().ids().len()
        );
        Ok(engine)
    }

    fn venue_registry(&self) -> Result<VenueRegistry> {
        let mut registry = VenueRegistry::new();
        for spec in &self.venues {
            let id = exchange(spec.exchange())?;
            match spec {
                VenueSpec::Amm { pools, .. } => {
                    let mut router = AmmRouter::new();
                    for p in pools {
                        let (a, ra, b, rb) = p.parse()?;
                        router.add_pool(a, ra, b, rb, p.fee_bps);
                    }
                    registry.register(id, router)?;
                }
                VenueSpec::Split { pools, .. } => {
                    let mut router = SplitRouter::new();
                    for p in pools {
                        let (a, ra, b, rb) = p.parse()?;
                        router.add_pool(a, ra, b, rb, p.fee_bps)?;
                    }
                    registry.register(id, router)?;
                }
                VenueSpec::Mock {
                    rates, slippage_bps, ..
                } => {
                    let mut builder = MockVenue::builder();
                    for r in rates {
                        builder = builder.with_rate(address(&r.asset_in)?, address(&r.asset_out)?, amount(&r.rate)?);
                    }
                    if let Some(bps) = slippage_bps {
                        builder = builder.fill_mode(FillMode::Slipped(*bps));
                    }
                    registry.register(id, builder.build())?;
                }
            }
        }
        Ok(registry)
    }

    fn apply_asset_settings(&self, engine: &mut RebalanceEngine, ctx: &CallContext) -> Result<()> {
        let mut routed = (Vec::new(), Vec::new());
        let mut sized = (Vec::new(), Vec::new());
        let mut cooled = (Vec::new(), Vec::new());
        for spec in &self.assets {
            let asset = address(&spec.asset)?;
            if let Some(ex) = &spec.exchange {
                routed.0.push(asset);
                routed.1.push(exchange(ex)?);
            }
            if let Some(max) = &spec.max_size {
                sized.0.push(asset);
                sized.1.push(amount(max)?);
            }
            if let Some(period) = spec.cool_off_period {
                cooled.0.push(asset);
                cooled.1.push(period);
            }
        }
        if !routed.0.is_empty() {
            engine.set_exchanges(ctx, &routed.0, &routed.1)?;
        }
        if !sized.0.is_empty() {
            engine.set_trade_maximums(ctx, &sized.0, &sized.1)?;
        }
        if !cooled.0.is_empty() {
            engine.set_cool_off_periods(ctx, &cooled.0, &cooled.1)?;
        }
        Ok(())
    }

    fn rebalance_new(&self) -> Result<(Vec<Address>, Vec<i128>)> {
        let mut components = Vec::new();
        let mut targets = Vec::new();
        for t in &self.rebalance.new_components {
            components.push(address(&t.asset)?);
            targets.push(unit(&t.target)?);
        }
        Ok((components, targets))
    }

    /// Old-component targets ordered like the basket's components, reserve
    /// asset excluded.
    fn old_targets(&self, engine: &RebalanceEngine) -> Result<Vec<i128>> {
        let mut by_asset: FxHashMap<Address, i128> = FxHashMap::default();
        for t in &self.rebalance.targets {
            by_asset.insert(address(&t.asset)?, unit(&t.target)?);
        }
        let reserve = engine.settings().reserve_asset;
        let mut targets = Vec::new();
        for component in engine.basket().components() {
            if *component == reserve {
                continue;
            }
            let target = by_asset
                .remove(component)
                .ok_or_else(|| Error::Scenario(format!("missing target for held component {component}")))?;
            targets.push(target);
        }
        if let Some(extra) = by_asset.keys().min() {
            return Err(Error::Scenario(format!(
                "{extra} is not held; list it under new_components"
            )));
        }
        Ok(targets)
    }
}

impl VenueSpec {
    fn exchange(&self) -> &str {
        match self {
            VenueSpec::Amm { exchange, .. } | VenueSpec::Split { exchange, .. } | VenueSpec::Mock { exchange, .. } => {
                exchange
            }
        }
    }
}

impl PoolSpec {
    fn parse(&self) -> Result<(Address, u128, Address, u128)> {
        Ok((
            address(&self.asset_a)?,
            amount(&self.reserve_a)?,
            address(&self.asset_b)?,
            amount(&self.reserve_b)?,
        ))
    }
}

fn address(s: &str) -> Result<Address> {
    Address::try_new(s).ok_or_else(|| Error::Scenario(format!("'{s}' is not a valid address")))
}

fn unit(s: &str) -> Result<i128> {
    parse_fixed(s, 18).ok_or_else(|| Error::Scenario(format!("'{s}' is not a decimal with at most 18 places")))
}

fn amount(s: &str) -> Result<u128> {
    u128::try_from(unit(s)?).map_err(|_| Error::Scenario(format!("'{s}' must not be negative")))
}

fn exchange(s: &str) -> Result<ExchangeId> {
    Ok(s.parse::<ExchangeId>()?)
}
