//! Rebalance trading engine.
//!
//! Trades one basket's holdings toward manager-set target units through the
//! venues in a [`VenueRegistry`], always against a single reserve asset.
//!
//! The engine owns everything a trade can touch: the basket (ledger and
//! supply), the custody balances, the venues and the rebalance metadata.
//! Every public mutating operation runs inside [`RebalanceEngine::atomically`]:
//! the whole state is checkpointed and restored if the call fails, so a
//! rejected trade leaves units, balances, venue reserves and buffered events
//! exactly as they were.
//!
//! Targets are stored at the multiplier snapshotted by `start_rebalance` and
//! rescaled to the live multiplier on every comparison:
//! `scaled = target * live / snapshot`, floored.

use std::sync::Arc;

use basketbook::math::{PRECISE_UNIT, PRECISE_UNIT_U, mul_div_ceil_u, mul_div_floor, mul_div_floor_u, precise_div};
use basketbook::{Address, Basket, CallContext, PositionState, SystemConfig, Timestamp, TokenBalances};
use basketbook_venue::{ExchangeAdapter, ExchangeId, Fill, Quote, SwapKind, VenueRegistry};
use log::{debug, info, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};
use crate::event::{RebalanceEvent, TradeDirection, TradeExecuted};
use crate::info::AssetTradeInfo;

/// Fee slot on [`SystemConfig`] charged on the bought side of each trade.
pub const TRADE_FEE_INDEX: usize = 0;

/// Default step for [`RebalanceEngine::raise_asset_targets`]: 0.25%.
pub const DEFAULT_RAISE_TARGET_PERCENTAGE: u128 = 2_500_000_000_000_000;

const BPS: u128 = 10_000;

/// Static engine parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Address the engine is registered under on the basket.
    pub module: Address,
    /// Settlement asset every trade routes against.
    pub reserve_asset: Address,
    /// Fraction (1e18 = 100%) each `raise_asset_targets` call adds to targets.
    pub raise_target_percentage: u128,
    /// Slippage tolerated against the venue's own quote.
    pub max_slippage_bps: u32,
}

impl EngineSettings {
    pub fn new(module: Address, reserve_asset: Address) -> Self {
        Self {
            module,
            reserve_asset,
            raise_target_percentage: DEFAULT_RAISE_TARGET_PERCENTAGE,
            max_slippage_bps: 100,
        }
    }
}

/// A sized and priced trade, before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradePlan {
    pub component: Address,
    pub direction: TradeDirection,
    /// Component quantity to buy or sell, after the `max_size` clamp.
    pub quantity: u128,
    pub exchange: ExchangeId,
    pub quote: Quote,
}

/// Basket balances captured before a swap, for excess correction.
#[derive(Debug, Clone, Copy)]
struct PreTrade {
    component: u128,
    reserve: u128,
}

/// The rebalance engine for one basket.
#[derive(Debug, Clone)]
pub struct RebalanceEngine {
    system: Arc<SystemConfig>,
    settings: EngineSettings,
    basket: Basket,
    balances: TokenBalances,
    venues: VenueRegistry,
    asset_info: FxHashMap<Address, AssetTradeInfo>,
    rebalance_components: Vec<Address>,
    position_multiplier: i128,
    anyone_trade: bool,
    traders: FxHashSet<Address>,
    events: Vec<RebalanceEvent>,
}

impl RebalanceEngine {
    /// Attach an engine to `basket`. The basket must already have the
    /// engine's module pending; call [`initialize`](Self::initialize) next.
    pub fn new(
        system: Arc<SystemConfig>,
        settings: EngineSettings,
        basket: Basket,
        balances: TokenBalances,
        venues: VenueRegistry,
    ) -> Self {
        Self {
            system,
            settings,
            basket,
            balances,
            venues,
            asset_info: FxHashMap::default(),
            rebalance_components: Vec::new(),
            position_multiplier: PRECISE_UNIT,
            anyone_trade: false,
            traders: FxHashSet::default(),
            events: Vec::new(),
        }
    }

    // === Queries ===

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn system(&self) -> &SystemConfig {
        &self.system
    }

    pub fn basket(&self) -> &Basket {
        &self.basket
    }

    /// Mutable basket access for the issuance and fee collaborators
    /// (supply changes, multiplier edits).
    pub fn basket_mut(&mut self) -> &mut Basket {
        &mut self.basket
    }

    pub fn balances(&self) -> &TokenBalances {
        &self.balances
    }

    pub fn balances_mut(&mut self) -> &mut TokenBalances {
        &mut self.balances
    }

    pub fn venues(&self) -> &VenueRegistry {
        &self.venues
    }

    /// Rebalance metadata for `asset`; all-default if never configured.
    pub fn asset_info(&self, asset: &Address) -> AssetTradeInfo {
        self.asset_info.get(asset).copied().unwrap_or_default()
    }

    /// Components of the active rebalance: old components, then new ones.
    pub fn rebalance_components(&self) -> &[Address] {
        &self.rebalance_components
    }

    /// Multiplier the current targets are expressed at.
    pub fn position_multiplier(&self) -> i128 {
        self.position_multiplier
    }

    pub fn anyone_trade(&self) -> bool {
        self.anyone_trade
    }

    pub fn is_trader(&self, trader: &Address) -> bool {
        self.traders.contains(trader)
    }

    /// Allow-listed traders, sorted.
    pub fn traders(&self) -> Vec<Address> {
        let mut traders: Vec<_> = self.traders.iter().copied().collect();
        traders.sort();
        traders
    }

    /// Events from committed calls, oldest first.
    pub fn events(&self) -> &[RebalanceEvent] {
        &self.events
    }

    /// Drain buffered events.
    pub fn take_events(&mut self) -> Vec<RebalanceEvent> {
        std::mem::take(&mut self.events)
    }

    /// Target unit of `component` scaled to the live multiplier.
    pub fn target_unit(&self, component: &Address) -> Result<i128> {
        let target = self.asset_info(component).target_unit;
        mul_div_floor(target, self.basket.position_multiplier(), self.position_multiplier)
            .ok_or(Error::Ledger(basketbook::LedgerError::Overflow))
    }

    /// Live-scaled target units for `components`, in order.
    pub fn target_units(&self, components: &[Address]) -> Result<Vec<i128>> {
        components.iter().map(|c| self.target_unit(c)).collect()
    }

    /// True when every rebalance component sits exactly at its scaled target.
    pub fn all_targets_met(&self) -> Result<bool> {
        for component in &self.rebalance_components {
            if self.target_unit(component)? != self.basket.default_position_real_unit(component) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// True when no routable rebalance component is above its target.
    pub fn no_tokens_to_sell(&self) -> Result<bool> {
        for component in &self.rebalance_components {
            if self.asset_info(component).exchange.is_none() {
                continue;
            }
            if self.target_unit(component)? < self.basket.default_position_real_unit(component) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Direction and clamped quantity of the next trade of `component`.
    ///
    /// The direction comes from the units. Holdings are measured with the
    /// notional floored. A sell stops at the target notional rounded up, so
    /// the unit never drops below target. A buy aims at the target notional
    /// rounded up, which lands exactly on the target unit whenever supply is
    /// at least one whole token. Below that a buy falls back to the rounded
    /// down notional if rounding up would leave the unit further from
    /// target than it started. A trade no wider than rounding is reported as
    /// [`Error::TargetAlreadyMet`].
    pub fn trade_size(&self, component: &Address) -> Result<(TradeDirection, u128)> {
        let supply = self.basket.total_supply();
        if supply == 0 {
            return Err(Error::ZeroSupply);
        }
        let current_unit = self.basket.default_position_real_unit(component);
        let target_unit = self.target_unit(component)?;
        if current_unit == target_unit {
            return Err(Error::TargetAlreadyMet);
        }

        let held = notional(current_unit, supply, false)?;
        let (direction, delta) = if target_unit > current_unit {
            let ceiled = notional(target_unit, supply, true)?.saturating_sub(held);
            let reached = held
                .checked_add(ceiled)
                .ok_or(basketbook::LedgerError::Overflow)?;
            let landed = unit_from_notional(reached, supply)?;
            let delta = if landed.saturating_sub(target_unit) <= target_unit.saturating_sub(current_unit) {
                ceiled
            } else {
                notional(target_unit, supply, false)?.saturating_sub(held)
            };
            (TradeDirection::Buy, delta)
        } else {
            (TradeDirection::Sell, held.saturating_sub(notional(target_unit, supply, true)?))
        };
        if delta == 0 {
            return Err(Error::TargetAlreadyMet);
        }

        let max_size = self.asset_info(component).max_size;
        let quantity = delta.min(max_size);
        debug!(
            "{component}: unit {current_unit} -> target {target_unit}, {direction} {quantity} (delta {delta}, max {max_size})"
        );
        Ok((direction, quantity))
    }

    /// Size the next trade of `component` and price it on its venue.
    pub fn plan_trade(&self, component: &Address) -> Result<TradePlan> {
        let exchange = self.asset_info(component).exchange;
        if exchange.is_none() {
            return Err(Error::ExchangeNotSet);
        }
        let (direction, quantity) = self.trade_size(component)?;
        let (asset_in, asset_out, kind) = self.legs(*component, direction);
        let quote = self
            .venues
            .get(exchange)?
            .quote(asset_in, asset_out, quantity, kind)?;
        Ok(TradePlan {
            component: *component,
            direction,
            quantity,
            exchange,
            quote,
        })
    }

    // === Manager operations ===

    /// Bind the engine to its basket: seed targets from the current
    /// positions and mark the module initialized. Manager only; the basket
    /// must be valid and have the module pending.
    pub fn initialize(&mut self, ctx: &CallContext) -> Result<()> {
        self.atomically(|engine| {
            engine.only_manager_caller(ctx)?;
            let basket = engine.basket.address();
            if !engine.system.is_valid_basket(&basket) || !engine.basket.is_pending_module(&engine.settings.module) {
                return Err(Error::NotPending);
            }
            for position in engine.basket.ledger().positions() {
                if position.state == PositionState::External {
                    return Err(Error::ExternalPositionsNotAllowed);
                }
                let info = engine.asset_info.entry(position.component).or_default();
                info.target_unit = position.unit;
                info.last_trade_timestamp = 0;
            }
            engine.basket.initialize_module(engine.settings.module)?;
            info!("rebalance engine initialized on {basket}");
            Ok(())
        })
    }

    /// Set targets for a new rebalance.
    ///
    /// `old_components_target_units` must cover every held component other
    /// than the reserve asset, in component order. New components follow.
    /// Targets are stored at `position_multiplier`.
    pub fn start_rebalance(
        &mut self,
        ctx: &CallContext,
        new_components: &[Address],
        new_components_target_units: &[i128],
        old_components_target_units: &[i128],
        position_multiplier: i128,
    ) -> Result<()> {
        self.atomically(|engine| {
            engine.only_manager(ctx)?;
            if new_components.len() != new_components_target_units.len() {
                return Err(Error::LengthMismatch);
            }
            if position_multiplier <= 0 {
                return Err(basketbook::LedgerError::MultiplierTooSmall.into());
            }

            let reserve = engine.settings.reserve_asset;
            let current: Vec<Address> = engine
                .basket
                .components()
                .iter()
                .copied()
                .filter(|c| *c != reserve)
                .collect();
            if current.len() != old_components_target_units.len() {
                return Err(Error::MissingOldTargets);
            }

            let aggregate: Vec<Address> = current.iter().chain(new_components).copied().collect();
            if has_duplicate(&aggregate) {
                return Err(Error::DuplicateComponent);
            }
            if aggregate.contains(&reserve) {
                return Err(Error::ReserveAsComponent);
            }

            let targets: Vec<i128> = old_components_target_units
                .iter()
                .chain(new_components_target_units)
                .copied()
                .collect();
            if let Some((component, _)) = aggregate.iter().zip(&targets).find(|(_, t)| **t < 0) {
                return Err(Error::NegativeTarget(*component));
            }
            for (component, target) in aggregate.iter().zip(targets) {
                engine.asset_info.entry(*component).or_default().target_unit = target;
                engine.events.push(RebalanceEvent::TargetUnitsUpdated {
                    component: *component,
                    target_unit: target,
                    position_multiplier,
                });
            }
            info!(
                "rebalance started: {} components at multiplier {position_multiplier}",
                aggregate.len()
            );
            engine.rebalance_components = aggregate;
            engine.position_multiplier = position_multiplier;
            Ok(())
        })
    }

    pub fn set_trade_maximums(&mut self, ctx: &CallContext, components: &[Address], maximums: &[u128]) -> Result<()> {
        self.atomically(|engine| {
            engine.only_manager(ctx)?;
            validate_arrays(components, maximums.len())?;
            for (component, max_size) in components.iter().zip(maximums) {
                engine.asset_info.entry(*component).or_default().max_size = *max_size;
                engine.events.push(RebalanceEvent::TradeMaximumUpdated {
                    component: *component,
                    max_size: *max_size,
                });
            }
            Ok(())
        })
    }

    /// Route components through venues. `ExchangeId::None` disables
    /// trading of a component; any other id must be registered.
    pub fn set_exchanges(&mut self, ctx: &CallContext, components: &[Address], exchanges: &[ExchangeId]) -> Result<()> {
        self.atomically(|engine| {
            engine.only_manager(ctx)?;
            validate_arrays(components, exchanges.len())?;
            for (component, exchange) in components.iter().zip(exchanges) {
                if !exchange.is_none() && !engine.venues.contains(*exchange) {
                    return Err(Error::ExchangeNotEnabled(*exchange));
                }
                engine.asset_info.entry(*component).or_default().exchange = *exchange;
                engine.events.push(RebalanceEvent::AssetExchangeUpdated {
                    component: *component,
                    exchange: *exchange,
                });
            }
            Ok(())
        })
    }

    pub fn set_cool_off_periods(&mut self, ctx: &CallContext, components: &[Address], periods: &[u64]) -> Result<()> {
        self.atomically(|engine| {
            engine.only_manager(ctx)?;
            validate_arrays(components, periods.len())?;
            for (component, period) in components.iter().zip(periods) {
                engine.asset_info.entry(*component).or_default().cool_off_period = *period;
                engine.events.push(RebalanceEvent::CoolOffPeriodUpdated {
                    component: *component,
                    cool_off_period: *period,
                });
            }
            Ok(())
        })
    }

    pub fn set_raise_target_percentage(&mut self, ctx: &CallContext, percentage: u128) -> Result<()> {
        self.atomically(|engine| {
            engine.only_manager(ctx)?;
            if percentage == 0 {
                return Err(Error::InvalidRaiseTarget);
            }
            engine.settings.raise_target_percentage = percentage;
            engine
                .events
                .push(RebalanceEvent::RaiseTargetPercentageUpdated { percentage });
            Ok(())
        })
    }

    pub fn update_trader_status(&mut self, ctx: &CallContext, traders: &[Address], statuses: &[bool]) -> Result<()> {
        self.atomically(|engine| {
            engine.only_manager(ctx)?;
            if traders.len() != statuses.len() {
                return Err(Error::LengthMismatch);
            }
            if traders.is_empty() {
                return Err(Error::EmptyArray);
            }
            if has_duplicate(traders) {
                return Err(Error::DuplicateTrader);
            }
            for (trader, status) in traders.iter().zip(statuses) {
                if *status {
                    engine.traders.insert(*trader);
                } else {
                    engine.traders.remove(trader);
                }
                engine.events.push(RebalanceEvent::TraderStatusUpdated {
                    trader: *trader,
                    status: *status,
                });
            }
            Ok(())
        })
    }

    pub fn update_anyone_trade(&mut self, ctx: &CallContext, status: bool) -> Result<()> {
        self.atomically(|engine| {
            engine.only_manager(ctx)?;
            engine.anyone_trade = status;
            engine.events.push(RebalanceEvent::AnyoneTradeUpdated { status });
            Ok(())
        })
    }

    // === Trading ===

    /// Move `component` one step toward its target.
    ///
    /// Sells are exact-input of the clamped quantity; buys are exact-output
    /// of the clamped quantity, paid from the reserve balance.
    pub fn trade(&mut self, ctx: &CallContext, component: Address) -> Result<TradeExecuted> {
        self.atomically(|engine| {
            engine.only_allowed_trader(ctx)?;
            engine.only_eoa(ctx)?;
            engine.require_valid_basket()?;
            engine.require_in_rebalance(&component)?;
            engine.require_tradable(&component, ctx.timestamp)?;

            let plan = engine.plan_trade(&component)?;
            let pre = engine.pre_trade(&component);
            let (asset_in, asset_out, kind) = engine.legs(component, plan.direction);
            let bound = engine.slippage_bound(kind, plan.quote, pre.reserve)?;
            let fill = engine
                .venues
                .get_mut(plan.exchange)?
                .execute(asset_in, asset_out, plan.quantity, kind, bound)?;
            engine.settle(ctx, component, plan.direction, plan.exchange, fill, pre)
        })
    }

    /// Spend the entire reserve balance buying `component`.
    ///
    /// Only allowed once nothing routable is left to sell and some reserve is
    /// held. May overshoot the component's target, but the bought quantity
    /// must not exceed its `max_size`.
    pub fn trade_remaining_reserve(&mut self, ctx: &CallContext, component: Address) -> Result<TradeExecuted> {
        self.atomically(|engine| {
            engine.only_allowed_trader(ctx)?;
            engine.only_eoa(ctx)?;
            engine.require_valid_basket()?;
            engine.require_in_rebalance(&component)?;
            if !engine.no_tokens_to_sell()? {
                return Err(Error::MustSellAllSellableTokensFirst);
            }
            if component == engine.settings.reserve_asset {
                return Err(Error::ReserveAsComponent);
            }
            engine.require_tradable(&component, ctx.timestamp)?;

            let info = engine.asset_info(&component);
            let pre = engine.pre_trade(&component);
            if pre.reserve == 0 {
                return Err(Error::NoReserveRemaining);
            }
            let reserve = engine.settings.reserve_asset;
            let quote = engine
                .venues
                .get(info.exchange)?
                .quote(reserve, component, pre.reserve, SwapKind::ExactInput)?;
            if quote.amount_out > info.max_size {
                return Err(Error::TradeSizeExceedsLimit);
            }
            let bound = engine.slippage_bound(SwapKind::ExactInput, quote, pre.reserve)?;
            let fill = engine
                .venues
                .get_mut(info.exchange)?
                .execute(reserve, component, pre.reserve, SwapKind::ExactInput, bound)?;
            if fill.amount_out > info.max_size {
                return Err(Error::TradeSizeExceedsLimit);
            }
            engine.settle(ctx, component, TradeDirection::Buy, info.exchange, fill, pre)
        })
    }

    /// Raise every target by the configured percentage in O(1) by lowering
    /// the snapshot multiplier. Requires all targets met and a positive
    /// reserve position. Returns the new snapshot multiplier.
    pub fn raise_asset_targets(&mut self, ctx: &CallContext) -> Result<i128> {
        self.atomically(|engine| {
            engine.only_allowed_trader(ctx)?;
            engine.require_valid_basket()?;
            let reserve_unit = engine
                .basket
                .default_position_real_unit(&engine.settings.reserve_asset);
            if !(engine.all_targets_met()? && reserve_unit > 0) {
                return Err(Error::TargetsNotMetOrNoReserveRemaining);
            }
            let step = PRECISE_UNIT
                .checked_add(i128::try_from(engine.settings.raise_target_percentage).map_err(|_| Error::InvalidRaiseTarget)?)
                .ok_or(Error::InvalidRaiseTarget)?;
            let raised = precise_div(engine.position_multiplier, step)
                .filter(|m| *m > 0)
                .ok_or(basketbook::LedgerError::MultiplierTooSmall)?;
            info!(
                "targets raised: snapshot multiplier {} -> {raised}",
                engine.position_multiplier
            );
            engine.position_multiplier = raised;
            engine.events.push(RebalanceEvent::AssetTargetsRaised {
                position_multiplier: raised,
            });
            Ok(raised)
        })
    }

    // === Internals ===

    /// Run `op` as one transaction: on error, every change it made is
    /// discarded.
    pub fn atomically<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let checkpoint = self.clone();
        match op(self) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!("call reverted: {e}");
                *self = checkpoint;
                Err(e)
            }
        }
    }

    fn only_manager_caller(&self, ctx: &CallContext) -> Result<()> {
        if ctx.caller != self.basket.manager() {
            return Err(Error::OnlyManager);
        }
        Ok(())
    }

    fn only_manager(&self, ctx: &CallContext) -> Result<()> {
        self.only_manager_caller(ctx)?;
        self.require_valid_basket()
    }

    fn require_valid_basket(&self) -> Result<()> {
        if !self.system.is_valid_basket(&self.basket.address())
            || !self.basket.is_initialized_module(&self.settings.module)
        {
            return Err(Error::InvalidBasket);
        }
        Ok(())
    }

    fn only_allowed_trader(&self, ctx: &CallContext) -> Result<()> {
        if self.anyone_trade || self.traders.contains(&ctx.caller) {
            Ok(())
        } else {
            Err(Error::NotPermittedTrader)
        }
    }

    fn only_eoa(&self, ctx: &CallContext) -> Result<()> {
        if !ctx.is_externally_owned() {
            return Err(Error::NotExternallyOwned);
        }
        Ok(())
    }

    fn require_in_rebalance(&self, component: &Address) -> Result<()> {
        if !self.rebalance_components.contains(component) {
            return Err(Error::NotInRebalance(*component));
        }
        Ok(())
    }

    fn require_tradable(&self, component: &Address, now: Timestamp) -> Result<()> {
        let info = self.asset_info(component);
        if info.exchange.is_none() {
            return Err(Error::ExchangeNotSet);
        }
        if !info.cool_off_elapsed(now) {
            return Err(Error::CoolOffNotElapsed);
        }
        Ok(())
    }

    fn legs(&self, component: Address, direction: TradeDirection) -> (Address, Address, SwapKind) {
        let reserve = self.settings.reserve_asset;
        match direction {
            TradeDirection::Sell => (component, reserve, SwapKind::ExactInput),
            TradeDirection::Buy => (reserve, component, SwapKind::ExactOutput),
        }
    }

    fn pre_trade(&self, component: &Address) -> PreTrade {
        let basket = self.basket.address();
        PreTrade {
            component: self.balances.balance_of(&basket, component),
            reserve: self.balances.balance_of(&basket, &self.settings.reserve_asset),
        }
    }

    /// Bound passed to the venue: its own quote widened by the slippage
    /// tolerance. Exact-output spends are also capped at `max_input`.
    fn slippage_bound(&self, kind: SwapKind, quote: Quote, max_input: u128) -> Result<u128> {
        let bps = u128::from(self.settings.max_slippage_bps).min(BPS);
        let bound = match kind {
            SwapKind::ExactInput => mul_div_floor_u(quote.amount_out, BPS - bps, BPS),
            SwapKind::ExactOutput => mul_div_ceil_u(quote.amount_in, BPS + bps, BPS).map(|b| b.min(max_input)),
        };
        bound.ok_or(Error::Ledger(basketbook::LedgerError::Overflow))
    }

    /// Book a fill: move custody, charge the protocol fee, rewrite both
    /// default positions and stamp the trade time.
    fn settle(
        &mut self,
        ctx: &CallContext,
        component: Address,
        direction: TradeDirection,
        exchange: ExchangeId,
        fill: Fill,
        pre: PreTrade,
    ) -> Result<TradeExecuted> {
        let basket = self.basket.address();
        let (asset_in, asset_out, _) = self.legs(component, direction);
        self.balances.debit(basket, asset_in, fill.amount_in)?;
        self.balances.credit(basket, asset_out, fill.amount_out)?;

        let protocol_fee = self
            .system
            .module_fee_amount(&self.settings.module, TRADE_FEE_INDEX, fill.amount_out)?;
        if protocol_fee > 0 {
            self.balances
                .transfer(asset_out, basket, self.system.fee_recipient(), protocol_fee)?;
        }

        let reserve = self.settings.reserve_asset;
        let new_component_unit = self.update_position(component, pre.component)?;
        let new_reserve_unit = self.update_position(reserve, pre.reserve)?;
        self.asset_info.entry(component).or_default().last_trade_timestamp = ctx.timestamp;

        let executed = TradeExecuted {
            component,
            counter_asset: reserve,
            direction,
            exchange,
            amount_sold: fill.amount_in,
            amount_bought: fill.amount_out - protocol_fee,
            protocol_fee,
            new_component_unit,
            new_reserve_unit,
            timestamp: ctx.timestamp,
        };
        info!(
            "{direction} {component} on {exchange}: sold {} bought {} fee {} -> unit {new_component_unit}",
            executed.amount_sold, executed.amount_bought, protocol_fee
        );
        self.events.push(RebalanceEvent::TradeExecuted(executed.clone()));
        Ok(executed)
    }

    /// Recompute the default unit of `asset` from its custody balance,
    /// leaving out any surplus that was already untracked before the trade.
    fn update_position(&mut self, asset: Address, pre_balance: u128) -> Result<i128> {
        let supply = self.basket.total_supply();
        let basket = self.basket.address();
        let pre_unit = self.basket.default_position_real_unit(&asset);
        let tracked = notional(pre_unit, supply, false)?;
        let excess = pre_balance
            .checked_sub(tracked)
            .ok_or(Error::UntrackedShortfall { asset })?;

        let post_balance = self.balances.balance_of(&basket, &asset);
        let new_unit = if post_balance == 0 {
            0
        } else {
            let attributable = post_balance
                .checked_sub(excess)
                .ok_or(Error::UntrackedShortfall { asset })?;
            unit_from_notional(attributable, supply)?
        };
        if excess > 0 {
            debug!("{asset}: {excess} untracked excess left out of unit");
        }
        self.basket.ledger_mut().edit_default_position(asset, new_unit)?;
        Ok(new_unit)
    }
}

/// `unit * supply / 1e18`, rounded up or down. Non-positive units have no
/// custodied notional.
fn notional(unit: i128, supply: u128, round_up: bool) -> Result<u128> {
    if unit <= 0 {
        return Ok(0);
    }
    let unit = unit as u128;
    let value = if round_up {
        mul_div_ceil_u(unit, supply, PRECISE_UNIT_U)
    } else {
        mul_div_floor_u(unit, supply, PRECISE_UNIT_U)
    };
    value.ok_or(Error::Ledger(basketbook::LedgerError::Overflow))
}

/// `notional * 1e18 / supply`, floored: the unit a balance backs.
fn unit_from_notional(notional: u128, supply: u128) -> Result<i128> {
    mul_div_floor_u(notional, PRECISE_UNIT_U, supply)
        .and_then(|u| i128::try_from(u).ok())
        .ok_or(Error::Ledger(basketbook::LedgerError::Overflow))
}

fn has_duplicate(items: &[Address]) -> bool {
    let mut seen = FxHashSet::default();
    !items.iter().all(|item| seen.insert(*item))
}

fn validate_arrays(components: &[Address], data_len: usize) -> Result<()> {
    if components.len() != data_len {
        return Err(Error::LengthMismatch);
    }
    if components.is_empty() {
        return Err(Error::EmptyArray);
    }
    if has_duplicate(components) {
        return Err(Error::DuplicateComponent);
    }
    Ok(())
}
