//! Integration tests for the rebalance engine against real venue routers.
//!
//! Fixture: a basket of 100 tokens holding uni, wbtc and bal. uni trades on
//! a constant-product pool (uniswap), wbtc on a fixed-rate venue
//! (sushiswap) and bal across three pools (balancer).

use std::sync::Arc;

use basketbook::math::parse_fixed;
use basketbook::{Address, Basket, CallContext, PRECISE_UNIT, PRECISE_UNIT_U, SystemConfig, TokenBalances};
use basketbook_rebalancer::engine::{EngineSettings, RebalanceEngine, TRADE_FEE_INDEX};
use basketbook_rebalancer::error::Error;
use basketbook_rebalancer::event::{RebalanceEvent, TradeDirection};
use basketbook_venue::{
    AmmRouter, ExchangeAdapter, ExchangeId, FillMode, MockVenue, SplitRouter, SwapKind, Venue, VenueError,
    VenueRegistry,
};

const E18: u128 = PRECISE_UNIT_U;
const SUPPLY: u128 = 100 * E18;

fn addr(s: &str) -> Address {
    Address::new(s)
}
fn dpi() -> Address {
    addr("dpi")
}
fn uni() -> Address {
    addr("uni")
}
fn wbtc() -> Address {
    addr("wbtc")
}
fn bal() -> Address {
    addr("bal")
}
fn weth() -> Address {
    addr("weth")
}
fn module() -> Address {
    addr("index-module")
}

fn unit(s: &str) -> i128 {
    parse_fixed(s, 18).unwrap()
}

fn manager_at(ts: u64) -> CallContext {
    CallContext::external(addr("manager"), ts)
}

fn keeper_at(ts: u64) -> CallContext {
    CallContext::external(addr("keeper"), ts)
}

fn split_router() -> SplitRouter {
    let mut router = SplitRouter::new();
    router.add_pool(bal(), 100_000 * E18, weth(), 20_000 * E18, 30).unwrap();
    router.add_pool(bal(), 50_000 * E18, weth(), 10_000 * E18, 30).unwrap();
    router.add_pool(bal(), 20_000 * E18, weth(), 4_000 * E18, 30).unwrap();
    router
}

struct Setup {
    /// Targets for uni, wbtc, bal.
    targets: [&'static str; 3],
    protocol_fee: u128,
    mock_mode: FillMode,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            targets: ["60.869565780223716593", "0.02", "50"],
            protocol_fee: 0,
            mock_mode: FillMode::Quoted,
        }
    }
}

struct Fixture {
    engine: RebalanceEngine,
    /// Copy of the balancer venue as registered, for quoting expectations.
    split: SplitRouter,
}

impl Setup {
    fn build(self) -> Fixture {
        let mut system = SystemConfig::new(addr("treasury"))
            .with_basket(dpi())
            .with_module(module());
        system
            .set_module_fee(module(), TRADE_FEE_INDEX, self.protocol_fee)
            .unwrap();

        let units = [
            (uni(), unit("86.9565217")),
            (wbtc(), unit("0.01111111")),
            (bal(), 100 * PRECISE_UNIT),
        ];
        let mut basket = Basket::new(dpi(), addr("manager"), &units, SUPPLY).unwrap();
        basket.add_module(&system, addr("manager"), module()).unwrap();

        let mut balances = TokenBalances::new();
        for (asset, u) in units {
            balances.credit(dpi(), asset, u as u128 * 100).unwrap();
        }

        let split = split_router();
        let venues = VenueRegistry::new()
            .with_venue(
                ExchangeId::Uniswap,
                AmmRouter::new().with_pool(uni(), 1_000_000 * E18, weth(), 5_000 * E18, 30),
            )
            .unwrap()
            .with_venue(
                ExchangeId::Sushiswap,
                MockVenue::builder()
                    .with_rate(wbtc(), weth(), 15 * E18)
                    .with_rate(uni(), weth(), E18 / 200)
                    .fill_mode(self.mock_mode)
                    .build(),
            )
            .unwrap()
            .with_venue(ExchangeId::Balancer, split.clone())
            .unwrap();

        let mut engine = RebalanceEngine::new(
            Arc::new(system),
            EngineSettings::new(module(), weth()),
            basket,
            balances,
            venues,
        );
        let ctx = manager_at(0);
        engine.initialize(&ctx).unwrap();
        engine.update_trader_status(&ctx, &[addr("keeper")], &[true]).unwrap();
        let old: Vec<i128> = self.targets.iter().map(|t| unit(t)).collect();
        engine.start_rebalance(&ctx, &[], &[], &old, PRECISE_UNIT).unwrap();
        engine
            .set_exchanges(
                &ctx,
                &[uni(), wbtc(), bal()],
                &[ExchangeId::Uniswap, ExchangeId::Sushiswap, ExchangeId::Balancer],
            )
            .unwrap();
        engine
            .set_trade_maximums(&ctx, &[uni(), wbtc(), bal()], &[1_000 * E18, E18, 1_000 * E18])
            .unwrap();
        engine.take_events();

        Fixture { engine, split }
    }
}

fn fixture() -> Fixture {
    Setup::default().build()
}

fn weth_balance(engine: &RebalanceEngine, holder: &Address) -> u128 {
    engine.balances().balance_of(holder, &weth())
}

// ============================================================================
// trade: sells
// ============================================================================

#[test]
fn sell_through_split_venue_books_quoted_output() {
    let mut f = fixture();
    let quote = f
        .split
        .quote_split(bal(), weth(), 1_000 * E18, SwapKind::ExactInput)
        .unwrap();
    assert!(quote.legs.len() > 1);

    let trade = f.engine.trade(&keeper_at(1_000), bal()).unwrap();

    assert_eq!(trade.direction, TradeDirection::Sell);
    assert_eq!(trade.amount_sold, 1_000 * E18);
    assert_eq!(trade.amount_bought, quote.total_output);

    let basket = f.engine.basket();
    assert_eq!(basket.default_position_real_unit(&bal()), 90 * PRECISE_UNIT);
    assert_eq!(weth_balance(&f.engine, &dpi()), quote.total_output);
    assert_eq!(
        basket.default_position_real_unit(&weth()),
        (quote.total_output / 100) as i128
    );
    assert!(basket.components().contains(&weth()));
    assert_eq!(f.engine.asset_info(&bal()).last_trade_timestamp, 1_000);
}

#[test]
fn clamped_sell_moves_unit_by_max_size() {
    let mut f = fixture();
    let before = f.engine.basket().default_position_real_unit(&uni());
    let target = f.engine.target_unit(&uni()).unwrap();

    f.engine.trade(&keeper_at(1_000), uni()).unwrap();

    let after = f.engine.basket().default_position_real_unit(&uni());
    assert_eq!(after, unit("76.9565217"));
    assert_eq!(before - after, 10 * PRECISE_UNIT);
    assert!((after - target).abs() < (before - target).abs());

    match f.engine.venues().get(ExchangeId::Uniswap).unwrap() {
        Venue::Amm(router) => {
            let pool = router.pool(uni(), weth()).unwrap();
            assert_eq!(pool.reserve(&uni()), Some(1_001_000 * E18));
        }
        other => panic!("unexpected venue {other:?}"),
    }
}

#[test]
fn untracked_excess_is_left_out_of_unit() {
    let mut f = fixture();
    f.engine.balances_mut().credit(dpi(), weth(), 5 * E18).unwrap();
    let quote = f
        .split
        .quote_split(bal(), weth(), 1_000 * E18, SwapKind::ExactInput)
        .unwrap();

    f.engine.trade(&keeper_at(1_000), bal()).unwrap();

    assert_eq!(weth_balance(&f.engine, &dpi()), quote.total_output + 5 * E18);
    assert_eq!(
        f.engine.basket().default_position_real_unit(&weth()),
        (quote.total_output / 100) as i128
    );
}

#[test]
fn trade_event_is_recorded() {
    let mut f = fixture();
    let trade = f.engine.trade(&keeper_at(1_000), bal()).unwrap();
    let events = f.engine.take_events();
    assert_eq!(events, vec![RebalanceEvent::TradeExecuted(trade)]);
}

// ============================================================================
// trade: buys
// ============================================================================

#[test]
fn buy_lands_exactly_on_target() {
    let mut f = fixture();
    f.engine.trade(&keeper_at(1_000), bal()).unwrap();

    let needed = 888_889 * E18 / 1_000_000;
    let cost = f
        .engine
        .venues()
        .get(ExchangeId::Sushiswap)
        .unwrap()
        .quote(weth(), wbtc(), needed, SwapKind::ExactOutput)
        .unwrap()
        .amount_in;
    let weth_before = weth_balance(&f.engine, &dpi());

    let trade = f.engine.trade(&keeper_at(1_000), wbtc()).unwrap();

    assert_eq!(trade.direction, TradeDirection::Buy);
    assert_eq!(trade.amount_bought, needed);
    assert_eq!(trade.amount_sold, cost);
    assert_eq!(
        f.engine.basket().default_position_real_unit(&wbtc()),
        f.engine.target_unit(&wbtc()).unwrap()
    );
    assert_eq!(weth_balance(&f.engine, &dpi()), weth_before - cost);
    assert!(matches!(
        f.engine.trade(&keeper_at(1_000), wbtc()),
        Err(Error::TargetAlreadyMet)
    ));
}

#[test]
fn buy_without_reserve_reverts() {
    let mut f = fixture();
    let before = f.engine.balances().clone();
    let err = f.engine.trade(&keeper_at(1_000), wbtc()).unwrap_err();
    assert!(matches!(err, Error::Venue(VenueError::SlippageExceeded { .. })));
    assert_eq!(f.engine.balances(), &before);
}

// ============================================================================
// Protocol fee
// ============================================================================

#[test]
fn protocol_fee_goes_to_fee_recipient() {
    let mut f = Setup {
        protocol_fee: E18 / 1_000,
        ..Default::default()
    }
    .build();
    let quote = f
        .split
        .quote_split(bal(), weth(), 1_000 * E18, SwapKind::ExactInput)
        .unwrap();
    let fee = quote.total_output / 1_000;

    let trade = f.engine.trade(&keeper_at(1_000), bal()).unwrap();

    assert_eq!(trade.protocol_fee, fee);
    assert_eq!(trade.amount_bought, quote.total_output - fee);
    assert_eq!(weth_balance(&f.engine, &addr("treasury")), fee);
    assert_eq!(weth_balance(&f.engine, &dpi()), quote.total_output - fee);
    assert_eq!(
        f.engine.basket().default_position_real_unit(&weth()),
        ((quote.total_output - fee) / 100) as i128
    );
}

// ============================================================================
// Cool-off gating
// ============================================================================

#[test]
fn cool_off_boundary_is_inclusive() {
    let mut f = fixture();
    f.engine
        .set_cool_off_periods(&manager_at(0), &[bal()], &[600])
        .unwrap();

    f.engine.trade(&keeper_at(1_000), bal()).unwrap();
    assert!(matches!(
        f.engine.trade(&keeper_at(1_599), bal()),
        Err(Error::CoolOffNotElapsed)
    ));
    assert_eq!(f.engine.basket().default_position_real_unit(&bal()), 90 * PRECISE_UNIT);

    f.engine.trade(&keeper_at(1_600), bal()).unwrap();
    assert_eq!(f.engine.basket().default_position_real_unit(&bal()), 80 * PRECISE_UNIT);
    assert_eq!(f.engine.asset_info(&bal()).last_trade_timestamp, 1_600);
}

#[test]
fn cool_off_is_per_asset() {
    let mut f = fixture();
    f.engine
        .set_cool_off_periods(&manager_at(0), &[uni(), bal()], &[600, 600])
        .unwrap();
    f.engine.trade(&keeper_at(1_000), bal()).unwrap();
    f.engine.trade(&keeper_at(1_000), uni()).unwrap();
}

// ============================================================================
// Preconditions
// ============================================================================

#[test]
fn unset_exchange_fails_before_mutation() {
    let mut f = fixture();
    f.engine
        .set_exchanges(&manager_at(0), &[uni()], &[ExchangeId::None])
        .unwrap();
    f.engine.take_events();
    let basket = f.engine.basket().clone();

    let err = f.engine.trade(&keeper_at(1_000), uni()).unwrap_err();

    assert!(matches!(err, Error::ExchangeNotSet));
    assert_eq!(err.to_string(), "exchange must be specified");
    assert_eq!(f.engine.basket(), &basket);
    assert!(f.engine.events().is_empty());
}

#[test]
fn reserve_cannot_be_new_component() {
    let mut f = fixture();
    let old = [unit("60"), unit("0.02"), unit("50")];
    let err = f
        .engine
        .start_rebalance(&manager_at(0), &[weth()], &[PRECISE_UNIT], &old, PRECISE_UNIT)
        .unwrap_err();
    assert!(matches!(err, Error::ReserveAsComponent));
    assert_eq!(err.to_string(), "reserve asset cannot be a component");

    assert!(matches!(
        f.engine
            .start_rebalance(&manager_at(0), &[], &[], &old[..2], PRECISE_UNIT),
        Err(Error::MissingOldTargets)
    ));
}

#[test]
fn held_reserve_is_excluded_from_old_targets() {
    let mut f = fixture();
    f.engine.trade(&keeper_at(1_000), bal()).unwrap();
    assert!(f.engine.basket().components().contains(&weth()));

    let old = [unit("60"), unit("0.02"), unit("50")];
    f.engine
        .start_rebalance(&manager_at(1_000), &[addr("link")], &[PRECISE_UNIT], &old, PRECISE_UNIT)
        .unwrap();
    assert_eq!(
        f.engine.rebalance_components(),
        &[uni(), wbtc(), bal(), addr("link")]
    );
}

#[test]
fn trade_requires_rebalance_component_and_eoa() {
    let mut f = fixture();
    assert!(matches!(
        f.engine.trade(&keeper_at(1_000), weth()),
        Err(Error::NotInRebalance(_))
    ));
    assert!(matches!(
        f.engine
            .trade(&CallContext::contract(addr("keeper"), 1_000), bal()),
        Err(Error::NotExternallyOwned)
    ));
    assert!(matches!(
        f.engine
            .trade(&CallContext::external(addr("stranger"), 1_000), bal()),
        Err(Error::NotPermittedTrader)
    ));
}

// ============================================================================
// Zero-out removal
// ============================================================================

#[test]
fn selling_to_zero_removes_component() {
    let mut f = Setup {
        targets: ["60.869565780223716593", "0.02", "0"],
        ..Default::default()
    }
    .build();
    f.engine
        .set_trade_maximums(&manager_at(0), &[bal()], &[20_000 * E18])
        .unwrap();

    let trade = f.engine.trade(&keeper_at(1_000), bal()).unwrap();

    assert_eq!(trade.amount_sold, 10_000 * E18);
    assert_eq!(trade.new_component_unit, 0);
    assert!(!f.engine.basket().components().contains(&bal()));
    assert_eq!(f.engine.balances().balance_of(&dpi(), &bal()), 0);
    assert!(matches!(
        f.engine.trade(&keeper_at(2_000), bal()),
        Err(Error::TargetAlreadyMet)
    ));
}

// ============================================================================
// Atomicity
// ============================================================================

#[test]
fn venue_rejection_rolls_back_everything() {
    let mut f = Setup {
        mock_mode: FillMode::Reject,
        ..Default::default()
    }
    .build();
    f.engine
        .set_exchanges(&manager_at(0), &[uni()], &[ExchangeId::Sushiswap])
        .unwrap();
    f.engine.take_events();
    let basket = f.engine.basket().clone();
    let balances = f.engine.balances().clone();

    let err = f.engine.trade(&keeper_at(1_000), uni()).unwrap_err();

    assert!(matches!(err, Error::Venue(VenueError::Rejected(_))));
    assert_eq!(f.engine.basket(), &basket);
    assert_eq!(f.engine.balances(), &balances);
    assert_eq!(f.engine.asset_info(&uni()).last_trade_timestamp, 0);
    assert!(f.engine.events().is_empty());
    match f.engine.venues().get(ExchangeId::Sushiswap).unwrap() {
        Venue::Mock(mock) => assert!(mock.recorded_swaps().is_empty()),
        other => panic!("unexpected venue {other:?}"),
    }
}

#[test]
fn slippage_beyond_tolerance_reverts() {
    let mut f = Setup {
        mock_mode: FillMode::Slipped(200),
        ..Default::default()
    }
    .build();
    f.engine
        .set_exchanges(&manager_at(0), &[uni()], &[ExchangeId::Sushiswap])
        .unwrap();
    let basket = f.engine.basket().clone();

    let err = f.engine.trade(&keeper_at(1_000), uni()).unwrap_err();
    assert!(matches!(err, Error::Venue(VenueError::SlippageExceeded { .. })));
    assert_eq!(f.engine.basket(), &basket);
}

#[test]
fn slippage_within_tolerance_fills() {
    let mut f = Setup {
        mock_mode: FillMode::Slipped(50),
        ..Default::default()
    }
    .build();
    f.engine
        .set_exchanges(&manager_at(0), &[uni()], &[ExchangeId::Sushiswap])
        .unwrap();

    let trade = f.engine.trade(&keeper_at(1_000), uni()).unwrap();
    // 1000 uni at 0.005 weth, less 0.5%
    assert_eq!(trade.amount_bought, 5 * E18 * 9_950 / 10_000);
}

// ============================================================================
// trade_remaining_reserve
// ============================================================================

#[test]
fn remaining_reserve_requires_nothing_left_to_sell() {
    let mut f = fixture();
    f.engine.trade(&keeper_at(1_000), bal()).unwrap();
    assert!(matches!(
        f.engine.trade_remaining_reserve(&keeper_at(1_000), wbtc()),
        Err(Error::MustSellAllSellableTokensFirst)
    ));
}

#[test]
fn remaining_reserve_is_spent_in_full() {
    let mut f = Setup {
        targets: ["86.9565217", "0.02", "90"],
        ..Default::default()
    }
    .build();
    f.engine.trade(&keeper_at(1_000), bal()).unwrap();
    assert!(f.engine.no_tokens_to_sell().unwrap());

    let reserve = weth_balance(&f.engine, &dpi());
    let expected = f
        .engine
        .venues()
        .get(ExchangeId::Sushiswap)
        .unwrap()
        .quote(weth(), wbtc(), reserve, SwapKind::ExactInput)
        .unwrap()
        .amount_out;
    let wbtc_before = f.engine.balances().balance_of(&dpi(), &wbtc());

    // default max_size of 1 wbtc is below what the reserve buys
    assert!(matches!(
        f.engine.trade_remaining_reserve(&keeper_at(1_000), wbtc()),
        Err(Error::TradeSizeExceedsLimit)
    ));
    assert_eq!(weth_balance(&f.engine, &dpi()), reserve);

    f.engine
        .set_trade_maximums(&manager_at(1_000), &[wbtc()], &[100 * E18])
        .unwrap();
    let trade = f.engine.trade_remaining_reserve(&keeper_at(1_000), wbtc()).unwrap();

    assert_eq!(trade.amount_sold, reserve);
    assert_eq!(trade.amount_bought, expected);
    assert_eq!(trade.new_reserve_unit, 0);
    assert_eq!(weth_balance(&f.engine, &dpi()), 0);
    assert!(!f.engine.basket().components().contains(&weth()));
    assert_eq!(
        f.engine.balances().balance_of(&dpi(), &wbtc()),
        wbtc_before + expected
    );
    // overshoots the target
    assert!(
        f.engine.basket().default_position_real_unit(&wbtc()) > f.engine.target_unit(&wbtc()).unwrap()
    );
}

#[test]
fn remaining_reserve_rejects_reserve_component() {
    let mut f = Setup {
        targets: ["86.9565217", "0.01111111", "90"],
        ..Default::default()
    }
    .build();
    f.engine.trade(&keeper_at(1_000), bal()).unwrap();
    assert!(matches!(
        f.engine.trade_remaining_reserve(&keeper_at(1_000), weth()),
        Err(Error::NotInRebalance(_))
    ));
}

// ============================================================================
// raise_asset_targets
// ============================================================================

#[test]
fn raise_requires_targets_met_and_reserve() {
    let mut f = fixture();
    assert!(matches!(
        f.engine.raise_asset_targets(&keeper_at(1_000)),
        Err(Error::TargetsNotMetOrNoReserveRemaining)
    ));

    // targets met but no reserve held
    let mut f = Setup {
        targets: ["86.9565217", "0.01111111", "100"],
        ..Default::default()
    }
    .build();
    assert!(f.engine.all_targets_met().unwrap());
    assert!(matches!(
        f.engine.raise_asset_targets(&keeper_at(1_000)),
        Err(Error::TargetsNotMetOrNoReserveRemaining)
    ));
}

#[test]
fn raise_scales_every_target() {
    let mut f = Setup {
        targets: ["86.9565217", "0.01111111", "90"],
        ..Default::default()
    }
    .build();
    f.engine.trade(&keeper_at(1_000), bal()).unwrap();
    assert!(f.engine.all_targets_met().unwrap());

    let multiplier = f.engine.raise_asset_targets(&keeper_at(1_000)).unwrap();

    assert_eq!(multiplier, 997_506_234_413_965_087);
    assert_eq!(f.engine.position_multiplier(), multiplier);
    let raised = f.engine.target_unit(&bal()).unwrap();
    assert!(raised >= unit("90.225"));
    assert!(raised < unit("90.225") + 100);
    assert!(!f.engine.all_targets_met().unwrap());
    assert!(matches!(
        f.engine.raise_asset_targets(&keeper_at(1_000)),
        Err(Error::TargetsNotMetOrNoReserveRemaining)
    ));

    // stored targets are untouched; only the snapshot moved
    assert_eq!(f.engine.asset_info(&bal()).target_unit, 90 * PRECISE_UNIT);
}

#[test]
fn raise_requires_permitted_trader() {
    let mut f = Setup {
        targets: ["86.9565217", "0.01111111", "90"],
        ..Default::default()
    }
    .build();
    f.engine.trade(&keeper_at(1_000), bal()).unwrap();
    assert!(matches!(
        f.engine
            .raise_asset_targets(&CallContext::external(addr("stranger"), 1_000)),
        Err(Error::NotPermittedTrader)
    ));
}

// ============================================================================
// get_target_units
// ============================================================================

#[test]
fn target_units_track_live_multiplier() {
    let mut f = fixture();
    assert_eq!(
        f.engine.target_units(&[uni(), wbtc(), bal()]).unwrap(),
        vec![unit("60.869565780223716593"), unit("0.02"), unit("50")]
    );

    // 2% streaming fee dilution
    f.engine
        .basket_mut()
        .ledger_mut()
        .edit_position_multiplier(PRECISE_UNIT * 98 / 100)
        .unwrap();
    assert_eq!(f.engine.target_unit(&bal()).unwrap(), 49 * PRECISE_UNIT);
}
