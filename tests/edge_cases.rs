//! Edge-case tests: adversarial inputs to the ledger, basket and custody APIs.

use basketbook::math::{
    format_fixed, mul_div_ceil_u, mul_div_floor, mul_div_floor_u, parse_fixed, precise_div, precise_mul,
};
use basketbook::{
    Address, Basket, LedgerError, PRECISE_UNIT, PRECISE_UNIT_U, PositionLedger, PositionState, SystemConfig,
    TokenBalances,
};

fn dai() -> Address {
    Address::new("dai")
}
fn weth() -> Address {
    Address::new("weth")
}
fn lender() -> Address {
    Address::new("lending-module")
}

// ============================================================================
// Fixed-point extremes
// ============================================================================

#[test]
fn full_width_products_divide_back() {
    assert_eq!(mul_div_floor_u(u128::MAX, u128::MAX, u128::MAX), Some(u128::MAX));
    assert_eq!(mul_div_floor(i128::MAX, i128::MAX, i128::MAX), Some(i128::MAX));
    assert_eq!(mul_div_floor(i128::MIN, 1, 1), Some(i128::MIN));
}

#[test]
fn division_by_zero_is_none() {
    assert_eq!(mul_div_floor_u(1, 1, 0), None);
    assert_eq!(mul_div_ceil_u(1, 1, 0), None);
    assert_eq!(precise_div(PRECISE_UNIT, 0), None);
}

#[test]
fn quotient_beyond_range_is_none() {
    assert_eq!(mul_div_floor_u(u128::MAX, 2, 1), None);
    assert_eq!(precise_mul(i128::MAX, 2 * PRECISE_UNIT), None);
    assert_eq!(mul_div_ceil_u(u128::MAX, u128::MAX, u128::MAX - 1), None);
}

#[test]
fn smallest_negative_product_floors_to_minus_one() {
    assert_eq!(precise_mul(-1, 1), Some(-1));
    assert_eq!(precise_mul(1, 1), Some(0));
}

#[test]
fn parse_rejects_garbage() {
    for bad in ["", ".", "-", "1.2.3", "abc", "1e18", "0.0000000000000000001", "+1"] {
        assert_eq!(parse_fixed(bad, 18), None, "{bad:?} should not parse");
    }
    assert_eq!(parse_fixed(" 1.5 ", 18), Some(3 * PRECISE_UNIT / 2));
    assert_eq!(parse_fixed(".5", 18), Some(PRECISE_UNIT / 2));
}

#[test]
fn format_handles_sign_and_dust() {
    assert_eq!(format_fixed(-1, 18), "-0.000000000000000001");
    assert_eq!(format_fixed(0, 18), "0");
    assert_eq!(format_fixed(i128::MIN, 0), i128::MIN.to_string());
}

// ============================================================================
// Ledger rejections leave state untouched
// ============================================================================

#[test]
fn edit_that_virtualizes_to_zero_is_rejected() {
    let mut ledger = PositionLedger::with_positions(&[(dai(), 5 * PRECISE_UNIT)]).unwrap();
    ledger.edit_position_multiplier(3 * PRECISE_UNIT).unwrap();
    let before = ledger.clone();

    let err = ledger.edit_default_position(weth(), 2).unwrap_err();

    assert_eq!(err, LedgerError::InvalidVirtualUnit { component: weth() });
    assert_eq!(ledger, before);
}

#[test]
fn multiplier_overflowing_a_position_is_rejected() {
    let mut ledger = PositionLedger::with_positions(&[(dai(), i128::MAX / 2)]).unwrap();
    assert_eq!(
        ledger.edit_position_multiplier(4 * PRECISE_UNIT),
        Err(LedgerError::Overflow)
    );
    assert_eq!(ledger.position_multiplier(), PRECISE_UNIT);
}

#[test]
fn non_positive_multiplier_is_rejected() {
    let mut ledger = PositionLedger::new();
    assert_eq!(ledger.edit_position_multiplier(0), Err(LedgerError::MultiplierTooSmall));
    assert_eq!(ledger.edit_position_multiplier(-PRECISE_UNIT), Err(LedgerError::MultiplierTooSmall));
}

#[test]
fn removing_unknown_component_fails() {
    let mut ledger = PositionLedger::new();
    assert_eq!(ledger.remove_component(dai()), Err(LedgerError::ComponentNotFound(dai())));
    assert_eq!(
        ledger.remove_external_position_module(dai(), lender()),
        Err(LedgerError::ModuleNotAttributed {
            component: dai(),
            module: lender()
        })
    );
}

#[test]
fn zero_units_are_skipped_at_creation() {
    let ledger = PositionLedger::with_positions(&[(dai(), 0), (weth(), PRECISE_UNIT)]).unwrap();
    assert_eq!(ledger.components(), &[weth()]);
}

// ============================================================================
// External positions
// ============================================================================

#[test]
fn negative_external_position_keeps_component() {
    let mut ledger = PositionLedger::new();
    ledger
        .edit_external_position(dai(), lender(), -20 * PRECISE_UNIT, b"debt".to_vec())
        .unwrap();
    assert!(ledger.is_component(&dai()));
    assert_eq!(ledger.external_position_real_unit(&dai(), &lender()), -20 * PRECISE_UNIT);

    ledger.edit_default_position(dai(), 50 * PRECISE_UNIT).unwrap();
    assert_eq!(ledger.total_component_real_units(&dai()), 30 * PRECISE_UNIT);

    let positions = ledger.positions();
    assert_eq!(positions.len(), 2);
    assert_eq!(positions[0].state, PositionState::Default);
    assert_eq!(positions[1].state, PositionState::External);
    assert_eq!(positions[1].data, b"debt".to_vec());

    // clearing the default position keeps the externally held component
    ledger.edit_default_position(dai(), 0).unwrap();
    assert!(ledger.is_component(&dai()));
    ledger.edit_external_position(dai(), lender(), 0, Vec::new()).unwrap();
    assert!(!ledger.is_component(&dai()));
}

#[test]
fn external_positions_rebase_with_defaults() {
    let mut ledger = PositionLedger::with_positions(&[(dai(), 10 * PRECISE_UNIT)]).unwrap();
    ledger
        .edit_external_position(weth(), lender(), 4 * PRECISE_UNIT, Vec::new())
        .unwrap();
    ledger.edit_position_multiplier(PRECISE_UNIT / 2).unwrap();
    assert_eq!(ledger.default_position_real_unit(&dai()), 5 * PRECISE_UNIT);
    assert_eq!(ledger.external_position_real_unit(&weth(), &lender()), 2 * PRECISE_UNIT);
}

// ============================================================================
// Basket and custody
// ============================================================================

#[test]
fn duplicate_initial_positions_rejected() {
    let err = Basket::new(
        Address::new("dpi"),
        Address::new("manager"),
        &[(dai(), PRECISE_UNIT), (dai(), PRECISE_UNIT)],
        PRECISE_UNIT_U,
    )
    .unwrap_err();
    assert_eq!(err, LedgerError::DuplicateComponent(dai()));
}

#[test]
fn notional_tracks_supply_changes() {
    let mut basket = Basket::new(
        Address::new("dpi"),
        Address::new("manager"),
        &[(dai(), 3 * PRECISE_UNIT)],
        PRECISE_UNIT_U,
    )
    .unwrap();
    basket.set_total_supply(PRECISE_UNIT_U / 3);
    // 3 * 0.333.. = 0.999..999, floored
    assert_eq!(basket.default_position_notional(&dai()).unwrap(), PRECISE_UNIT_U - 1);
    basket.set_total_supply(0);
    assert_eq!(basket.default_position_notional(&dai()).unwrap(), 0);
}

#[test]
fn overdrawn_debit_reports_holder_and_asset() {
    let mut balances = TokenBalances::new();
    let holder = Address::new("dpi");
    balances.credit(holder, dai(), 10).unwrap();
    assert_eq!(
        balances.debit(holder, dai(), 11),
        Err(LedgerError::InsufficientBalance { holder, asset: dai() })
    );
    assert_eq!(balances.balance_of(&holder, &dai()), 10);
    assert_eq!(balances.credit(holder, dai(), u128::MAX), Err(LedgerError::Overflow));
}

#[test]
fn fee_amount_on_huge_quantity() {
    let mut system = SystemConfig::new(Address::new("treasury"));
    system.set_module_fee(lender(), 0, PRECISE_UNIT_U).unwrap();
    assert_eq!(system.module_fee_amount(&lender(), 0, u128::MAX).unwrap(), u128::MAX);
    assert_eq!(system.module_fee_amount(&lender(), 1, u128::MAX).unwrap(), 0);
}

#[cfg(feature = "serde")]
#[test]
fn basket_serde_round_trip() {
    let mut basket = Basket::new(
        Address::new("dpi"),
        Address::new("manager"),
        &[(dai(), 100 * PRECISE_UNIT), (weth(), PRECISE_UNIT / 100)],
        10 * PRECISE_UNIT_U,
    )
    .unwrap();
    basket
        .ledger_mut()
        .edit_external_position(dai(), lender(), -PRECISE_UNIT, vec![1, 2, 3])
        .unwrap();
    basket.ledger_mut().edit_position_multiplier(PRECISE_UNIT * 98 / 100).unwrap();

    let json = serde_json::to_string(&basket).unwrap();
    let restored: Basket = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, basket);
}
