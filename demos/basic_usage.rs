//! Basic usage example: create a basket, rebase it, inspect positions.
//!
//! Run with: cargo run --example basic_usage

use basketbook::math::format_fixed;
use basketbook::{Address, Basket, PRECISE_UNIT, PRECISE_UNIT_U};

fn show(basket: &Basket) {
    println!(
        "  multiplier {}",
        format_fixed(basket.position_multiplier(), 18)
    );
    for position in basket.ledger().positions() {
        let module = position
            .module
            .map(|m| m.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "  {:6} {:16} {:>24}",
            position.component,
            module,
            format_fixed(position.unit, 18)
        );
    }
}

fn main() {
    let dai = Address::new("dai");
    let wbtc = Address::new("wbtc");
    let lender = Address::new("lending-module");

    println!("=== Creating the basket ===\n");

    let mut basket = Basket::new(
        Address::new("dpi"),
        Address::new("manager"),
        &[(dai, 100 * PRECISE_UNIT), (wbtc, PRECISE_UNIT / 100)],
        1_000 * PRECISE_UNIT_U,
    )
    .unwrap();
    show(&basket);
    println!(
        "  dai notional: {}",
        format_fixed(basket.default_position_notional(&dai).unwrap() as i128, 18)
    );

    // A 2% streaming fee dilutes every component with one write.
    println!("\n=== Streaming fee rebase ===\n");

    basket
        .ledger_mut()
        .edit_position_multiplier(PRECISE_UNIT * 98 / 100)
        .unwrap();
    show(&basket);

    // Collateral held by a lending module still counts toward the basket.
    println!("\n=== External position ===\n");

    basket
        .ledger_mut()
        .edit_external_position(dai, lender, 20 * PRECISE_UNIT, Vec::new())
        .unwrap();
    show(&basket);
    println!(
        "  total dai per token: {}",
        format_fixed(basket.ledger().total_component_real_units(&dai), 18)
    );

    // Zeroing the default position keeps dai listed while the module holds it.
    println!("\n=== Clearing the default position ===\n");

    basket.ledger_mut().edit_default_position(dai, 0).unwrap();
    show(&basket);
    println!("  components: {:?}", basket.components());
}
