//! Keeper orchestrator: build → plan → confirm → trade until targets are met.
//!
//! The keeper drives a [`RebalanceEngine`] on a simulated clock. Each round
//! it sells over-weight components first so the reserve is funded, then buys.
//! When every target is met and reserve is left over it raises targets; when
//! nothing is left to sell it can sweep the reserve into one component.

use basketbook::math::format_fixed;
use basketbook::{Address, CallContext, Timestamp};
use log::{debug, info, warn};

use crate::audit::{self, AuditLog};
use crate::config::Config;
use crate::engine::{RebalanceEngine, TradePlan};
use crate::error::{Error, Result};
use crate::event::{TradeDirection, TradeExecuted};
use crate::scenario::Scenario;

/// Options for a keeper run.
pub struct RunOptions {
    pub dry_run: bool,
    pub force: bool,
    pub scenario_file: String,
    /// Overrides `bot.max_rounds` from the config.
    pub max_rounds: Option<usize>,
}

/// Outcome of a keeper run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rounds: usize,
    pub trades: usize,
    pub raises: usize,
    /// Calls rejected for reasons other than a business rule.
    pub failures: usize,
    pub targets_met: bool,
    pub end_time: Timestamp,
}

/// Build the engine and execute the rebalance.
pub fn run(config: &Config, scenario: &Scenario, opts: &RunOptions) -> Result<RunSummary> {
    let mut engine = scenario.build(config)?;
    let clock = scenario.start_time;

    let mut audit = AuditLog::open(&config.audit_path())?;
    audit::log_run_started(&mut audit, &opts.scenario_file, &scenario.basket, clock)?;
    flush_events(&mut engine, &mut audit, clock)?;

    let plans = plan_all(&engine);
    display_plan(&plans);
    audit::log_plan(&mut audit, &plans)?;

    if opts.dry_run {
        println!("\n[DRY RUN] No trades executed.");
        return Ok(RunSummary {
            targets_met: engine.all_targets_met()?,
            end_time: clock,
            ..Default::default()
        });
    }

    if !opts.force {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt("Execute?")
            .default(false)
            .interact()
            .map_err(|e| Error::Aborted(format!("confirmation prompt failed: {e}")))?;

        audit.log("user_confirmed", serde_json::json!({ "approved": confirmed }))?;
        if !confirmed {
            return Err(Error::Aborted("not confirmed".into()));
        }
    }

    let keeper = Keeper {
        trader: config.trader()?,
        sweep: config.sweep_component()?,
        max_rounds: opts.max_rounds.unwrap_or(config.bot.max_rounds),
        max_raises: config.bot.max_raises,
    };
    let summary = keeper.run(&mut engine, &mut audit, clock)?;

    audit::log_run_completed(&mut audit, &summary)?;
    println!(
        "\n{} rounds, {} trades, {} raises, {} failures. Audit logged to {}",
        summary.rounds,
        summary.trades,
        summary.raises,
        summary.failures,
        config.audit_path().display()
    );
    display_targets(&engine)?;
    Ok(summary)
}

/// Show the next trade of every rebalance component without executing.
pub fn plan(config: &Config, scenario: &Scenario) -> Result<()> {
    let engine = scenario.build(config)?;
    display_plan(&plan_all(&engine));
    Ok(())
}

/// Show current units against live-scaled targets.
pub fn targets(config: &Config, scenario: &Scenario) -> Result<()> {
    let engine = scenario.build(config)?;
    display_targets(&engine)
}

/// Trading loop parameters.
struct Keeper {
    trader: Address,
    sweep: Option<Address>,
    max_rounds: usize,
    max_raises: usize,
}

impl Keeper {
    fn run(&self, engine: &mut RebalanceEngine, audit: &mut AuditLog, start: Timestamp) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut clock = start;

        while summary.rounds < self.max_rounds {
            summary.rounds += 1;
            let ctx = CallContext::external(self.trader, clock);
            let mut progressed = false;

            for component in trade_order(engine) {
                match engine.trade(&ctx, component) {
                    Ok(trade) => {
                        display_trade(&trade);
                        summary.trades += 1;
                        progressed = true;
                    }
                    Err(e) => self.rejected(audit, "trade", Some(component), &e, clock, &mut summary)?,
                }
            }
            flush_events(engine, audit, clock)?;

            if engine.all_targets_met()? {
                if summary.raises < self.max_raises && reserve_unit(engine) > 0 {
                    match engine.raise_asset_targets(&ctx) {
                        Ok(multiplier) => {
                            println!("RAISE  targets, snapshot multiplier {}", format_fixed(multiplier, 18));
                            summary.raises += 1;
                            flush_events(engine, audit, clock)?;
                            continue;
                        }
                        Err(e) => self.rejected(audit, "raise_asset_targets", None, &e, clock, &mut summary)?,
                    }
                }
                self.sweep(engine, audit, &ctx, &mut summary)?;
                break;
            }

            if progressed {
                continue;
            }
            if self.sweep(engine, audit, &ctx, &mut summary)? {
                continue;
            }
            match next_wakeup(engine, clock) {
                Some(t) => {
                    debug!("no progress at {clock}, waiting until {t}");
                    clock = t;
                }
                None => {
                    warn!("keeper stalled at {clock}: no component can trade");
                    break;
                }
            }
        }

        summary.targets_met = engine.all_targets_met()?;
        summary.end_time = clock;
        info!(
            "keeper finished after {} rounds: {} trades, targets met: {}",
            summary.rounds, summary.trades, summary.targets_met
        );
        Ok(summary)
    }

    /// Spend leftover reserve on the sweep component, if one is configured
    /// and nothing is left to sell. Returns true when a trade executed.
    fn sweep(
        &self,
        engine: &mut RebalanceEngine,
        audit: &mut AuditLog,
        ctx: &CallContext,
        summary: &mut RunSummary,
    ) -> Result<bool> {
        let Some(component) = self.sweep else {
            return Ok(false);
        };
        if reserve_unit(engine) <= 0 || !engine.no_tokens_to_sell()? {
            return Ok(false);
        }
        let swept = match engine.trade_remaining_reserve(ctx, component) {
            Ok(trade) => {
                display_trade(&trade);
                summary.trades += 1;
                true
            }
            Err(e) => {
                self.rejected(audit, "trade_remaining_reserve", Some(component), &e, ctx.timestamp, summary)?;
                false
            }
        };
        flush_events(engine, audit, ctx.timestamp)?;
        Ok(swept)
    }

    fn rejected(
        &self,
        audit: &mut AuditLog,
        operation: &str,
        component: Option<Address>,
        error: &Error,
        clock: Timestamp,
        summary: &mut RunSummary,
    ) -> Result<()> {
        if error.is_rule_violation() {
            debug!("{operation} {component:?} skipped: {error}");
            return Ok(());
        }
        warn!("{operation} {component:?} failed: {error}");
        summary.failures += 1;
        audit::log_call_failed(audit, operation, component.as_ref().map(Address::as_str), error, clock)
    }
}

// === Helpers ===

/// Routable components that are off target, sells before buys.
fn trade_order(engine: &RebalanceEngine) -> Vec<Address> {
    let mut sells = Vec::new();
    let mut buys = Vec::new();
    for component in engine.rebalance_components() {
        if engine.asset_info(component).exchange.is_none() {
            continue;
        }
        match engine.trade_size(component) {
            Ok((TradeDirection::Sell, _)) => sells.push(*component),
            Ok((TradeDirection::Buy, _)) => buys.push(*component),
            Err(_) => {}
        }
    }
    sells.extend(buys);
    sells
}

/// Earliest cool-off expiry after `now` among components still off target.
fn next_wakeup(engine: &RebalanceEngine, now: Timestamp) -> Option<Timestamp> {
    trade_order(engine)
        .iter()
        .map(|c| engine.asset_info(c).next_trade_time())
        .filter(|t| *t > now)
        .min()
}

fn reserve_unit(engine: &RebalanceEngine) -> i128 {
    engine
        .basket()
        .default_position_real_unit(&engine.settings().reserve_asset)
}

fn plan_all(engine: &RebalanceEngine) -> Vec<TradePlan> {
    engine
        .rebalance_components()
        .iter()
        .filter_map(|c| match engine.plan_trade(c) {
            Ok(plan) => Some(plan),
            Err(e) => {
                debug!("{c}: no trade planned ({e})");
                None
            }
        })
        .collect()
}

fn flush_events(engine: &mut RebalanceEngine, audit: &mut AuditLog, clock: Timestamp) -> Result<()> {
    for event in engine.take_events() {
        audit::log_event(audit, &event, clock)?;
    }
    Ok(())
}

fn fixed_u(value: u128) -> String {
    i128::try_from(value).map_or_else(|_| value.to_string(), |v| format_fixed(v, 18))
}

fn display_plan(plans: &[TradePlan]) {
    if plans.is_empty() {
        println!("\nNo trades needed: every component is at target.");
        return;
    }

    println!("\nPLANNED TRADES:");
    println!(
        "  {:>3}  {:5} {:10} {:>24} {:10} {:>24} {:>24}",
        "#", "Side", "Component", "Quantity", "Exchange", "Quote in", "Quote out"
    );
    for (i, plan) in plans.iter().enumerate() {
        println!(
            "  {:>3}  {:5} {:10} {:>24} {:10} {:>24} {:>24}",
            i + 1,
            plan.direction.to_string(),
            plan.component.as_str(),
            fixed_u(plan.quantity),
            plan.exchange.to_string(),
            fixed_u(plan.quote.amount_in),
            fixed_u(plan.quote.amount_out),
        );
    }
}

fn display_trade(trade: &TradeExecuted) {
    println!(
        "{:5}  {} on {}: sold {}, bought {} (fee {}) -> unit {}",
        trade.direction.to_string(),
        trade.component,
        trade.exchange,
        fixed_u(trade.amount_sold),
        fixed_u(trade.amount_bought),
        fixed_u(trade.protocol_fee),
        format_fixed(trade.new_component_unit, 18),
    );
}

fn display_targets(engine: &RebalanceEngine) -> Result<()> {
    println!(
        "\nBASKET {} (supply {}, multiplier {}):",
        engine.basket().address(),
        fixed_u(engine.basket().total_supply()),
        format_fixed(engine.basket().position_multiplier(), 18),
    );
    println!(
        "  {:10} {:>26} {:>26} {:10} {:>8}",
        "Component", "Unit", "Target", "Exchange", "Status"
    );
    for component in engine.rebalance_components() {
        let unit = engine.basket().default_position_real_unit(component);
        let target = engine.target_unit(component)?;
        let status = match unit.cmp(&target) {
            std::cmp::Ordering::Equal => "met",
            std::cmp::Ordering::Less => "under",
            std::cmp::Ordering::Greater => "over",
        };
        println!(
            "  {:10} {:>26} {:>26} {:10} {:>8}",
            component.as_str(),
            format_fixed(unit, 18),
            format_fixed(target, 18),
            engine.asset_info(component).exchange.to_string(),
            status,
        );
    }
    println!(
        "  {:10} {:>26}",
        engine.settings().reserve_asset.as_str(),
        format_fixed(reserve_unit(engine), 18),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &std::path::Path, sweep: Option<&str>) -> Config {
        let sweep = sweep.map(|s| format!("sweep_component = \"{s}\"")).unwrap_or_default();
        Config::from_toml(&format!(
            r#"
[engine]
reserve_asset = "weth"
max_slippage_bps = 100

[bot]
trader = "keeper"
max_rounds = 50
max_raises = 2
{sweep}

[logging]
dir = "{}"
"#,
            dir.display()
        ))
        .unwrap()
    }

    fn scenario(cool_off: u64) -> Scenario {
        Scenario::from_json(&format!(
            r#"{{
                "basket": "dpi",
                "manager": "manager",
                "total_supply": "10",
                "start_time": 1000,
                "positions": [
                    {{ "asset": "dai", "unit": "100" }},
                    {{ "asset": "weth", "unit": "0.01" }}
                ],
                "venues": [
                    {{ "type": "mock", "exchange": "uniswap", "rates": [
                        {{ "asset_in": "dai", "asset_out": "weth", "rate": "0.0005" }},
                        {{ "asset_in": "weth", "asset_out": "uni", "rate": "100" }}
                    ] }}
                ],
                "assets": [
                    {{ "asset": "dai", "exchange": "uniswap", "max_size": "300", "cool_off_period": {cool_off} }},
                    {{ "asset": "uni", "exchange": "uniswap", "max_size": "1000", "cool_off_period": {cool_off} }}
                ],
                "traders": ["keeper"],
                "rebalance": {{
                    "targets": [ {{ "asset": "dai", "target": "40" }} ],
                    "new_components": [ {{ "asset": "uni", "target": "2" }} ]
                }}
            }}"#
        ))
        .unwrap()
    }

    fn opts() -> RunOptions {
        RunOptions {
            dry_run: false,
            force: true,
            scenario_file: "scenario.json".into(),
            max_rounds: None,
        }
    }

    #[test]
    fn sells_before_buys() {
        let dir = tempfile::tempdir().unwrap();
        let engine = scenario(0).build(&config(dir.path(), None)).unwrap();
        assert_eq!(trade_order(&engine), vec![Address::new("dai"), Address::new("uni")]);
    }

    #[test]
    fn dry_run_executes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let opts = RunOptions { dry_run: true, ..opts() };
        let summary = run(&config(dir.path(), None), &scenario(0), &opts).unwrap();
        assert_eq!(summary.trades, 0);
        assert_eq!(summary.rounds, 0);
        assert!(!summary.targets_met);
    }

    #[test]
    fn keeper_waits_out_cool_off() {
        let dir = tempfile::tempdir().unwrap();
        let summary = run(&config(dir.path(), None), &scenario(600), &opts()).unwrap();
        // dai needs 600 sold at 300 per trade; uni is bought in one go.
        assert!(summary.trades >= 3);
        assert!(summary.end_time >= 1600);
        assert_eq!(summary.failures, 0);
    }

    #[test]
    fn keeper_raises_then_sweeps() {
        let dir = tempfile::tempdir().unwrap();
        let summary = run(&config(dir.path(), Some("uni")), &scenario(0), &opts()).unwrap();
        assert!(summary.raises >= 1);
        assert_eq!(summary.failures, 0);

        let audit = std::fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
        assert!(audit.contains("\"event\":\"run_started\""));
        assert!(audit.contains("\"event\":\"trade_executed\""));
        assert!(audit.contains("\"event\":\"asset_targets_raised\""));
        assert!(audit.lines().last().unwrap().contains("\"event\":\"run_completed\""));
    }

    #[test]
    fn max_rounds_override_caps_loop() {
        let dir = tempfile::tempdir().unwrap();
        let opts = RunOptions { max_rounds: Some(1), ..opts() };
        let summary = run(&config(dir.path(), None), &scenario(600), &opts).unwrap();
        assert_eq!(summary.rounds, 1);
        assert!(!summary.targets_met);
    }
}
