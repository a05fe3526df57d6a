//! JSONL audit trail logging.
//!
//! Each keeper run appends events to an audit.jsonl file, one JSON object
//! per line. Fixed-point quantities are written as decimal strings.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use basketbook::math::format_fixed;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::TradePlan;
use crate::error::{Error, Result};
use crate::event::RebalanceEvent;
use crate::execution::RunSummary;

/// An audit event written to the JSONL trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: &'static str,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Append-only audit logger.
pub struct AuditLog {
    writer: BufWriter<std::fs::File>,
}

impl AuditLog {
    /// Open (or create) the audit log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Log an event with arbitrary JSON data.
    pub fn log(&mut self, event: &'static str, data: serde_json::Value) -> Result<()> {
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            data,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Log a simple event with no additional data.
    pub fn log_simple(&mut self, event: &'static str) -> Result<()> {
        self.log(event, serde_json::json!({}))
    }
}

fn fixed(value: i128) -> String {
    format_fixed(value, 18)
}

fn fixed_u(value: u128) -> String {
    i128::try_from(value).map_or_else(|_| value.to_string(), fixed)
}

/// Convenience: log a run start event.
pub fn log_run_started(audit: &mut AuditLog, scenario_file: &str, basket: &str, sim_time: u64) -> Result<()> {
    audit.log(
        "run_started",
        serde_json::json!({
            "scenario_file": scenario_file,
            "basket": basket,
            "sim_time": sim_time,
        }),
    )
}

/// Convenience: log the planned trades.
pub fn log_plan(audit: &mut AuditLog, plans: &[TradePlan]) -> Result<()> {
    let trades: Vec<_> = plans
        .iter()
        .map(|p| {
            serde_json::json!({
                "component": p.component.as_str(),
                "direction": p.direction.to_string(),
                "quantity": fixed_u(p.quantity),
                "exchange": p.exchange.to_string(),
                "quote_in": fixed_u(p.quote.amount_in),
                "quote_out": fixed_u(p.quote.amount_out),
            })
        })
        .collect();
    audit.log("plan_computed", serde_json::json!({ "trades": trades }))
}

/// Convenience: log one engine event.
pub fn log_event(audit: &mut AuditLog, event: &RebalanceEvent, sim_time: u64) -> Result<()> {
    let mut data = match event {
        RebalanceEvent::TargetUnitsUpdated {
            component,
            target_unit,
            position_multiplier,
        } => serde_json::json!({
            "component": component.as_str(),
            "target_unit": fixed(*target_unit),
            "position_multiplier": fixed(*position_multiplier),
        }),
        RebalanceEvent::TradeMaximumUpdated { component, max_size } => serde_json::json!({
            "component": component.as_str(),
            "max_size": fixed_u(*max_size),
        }),
        RebalanceEvent::AssetExchangeUpdated { component, exchange } => serde_json::json!({
            "component": component.as_str(),
            "exchange": exchange.to_string(),
        }),
        RebalanceEvent::CoolOffPeriodUpdated {
            component,
            cool_off_period,
        } => serde_json::json!({
            "component": component.as_str(),
            "cool_off_period": cool_off_period,
        }),
        RebalanceEvent::TraderStatusUpdated { trader, status } => serde_json::json!({
            "trader": trader.as_str(),
            "status": status,
        }),
        RebalanceEvent::AnyoneTradeUpdated { status } => serde_json::json!({ "status": status }),
        RebalanceEvent::RaiseTargetPercentageUpdated { percentage } => {
            serde_json::json!({ "percentage": fixed_u(*percentage) })
        }
        RebalanceEvent::TradeExecuted(t) => serde_json::json!({
            "component": t.component.as_str(),
            "counter_asset": t.counter_asset.as_str(),
            "direction": t.direction.to_string(),
            "exchange": t.exchange.to_string(),
            "amount_sold": fixed_u(t.amount_sold),
            "amount_bought": fixed_u(t.amount_bought),
            "protocol_fee": fixed_u(t.protocol_fee),
            "new_component_unit": fixed(t.new_component_unit),
            "new_reserve_unit": fixed(t.new_reserve_unit),
            "timestamp": t.timestamp,
        }),
        RebalanceEvent::AssetTargetsRaised { position_multiplier } => serde_json::json!({
            "position_multiplier": fixed(*position_multiplier),
        }),
    };
    if let Some(obj) = data.as_object_mut() {
        obj.insert("sim_time".into(), sim_time.into());
    }
    audit.log(event.name(), data)
}

/// Convenience: log a rejected call.
pub fn log_call_failed(audit: &mut AuditLog, operation: &str, component: Option<&str>, error: &Error, sim_time: u64) -> Result<()> {
    audit.log(
        "call_failed",
        serde_json::json!({
            "operation": operation,
            "component": component,
            "error": error.to_string(),
            "sim_time": sim_time,
        }),
    )
}

/// Convenience: log run completion.
pub fn log_run_completed(audit: &mut AuditLog, summary: &RunSummary) -> Result<()> {
    audit.log(
        "run_completed",
        serde_json::json!({
            "rounds": summary.rounds,
            "trades": summary.trades,
            "raises": summary.raises,
            "failures": summary.failures,
            "targets_met": summary.targets_met,
            "sim_time": summary.end_time,
        }),
    )
}
