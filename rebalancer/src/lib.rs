//! basketbook-rebalancer: rebalance trading engine for basketbook baskets.
//!
//! The [`engine::RebalanceEngine`] moves each basket component toward a
//! manager-set target unit through pluggable venues, one bounded trade at a
//! time. The keeper binary drives it from a TOML config and a JSON scenario
//! and writes a JSONL audit trail.

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod execution;
pub mod info;
pub mod scenario;

pub use engine::{EngineSettings, RebalanceEngine, TradePlan};
pub use error::{Error, Result};
pub use event::{RebalanceEvent, TradeDirection, TradeExecuted};
pub use info::AssetTradeInfo;
