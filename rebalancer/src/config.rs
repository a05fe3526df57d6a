//! TOML configuration loading and validation.

use std::path::Path;

use basketbook::Address;
use basketbook::math::parse_fixed;
use serde::Deserialize;

use crate::engine::EngineSettings;
use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    #[serde(default)]
    pub fees: FeeConfig,
    pub bot: BotConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Address the engine registers under on the basket.
    #[serde(default = "default_module")]
    pub module: String,
    /// Settlement asset (the wrapped native token).
    pub reserve_asset: String,
    /// Decimal fraction added to targets per raise, e.g. "0.0025".
    #[serde(default = "default_raise_target")]
    pub raise_target_percentage: String,
    #[serde(default = "default_slippage")]
    pub max_slippage_bps: u32,
}

fn default_module() -> String {
    "index-module".into()
}
fn default_raise_target() -> String {
    "0.0025".into()
}
fn default_slippage() -> u32 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    #[serde(default = "default_recipient")]
    pub recipient: String,
    /// Decimal fraction of the bought amount, e.g. "0.001".
    #[serde(default = "default_protocol_fee")]
    pub protocol_fee: String,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            recipient: default_recipient(),
            protocol_fee: default_protocol_fee(),
        }
    }
}

fn default_recipient() -> String {
    "treasury".into()
}
fn default_protocol_fee() -> String {
    "0".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Identity the keeper trades as.
    pub trader: String,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// Component that absorbs leftover reserve once nothing is left to sell.
    #[serde(default)]
    pub sweep_component: Option<String>,
    /// Upper bound on `raise_asset_targets` calls per run.
    #[serde(default = "default_max_raises")]
    pub max_raises: usize,
}

fn default_max_rounds() -> usize {
    100
}
fn default_max_raises() -> usize {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_audit_file")]
    pub audit_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            audit_file: default_audit_file(),
        }
    }
}

fn default_log_dir() -> String {
    "./logs".into()
}
fn default_audit_file() -> String {
    "audit.jsonl".into()
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse from a TOML string (useful for testing).
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    fn validate(&self) -> Result<()> {
        address(&self.engine.module, "engine.module")?;
        address(&self.engine.reserve_asset, "engine.reserve_asset")?;
        address(&self.fees.recipient, "fees.recipient")?;
        address(&self.bot.trader, "bot.trader")?;
        if let Some(sweep) = &self.bot.sweep_component {
            if address(sweep, "bot.sweep_component")? == address(&self.engine.reserve_asset, "engine.reserve_asset")? {
                return Err(Error::Config("bot.sweep_component cannot be the reserve asset".into()));
            }
        }
        if self.engine.max_slippage_bps >= 10_000 {
            return Err(Error::Config("max_slippage_bps must be < 10000".into()));
        }
        if self.raise_target_percentage()? == 0 {
            return Err(Error::Config("raise_target_percentage must be > 0".into()));
        }
        if self.protocol_fee()? > basketbook::PRECISE_UNIT_U {
            return Err(Error::Config("protocol_fee must be <= 1".into()));
        }
        if self.bot.max_rounds == 0 {
            return Err(Error::Config("max_rounds must be > 0".into()));
        }
        Ok(())
    }

    pub fn raise_target_percentage(&self) -> Result<u128> {
        fraction(&self.engine.raise_target_percentage, "raise_target_percentage")
    }

    pub fn protocol_fee(&self) -> Result<u128> {
        fraction(&self.fees.protocol_fee, "protocol_fee")
    }

    pub fn fee_recipient(&self) -> Result<Address> {
        address(&self.fees.recipient, "fees.recipient")
    }

    pub fn trader(&self) -> Result<Address> {
        address(&self.bot.trader, "bot.trader")
    }

    pub fn sweep_component(&self) -> Result<Option<Address>> {
        self.bot
            .sweep_component
            .as_deref()
            .map(|s| address(s, "bot.sweep_component"))
            .transpose()
    }

    /// Engine parameters from the `[engine]` section.
    pub fn engine_settings(&self) -> Result<EngineSettings> {
        Ok(EngineSettings {
            module: address(&self.engine.module, "engine.module")?,
            reserve_asset: address(&self.engine.reserve_asset, "engine.reserve_asset")?,
            raise_target_percentage: self.raise_target_percentage()?,
            max_slippage_bps: self.engine.max_slippage_bps,
        })
    }

    /// Full path to the audit log file.
    pub fn audit_path(&self) -> std::path::PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.audit_file)
    }
}

fn address(s: &str, field: &str) -> Result<Address> {
    Address::try_new(s).ok_or_else(|| Error::Config(format!("{field} '{s}' is not a valid address")))
}

fn fraction(s: &str, field: &str) -> Result<u128> {
    parse_fixed(s, 18)
        .and_then(|v| u128::try_from(v).ok())
        .ok_or_else(|| Error::Config(format!("{field} '{s}' is not a non-negative decimal")))
}
