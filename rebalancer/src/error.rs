//! Error types for the rebalancer.

use std::path::PathBuf;

use basketbook::{Address, LedgerError};
use basketbook_venue::{ExchangeId, VenueError};

/// All errors that can occur during rebalancer operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // === Validation ===
    #[error("array length mismatch")]
    LengthMismatch,

    #[error("array length must be > 0")]
    EmptyArray,

    #[error("cannot duplicate components")]
    DuplicateComponent,

    #[error("cannot duplicate traders")]
    DuplicateTrader,

    #[error("reserve asset cannot be a component")]
    ReserveAsComponent,

    #[error("new allocation must have target for all old components")]
    MissingOldTargets,

    #[error("unrecognized exchange identifier: {0}")]
    ExchangeNotEnabled(ExchangeId),

    #[error("target percentage must be > 0")]
    InvalidRaiseTarget,

    #[error("target unit for {0} must not be negative")]
    NegativeTarget(Address),

    // === Permission ===
    #[error("caller must be manager")]
    OnlyManager,

    #[error("address not permitted to trade")]
    NotPermittedTrader,

    #[error("caller must be EOA")]
    NotExternallyOwned,

    // === State preconditions ===
    #[error("must be a valid and initialized basket")]
    InvalidBasket,

    #[error("must be a valid and pending basket")]
    NotPending,

    #[error("external positions not allowed")]
    ExternalPositionsNotAllowed,

    #[error("component {0} not included in rebalance")]
    NotInRebalance(Address),

    #[error("exchange must be specified")]
    ExchangeNotSet,

    #[error("basket total supply is zero")]
    ZeroSupply,

    #[error("balance of {asset} is below its tracked amount")]
    UntrackedShortfall { asset: Address },

    // === Business rules ===
    #[error("target already met")]
    TargetAlreadyMet,

    #[error("cool off period has not elapsed")]
    CoolOffNotElapsed,

    #[error("trade size exceeds limit")]
    TradeSizeExceedsLimit,

    #[error("must sell all sellable tokens first")]
    MustSellAllSellableTokensFirst,

    #[error("targets must be met and reserve remaining to raise target")]
    TargetsNotMetOrNoReserveRemaining,

    #[error("no reserve remaining to trade")]
    NoReserveRemaining,

    // === Collaborators ===
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Venue(#[from] VenueError),

    // === Runner ===
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("scenario error: {0}")]
    Scenario(String),

    #[error("failed to read scenario file {path}: {source}")]
    ScenarioRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse scenario JSON: {0}")]
    ScenarioParse(#[from] serde_json::Error),

    #[error("execution aborted: {0}")]
    Aborted(String),

    #[error("audit log error: {0}")]
    Audit(#[from] std::io::Error),
}

impl Error {
    /// True for business-rule rejections: the call was well-formed and
    /// permitted but the basket's current state does not allow it.
    pub fn is_rule_violation(&self) -> bool {
        matches!(
            self,
            Error::TargetAlreadyMet
                | Error::CoolOffNotElapsed
                | Error::TradeSizeExceedsLimit
                | Error::MustSellAllSellableTokensFirst
                | Error::TargetsNotMetOrNoReserveRemaining
                | Error::NoReserveRemaining
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
