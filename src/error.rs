//! Ledger and basket errors.

use crate::types::Address;

/// Errors returned by position ledger and basket operations.
///
/// Every failing operation leaves the ledger unchanged.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LedgerError {
    /// A nonzero real unit would be stored (or read back) as zero.
    #[error("real to virtual unit conversion invalid for {component}")]
    InvalidVirtualUnit { component: Address },

    /// The multiplier is non-positive or would zero out a nonzero position.
    #[error("new multiplier too small")]
    MultiplierTooSmall,

    #[error("component {0} already exists")]
    ComponentExists(Address),

    #[error("component {0} not found")]
    ComponentNotFound(Address),

    #[error("duplicate component {0}")]
    DuplicateComponent(Address),

    #[error("module {module} already attributed to {component}")]
    ModuleAlreadyAttributed { component: Address, module: Address },

    #[error("module {module} not attributed to {component}")]
    ModuleNotAttributed { component: Address, module: Address },

    #[error("only the manager can call")]
    OnlyManager,

    #[error("module {0} must be enabled on the system")]
    ModuleNotEnabled(Address),

    #[error("module {0} must not be added yet")]
    ModuleAlreadyAdded(Address),

    #[error("module {0} must be pending initialization")]
    ModuleNotPending(Address),

    #[error("module {0} must be initialized")]
    ModuleNotInitialized(Address),

    #[error("{holder} has insufficient {asset} balance")]
    InsufficientBalance { holder: Address, asset: Address },

    #[error("basket {0} is not registered on the system")]
    InvalidBasket(Address),

    #[error("fee percentage exceeds 100%")]
    FeeTooHigh,

    #[error("arithmetic overflow")]
    Overflow,
}

pub type Result<T> = std::result::Result<T, LedgerError>;
