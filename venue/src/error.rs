//! Venue error types.

use basketbook::Address;

use crate::ExchangeId;

/// Errors that can occur when quoting or executing a swap.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VenueError {
    /// The realized price violates the caller-supplied bound.
    #[error("slippage bound violated: bound {bound}, actual {actual}")]
    SlippageExceeded { bound: u128, actual: u128 },

    #[error("no liquidity for {asset_in} -> {asset_out}")]
    UnknownPair { asset_in: Address, asset_out: Address },

    #[error("insufficient liquidity")]
    InsufficientLiquidity,

    #[error("swap amount must be greater than zero")]
    ZeroAmount,

    #[error("venue rejected swap: {0}")]
    Rejected(String),

    #[error("exchange {0} is not registered")]
    NotRegistered(ExchangeId),

    #[error("unknown exchange '{0}'")]
    UnknownExchange(String),

    #[error("exchange id {0} is invalid")]
    InvalidExchange(u8),

    #[error("arithmetic overflow")]
    Overflow,
}

pub type Result<T> = std::result::Result<T, VenueError>;
