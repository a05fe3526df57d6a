//! # basketbook
//!
//! A dilution-safe position ledger for tokenized index baskets.
//!
//! ## Features
//!
//! - **Virtual units**: positions are stored once and scaled by a single
//!   position multiplier, so supply changes rebase every holding in O(1)
//! - **Default and external positions**: custodied holdings plus positions
//!   attributed by modules (e.g. collateral held elsewhere)
//! - **Fixed-point math**: 18-decimal integers with a 256-bit intermediate;
//!   signed results floor toward negative infinity
//! - **Module registry**: modules are enabled system-wide, then added and
//!   initialized per basket
//!
//! ## Quick Start
//!
//! ```
//! use basketbook::{Address, Basket, PRECISE_UNIT};
//!
//! let dai = Address::new("dai");
//! let mut basket = Basket::new(
//!     Address::new("dpi"),
//!     Address::new("manager"),
//!     &[(dai, 100 * PRECISE_UNIT)],
//!     10 * PRECISE_UNIT as u128,
//! )
//! .unwrap();
//!
//! // A 2% streaming fee dilutes every holding at once.
//! basket.ledger_mut().edit_position_multiplier(PRECISE_UNIT * 98 / 100).unwrap();
//! assert_eq!(basket.default_position_real_unit(&dai), 98 * PRECISE_UNIT);
//! ```
//!
//! ## Rounding
//!
//! Real units are `floor(virtual * multiplier / 1e18)`. An edit that would
//! store a nonzero real unit as a zero virtual unit is rejected:
//!
//! ```
//! use basketbook::{Address, LedgerError, PositionLedger, PRECISE_UNIT};
//!
//! let mut ledger = PositionLedger::new();
//! ledger.edit_position_multiplier(2 * PRECISE_UNIT).unwrap();
//! let err = ledger.edit_default_position_unit(Address::new("dai"), 1).unwrap_err();
//! assert!(matches!(err, LedgerError::InvalidVirtualUnit { .. }));
//! ```

pub mod basket;
pub mod custody;
mod error;
pub mod ledger;
pub mod math;
pub mod system;
mod types;

// Re-export public API
pub use basket::{Basket, ModuleState};
pub use custody::TokenBalances;
pub use error::{LedgerError, Result};
pub use ledger::{Position, PositionLedger, PositionState};
pub use math::{PRECISE_UNIT, PRECISE_UNIT_U};
pub use system::SystemConfig;
pub use types::{ADDRESS_MAX_LEN, Address, CallContext, CallerKind, Timestamp};
