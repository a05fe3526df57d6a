//! Core types: Address, Timestamp

use std::fmt;

/// Maximum length of an [`Address`] in bytes.
pub const ADDRESS_MAX_LEN: usize = 24;

/// Identifier for assets, accounts, modules and baskets.
///
/// Stored inline (no heap allocation) so it is `Copy` and cheap to use as a
/// map key. Up to 24 bytes of UTF-8.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    bytes: [u8; ADDRESS_MAX_LEN],
    len: u8,
}

impl Address {
    /// Create an address from a string.
    ///
    /// # Panics
    ///
    /// Panics if `s` is longer than 24 bytes. Use [`Address::try_new`] for
    /// untrusted input.
    #[track_caller]
    pub fn new(s: &str) -> Self {
        match Self::try_new(s) {
            Some(addr) => addr,
            None => panic!("address '{s}' exceeds {ADDRESS_MAX_LEN} bytes"),
        }
    }

    /// Create an address, returning `None` if `s` is empty or too long.
    pub fn try_new(s: &str) -> Option<Self> {
        if s.is_empty() || s.len() > ADDRESS_MAX_LEN {
            return None;
        }
        let mut bytes = [0u8; ADDRESS_MAX_LEN];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Some(Self {
            bytes,
            len: s.len() as u8,
        })
    }

    /// The address as a string slice.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.as_str())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        Address::try_new(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "address '{s}' must be 1..={ADDRESS_MAX_LEN} bytes"
            ))
        })
    }
}

/// Seconds since an arbitrary epoch, supplied by the caller's environment.
pub type Timestamp = u64;

/// Who is calling an operation, and when.
///
/// Operations take this explicitly instead of reading ambient block state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub kind: CallerKind,
    pub timestamp: Timestamp,
}

impl CallContext {
    /// A call from an externally-owned account.
    pub fn external(caller: Address, timestamp: Timestamp) -> Self {
        Self {
            caller,
            kind: CallerKind::ExternallyOwned,
            timestamp,
        }
    }

    /// A call relayed through a contract account.
    pub fn contract(caller: Address, timestamp: Timestamp) -> Self {
        Self {
            caller,
            kind: CallerKind::Contract,
            timestamp,
        }
    }

    /// True if the caller is an externally-owned account.
    pub fn is_externally_owned(&self) -> bool {
        self.kind == CallerKind::ExternallyOwned
    }
}

/// Account kind of a caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CallerKind {
    ExternallyOwned,
    Contract,
}
