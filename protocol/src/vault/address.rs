//! Account addresses.
//!
//! Address encoding is the transport layer's business, so an [`Address`]
//! is an opaque, non-empty string. The only structure we care about is
//! whether it belongs to a module (an escrow) or to a user.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{MODULE_ADDRESS_PREFIX, MODULE_NAME};

/// An opaque account identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

/// Why a user-supplied address string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address must not be empty")]
    Empty,

    /// Module accounts are built with [`Address::module`], never parsed.
    #[error("address {0} is reserved for module accounts")]
    Reserved(String),
}

impl Address {
    /// Wraps a user address. Rejects empty strings and the module prefix.
    pub fn new(raw: impl Into<String>) -> Result<Self, AddressError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }
        if trimmed.starts_with(MODULE_ADDRESS_PREFIX) {
            return Err(AddressError::Reserved(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The account owned by the named module.
    pub fn module(name: &str) -> Self {
        Self(format!("{MODULE_ADDRESS_PREFIX}{name}"))
    }

    /// Rebuilds an address from a ledger key. Module accounts are allowed
    /// here because the ledger itself wrote them.
    pub(crate) fn from_stored(raw: String) -> Option<Self> {
        if raw.is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// The loan module's escrow account.
    pub fn escrow() -> Self {
        Self::module(MODULE_NAME)
    }

    pub fn is_module(&self) -> bool {
        self.0.starts_with(MODULE_ADDRESS_PREFIX)
    }

    /// Raw key bytes for on-disk indexes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl std::str::FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
