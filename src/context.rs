//! Identity types and the per-call capability context.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque account identifier.
///
/// The queue never interprets addresses; they are keys into the ledger and
/// the request store. Hosts map them onto whatever account model they use.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifies a fungible asset known to the ledger.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Capability context for a single mutating call.
///
/// Every entry point takes one of these instead of reading ambient state:
/// `caller` is the authenticated identity the host resolved for the call and
/// `now` is the host clock in seconds. Passing time explicitly keeps deadline
/// and staleness checks deterministic under test.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub caller: Address,
    pub now: u64,
}

impl CallContext {
    pub fn new(caller: Address, now: u64) -> Self {
        Self { caller, now }
    }
}
