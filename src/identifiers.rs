//! Identifier types for search execution
//!
//! This module provides type-safe wrapper types for ULID-based identifiers so
//! that search, shard, and node identifiers cannot be mixed up at compile
//! time. ULIDs carry a millisecond timestamp in their high bits, so freshly
//! generated identifiers sort by creation time.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use ulid::Ulid;

/// Type-safe wrapper for search identifiers
///
/// One SearchId is minted per search session and ties together that session's
/// producer, streaming queue, and collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SearchId(u128);

/// Type-safe wrapper for shard identifiers
///
/// ShardId names one independently searchable partition of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ShardId(u128);

/// Type-safe wrapper for cluster node identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct NodeId(u128);

impl SearchId {
    /// Generate a new ULID-based search identifier
    pub fn new() -> Self {
        Self(Ulid::new().0)
    }

    /// Create a SearchId from a ULID
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid.0)
    }

    /// Convert to ULID
    pub fn as_ulid(self) -> Ulid {
        Ulid(self.0)
    }

    /// Parse from string (alias for FromStr implementation)
    pub fn parse_str(s: &str) -> Result<Self, ulid::DecodeError> {
        Self::from_str(s)
    }

    /// Get the raw u128 value (mainly for testing)
    pub fn raw(self) -> u128 {
        self.0
    }
}

impl ShardId {
    /// Generate a new ULID-based shard identifier
    pub fn new() -> Self {
        Self(Ulid::new().0)
    }

    /// Create a ShardId from a ULID
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid.0)
    }

    /// Convert to ULID
    pub fn as_ulid(self) -> Ulid {
        Ulid(self.0)
    }

    /// Parse from string (alias for FromStr implementation)
    pub fn parse_str(s: &str) -> Result<Self, ulid::DecodeError> {
        Self::from_str(s)
    }

    /// Get the raw u128 value (mainly for testing)
    pub fn raw(self) -> u128 {
        self.0
    }
}

impl NodeId {
    /// Generate a new ULID-based node identifier
    pub fn new() -> Self {
        Self(Ulid::new().0)
    }

    /// Create a NodeId from a ULID
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid.0)
    }

    /// Convert to ULID
    pub fn as_ulid(self) -> Ulid {
        Ulid(self.0)
    }

    /// Parse from string (alias for FromStr implementation)
    pub fn parse_str(s: &str) -> Result<Self, ulid::DecodeError> {
        Self::from_str(s)
    }

    /// Get the raw u128 value (mainly for testing)
    pub fn raw(self) -> u128 {
        self.0
    }
}

impl Default for SearchId {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for ShardId {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SearchId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ulid())
    }
}

impl Display for ShardId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ulid())
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ulid())
    }
}

impl FromStr for SearchId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_ulid(Ulid::from_str(s)?))
    }
}

impl FromStr for ShardId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_ulid(Ulid::from_str(s)?))
    }
}

impl FromStr for NodeId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_ulid(Ulid::from_str(s)?))
    }
}
