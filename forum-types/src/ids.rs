//! Identifier types used throughout the forum API.
//!
//! Records are keyed by the store's integer primary key; JSON:API carries
//! them as strings, so `RecordId` parses from and displays as a decimal string.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Primary key of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    /// Wraps a raw primary key.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw primary key.
    #[must_use]
    pub const fn get(&self) -> i64 {
        self.0
    }

    /// Parses a record id from its wire form. Only positive decimal integers
    /// are accepted, so `"01"`, `"-3"` and `"1e3"` are rejected.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let valid = !s.is_empty()
            && !s.starts_with('0')
            && s.len() <= 18
            && s.bytes().all(|b| b.is_ascii_digit());
        if !valid {
            return Err(Error::InvalidRecordId(s.to_string()));
        }
        s.parse::<i64>()
            .map(Self)
            .map_err(|_| Error::InvalidRecordId(s.to_string()))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<i64> for RecordId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

/// Correlation id attached to every inbound request.
/// Uses UUID v7 so ids sort by arrival time in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new request id with the current timestamp.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
