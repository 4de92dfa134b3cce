//! Core type definitions for the forum API.
//!
//! This crate defines the small, resource-agnostic types shared by every
//! other crate in the workspace:
//! - Record identifiers (`RecordId`) as they appear in storage and on the wire
//! - Request identifiers (UUID v7) used to correlate log lines
//! - Wire timestamps (RFC 3339, UTC, second precision)
//!
//! Resource-specific types (discussions, posts, users) live in `forum-api`.

mod ids;
mod timestamp;

pub use ids::{RecordId, RequestId};
pub use timestamp::{format_timestamp, now, parse_timestamp, Timestamp};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid record id: {0}")]
    InvalidRecordId(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
