//! SQLite persistence for the forum API.
//!
//! This is the ORM collaborator the resource layer is written against:
//! `find` (optionally scoped), `query` with conditions/order/pagination,
//! `insert`/`update`/`delete`, and `transaction(fn)`.
//!
//! # Architecture
//!
//! - One table per resource type; each row is an integer id plus the record's
//!   attributes as a JSON object
//! - Filtering and ordering on attributes use SQLite's `json_extract`
//! - Queries are built from [`Query`]/[`Condition`]/[`OrderBy`] values and
//!   compiled to parameterised SQL

mod error;
mod query;
mod store;

pub use error::{StorageError, StorageResult};
pub use query::{Column, Condition, Direction, OrderBy, Query};
pub use store::{SqliteStore, StoreTx};
