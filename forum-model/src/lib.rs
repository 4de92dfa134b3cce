//! Record model for the forum API.
//!
//! Defines the two collaborator-facing types the resource layer is written
//! against:
//! - [`Model`]: one stored record (type, id, JSON attribute bag)
//! - [`Principal`]: the actor making a request (`can`, `is_admin`, `exists`)
//!
//! [`Actor`] is the concrete principal used by the server binary and tests:
//! a capability grant set in the spirit of a permission set, plus
//! "own record" grants.

mod actor;
mod model;

pub use actor::{Actor, Principal};
pub use model::Model;
