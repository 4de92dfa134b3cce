//! Extensible JSON:API resource layer for the forum.
//!
//! Resources declare fields, sorts, filters, endpoints and settings;
//! extensions patch those declarations without touching them, and the
//! registry folds everything into one schema per resource type at boot.
//!
//! # Architecture
//!
//! - [`SchemaRegistry`] collects resources and [`PatchOp`]s; the
//!   [`OverrideResolver`] orders patches by specificity along each type's
//!   explicit ancestor chain, then registration order
//! - `boot` builds every schema once into an immutable [`Catalog`]
//! - [`JsonApi`] binds the catalog to a [`forum_storage::SqliteStore`] and
//!   runs each request through the endpoint pipeline inside one transaction
//! - The pipeline scopes before it authorizes, so hidden and missing records
//!   both answer 404
//! - Responses and errors are JSON:API documents
//!
//! ```ignore
//! let mut registry = SchemaRegistry::with_builtin_resources()?;
//! registry.extend(
//!     ApiResource::new("discussions")
//!         .fields_after("title", || vec![Field::boolean("isSticky").writable()]),
//! );
//! let api = JsonApi::open(registry, ApiConfig::default(), None)?;
//! ```

mod api;
mod config;
mod context;
mod document;
mod endpoint;
mod error;
mod extend;
mod field;
mod filter;
mod gate;
mod pipeline;
mod query;
mod registry;
mod resolver;
mod resource;
pub mod resources;
mod sort;

pub use api::{ApiRequest, ApiResponse, JsonApi, Route, FORUM_ID};
pub use config::{ApiConfig, PaginationConfig, PermissionsConfig};
pub use context::{Context, Phase};
pub use endpoint::{AfterHook, BeforeHook, Endpoint, EndpointKind};
pub use error::{ApiError, ApiResult, BootError, ConfigurationError, ErrorOrigin, FieldError};
pub use extend::{ApiResource, Patch, PatchOp};
pub use field::{Field, FieldKind, Rule};
pub use filter::Filter;
pub use gate::{assert_admin, assert_can, assert_registered, authorize, can};
pub use pipeline::{Listing, Outcome, Stage};
pub use query::{IncludeTree, QueryParams};
pub use registry::{Catalog, CatalogEntry, ResourceSchema, SchemaRegistry};
pub use resolver::{AncestorTable, MergePlan, OverrideResolver};
pub use resource::{Resource, ABSTRACT_DATABASE_RESOURCE, ABSTRACT_RESOURCE};
pub use sort::SortColumn;
