//! The resource trait: a resource type's core declarations plus the
//! persistence behaviour the endpoint pipeline calls into.

use crate::api::JsonApi;
use crate::context::Context;
use crate::endpoint::Endpoint;
use crate::error::ApiResult;
use crate::field::Field;
use crate::filter::Filter;
use crate::sort::SortColumn;
use forum_model::Model;
use forum_storage::{Condition, StoreTx};
use forum_types::RecordId;
use serde_json::Value;

/// Root of every ancestor chain. Patches registered here apply to all
/// resources.
pub const ABSTRACT_RESOURCE: &str = "abstract-resource";

/// Ancestor of every resource backed by a store table.
pub const ABSTRACT_DATABASE_RESOURCE: &str = "abstract-database-resource";

/// A resource type.
///
/// `fields`/`sorts`/`filters`/`endpoints`/`settings` are the core
/// declarations the registry starts from before applying extension
/// patches. The remaining methods have defaults suitable for a plain table
/// resource.
pub trait Resource: Send + Sync {
    /// Unique type name; also the store table name.
    fn resource_type(&self) -> &str;

    /// Ancestor types, nearest first.
    fn ancestors(&self) -> Vec<String> {
        vec![
            ABSTRACT_DATABASE_RESOURCE.to_string(),
            ABSTRACT_RESOURCE.to_string(),
        ]
    }

    /// Whether records live in a store table of the same name.
    fn stored(&self) -> bool {
        true
    }

    fn fields(&self) -> Vec<Field>;

    fn sorts(&self) -> Vec<SortColumn> {
        Vec::new()
    }

    fn filters(&self) -> Vec<Filter> {
        Vec::new()
    }

    fn endpoints(&self) -> Vec<Endpoint>;

    fn settings(&self) -> Vec<(String, Value)> {
        Vec::new()
    }

    /// Visibility restriction for the acting principal. Records outside the
    /// scope are indistinguishable from missing ones.
    fn scope(&self, _ctx: &Context) -> Option<Condition> {
        None
    }

    /// Locates one record by its public id, within scope.
    fn find(&self, id: &str, ctx: &Context, tx: &StoreTx<'_>) -> ApiResult<Option<Model>> {
        let Ok(id) = RecordId::parse(id) else {
            return Ok(None);
        };
        Ok(tx.find(self.resource_type(), id, self.scope(ctx).as_ref())?)
    }

    /// Runs over one page of an Index listing before it is serialized.
    /// Changes are never persisted.
    fn listed(&self, _models: &mut [Model], _ctx: &Context, _tx: &StoreTx<'_>) -> ApiResult<()> {
        Ok(())
    }

    /// Fresh model for Create, before fields are applied.
    fn new_model(&self, _ctx: &Context) -> Model {
        Model::new(self.resource_type())
    }

    /// Runs before fields are applied to a new model (defaults, ownership).
    fn creating(&self, model: Model, _ctx: &Context) -> ApiResult<Model> {
        Ok(model)
    }

    /// Persists a created or updated model.
    fn save(&self, model: &mut Model, _ctx: &Context, tx: &StoreTx<'_>, _api: &JsonApi) -> ApiResult<()> {
        tx.save(model)?;
        Ok(())
    }

    /// Removes a record; dependants are the resource's business.
    fn delete(&self, model: &Model, _ctx: &Context, tx: &StoreTx<'_>) -> ApiResult<()> {
        if let Some(id) = model.id {
            tx.delete(self.resource_type(), id)?;
        }
        Ok(())
    }
}
