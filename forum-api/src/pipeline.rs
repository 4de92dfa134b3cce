//! Endpoint state machine.
//!
//! Every operation walks the same stages inside one store transaction:
//!
//! ```text
//! Received → Located → Scoped → Authorized → BeforeHooksRun
//!          → ModelResolved → FieldsApplied → Persisted → AfterHooksRun
//! ```
//!
//! Any stage may end the run with an [`ApiError`]; the caller rolls the
//! transaction back. Scoping happens before authorization, so a record the
//! actor cannot see is a 404 whether or not they could act on it.

use crate::api::JsonApi;
use crate::context::Context;
use crate::document;
use crate::endpoint::{Endpoint, EndpointKind};
use crate::error::{ApiError, ApiResult, FieldError};
use crate::field::{Field, FieldKind};
use crate::filter;
use crate::gate;
use crate::query::IncludeTree;
use crate::resource::Resource;
use crate::sort;
use forum_model::Model;
use forum_storage::{Condition, OrderBy, Query, StoreTx};
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// Pipeline stage, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    Located,
    Scoped,
    Authorized,
    BeforeHooksRun,
    ModelResolved,
    FieldsApplied,
    Persisted,
    AfterHooksRun,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One page of an Index result.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub models: Vec<Model>,
    pub total: usize,
    pub offset: usize,
    /// `None` when the endpoint does not paginate.
    pub limit: Option<usize>,
}

/// What an endpoint produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    One(Model),
    Many(Listing),
    Deleted(Model),
}

impl Outcome {
    pub fn into_model(self) -> Option<Model> {
        match self {
            Self::One(model) | Self::Deleted(model) => Some(model),
            Self::Many(_) => None,
        }
    }
}

/// Result of a run, plus the include tree to serialize with when one was
/// requested.
#[derive(Debug)]
pub(crate) struct Processed {
    pub outcome: Outcome,
    pub include: IncludeTree,
}

struct Run<'a, 't> {
    api: &'a JsonApi,
    tx: &'a StoreTx<'t>,
    ctx: &'a Context,
    resource: &'a dyn Resource,
    stage: Stage,
}

/// Runs one endpoint for `ctx`. With `serialize` set, include paths are
/// resolved and validated after authorization.
pub(crate) fn execute(
    api: &JsonApi,
    tx: &StoreTx<'_>,
    ctx: &Context,
    resource: &dyn Resource,
    id: Option<&str>,
    serialize: bool,
) -> ApiResult<Processed> {
    let mut run = Run {
        api,
        tx,
        ctx,
        resource,
        stage: Stage::Received,
    };
    run.execute(id, serialize)
}

impl Run<'_, '_> {
    fn advance(&mut self, next: Stage) {
        debug!(
            resource = self.ctx.resource_type(),
            endpoint = %self.ctx.endpoint(),
            from = %self.stage,
            to = %next,
            "Pipeline transition"
        );
        self.stage = next;
    }

    fn execute(&mut self, id: Option<&str>, serialize: bool) -> ApiResult<Processed> {
        let ctx = self.ctx;
        let schema = ctx.schema();
        let kind = ctx.endpoint();
        let endpoint = schema.endpoint(kind).ok_or(ApiError::MethodNotAllowed)?;
        self.advance(Stage::Located);

        let target = if kind.targets_record() {
            let id = id.ok_or(ApiError::NotFound)?;
            Some(
                self.resource
                    .find(id, ctx, self.tx)?
                    .ok_or(ApiError::NotFound)?,
            )
        } else {
            None
        };
        self.advance(Stage::Scoped);

        gate::authorize(endpoint, ctx.actor(), target.as_ref())?;
        self.advance(Stage::Authorized);

        let include = if serialize && kind != EndpointKind::Delete {
            let requested = ctx.query().include().unwrap_or_default();
            let tree = IncludeTree::from_paths(endpoint.default_includes().iter().chain(&requested))?;
            document::validate_includes(self.api, schema, &tree)?;
            tree
        } else {
            IncludeTree::default()
        };
        let listing_plan = match kind {
            EndpointKind::Index => Some(self.plan_listing(endpoint)?),
            _ => None,
        };

        for hook in endpoint.before_hooks() {
            hook(ctx)?;
        }
        self.advance(Stage::BeforeHooksRun);

        let outcome = match kind {
            EndpointKind::Show => {
                let model = target.ok_or(ApiError::NotFound)?;
                self.advance(Stage::ModelResolved);
                Outcome::One(self.run_after_hooks(endpoint, model)?)
            }
            EndpointKind::Index => {
                let plan = listing_plan.ok_or(ApiError::MethodNotAllowed)?;
                let mut listing = self.list(plan)?;
                self.advance(Stage::ModelResolved);
                let mut models = Vec::with_capacity(listing.models.len());
                for model in std::mem::take(&mut listing.models) {
                    models.push(self.run_after_hooks(endpoint, model)?);
                }
                listing.models = models;
                Outcome::Many(listing)
            }
            EndpointKind::Create => {
                let model = self.resource.new_model(ctx);
                let model = self.resource.creating(model, ctx)?;
                self.advance(Stage::ModelResolved);
                let mut model = self.apply_fields(model)?;
                self.advance(Stage::FieldsApplied);
                self.resource.save(&mut model, ctx, self.tx, self.api)?;
                self.advance(Stage::Persisted);
                Outcome::One(self.run_after_hooks(endpoint, model)?)
            }
            EndpointKind::Update => {
                let model = target.ok_or(ApiError::NotFound)?;
                self.advance(Stage::ModelResolved);
                let mut model = self.apply_fields(model)?;
                self.advance(Stage::FieldsApplied);
                self.resource.save(&mut model, ctx, self.tx, self.api)?;
                self.advance(Stage::Persisted);
                Outcome::One(self.run_after_hooks(endpoint, model)?)
            }
            EndpointKind::Delete => {
                let model = target.ok_or(ApiError::NotFound)?;
                self.advance(Stage::ModelResolved);
                self.resource.delete(&model, ctx, self.tx)?;
                self.advance(Stage::Persisted);
                Outcome::Deleted(self.run_after_hooks(endpoint, model)?)
            }
        };
        Ok(Processed { outcome, include })
    }

    fn run_after_hooks(&mut self, endpoint: &Endpoint, mut model: Model) -> ApiResult<Model> {
        for hook in endpoint.after_hooks() {
            model = hook(self.ctx, model)?;
        }
        if self.stage < Stage::AfterHooksRun {
            self.advance(Stage::AfterHooksRun);
        }
        Ok(model)
    }

    // ==================== Listing ====================

    fn plan_listing(&self, endpoint: &Endpoint) -> ApiResult<ListingPlan> {
        let schema = self.ctx.schema();
        let params = self.ctx.query();
        let order = sort::compile(
            schema.sorts(),
            params.sort().or(endpoint.default_sort_key()),
        )?;
        let filter = filter::compile(schema.filters(), params, self.ctx)?;

        let pagination = &self.api.config().pagination;
        let (limit, offset) = if endpoint.is_paginated() {
            let max = endpoint.page_max_limit().unwrap_or(pagination.max_limit);
            let requested = params
                .page_limit()?
                .or(endpoint.page_limit())
                .unwrap_or(pagination.default_limit);
            (Some(requested.min(max)), params.page_offset()?)
        } else {
            (None, 0)
        };
        Ok(ListingPlan {
            order,
            filter,
            limit,
            offset,
        })
    }

    fn list(&self, plan: ListingPlan) -> ApiResult<Listing> {
        let resource_type = self.ctx.resource_type();
        let condition = Condition::all([self.resource.scope(self.ctx), plan.filter]);
        let total = self.tx.count(resource_type, condition.as_ref())?;

        let mut query = Query::table(resource_type)
            .filter_opt(condition)
            .offset(plan.offset);
        query.order = plan.order;
        if let Some(limit) = plan.limit {
            query = query.limit(limit);
        }
        let mut models = self.tx.query(&query)?;
        self.resource.listed(&mut models, self.ctx, self.tx)?;
        debug!(
            resource = resource_type,
            total,
            returned = models.len(),
            offset = plan.offset,
            "Listed records"
        );
        Ok(Listing {
            models,
            total,
            offset: plan.offset,
            limit: plan.limit,
        })
    }

    // ==================== Writes ====================

    /// Validates the request document against the schema and writes every
    /// writable field present. All field errors are collected before
    /// failing.
    fn apply_fields(&self, mut model: Model) -> ApiResult<Model> {
        let schema = self.ctx.schema();
        let data = self
            .ctx
            .body_pointer("/data")
            .and_then(Value::as_object)
            .ok_or_else(|| ApiError::bad_pointer("/data", "Request body must contain a data object."))?;

        match data.get("type").and_then(Value::as_str) {
            Some(t) if t == schema.resource_type() => {}
            _ => {
                return Err(ApiError::bad_pointer(
                    "/data/type",
                    format!("Expected type [{}].", schema.resource_type()),
                ))
            }
        }
        if let (Some(expected), Some(given)) = (model.id, data.get("id")) {
            let matches = match given {
                Value::String(s) => *s == expected.to_string(),
                Value::Number(n) => n.as_i64() == Some(expected.get()),
                _ => false,
            };
            if !matches {
                return Err(ApiError::bad_pointer("/data/id", "Id does not match the addressed record."));
            }
        }

        let attributes = member_object(data, "attributes")?;
        let relationships = member_object(data, "relationships")?;
        for key in attributes.into_iter().flat_map(Map::keys) {
            if !schema.field(key).is_some_and(|f| !f.is_relationship()) {
                return Err(ApiError::bad_pointer(
                    format!("/data/attributes/{key}"),
                    format!("Unknown attribute [{key}]."),
                ));
            }
        }
        for key in relationships.into_iter().flat_map(Map::keys) {
            if !schema.field(key).is_some_and(Field::is_relationship) {
                return Err(ApiError::bad_pointer(
                    format!("/data/relationships/{key}"),
                    format!("Unknown relationship [{key}]."),
                ));
            }
        }

        let creating = self.ctx.creating();
        let mut errors = Vec::new();
        for field in schema.fields() {
            let name = field.name();
            let error_for = |detail: String| {
                if field.is_relationship() {
                    FieldError::relationship(name, detail)
                } else {
                    FieldError::attribute(name, detail)
                }
            };
            let given = if field.is_relationship() {
                relationships.and_then(|m| m.get(name))
            } else {
                attributes.and_then(|m| m.get(name))
            };

            let value = match given {
                Some(value) => value.clone(),
                None if creating && field.is_required_on_create() => {
                    errors.push(error_for(format!("The {name} field is required.")));
                    continue;
                }
                None if field.applies_when_absent() => Value::Null,
                None => continue,
            };

            if !field.is_writable(&model, self.ctx) {
                if given.is_some() {
                    errors.push(error_for(format!("The {name} field is not writable.")));
                }
                continue;
            }

            if given.is_none() && !field.is_nullable() && !field.is_relationship() {
                errors.push(error_for(format!("The {name} field is required.")));
                continue;
            }

            let value = match field.kind() {
                FieldKind::ToOne { related_type, .. } if given.is_some() => {
                    match self.resolve_linkage(field, related_type, &value)? {
                        Ok(id) => id,
                        Err(detail) => {
                            errors.push(error_for(detail));
                            continue;
                        }
                    }
                }
                _ => value,
            };

            if creating && field.is_required_on_create() && value.is_null() {
                errors.push(error_for(format!("The {name} field is required.")));
                continue;
            }
            if let Err(detail) = field.check(&value, &model, self.ctx) {
                errors.push(error_for(detail));
                continue;
            }
            match field.write(&mut model, value, self.ctx) {
                Ok(()) => {}
                Err(ApiError::ValidationFailed(mut more)) => errors.append(&mut more),
                Err(other) => return Err(other),
            }
        }

        if errors.is_empty() {
            Ok(model)
        } else {
            debug!(
                resource = schema.resource_type(),
                invalid = errors.len(),
                "Rejected request document"
            );
            Err(ApiError::ValidationFailed(errors))
        }
    }

    /// Turns `{data: {type, id}}` into the related record's id, looked up
    /// within the related resource's scope. The inner `Err` is a field
    /// validation detail.
    fn resolve_linkage(
        &self,
        field: &Field,
        related_type: &str,
        value: &Value,
    ) -> ApiResult<Result<Value, String>> {
        let name = field.name();
        let Some(data) = value.get("data") else {
            return Ok(Err(format!("The {name} relationship must have a data member.")));
        };
        if data.is_null() {
            return Ok(Ok(Value::Null));
        }
        if data.get("type").and_then(Value::as_str) != Some(related_type) {
            return Ok(Err(format!("The {name} relationship must reference a {related_type} record.")));
        }
        let id = match data.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Ok(Err(format!("The {name} relationship must have an id."))),
        };
        match self.api.find_related(self.tx, self.ctx, related_type, &id)? {
            Some(related) => Ok(Ok(related
                .id
                .map(|id| Value::from(id.get()))
                .unwrap_or(Value::Null))),
            None => Ok(Err(format!("The selected {name} is invalid."))),
        }
    }
}

struct ListingPlan {
    order: Vec<OrderBy>,
    filter: Option<Condition>,
    limit: Option<usize>,
    offset: usize,
}

fn member_object<'v>(
    data: &'v Map<String, Value>,
    member: &str,
) -> ApiResult<Option<&'v Map<String, Value>>> {
    match data.get(member) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(ApiError::bad_pointer(
            format!("/data/{member}"),
            format!("The {member} member must be an object."),
        )),
    }
}
