//! JSON:API document serialization.
//!
//! Turns a pipeline [`Outcome`] into a top-level document: primary `data`,
//! side-loaded `included` records (deduplicated by type and id, first-seen
//! order), and for listings `links` plus `meta.total`.

use crate::api::JsonApi;
use crate::context::Context;
use crate::error::{ApiError, ApiResult};
use crate::field::FieldKind;
use crate::pipeline::{Listing, Outcome};
use crate::query::IncludeTree;
use crate::registry::ResourceSchema;
use forum_model::Model;
use forum_storage::StoreTx;
use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

type Key = (String, String);

fn key_of(model: &Model) -> Key {
    (
        model.resource_type.clone(),
        model.id.map(|id| id.to_string()).unwrap_or_default(),
    )
}

fn identifier(model: &Model) -> Value {
    let (resource_type, id) = key_of(model);
    json!({ "type": resource_type, "id": id })
}

/// Checks every include path against the schemas: each segment must be an
/// includable relationship of the schema it is applied to.
pub(crate) fn validate_includes(api: &JsonApi, schema: &ResourceSchema, tree: &IncludeTree) -> ApiResult<()> {
    validate_level(api, schema, tree, "")
}

fn validate_level(api: &JsonApi, schema: &ResourceSchema, tree: &IncludeTree, prefix: &str) -> ApiResult<()> {
    for (name, child) in tree.iter() {
        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        };
        let invalid = || ApiError::bad_parameter("include", format!("Invalid include [{path}]"));

        let field = schema
            .field(name)
            .filter(|f| f.is_relationship() && f.is_includable())
            .ok_or_else(invalid)?;
        let related = field
            .kind()
            .related_type()
            .and_then(|t| api.schema(t))
            .ok_or_else(invalid)?;
        validate_level(api, related, child, &path)?;
    }
    Ok(())
}

/// Builds one response document. Holds the transaction so relationships
/// are read from the same snapshot the endpoint wrote to.
pub(crate) struct Serializer<'a, 't> {
    api: &'a JsonApi,
    tx: &'a StoreTx<'t>,
    ctx: &'a Context,
    primary: HashSet<Key>,
    included: IndexMap<Key, Value>,
}

impl<'a, 't> Serializer<'a, 't> {
    pub fn new(api: &'a JsonApi, tx: &'a StoreTx<'t>, ctx: &'a Context) -> Self {
        Self {
            api,
            tx,
            ctx,
            primary: HashSet::new(),
            included: IndexMap::new(),
        }
    }

    /// `None` for outcomes without a body (Delete).
    pub fn document(mut self, outcome: &Outcome, include: &IncludeTree) -> ApiResult<Option<Value>> {
        let ctx = self.ctx;
        let mut document = match outcome {
            Outcome::Deleted(_) => return Ok(None),
            Outcome::One(model) => {
                self.primary.insert(key_of(model));
                let data = self.resource_object(ctx, model, include)?;
                json!({ "data": data })
            }
            Outcome::Many(listing) => {
                self.primary.extend(listing.models.iter().map(key_of));
                let mut data = Vec::with_capacity(listing.models.len());
                for model in &listing.models {
                    data.push(self.resource_object(ctx, model, include)?);
                }
                json!({
                    "data": data,
                    "links": self.links(listing),
                    "meta": { "total": listing.total },
                })
            }
        };
        if !self.included.is_empty() {
            let included: Vec<Value> = self.included.into_values().collect();
            document["included"] = Value::Array(included);
        }
        Ok(Some(document))
    }

    fn resource_object(&mut self, ctx: &Context, model: &Model, tree: &IncludeTree) -> ApiResult<Value> {
        let schema = Arc::clone(ctx.schema());
        let mut attributes = Map::new();
        let mut relationships = Map::new();

        for field in schema.fields() {
            if !field.is_visible(model, ctx) {
                continue;
            }
            let name = field.name();
            let child = tree.get(name);
            match field.kind() {
                FieldKind::ToOne {
                    related_type,
                    foreign_key,
                } => {
                    if child.is_none() && !field.has_linkage(model, ctx) {
                        continue;
                    }
                    let related = match model.get_id(foreign_key) {
                        Some(id) => self
                            .api
                            .find_related(self.tx, ctx, related_type, &id.to_string())?,
                        None => None,
                    };
                    let data = related.as_ref().map(identifier).unwrap_or(Value::Null);
                    relationships.insert(name.to_string(), json!({ "data": data }));
                    if let (Some(child), Some(related)) = (child, related) {
                        self.include(ctx, related_type, &related, child)?;
                    }
                }
                FieldKind::ToMany {
                    related_type,
                    inverse_key,
                } => {
                    if child.is_none() && !field.has_linkage(model, ctx) {
                        continue;
                    }
                    let related = match model.id {
                        Some(id) => self
                            .api
                            .find_related_many(self.tx, ctx, related_type, inverse_key, id)?,
                        None => Vec::new(),
                    };
                    let data: Vec<Value> = related.iter().map(identifier).collect();
                    relationships.insert(name.to_string(), json!({ "data": data }));
                    if let Some(child) = child {
                        for record in &related {
                            self.include(ctx, related_type, record, child)?;
                        }
                    }
                }
                _ => {
                    attributes.insert(name.to_string(), field.read(model, ctx));
                }
            }
        }

        let (resource_type, id) = key_of(model);
        let mut object = json!({
            "type": resource_type,
            "id": id,
            "attributes": attributes,
        });
        if !relationships.is_empty() {
            object["relationships"] = Value::Object(relationships);
        }
        Ok(object)
    }

    fn include(&mut self, parent: &Context, related_type: &str, model: &Model, tree: &IncludeTree) -> ApiResult<()> {
        let key = key_of(model);
        let seen = self.included.contains_key(&key);
        if (seen || self.primary.contains(&key)) && tree.is_empty() {
            return Ok(());
        }
        let schema = self
            .api
            .schema(related_type)
            .ok_or_else(|| ApiError::bad_parameter("include", format!("Invalid include [{related_type}]")))?;
        let ctx = parent.for_schema(Arc::clone(schema));

        if self.primary.contains(&key) {
            // Already in `data`; only its nested includes are still needed.
            self.resource_object(&ctx, model, tree)?;
            return Ok(());
        }
        if !seen {
            // Reserve the slot so the record keeps its first-seen position.
            self.included.insert(key.clone(), Value::Null);
        }
        let object = self.resource_object(&ctx, model, tree)?;
        if let Some(slot) = self.included.get_mut(&key) {
            merge_object(slot, object);
        }
        Ok(())
    }

    fn links(&self, listing: &Listing) -> Value {
        let base = format!(
            "{}/api/{}",
            self.api.config().base_url.trim_end_matches('/'),
            self.ctx.resource_type()
        );
        let extra = self.ctx.query().encode_without_page();
        let Some(limit) = listing.limit else {
            return json!({ "first": with_query(&base, &extra) });
        };

        let page = |offset: usize| {
            let mut parts = extra.clone();
            parts.push(format!("page[offset]={offset}"));
            parts.push(format!("page[limit]={limit}"));
            with_query(&base, &parts)
        };
        let mut links = Map::new();
        links.insert("first".into(), Value::from(page(0)));
        if listing.offset > 0 {
            links.insert("prev".into(), Value::from(page(listing.offset.saturating_sub(limit))));
        }
        if let Some(next) = listing.offset.checked_add(limit).filter(|&next| next < listing.total) {
            links.insert("next".into(), Value::from(page(next)));
        }
        Value::Object(links)
    }
}

fn with_query(base: &str, parts: &[String]) -> String {
    if parts.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{}", parts.join("&"))
    }
}

/// Fills a reserved slot, or adds relationships found through another
/// include path to an already serialized record.
fn merge_object(slot: &mut Value, object: Value) {
    if slot.is_null() {
        *slot = object;
        return;
    }
    if let Some(Value::Object(extra)) = object.get("relationships").cloned() {
        let target = slot
            .as_object_mut()
            .map(|o| o.entry("relationships").or_insert_with(|| json!({})));
        if let Some(Value::Object(existing)) = target {
            for (name, rel) in extra {
                existing.insert(name, rel);
            }
        }
    }
}
