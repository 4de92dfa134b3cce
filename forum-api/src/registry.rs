//! Schema registry.
//!
//! Holds the registered resources and every extension patch, and turns
//! them into one effective [`ResourceSchema`] per type. Building is a pure
//! function of a resource's core declarations and the patches that apply
//! to it; `build` caches the result, `compile` always recomputes.
//!
//! `boot` validates and compiles every type once and returns the immutable
//! [`Catalog`] the request path runs against.

use crate::endpoint::{Endpoint, EndpointKind};
use crate::error::ConfigurationError;
use crate::extend::{ApiResource, Patch, PatchOp};
use crate::field::{Field, FieldKind};
use crate::filter::Filter;
use crate::resolver::{AncestorTable, MergePlan, OverrideResolver};
use crate::resource::Resource;
use crate::resources;
use crate::sort::SortColumn;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// The effective declarations of one resource type.
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    resource_type: String,
    stored: bool,
    fields: IndexMap<String, Field>,
    sorts: IndexMap<String, SortColumn>,
    filters: IndexMap<String, Filter>,
    endpoints: IndexMap<EndpointKind, Endpoint>,
    settings: IndexMap<String, Value>,
}

impl ResourceSchema {
    /// A schema with no declarations.
    pub fn empty(resource_type: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            stored: true,
            fields: IndexMap::new(),
            sorts: IndexMap::new(),
            filters: IndexMap::new(),
            endpoints: IndexMap::new(),
            settings: IndexMap::new(),
        }
    }

    /// Core declarations of a resource, before any patch.
    fn from_resource(resource: &dyn Resource) -> Result<Self, ConfigurationError> {
        let resource_type = resource.resource_type();
        let mut schema = Self::empty(resource_type);
        schema.stored = resource.stored();

        for field in resource.fields() {
            if schema.fields.contains_key(field.name()) {
                return Err(ConfigurationError::DuplicateField {
                    resource: resource_type.to_string(),
                    field: field.name().to_string(),
                });
            }
            schema.fields.insert(field.name().to_string(), field);
        }
        for sort in resource.sorts() {
            schema.sorts.insert(sort.name().to_string(), sort);
        }
        for filter in resource.filters() {
            schema.filters.insert(filter.name().to_string(), filter);
        }
        schema.add_endpoints(resource.endpoints())?;
        for (key, value) in resource.settings() {
            schema.settings.insert(key, value);
        }
        Ok(schema)
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn is_stored(&self) -> bool {
        self.stored
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    pub fn sorts(&self) -> &IndexMap<String, SortColumn> {
        &self.sorts
    }

    pub fn filters(&self) -> &IndexMap<String, Filter> {
        &self.filters
    }

    pub fn endpoint(&self, kind: EndpointKind) -> Option<&Endpoint> {
        self.endpoints.get(&kind)
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.values()
    }

    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    pub fn settings(&self) -> &IndexMap<String, Value> {
        &self.settings
    }

    /// Copy with configured values for settings this schema declares.
    /// Keys the schema does not declare (or that a patch removed) are ignored.
    pub fn with_setting_overrides<'v>(
        &self,
        overrides: impl IntoIterator<Item = (&'v String, &'v Value)>,
    ) -> Self {
        let mut schema = self.clone();
        for (key, value) in overrides {
            if let Some(slot) = schema.settings.get_mut(key) {
                *slot = value.clone();
            }
        }
        schema
    }

    // ==================== Patch application ====================

    fn unknown_key(&self, op: &PatchOp, key: &str) -> ConfigurationError {
        ConfigurationError::UnknownKey {
            resource: self.resource_type.clone(),
            operation: op.label(),
            key: key.to_string(),
        }
    }

    fn add_endpoints(&mut self, endpoints: Vec<Endpoint>) -> Result<(), ConfigurationError> {
        let mut seen = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let kind = endpoint.kind();
            if seen.contains(&kind) {
                return Err(ConfigurationError::DuplicateEndpoint {
                    resource: self.resource_type.clone(),
                    kind,
                });
            }
            seen.push(kind);
            self.endpoints.insert(kind, endpoint);
        }
        Ok(())
    }

    /// Adds fields, replacing same-named ones in place.
    fn add_fields(&mut self, fields: Vec<Field>) -> Result<(), ConfigurationError> {
        self.check_unique(&fields)?;
        for field in fields {
            self.fields.insert(field.name().to_string(), field);
        }
        Ok(())
    }

    /// Inserts fields next to `anchor`, keeping the batch's order. A field
    /// whose name already exists elsewhere moves to the new position.
    fn insert_fields_at(&mut self, anchor: &str, after: bool, fields: Vec<Field>) -> Result<(), ConfigurationError> {
        self.check_unique(&fields)?;
        if !self.fields.contains_key(anchor) {
            return Err(ConfigurationError::UnknownKey {
                resource: self.resource_type.clone(),
                operation: if after { "insert_fields_after" } else { "insert_fields_before" },
                key: anchor.to_string(),
            });
        }
        // After-inserts chain off the previously inserted field.
        let mut cursor = anchor.to_string();
        for field in fields {
            let name = field.name().to_string();
            if name == anchor {
                self.fields.insert(name, field);
                continue;
            }
            self.fields.shift_remove(&name);
            let Some(at) = self.fields.get_index_of(&cursor) else {
                continue;
            };
            let index = if after { at + 1 } else { at };
            self.fields.shift_insert(index, name.clone(), field);
            if after {
                cursor = name;
            }
        }
        Ok(())
    }

    fn check_unique(&self, fields: &[Field]) -> Result<(), ConfigurationError> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name() == field.name()) {
                return Err(ConfigurationError::DuplicateField {
                    resource: self.resource_type.clone(),
                    field: field.name().to_string(),
                });
            }
        }
        Ok(())
    }

    fn apply(&mut self, level: usize, op: &PatchOp) -> Result<(), ConfigurationError> {
        match op {
            PatchOp::AddFields(f) => self.add_fields(f())?,
            PatchOp::InsertFieldsBefore { anchor, fields } => {
                self.insert_fields_at(anchor, false, fields())?
            }
            PatchOp::InsertFieldsAfter { anchor, fields } => {
                self.insert_fields_at(anchor, true, fields())?
            }
            PatchOp::RemoveFields(names) => {
                for name in names {
                    self.fields.shift_remove(name);
                }
            }
            PatchOp::MutateField { name, mutator } => {
                let Some(slot) = self.fields.get_mut(name) else {
                    return Err(self.unknown_key(op, name));
                };
                let mutated = mutator(slot.clone());
                if mutated.name() != name.as_str() {
                    return Err(ConfigurationError::InvalidField {
                        resource: self.resource_type.clone(),
                        field: name.clone(),
                        reason: format!("mutator renamed it to '{}'", mutated.name()),
                    });
                }
                *slot = mutated;
            }
            PatchOp::AddSorts(f) => {
                for sort in f() {
                    self.sorts.insert(sort.name().to_string(), sort);
                }
            }
            PatchOp::RemoveSorts(names) => {
                for name in names {
                    self.sorts.shift_remove(name);
                }
            }
            PatchOp::AddFilters(f) => {
                for filter in f() {
                    self.filters.insert(filter.name().to_string(), filter);
                }
            }
            PatchOp::RemoveFilters(names) => {
                for name in names {
                    self.filters.shift_remove(name);
                }
            }
            PatchOp::AddEndpoints(f) => self.add_endpoints(f())?,
            PatchOp::RemoveEndpoints(kinds) => {
                for kind in kinds {
                    self.endpoints.shift_remove(kind);
                }
            }
            PatchOp::ConfigureEndpoint { kind, mutator } => match self.endpoints.get_mut(kind) {
                Some(slot) => {
                    let configured = mutator(slot.clone());
                    if configured.kind() != *kind {
                        return Err(self.unknown_key(op, kind.as_str()));
                    }
                    *slot = configured;
                }
                // Ancestor patches configure whichever descendants have the endpoint.
                None if level > 0 => {
                    debug!(
                        resource = %self.resource_type,
                        endpoint = %kind,
                        "Skipping inherited endpoint patch"
                    );
                }
                None => return Err(self.unknown_key(op, kind.as_str())),
            },
            PatchOp::ReplaceSetting { key, value } => {
                self.settings.insert(key.clone(), value.clone());
            }
            PatchOp::RemoveSetting(key) => {
                self.settings.shift_remove(key);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        for field in self.fields.values() {
            if matches!(field.kind(), FieldKind::ToMany { .. }) && !field.writable_rule().is_never() {
                return Err(ConfigurationError::InvalidField {
                    resource: self.resource_type.clone(),
                    field: field.name().to_string(),
                    reason: "to-many relationships cannot be writable".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Registered resources plus extension patches.
pub struct SchemaRegistry {
    resources: IndexMap<String, Arc<dyn Resource>>,
    ancestors: AncestorTable,
    patches: Vec<Patch>,
    cache: Mutex<HashMap<String, Arc<ResourceSchema>>>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            resources: IndexMap::new(),
            ancestors: AncestorTable::new(),
            patches: Vec::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Registry preloaded with the stock forum resources.
    pub fn with_builtin_resources() -> Result<Self, ConfigurationError> {
        let mut registry = Self::new();
        for resource in resources::builtin() {
            registry.register_resource_arc(resource)?;
        }
        Ok(registry)
    }

    pub fn register_resource(&mut self, resource: impl Resource + 'static) -> Result<(), ConfigurationError> {
        self.register_resource_arc(Arc::new(resource))
    }

    pub fn register_resource_arc(&mut self, resource: Arc<dyn Resource>) -> Result<(), ConfigurationError> {
        let resource_type = resource.resource_type().to_string();
        self.ancestors.insert(&resource_type, resource.ancestors())?;
        debug!(resource = %resource_type, "Registered resource");
        self.resources.insert(resource_type, resource);
        self.invalidate();
        Ok(())
    }

    /// Registers one patch against a type or ancestor. Targets are checked
    /// at boot, so resources and patches may register in any order.
    pub fn register(&mut self, target: &str, op: PatchOp) {
        let sequence = self.patches.len();
        self.patches.push(Patch {
            target: target.to_string(),
            sequence,
            op,
        });
        self.invalidate();
    }

    /// Registers every patch an extender collected.
    pub fn extend(&mut self, extender: ApiResource) {
        let (target, ops) = extender.into_parts();
        for op in ops {
            self.register(&target, op);
        }
    }

    fn invalidate(&mut self) {
        if let Ok(cache) = self.cache.get_mut() {
            cache.clear();
        }
    }

    pub fn resource(&self, resource_type: &str) -> Option<&Arc<dyn Resource>> {
        self.resources.get(resource_type)
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn ancestors(&self) -> &AncestorTable {
        &self.ancestors
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn resolver(&self) -> OverrideResolver<'_> {
        OverrideResolver::new(&self.ancestors, &self.patches)
    }

    /// Applicable patches for a type, most specific first.
    pub fn resolve(&self, resource_type: &str) -> Result<MergePlan<'_>, ConfigurationError> {
        self.resolver().resolve(resource_type)
    }

    /// Builds the effective schema without touching the cache.
    pub fn compile(&self, resource_type: &str) -> Result<ResourceSchema, ConfigurationError> {
        let resource = self
            .resources
            .get(resource_type)
            .ok_or_else(|| ConfigurationError::UnknownResource(resource_type.to_string()))?;
        let mut schema = ResourceSchema::from_resource(resource.as_ref())?;

        let plan = self.resolve(resource_type)?;
        for (level, patch) in plan.application_order() {
            schema.apply(level, &patch.op)?;
            debug!(
                resource = %resource_type,
                target = %patch.target,
                patch = patch.op.label(),
                level,
                "Applied patch"
            );
        }
        schema.validate()?;
        Ok(schema)
    }

    /// Builds the effective schema, memoized per type.
    pub fn build(&self, resource_type: &str) -> Result<Arc<ResourceSchema>, ConfigurationError> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(schema) = cache.get(resource_type) {
                return Ok(Arc::clone(schema));
            }
        }
        let schema = Arc::new(self.compile(resource_type)?);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(resource_type.to_string(), Arc::clone(&schema));
        }
        Ok(schema)
    }

    /// Validates every patch target and builds every schema.
    pub fn boot(self) -> Result<Catalog, ConfigurationError> {
        self.resolver().check_targets()?;
        let mut entries = IndexMap::with_capacity(self.resources.len());
        for (resource_type, resource) in &self.resources {
            let schema = self.build(resource_type)?;
            entries.insert(
                resource_type.clone(),
                CatalogEntry {
                    resource: Arc::clone(resource),
                    schema,
                },
            );
        }
        info!(
            resources = entries.len(),
            patches = self.patches.len(),
            "Schema registry booted"
        );
        Ok(Catalog { entries })
    }
}

/// A booted resource type.
#[derive(Clone)]
pub struct CatalogEntry {
    pub resource: Arc<dyn Resource>,
    pub schema: Arc<ResourceSchema>,
}

/// Every resource type with its effective schema. Immutable after boot.
#[derive(Clone)]
pub struct Catalog {
    entries: IndexMap<String, CatalogEntry>,
}

impl Catalog {
    pub fn get(&self, resource_type: &str) -> Option<&CatalogEntry> {
        self.entries.get(resource_type)
    }

    pub fn schema(&self, resource_type: &str) -> Option<&Arc<ResourceSchema>> {
        self.entries.get(resource_type).map(|e| &e.schema)
    }

    pub fn resource(&self, resource_type: &str) -> Option<&Arc<dyn Resource>> {
        self.entries.get(resource_type).map(|e| &e.resource)
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Types whose records live in the store.
    pub fn stored_types(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, e)| e.schema.is_stored())
            .map(|(t, _)| t.as_str())
            .collect()
    }

    /// Applies configured setting values to every schema declaring them.
    pub fn with_setting_overrides(mut self, overrides: &BTreeMap<String, Value>) -> Self {
        if overrides.is_empty() {
            return self;
        }
        for entry in self.entries.values_mut() {
            entry.schema = Arc::new(entry.schema.with_setting_overrides(overrides.iter()));
        }
        self
    }
}
