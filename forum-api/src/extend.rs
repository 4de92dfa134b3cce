//! Extension patches.
//!
//! Extensions never touch a resource's declarations directly. They register
//! [`PatchOp`]s against a resource type or one of its ancestors, and the
//! registry folds every applicable patch over the core declarations when
//! it builds a schema. [`ApiResource`] is the builder extensions use to
//! collect patches for one target.

use crate::endpoint::{Endpoint, EndpointKind};
use crate::field::Field;
use crate::filter::Filter;
use crate::sort::SortColumn;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub type FieldsFn = Arc<dyn Fn() -> Vec<Field> + Send + Sync>;
pub type SortsFn = Arc<dyn Fn() -> Vec<SortColumn> + Send + Sync>;
pub type FiltersFn = Arc<dyn Fn() -> Vec<Filter> + Send + Sync>;
pub type EndpointsFn = Arc<dyn Fn() -> Vec<Endpoint> + Send + Sync>;
pub type FieldMutator = Arc<dyn Fn(Field) -> Field + Send + Sync>;
pub type EndpointMutator = Arc<dyn Fn(Endpoint) -> Endpoint + Send + Sync>;

/// One schema edit.
#[derive(Clone)]
pub enum PatchOp {
    /// Appends fields; a field with an existing name replaces it in place.
    AddFields(FieldsFn),
    InsertFieldsBefore { anchor: String, fields: FieldsFn },
    InsertFieldsAfter { anchor: String, fields: FieldsFn },
    RemoveFields(Vec<String>),
    MutateField { name: String, mutator: FieldMutator },
    AddSorts(SortsFn),
    RemoveSorts(Vec<String>),
    AddFilters(FiltersFn),
    RemoveFilters(Vec<String>),
    AddEndpoints(EndpointsFn),
    RemoveEndpoints(Vec<EndpointKind>),
    ConfigureEndpoint { kind: EndpointKind, mutator: EndpointMutator },
    ReplaceSetting { key: String, value: Value },
    RemoveSetting(String),
}

impl PatchOp {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AddFields(_) => "add_fields",
            Self::InsertFieldsBefore { .. } => "insert_fields_before",
            Self::InsertFieldsAfter { .. } => "insert_fields_after",
            Self::RemoveFields(_) => "remove_fields",
            Self::MutateField { .. } => "mutate_field",
            Self::AddSorts(_) => "add_sorts",
            Self::RemoveSorts(_) => "remove_sorts",
            Self::AddFilters(_) => "add_filters",
            Self::RemoveFilters(_) => "remove_filters",
            Self::AddEndpoints(_) => "add_endpoints",
            Self::RemoveEndpoints(_) => "remove_endpoints",
            Self::ConfigureEndpoint { .. } => "configure_endpoint",
            Self::ReplaceSetting { .. } => "replace_setting",
            Self::RemoveSetting(_) => "remove_setting",
        }
    }
}

impl fmt::Debug for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsertFieldsBefore { anchor, .. } | Self::InsertFieldsAfter { anchor, .. } => {
                write!(f, "{}({anchor})", self.label())
            }
            Self::RemoveFields(names) | Self::RemoveSorts(names) | Self::RemoveFilters(names) => {
                write!(f, "{}({names:?})", self.label())
            }
            Self::MutateField { name, .. } => write!(f, "{}({name})", self.label()),
            Self::RemoveEndpoints(kinds) => write!(f, "{}({kinds:?})", self.label()),
            Self::ConfigureEndpoint { kind, .. } => write!(f, "{}({kind:?})", self.label()),
            Self::ReplaceSetting { key, .. } | Self::RemoveSetting(key) => {
                write!(f, "{}({key})", self.label())
            }
            _ => f.write_str(self.label()),
        }
    }
}

/// A registered patch: target type, registration sequence, edit.
#[derive(Debug, Clone)]
pub struct Patch {
    pub target: String,
    pub sequence: usize,
    pub op: PatchOp,
}

/// Extender for one resource type (or ancestor).
///
/// ```ignore
/// registry.extend(
///     ApiResource::new("discussions")
///         .fields(|| vec![Field::boolean("isPinned").writable()])
///         .endpoint(EndpointKind::Index, |e| e.limit(10)),
/// );
/// ```
#[derive(Debug, Clone)]
pub struct ApiResource {
    target: String,
    ops: Vec<PatchOp>,
}

impl ApiResource {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            ops: Vec::new(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn fields(mut self, f: impl Fn() -> Vec<Field> + Send + Sync + 'static) -> Self {
        self.ops.push(PatchOp::AddFields(Arc::new(f)));
        self
    }

    pub fn fields_before(mut self, anchor: &str, f: impl Fn() -> Vec<Field> + Send + Sync + 'static) -> Self {
        self.ops.push(PatchOp::InsertFieldsBefore {
            anchor: anchor.to_string(),
            fields: Arc::new(f),
        });
        self
    }

    pub fn fields_after(mut self, anchor: &str, f: impl Fn() -> Vec<Field> + Send + Sync + 'static) -> Self {
        self.ops.push(PatchOp::InsertFieldsAfter {
            anchor: anchor.to_string(),
            fields: Arc::new(f),
        });
        self
    }

    pub fn remove_fields<S: AsRef<str>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.ops.push(PatchOp::RemoveFields(to_strings(names)));
        self
    }

    /// Mutates one existing field.
    pub fn field(mut self, name: &str, mutator: impl Fn(Field) -> Field + Send + Sync + 'static) -> Self {
        self.ops.push(PatchOp::MutateField {
            name: name.to_string(),
            mutator: Arc::new(mutator),
        });
        self
    }

    pub fn sorts(mut self, f: impl Fn() -> Vec<SortColumn> + Send + Sync + 'static) -> Self {
        self.ops.push(PatchOp::AddSorts(Arc::new(f)));
        self
    }

    pub fn remove_sorts<S: AsRef<str>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.ops.push(PatchOp::RemoveSorts(to_strings(names)));
        self
    }

    pub fn filters(mut self, f: impl Fn() -> Vec<Filter> + Send + Sync + 'static) -> Self {
        self.ops.push(PatchOp::AddFilters(Arc::new(f)));
        self
    }

    pub fn remove_filters<S: AsRef<str>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.ops.push(PatchOp::RemoveFilters(to_strings(names)));
        self
    }

    pub fn endpoints(mut self, f: impl Fn() -> Vec<Endpoint> + Send + Sync + 'static) -> Self {
        self.ops.push(PatchOp::AddEndpoints(Arc::new(f)));
        self
    }

    pub fn remove_endpoints(mut self, kinds: impl IntoIterator<Item = EndpointKind>) -> Self {
        self.ops.push(PatchOp::RemoveEndpoints(kinds.into_iter().collect()));
        self
    }

    /// Mutates one existing endpoint.
    pub fn endpoint(
        mut self,
        kind: EndpointKind,
        mutator: impl Fn(Endpoint) -> Endpoint + Send + Sync + 'static,
    ) -> Self {
        self.ops.push(PatchOp::ConfigureEndpoint {
            kind,
            mutator: Arc::new(mutator),
        });
        self
    }

    pub fn setting(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.ops.push(PatchOp::ReplaceSetting {
            key: key.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn remove_setting(mut self, key: &str) -> Self {
        self.ops.push(PatchOp::RemoveSetting(key.to_string()));
        self
    }

    pub(crate) fn into_parts(self) -> (String, Vec<PatchOp>) {
        (self.target, self.ops)
    }
}

fn to_strings<S: AsRef<str>>(names: impl IntoIterator<Item = S>) -> Vec<String> {
    names.into_iter().map(|n| n.as_ref().to_string()).collect()
}
