//! Per-request context handed to every field predicate, getter, setter,
//! validator and endpoint hook.

use crate::endpoint::EndpointKind;
use crate::query::QueryParams;
use crate::registry::ResourceSchema;
use forum_model::Principal;
use forum_types::RequestId;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Which endpoint operation a context belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Creating,
    Updating,
    Showing,
    Listing,
    Deleting,
}

impl From<EndpointKind> for Phase {
    fn from(kind: EndpointKind) -> Self {
        match kind {
            EndpointKind::Create => Self::Creating,
            EndpointKind::Update => Self::Updating,
            EndpointKind::Show => Self::Showing,
            EndpointKind::Index => Self::Listing,
            EndpointKind::Delete => Self::Deleting,
        }
    }
}

/// Immutable request context. Cheap to clone; nested operations derive a
/// child context that shares the actor, request id and flags.
#[derive(Clone)]
pub struct Context {
    actor: Arc<dyn Principal>,
    endpoint: EndpointKind,
    schema: Arc<ResourceSchema>,
    body: Arc<Value>,
    query: Arc<QueryParams>,
    request_id: RequestId,
    flags: Arc<BTreeSet<String>>,
}

impl Context {
    pub fn new(actor: Arc<dyn Principal>, schema: Arc<ResourceSchema>, endpoint: EndpointKind) -> Self {
        Self {
            actor,
            endpoint,
            schema,
            body: Arc::new(Value::Null),
            query: Arc::new(QueryParams::default()),
            request_id: RequestId::new(),
            flags: Arc::new(BTreeSet::new()),
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Arc::new(body);
        self
    }

    pub fn with_query(mut self, query: QueryParams) -> Self {
        self.query = Arc::new(query);
        self
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_flag(mut self, flag: &str) -> Self {
        Arc::make_mut(&mut self.flags).insert(flag.to_string());
        self
    }

    /// Context for a nested operation on another resource inside the same
    /// request. Query parameters do not carry over.
    pub(crate) fn nested(&self, schema: Arc<ResourceSchema>, endpoint: EndpointKind, body: Value) -> Self {
        Self {
            actor: Arc::clone(&self.actor),
            endpoint,
            schema,
            body: Arc::new(body),
            query: Arc::new(QueryParams::default()),
            request_id: self.request_id,
            flags: Arc::clone(&self.flags),
        }
    }

    /// Same request, viewed through a related resource's schema (used while
    /// serializing included records).
    pub(crate) fn for_schema(&self, schema: Arc<ResourceSchema>) -> Self {
        Self {
            schema,
            ..self.clone()
        }
    }

    pub fn actor(&self) -> &dyn Principal {
        self.actor.as_ref()
    }

    pub fn actor_arc(&self) -> Arc<dyn Principal> {
        Arc::clone(&self.actor)
    }

    pub fn endpoint(&self) -> EndpointKind {
        self.endpoint
    }

    pub fn phase(&self) -> Phase {
        Phase::from(self.endpoint)
    }

    pub fn creating(&self) -> bool {
        self.phase() == Phase::Creating
    }

    pub fn updating(&self) -> bool {
        self.phase() == Phase::Updating
    }

    pub fn showing(&self) -> bool {
        self.phase() == Phase::Showing
    }

    pub fn listing(&self) -> bool {
        self.phase() == Phase::Listing
    }

    pub fn deleting(&self) -> bool {
        self.phase() == Phase::Deleting
    }

    pub fn resource_type(&self) -> &str {
        self.schema.resource_type()
    }

    pub fn schema(&self) -> &Arc<ResourceSchema> {
        &self.schema
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Looks up a value in the request body by JSON pointer
    /// (`/data/attributes/content`).
    pub fn body_pointer(&self, pointer: &str) -> Option<&Value> {
        self.body.pointer(pointer)
    }

    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Resolved setting of this context's resource.
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.schema.setting(key)
    }

    /// Whether an operation-scoped flag is set (e.g. `isFirstPost`).
    pub fn flag(&self, name: &str) -> bool {
        self.flags.contains(name)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("actor", &self.actor)
            .field("resource_type", &self.resource_type())
            .field("endpoint", &self.endpoint)
            .field("request_id", &self.request_id)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}
