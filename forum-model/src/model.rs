use forum_types::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A generic record stored by the persistence collaborator.
///
/// All resource data flows through this type. `attributes` holds the
/// record's columns as JSON; its structure is defined by the resource's
/// schema. Relationship foreign keys are ordinary attributes (`userId`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub resource_type: String,
    pub id: Option<RecordId>,
    pub attributes: Map<String, Value>,
}

impl Model {
    /// Creates an unsaved record of the given type.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: None,
            attributes: Map::new(),
        }
    }

    /// Builder-style id assignment.
    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    /// Builder-style attribute assignment.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Whether the record has been assigned a primary key by the store.
    pub fn exists(&self) -> bool {
        self.id.is_some()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key).filter(|v| !v.is_null())
    }

    /// Extract a string attribute.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    /// Extract an integer attribute.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    /// Extract a boolean attribute. SQLite hands booleans back as 0/1, so
    /// integers are accepted as well.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key)
            .and_then(|v| v.as_bool().or_else(|| v.as_i64().map(|n| n != 0)))
    }

    /// Extract a foreign key attribute.
    pub fn get_id(&self, key: &str) -> Option<RecordId> {
        self.get_i64(key).map(RecordId::new)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.attributes.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    /// Whether `userId` on this record points at `actor_id`.
    pub fn is_owned_by(&self, actor_id: Option<RecordId>) -> bool {
        match (actor_id, self.get_id("userId")) {
            (Some(actor), Some(owner)) => actor == owner,
            _ => false,
        }
    }
}
