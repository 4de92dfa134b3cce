//! The acting principal.
//!
//! The resource layer only ever talks to [`Principal`]; how grants are
//! decided is the collaborator's business. [`Actor`] is the stock
//! implementation: admins can do everything, other actors hold a set of
//! global capabilities and a set of capabilities that apply only to records
//! they authored.

use crate::Model;
use forum_types::RecordId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Authenticated or anonymous principal making a request.
pub trait Principal: Send + Sync + fmt::Debug {
    /// Primary key of the backing user record; `None` for guests.
    fn id(&self) -> Option<RecordId>;

    /// Whether this is a registered user rather than a guest.
    fn exists(&self) -> bool {
        self.id().is_some()
    }

    fn is_admin(&self) -> bool;

    /// Whether the principal holds `capability`, globally (`target == None`)
    /// or on a specific record.
    fn can(&self, capability: &str, target: Option<&Model>) -> bool;
}

/// Capability-set principal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    id: Option<RecordId>,
    admin: bool,
    granted: BTreeSet<String>,
    /// Capabilities that only apply to records whose `userId` is this actor.
    granted_own: BTreeSet<String>,
}

impl Actor {
    /// Anonymous visitor with no grants.
    pub fn guest() -> Self {
        Self::default()
    }

    /// Registered user with no grants yet.
    pub fn member(id: RecordId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    /// Registered administrator.
    pub fn admin(id: RecordId) -> Self {
        Self {
            id: Some(id),
            admin: true,
            ..Self::default()
        }
    }

    /// Builder-style global grant.
    pub fn with_grant(mut self, capability: &str) -> Self {
        self.grant(capability);
        self
    }

    /// Builder-style grant restricted to the actor's own records.
    pub fn with_own_grant(mut self, capability: &str) -> Self {
        self.granted_own.insert(capability.to_string());
        self
    }

    pub fn grant(&mut self, capability: &str) {
        self.granted.insert(capability.to_string());
    }

    pub fn revoke(&mut self, capability: &str) {
        self.granted.remove(capability);
        self.granted_own.remove(capability);
    }

    /// Returns all global grants.
    pub fn granted(&self) -> &BTreeSet<String> {
        &self.granted
    }
}

impl Principal for Actor {
    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn is_admin(&self) -> bool {
        self.admin
    }

    fn can(&self, capability: &str, target: Option<&Model>) -> bool {
        if self.admin || self.granted.contains(capability) {
            return true;
        }
        match target {
            Some(model) => self.granted_own.contains(capability) && model.is_owned_by(self.id),
            None => false,
        }
    }
}
