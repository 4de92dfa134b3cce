//! Endpoint definitions: which operations a resource exposes, who may call
//! them, and the hooks and defaults attached to each.

use crate::context::Context;
use crate::error::ApiResult;
use forum_model::Model;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EndpointKind {
    Show,
    Index,
    Create,
    Update,
    Delete,
}

impl EndpointKind {
    pub const ALL: [EndpointKind; 5] = [
        Self::Show,
        Self::Index,
        Self::Create,
        Self::Update,
        Self::Delete,
    ];

    /// Whether the endpoint addresses one existing record by id.
    pub fn targets_record(self) -> bool {
        matches!(self, Self::Show | Self::Update | Self::Delete)
    }

    /// Whether the endpoint reads a request document.
    pub fn has_body(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Show => "show",
            Self::Index => "index",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Success status code.
    pub fn success_status(self) -> u16 {
        match self {
            Self::Create => 201,
            Self::Delete => 204,
            _ => 200,
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs after authorization, before the model is touched. An error aborts
/// the request.
pub type BeforeHook = Arc<dyn Fn(&Context) -> ApiResult<()> + Send + Sync>;
/// Runs after persistence; may replace the model that gets serialized.
pub type AfterHook = Arc<dyn Fn(&Context, Model) -> ApiResult<Model> + Send + Sync>;

/// One operation of a resource.
#[derive(Clone)]
pub struct Endpoint {
    kind: EndpointKind,
    authenticated: bool,
    admin: bool,
    capability: Option<String>,
    before: Vec<BeforeHook>,
    after: Vec<AfterHook>,
    default_include: Vec<String>,
    default_sort: Option<String>,
    limit: Option<usize>,
    max_limit: Option<usize>,
    paginate: bool,
}

impl Endpoint {
    pub fn new(kind: EndpointKind) -> Self {
        Self {
            kind,
            authenticated: false,
            admin: false,
            capability: None,
            before: Vec::new(),
            after: Vec::new(),
            default_include: Vec::new(),
            default_sort: None,
            limit: None,
            max_limit: None,
            paginate: false,
        }
    }

    pub fn show() -> Self {
        Self::new(EndpointKind::Show)
    }

    pub fn index() -> Self {
        Self::new(EndpointKind::Index)
    }

    pub fn create() -> Self {
        Self::new(EndpointKind::Create)
    }

    pub fn update() -> Self {
        Self::new(EndpointKind::Update)
    }

    pub fn delete() -> Self {
        Self::new(EndpointKind::Delete)
    }

    /// Rejects guests.
    pub fn authenticated(mut self) -> Self {
        self.authenticated = true;
        self
    }

    /// Restricts the endpoint to administrators.
    pub fn admin(mut self) -> Self {
        self.admin = true;
        self
    }

    /// Requires a capability. Checked globally for Create/Index, against the
    /// scoped target record for Show/Update/Delete.
    pub fn can(mut self, capability: &str) -> Self {
        self.capability = Some(capability.to_string());
        self
    }

    /// Drops every access requirement.
    pub fn public(mut self) -> Self {
        self.authenticated = false;
        self.admin = false;
        self.capability = None;
        self
    }

    pub fn before(mut self, hook: impl Fn(&Context) -> ApiResult<()> + Send + Sync + 'static) -> Self {
        self.before.push(Arc::new(hook));
        self
    }

    pub fn after(
        mut self,
        hook: impl Fn(&Context, Model) -> ApiResult<Model> + Send + Sync + 'static,
    ) -> Self {
        self.after.push(Arc::new(hook));
        self
    }

    /// Replaces the default include paths.
    pub fn default_include<S: AsRef<str>>(mut self, paths: impl IntoIterator<Item = S>) -> Self {
        self.default_include = paths.into_iter().map(|p| p.as_ref().to_string()).collect();
        self
    }

    pub fn add_default_include<S: AsRef<str>>(mut self, paths: impl IntoIterator<Item = S>) -> Self {
        for path in paths {
            let path = path.as_ref();
            if !self.default_include.iter().any(|p| p == path) {
                self.default_include.push(path.to_string());
            }
        }
        self
    }

    pub fn remove_default_include<S: AsRef<str>>(mut self, paths: impl IntoIterator<Item = S>) -> Self {
        let drop: Vec<String> = paths.into_iter().map(|p| p.as_ref().to_string()).collect();
        self.default_include.retain(|p| !drop.contains(p));
        self
    }

    /// Sort used when the request has no `sort` parameter.
    pub fn default_sort(mut self, sort: &str) -> Self {
        self.default_sort = Some(sort.to_string());
        self
    }

    /// Page size used when the request has no `page[limit]`.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Upper bound for `page[limit]`; larger requests are clamped.
    pub fn max_limit(mut self, max: usize) -> Self {
        self.max_limit = Some(max);
        self
    }

    /// Pages the listing through `page[offset]`/`page[limit]`. Without it
    /// every matching record is returned.
    pub fn paginate(mut self) -> Self {
        self.paginate = true;
        self
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    pub fn requires_authentication(&self) -> bool {
        self.authenticated
    }

    pub fn requires_admin(&self) -> bool {
        self.admin
    }

    pub fn capability(&self) -> Option<&str> {
        self.capability.as_deref()
    }

    pub fn before_hooks(&self) -> &[BeforeHook] {
        &self.before
    }

    pub fn after_hooks(&self) -> &[AfterHook] {
        &self.after
    }

    pub fn default_includes(&self) -> &[String] {
        &self.default_include
    }

    pub fn default_sort_key(&self) -> Option<&str> {
        self.default_sort.as_deref()
    }

    pub fn page_limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn page_max_limit(&self) -> Option<usize> {
        self.max_limit
    }

    pub fn is_paginated(&self) -> bool {
        self.paginate
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("kind", &self.kind)
            .field("authenticated", &self.authenticated)
            .field("admin", &self.admin)
            .field("capability", &self.capability)
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .field("default_include", &self.default_include)
            .field("default_sort", &self.default_sort)
            .field("limit", &self.limit)
            .field("max_limit", &self.max_limit)
            .field("paginate", &self.paginate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_include_edits_preserve_order_and_dedupe() {
        let e = Endpoint::show()
            .default_include(["user", "firstPost"])
            .add_default_include(["lastPost", "user"])
            .remove_default_include(["firstPost"]);
        assert_eq!(e.default_includes(), ["user", "lastPost"]);
    }

    #[test]
    fn public_clears_requirements() {
        let e = Endpoint::delete().authenticated().admin().can("delete").public();
        assert!(!e.requires_authentication());
        assert!(!e.requires_admin());
        assert_eq!(e.capability(), None);
    }

    #[test]
    fn listings_page_only_when_asked() {
        assert!(!Endpoint::index().is_paginated());
        assert!(Endpoint::index().paginate().is_paginated());
    }

    #[test]
    fn success_statuses() {
        assert_eq!(EndpointKind::Create.success_status(), 201);
        assert_eq!(EndpointKind::Delete.success_status(), 204);
        assert_eq!(EndpointKind::Index.success_status(), 200);
    }
}
