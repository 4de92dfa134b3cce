//! The API facade: routing, request handling, nested processing.

use crate::config::ApiConfig;
use crate::context::Context;
use crate::document::Serializer;
use crate::endpoint::EndpointKind;
use crate::error::{ApiError, ApiResult, BootError};
use crate::pipeline::{self, Outcome};
use crate::query::QueryParams;
use crate::registry::{Catalog, ResourceSchema, SchemaRegistry};
use crate::resource::Resource;
use forum_model::{Actor, Model, Principal};
use forum_storage::{Column, Condition, OrderBy, Query, SqliteStore, StoreTx};
use forum_types::{RecordId, RequestId};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, info_span};

/// Id of the forum singleton.
pub const FORUM_ID: &str = "1";

/// An endpoint invocation resolved from method + path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub resource_type: String,
    pub endpoint: EndpointKind,
    pub id: Option<String>,
}

/// One request to the resource layer.
#[derive(Clone)]
pub struct ApiRequest {
    pub actor: Arc<dyn Principal>,
    pub resource_type: String,
    pub endpoint: EndpointKind,
    pub id: Option<String>,
    pub query: QueryParams,
    pub body: Value,
}

impl ApiRequest {
    pub fn new(actor: Arc<dyn Principal>, resource_type: &str, endpoint: EndpointKind) -> Self {
        Self {
            actor,
            resource_type: resource_type.to_string(),
            endpoint,
            id: None,
            query: QueryParams::default(),
            body: Value::Null,
        }
    }

    pub fn from_route(actor: Arc<dyn Principal>, route: Route) -> Self {
        Self {
            id: route.id,
            ..Self::new(actor, &route.resource_type, route.endpoint)
        }
    }

    pub fn with_id(mut self, id: impl ToString) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }
}

/// Status plus optional JSON:API document.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub document: Option<Value>,
}

impl ApiResponse {
    pub fn error(err: &ApiError) -> Self {
        Self {
            status: err.status(),
            document: Some(err.to_document()),
        }
    }
}

/// Booted resource layer bound to a store.
pub struct JsonApi {
    catalog: Catalog,
    store: SqliteStore,
    config: ApiConfig,
}

impl JsonApi {
    /// Binds a booted catalog to a store. Configured setting overrides are
    /// applied to every schema that still declares the key.
    pub fn new(catalog: Catalog, store: SqliteStore, config: ApiConfig) -> Self {
        let catalog = catalog.with_setting_overrides(&config.settings);
        Self {
            catalog,
            store,
            config,
        }
    }

    /// Boots the registry and opens a store with one table per stored
    /// resource type (in memory when `database` is `None`).
    pub fn open(registry: SchemaRegistry, config: ApiConfig, database: Option<&Path>) -> Result<Self, BootError> {
        let catalog = registry.boot()?;
        let tables = catalog.stored_types();
        let store = match database {
            Some(path) => SqliteStore::open(path, &tables)?,
            None => SqliteStore::open_in_memory(&tables)?,
        };
        info!(
            tables = tables.len(),
            database = ?database,
            "Store opened"
        );
        Ok(Self::new(catalog, store, config))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn schema(&self, resource_type: &str) -> Option<&Arc<ResourceSchema>> {
        self.catalog.schema(resource_type)
    }

    pub fn resource(&self, resource_type: &str) -> Option<&Arc<dyn Resource>> {
        self.catalog.resource(resource_type)
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Maps an HTTP method and path to an endpoint.
    pub fn route(method: &str, path: &str) -> ApiResult<Route> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let method = method.to_ascii_uppercase();
        let route = |resource_type: &str, endpoint, id: Option<&str>| Route {
            resource_type: resource_type.to_string(),
            endpoint,
            id: id.map(str::to_string),
        };

        match segments.as_slice() {
            ["api"] => match method.as_str() {
                "GET" => Ok(route("forum", EndpointKind::Show, Some(FORUM_ID))),
                _ => Err(ApiError::MethodNotAllowed),
            },
            ["api", resource_type] if !resource_type.is_empty() => match method.as_str() {
                "GET" => Ok(route(resource_type, EndpointKind::Index, None)),
                "POST" => Ok(route(resource_type, EndpointKind::Create, None)),
                _ => Err(ApiError::MethodNotAllowed),
            },
            ["api", resource_type, id] if !resource_type.is_empty() && !id.is_empty() => {
                match method.as_str() {
                    "GET" => Ok(route(resource_type, EndpointKind::Show, Some(id))),
                    "PATCH" => Ok(route(resource_type, EndpointKind::Update, Some(id))),
                    "DELETE" => Ok(route(resource_type, EndpointKind::Delete, Some(id))),
                    _ => Err(ApiError::MethodNotAllowed),
                }
            }
            _ => Err(ApiError::NotFound),
        }
    }

    /// Principal for a request carrying `user_id`: unknown ids and `None`
    /// are guests; known users get the configured member grants and are
    /// admins when their record says so.
    pub fn actor_for(&self, user_id: Option<&str>) -> ApiResult<Actor> {
        let Some(id) = user_id.and_then(|raw| RecordId::parse(raw).ok()) else {
            return Ok(self.config.actor_for(None));
        };
        if self.schema("users").is_none_or(|s| !s.is_stored()) {
            return Ok(self.config.actor_for(None));
        }
        let user = self.store.transaction(|tx| tx.find("users", id, None))?;
        Ok(match user {
            Some(user) if user.get_bool("isAdmin") == Some(true) => Actor::admin(id),
            Some(_) => self.config.actor_for(Some(id)),
            None => self.config.actor_for(None),
        })
    }

    /// Runs a request and renders the response, errors included.
    pub fn handle(&self, request: ApiRequest) -> ApiResponse {
        let request_id = RequestId::new();
        let span = info_span!(
            "api_request",
            request_id = %request_id,
            resource = %request.resource_type,
            endpoint = %request.endpoint,
        );
        let _guard = span.enter();

        match self.process(request, request_id) {
            Ok(response) => {
                debug!(status = response.status, "Request handled");
                response
            }
            Err(err) => {
                if err.status() >= 500 {
                    error!(error = %err, "Request failed");
                } else {
                    debug!(status = err.status(), error = %err, "Request rejected");
                }
                ApiResponse::error(&err)
            }
        }
    }

    /// Runs a request inside one transaction. Any error rolls back every
    /// write the request made.
    pub fn process(&self, request: ApiRequest, request_id: RequestId) -> ApiResult<ApiResponse> {
        let entry = self
            .catalog
            .get(&request.resource_type)
            .ok_or(ApiError::NotFound)?;
        let ctx = Context::new(request.actor, Arc::clone(&entry.schema), request.endpoint)
            .with_body(request.body)
            .with_query(request.query)
            .with_request_id(request_id);
        let resource = Arc::clone(&entry.resource);
        let id = request.id;

        self.store.transaction(|tx| {
            let processed = pipeline::execute(self, tx, &ctx, resource.as_ref(), id.as_deref(), true)?;
            let document = Serializer::new(self, tx, &ctx).document(&processed.outcome, &processed.include)?;
            Ok(ApiResponse {
                status: ctx.endpoint().success_status(),
                document,
            })
        })
    }

    /// Runs another resource's endpoint inside an open transaction, as part
    /// of the request `parent` belongs to. Nothing is serialized; a failure
    /// propagates and rolls back the caller's transaction.
    pub fn process_within(
        &self,
        tx: &StoreTx<'_>,
        parent: &Context,
        resource_type: &str,
        endpoint: EndpointKind,
        id: Option<&str>,
        body: Value,
        flags: &[&str],
    ) -> ApiResult<Outcome> {
        let entry = self.catalog.get(resource_type).ok_or(ApiError::NotFound)?;
        let ctx = flags.iter().fold(
            parent.nested(Arc::clone(&entry.schema), endpoint, body),
            |ctx, flag| ctx.with_flag(flag),
        );
        debug!(
            parent = parent.resource_type(),
            resource = resource_type,
            endpoint = %endpoint,
            "Nested operation"
        );
        Ok(pipeline::execute(self, tx, &ctx, entry.resource.as_ref(), id, false)?.outcome)
    }

    /// Looks up a related record through its resource's scope.
    pub fn find_related(
        &self,
        tx: &StoreTx<'_>,
        ctx: &Context,
        resource_type: &str,
        id: &str,
    ) -> ApiResult<Option<Model>> {
        let entry = self.catalog.get(resource_type).ok_or(ApiError::NotFound)?;
        let related_ctx = ctx.for_schema(Arc::clone(&entry.schema));
        entry.resource.find(id, &related_ctx, tx)
    }

    /// Records of `resource_type` whose `inverse_key` points at `id`, within
    /// scope, in id order.
    pub fn find_related_many(
        &self,
        tx: &StoreTx<'_>,
        ctx: &Context,
        resource_type: &str,
        inverse_key: &str,
        id: RecordId,
    ) -> ApiResult<Vec<Model>> {
        let entry = self.catalog.get(resource_type).ok_or(ApiError::NotFound)?;
        let related_ctx = ctx.for_schema(Arc::clone(&entry.schema));
        let query = Query::table(resource_type)
            .filter(Condition::eq(inverse_key, id.get()))
            .filter_opt(entry.resource.scope(&related_ctx))
            .order_by(OrderBy::asc(Column::Id));
        Ok(tx.query(&query)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes() {
        assert_eq!(
            JsonApi::route("GET", "/api").unwrap(),
            Route {
                resource_type: "forum".into(),
                endpoint: EndpointKind::Show,
                id: Some("1".into()),
            }
        );
        assert_eq!(
            JsonApi::route("post", "/api/discussions/").unwrap().endpoint,
            EndpointKind::Create
        );
        let show = JsonApi::route("GET", "/api/posts/12").unwrap();
        assert_eq!(show.endpoint, EndpointKind::Show);
        assert_eq!(show.id.as_deref(), Some("12"));
        assert_eq!(
            JsonApi::route("PATCH", "/api/posts/12").unwrap().endpoint,
            EndpointKind::Update
        );
        assert_eq!(
            JsonApi::route("DELETE", "/api/posts/12").unwrap().endpoint,
            EndpointKind::Delete
        );
    }

    #[test]
    fn route_errors() {
        assert!(matches!(
            JsonApi::route("PUT", "/api/posts/1"),
            Err(ApiError::MethodNotAllowed)
        ));
        assert!(matches!(
            JsonApi::route("DELETE", "/api/posts"),
            Err(ApiError::MethodNotAllowed)
        ));
        assert!(matches!(JsonApi::route("GET", "/other"), Err(ApiError::NotFound)));
        assert!(matches!(
            JsonApi::route("GET", "/api/posts/1/extra"),
            Err(ApiError::NotFound)
        ));
    }
}
