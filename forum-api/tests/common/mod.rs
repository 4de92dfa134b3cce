//! Shared test helpers for the resource layer.

#![allow(dead_code)]

use forum_api::{
    ApiConfig, ApiRequest, ApiResponse, Endpoint, Field, JsonApi, QueryParams, Resource, SchemaRegistry,
    SortColumn,
};
use forum_model::{Actor, Model, Principal};
use forum_types::RecordId;
use serde_json::{json, Value};
use std::sync::Arc;

/// Minimal stored resource used by schema merge tests.
pub struct Widgets;

impl Resource for Widgets {
    fn resource_type(&self) -> &str {
        "widgets"
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::string("title").writable().min_length(3),
            Field::string("body").writable(),
        ]
    }

    fn sorts(&self) -> Vec<SortColumn> {
        vec![SortColumn::new("title")]
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        vec![
            Endpoint::show(),
            Endpoint::index(),
            Endpoint::create(),
            Endpoint::update(),
            Endpoint::delete(),
        ]
    }
}

pub fn widgets_registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry.register_resource(Widgets).unwrap();
    registry
}

pub fn field_names(registry: &SchemaRegistry, resource_type: &str) -> Vec<String> {
    registry
        .build(resource_type)
        .unwrap()
        .field_names()
        .into_iter()
        .map(str::to_string)
        .collect()
}

// ── Actors ───────────────────────────────────────────────────────

pub fn guest() -> Arc<dyn Principal> {
    Arc::new(Actor::guest())
}

pub fn member(id: i64, capabilities: &[&str]) -> Arc<dyn Principal> {
    let actor = capabilities
        .iter()
        .fold(Actor::member(RecordId::new(id)), |actor, cap| actor.with_grant(cap));
    Arc::new(actor)
}

/// Member with the grants an ordinary forum user has.
pub fn poster(id: i64) -> Arc<dyn Principal> {
    member(id, &["startDiscussion", "reply"])
}

pub fn admin(id: i64) -> Arc<dyn Principal> {
    Arc::new(Actor::admin(RecordId::new(id)))
}

// ── APIs ─────────────────────────────────────────────────────────

pub fn forum_api() -> JsonApi {
    forum_api_with(|_| {})
}

/// Stock resources plus whatever `extend` registers, in memory.
pub fn forum_api_with(extend: impl FnOnce(&mut SchemaRegistry)) -> JsonApi {
    let mut registry = SchemaRegistry::with_builtin_resources().unwrap();
    extend(&mut registry);
    JsonApi::open(registry, ApiConfig::default(), None).unwrap()
}

// ── Requests ─────────────────────────────────────────────────────

pub fn send(api: &JsonApi, actor: Arc<dyn Principal>, method: &str, path: &str) -> ApiResponse {
    send_with(api, actor, method, path, "", Value::Null)
}

pub fn send_with(
    api: &JsonApi,
    actor: Arc<dyn Principal>,
    method: &str,
    path: &str,
    query: &str,
    body: Value,
) -> ApiResponse {
    match JsonApi::route(method, path) {
        Ok(route) => api.handle(
            ApiRequest::from_route(actor, route)
                .with_query(QueryParams::parse(query))
                .with_body(body),
        ),
        Err(err) => ApiResponse::error(&err),
    }
}

pub fn document(response: &ApiResponse) -> &Value {
    response.document.as_ref().unwrap()
}

pub fn discussion_body(title: &str, content: &str) -> Value {
    json!({
        "data": {
            "type": "discussions",
            "attributes": { "title": title, "content": content }
        }
    })
}

/// Starts a discussion and returns its id.
pub fn start_discussion(api: &JsonApi, actor: Arc<dyn Principal>, title: &str) -> String {
    let response = send_with(
        api,
        actor,
        "POST",
        "/api/discussions",
        "",
        discussion_body(title, "First post content"),
    );
    assert_eq!(response.status, 201, "{:?}", response.document);
    document(&response)["data"]["id"].as_str().unwrap().to_string()
}

pub fn sign_up(api: &JsonApi, username: &str) -> String {
    let response = send_with(
        api,
        guest(),
        "POST",
        "/api/users",
        "",
        json!({
            "data": {
                "type": "users",
                "attributes": { "username": username, "email": format!("{username}@example.com") }
            }
        }),
    );
    assert_eq!(response.status, 201, "{:?}", response.document);
    document(&response)["data"]["id"].as_str().unwrap().to_string()
}

// ── Store access ─────────────────────────────────────────────────

pub fn count(api: &JsonApi, table: &str) -> usize {
    api.store().transaction(|tx| tx.count(table, None)).unwrap()
}

pub fn insert(api: &JsonApi, model: Model) -> RecordId {
    api.store()
        .transaction(|tx| {
            let mut model = model;
            tx.insert(&mut model)
        })
        .unwrap()
}

pub fn error_pointers(response: &ApiResponse) -> Vec<String> {
    document(response)["errors"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["source"]["pointer"].as_str().map(str::to_string))
        .collect()
}

pub fn error_parameter(response: &ApiResponse) -> Option<String> {
    document(response)["errors"][0]["source"]["parameter"]
        .as_str()
        .map(str::to_string)
}
