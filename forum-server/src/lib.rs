//! HTTP API for the forum.
//!
//! Every `/api` path is forwarded to [`JsonApi`], which does its own
//! routing, so unsupported methods come back as JSON:API 405 documents
//! rather than axum's empty ones. Store access is synchronous and runs on
//! the blocking pool.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use forum_api::{ApiError, ApiRequest, ApiResponse, ErrorOrigin, JsonApi, QueryParams};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;

pub const JSON_API_MEDIA_TYPE: &str = "application/vnd.api+json";

/// User id from `Authorization: Token <id>`.
pub fn token_user(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("token") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn parse_body(bytes: &[u8]) -> Result<Value, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes).map_err(|e| ApiError::BadRequest {
        detail: format!("Malformed JSON body: {e}"),
        origin: ErrorOrigin::Unspecified,
    })
}

fn dispatch(api: &JsonApi, method: &Method, uri: &Uri, headers: &HeaderMap, body: &[u8]) -> ApiResponse {
    let run = || -> Result<ApiResponse, ApiError> {
        let route = JsonApi::route(method.as_str(), uri.path())?;
        let body = parse_body(body)?;
        let actor = api.actor_for(token_user(headers).as_deref())?;
        let request = ApiRequest::from_route(Arc::new(actor), route)
            .with_query(QueryParams::parse(uri.query().unwrap_or_default()))
            .with_body(body);
        Ok(api.handle(request))
    };
    run().unwrap_or_else(|err| ApiResponse::error(&err))
}

fn render(response: ApiResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match response.document {
        Some(document) => (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static(JSON_API_MEDIA_TYPE))],
            document.to_string(),
        )
            .into_response(),
        None => status.into_response(),
    }
}

async fn api_handler(
    State(api): State<Arc<JsonApi>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let joined = tokio::task::spawn_blocking(move || dispatch(&api, &method, &uri, &headers, &body)).await;
    match joined {
        Ok(response) => render(response),
        Err(e) => {
            error!("Request worker failed: {}", e);
            render(ApiResponse {
                status: 500,
                document: Some(json!({
                    "errors": [{ "status": "500", "code": "internal_error", "title": "Internal Server Error" }]
                })),
            })
        }
    }
}

async fn not_found() -> Response {
    render(ApiResponse::error(&ApiError::NotFound))
}

/// Build the HTTP API router around a booted API.
pub fn build_router(api: Arc<JsonApi>) -> Router {
    Router::new()
        .route("/api", any(api_handler))
        .route("/api/{resource}", any(api_handler))
        .route("/api/{resource}/{id}", any(api_handler))
        .fallback(not_found)
        .with_state(api)
}
