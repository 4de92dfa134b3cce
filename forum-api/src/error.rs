//! Error types for the resource layer.
//!
//! Two categories that never mix:
//! - [`ApiError`]: recoverable, request-time, rendered as a JSON:API error
//!   envelope with an HTTP status.
//! - [`ConfigurationError`]: boot-time only; returned while schemas are
//!   being built and meant to abort startup. [`BootError`] wraps it together
//!   with store failures for [`crate::JsonApi::open`].

use crate::endpoint::EndpointKind;
use forum_storage::StorageError;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Result type for request-time operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// One invalid field, addressed by JSON pointer into the request document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub pointer: String,
    pub detail: String,
}

impl FieldError {
    pub fn attribute(field: &str, detail: impl Into<String>) -> Self {
        Self {
            pointer: format!("/data/attributes/{field}"),
            detail: detail.into(),
        }
    }

    pub fn relationship(field: &str, detail: impl Into<String>) -> Self {
        Self {
            pointer: format!("/data/relationships/{field}"),
            detail: detail.into(),
        }
    }
}

/// Where in the request a 400 originated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorOrigin {
    Pointer(String),
    Parameter(String),
    Unspecified,
}

/// Recoverable request errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("resource not found")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("validation failed for {} field(s)", .0.len())]
    ValidationFailed(Vec<FieldError>),

    #[error("bad request: {detail}")]
    BadRequest { detail: String, origin: ErrorOrigin },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ApiError {
    /// Single-field validation failure.
    pub fn invalid(field: &str, detail: impl Into<String>) -> Self {
        Self::ValidationFailed(vec![FieldError::attribute(field, detail)])
    }

    /// 400 caused by a query parameter (`sort`, `include`, `filter[x]`, `page[limit]`).
    pub fn bad_parameter(parameter: &str, detail: impl Into<String>) -> Self {
        Self::BadRequest {
            detail: detail.into(),
            origin: ErrorOrigin::Parameter(parameter.to_string()),
        }
    }

    /// 400 caused by a location in the request body.
    pub fn bad_pointer(pointer: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::BadRequest {
            detail: detail.into(),
            origin: ErrorOrigin::Pointer(pointer.into()),
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::PermissionDenied => 403,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::ValidationFailed(_) => 422,
            Self::BadRequest { .. } => 400,
            Self::Storage(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::ValidationFailed(_) => "validation_error",
            Self::BadRequest { .. } => "bad_request",
            Self::Storage(_) => "internal_error",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "Permission Denied",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::ValidationFailed(_) => "Validation Failed",
            Self::BadRequest { .. } => "Bad Request",
            Self::Storage(_) => "Internal Server Error",
        }
    }

    /// Renders the `{errors: [...]}` envelope. Validation failures produce
    /// one entry per invalid field; storage details are not exposed.
    pub fn to_document(&self) -> Value {
        let status = self.status().to_string();
        let entry = |detail: Option<&str>, source: Option<Value>| {
            let mut e = json!({
                "status": status,
                "code": self.code(),
                "title": self.title(),
            });
            if let Some(detail) = detail {
                e["detail"] = json!(detail);
            }
            if let Some(source) = source {
                e["source"] = source;
            }
            e
        };

        let errors: Vec<Value> = match self {
            Self::ValidationFailed(fields) => fields
                .iter()
                .map(|f| entry(Some(&f.detail), Some(json!({ "pointer": f.pointer }))))
                .collect(),
            Self::BadRequest { detail, origin } => {
                let source = match origin {
                    ErrorOrigin::Pointer(p) => Some(json!({ "pointer": p })),
                    ErrorOrigin::Parameter(p) => Some(json!({ "parameter": p })),
                    ErrorOrigin::Unspecified => None,
                };
                vec![entry(Some(detail), source)]
            }
            _ => vec![entry(None, None)],
        };
        json!({ "errors": errors })
    }
}

/// Boot-time schema configuration errors. Fatal by contract.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("resource type '{0}' registered twice")]
    DuplicateResource(String),

    #[error("resource type '{0}' is not registered")]
    UnknownResource(String),

    #[error("patch targets '{0}', which is neither a resource type nor a declared ancestor")]
    UnknownTarget(String),

    #[error("ancestor chain of '{0}' repeats a type")]
    CyclicAncestors(String),

    #[error("{operation} on '{resource}' references missing key '{key}'")]
    UnknownKey {
        resource: String,
        operation: &'static str,
        key: String,
    },

    #[error("field '{field}' declared twice on '{resource}'")]
    DuplicateField { resource: String, field: String },

    #[error("endpoint {kind:?} declared twice on '{resource}'")]
    DuplicateEndpoint { resource: String, kind: EndpointKind },

    #[error("field '{field}' on '{resource}' is invalid: {reason}")]
    InvalidField {
        resource: String,
        field: String,
        reason: String,
    },
}

/// Failure to bring an API up: a bad schema or an unusable store.
#[derive(Debug, Error)]
pub enum BootError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("store: {0}")]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_envelope_lists_every_field() {
        let err = ApiError::ValidationFailed(vec![
            FieldError::attribute("title", "too short"),
            FieldError::relationship("user", "missing"),
        ]);
        let doc = err.to_document();
        let errors = doc["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0]["status"], "422");
        assert_eq!(errors[0]["source"]["pointer"], "/data/attributes/title");
        assert_eq!(errors[1]["source"]["pointer"], "/data/relationships/user");
    }

    #[test]
    fn bad_parameter_points_at_parameter() {
        let doc = ApiError::bad_parameter("sort", "unknown").to_document();
        assert_eq!(doc["errors"][0]["status"], "400");
        assert_eq!(doc["errors"][0]["source"]["parameter"], "sort");
    }

    #[test]
    fn storage_errors_do_not_leak_details() {
        let err = ApiError::Storage(StorageError::InvalidData("secret path".into()));
        let doc = err.to_document();
        assert_eq!(err.status(), 500);
        assert!(!doc.to_string().contains("secret path"));
    }

    #[test]
    fn statuses() {
        assert_eq!(ApiError::PermissionDenied.status(), 403);
        assert_eq!(ApiError::NotFound.status(), 404);
        assert_eq!(ApiError::MethodNotAllowed.status(), 405);
        assert_eq!(ApiError::invalid("x", "y").status(), 422);
    }
}
