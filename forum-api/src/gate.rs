//! Authorization gate.
//!
//! Thin layer over [`Principal`]: capability checks, admin assertions, and
//! the endpoint access check run by the pipeline once the target record
//! (if any) has been located within scope.

use crate::endpoint::Endpoint;
use crate::error::{ApiError, ApiResult};
use forum_model::{Model, Principal};
use tracing::debug;

/// Whether `actor` holds `capability`, globally or on `target`.
pub fn can(actor: &dyn Principal, capability: &str, target: Option<&Model>) -> bool {
    actor.can(capability, target)
}

pub fn assert_can(actor: &dyn Principal, capability: &str, target: Option<&Model>) -> ApiResult<()> {
    if can(actor, capability, target) {
        Ok(())
    } else {
        Err(ApiError::PermissionDenied)
    }
}

pub fn assert_admin(actor: &dyn Principal) -> ApiResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(ApiError::PermissionDenied)
    }
}

pub fn assert_registered(actor: &dyn Principal) -> ApiResult<()> {
    if actor.exists() {
        Ok(())
    } else {
        Err(ApiError::PermissionDenied)
    }
}

/// Endpoint access: authentication, admin flag, then capability. The
/// capability is checked against `target` when the endpoint addresses a
/// record and globally otherwise.
pub fn authorize(endpoint: &Endpoint, actor: &dyn Principal, target: Option<&Model>) -> ApiResult<()> {
    let result = check_access(endpoint, actor, target);
    if result.is_err() {
        debug!(
            endpoint = %endpoint.kind(),
            actor = ?actor.id(),
            capability = endpoint.capability().unwrap_or("-"),
            "Access denied"
        );
    }
    result
}

fn check_access(endpoint: &Endpoint, actor: &dyn Principal, target: Option<&Model>) -> ApiResult<()> {
    if endpoint.requires_authentication() {
        assert_registered(actor)?;
    }
    if endpoint.requires_admin() {
        assert_admin(actor)?;
    }
    if let Some(capability) = endpoint.capability() {
        assert_can(actor, capability, target)?;
    }
    Ok(())
}
