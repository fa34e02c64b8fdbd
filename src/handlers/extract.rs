//! Request extractors for the two authenticated boundaries.
//!
//! Neither performs authentication itself: the ingest key is only looked up
//! in the registry, and dashboard callers arrive with identity headers set
//! by the upstream identity gateway.

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::AppError;
use crate::usage::{Caller, Role};
use crate::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const CALLER_ID_HEADER: &str = "x-caller-id";
pub const CALLER_ROLE_HEADER: &str = "x-caller-role";

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Service bound to the request's `X-API-Key`.
pub struct IngestService(pub String);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for IngestService {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let key = header(parts, API_KEY_HEADER)
            .ok_or(AppError::Unauthorized("Missing X-API-Key header"))?;

        state
            .registry
            .service_for_key(key)
            .map(IngestService)
            .ok_or(AppError::Unauthorized("Invalid API key"))
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = header(parts, CALLER_ID_HEADER)
            .ok_or(AppError::Unauthorized("Missing caller identity"))?;
        let role = header(parts, CALLER_ROLE_HEADER)
            .and_then(Role::parse)
            .ok_or(AppError::Unauthorized("Missing or unknown caller role"))?;

        Ok(Caller {
            identity: identity.to_owned(),
            role,
        })
    }
}
