//! Bearer/API-key authentication for the HTTP transport (spec.md §6).

use crate::config::TransportConfig;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

#[derive(Clone)]
pub struct AuthState {
    pub config: TransportConfig,
}

pub fn create_auth_state(config: TransportConfig) -> Arc<AuthState> {
    Arc::new(AuthState { config })
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"success": false, "error": "Unauthorized"}))).into_response()
}

fn extract_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("x-api-key") {
        return value.to_str().ok().map(str::to_string);
    }
    let auth = headers.get("authorization")?.to_str().ok()?;
    auth.strip_prefix("Bearer ").map(str::to_string)
}

/// Rejects any request whose key doesn't match `config.api_key` with a
/// constant-time comparison. A no-op if `enable_auth` is false — auth is
/// opt-in via `MARCUS_API_KEY` (spec.md §6).
pub async fn auth_middleware(
    State(auth_state): State<Arc<AuthState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    if !auth_state.config.enable_auth || request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let Some(provided) = extract_key(&headers) else {
        warn!(path = request.uri().path(), "request missing api key");
        return Err(unauthorized());
    };
    let Some(expected) = &auth_state.config.api_key else {
        // enable_auth is only ever true when Config::load populated api_key.
        return Err(unauthorized());
    };

    if provided.as_bytes().ct_eq(expected.as_bytes()).into() {
        Ok(next.run(request).await)
    } else {
        warn!(path = request.uri().path(), "request had invalid api key");
        Err(unauthorized())
    }
}
