// src/server/auth.rs
//! API key check for mutating endpoints

use crate::server::ServerState;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// Header NuGet clients send the push/delete key in
pub const API_KEY_HEADER: &str = "X-NuGet-ApiKey";

/// Reject the request unless it carries the configured API key.
///
/// With no key configured every request passes.
pub async fn require_api_key(
    State(state): State<Arc<ServerState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if provided == Some(expected) {
        return next.run(request).await;
    }

    tracing::warn!(
        "Rejected {} {}: missing or wrong API key",
        request.method(),
        request.uri().path()
    );
    (StatusCode::UNAUTHORIZED, "Invalid or missing API key").into_response()
}
