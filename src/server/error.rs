// src/server/error.rs
//! Mapping of repository errors onto HTTP responses

use crate::error::Error;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

impl Error {
    /// HTTP status a failed request reports
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::DuplicatePackage { .. } => StatusCode::CONFLICT,
            Error::InvalidPackage(_)
            | Error::InvalidVersion(_)
            | Error::InvalidFramework(_)
            | Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::PackageNotFound { .. } => StatusCode::NOT_FOUND,
            Error::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            Error::Io(_) | Error::Json(_) | Error::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }

        let payload = json!({ "error": self.to_string() });
        (status, Json(payload)).into_response()
    }
}

/// Result type for handlers
pub type ApiResult<T> = Result<T, Error>;
