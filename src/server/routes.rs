// src/server/routes.rs
//! Axum router configuration for the feed server
//!
//! Read routes are public. Push, delete, relist and the admin endpoint go
//! through the API key middleware.

use crate::server::ServerState;
use crate::server::auth::require_api_key;
use crate::server::handlers::{admin, packages};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};

/// Create the main application router
pub fn create_router(state: Arc<ServerState>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let auth = middleware::from_fn_with_state(state.clone(), require_api_key);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Package metadata
        .route("/api/v2/packages/:id", get(packages::get_package))
        .route("/api/v2/packages/:id/versions", get(packages::get_package_versions))
        .route("/api/v2/packages/:id/:version", get(packages::get_package_version))
        // Queries
        .route("/api/v2/search", get(packages::search))
        .route("/api/v2/updates", get(packages::get_updates))
        // Push
        .route(
            "/api/v2/package",
            put(packages::push_package)
                .layer(DefaultBodyLimit::max(max_upload_bytes))
                .route_layer(auth.clone()),
        )
        // Download is public; delete and relist need the key
        .route(
            "/api/v2/package/:id/:version",
            get(packages::download_package).merge(
                delete(packages::delete_package)
                    .post(packages::relist_package)
                    .route_layer(auth.clone()),
            ),
        )
        // Admin endpoints
        .route(
            "/api/v2/admin/clear-cache",
            post(admin::clear_cache).route_layer(auth),
        )
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
