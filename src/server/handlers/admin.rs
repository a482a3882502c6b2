// src/server/handlers/admin.rs
//! Operator endpoints

use crate::repository::SyncStats;
use crate::server::ServerState;
use crate::server::error::ApiResult;
use axum::{Json, extract::State};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// POST /api/v2/admin/clear-cache
///
/// Drops the cache and its snapshot, then rebuilds from the package
/// directory. If the client goes away mid-rebuild the scan is cancelled
/// and the next request rebuilds instead.
pub async fn clear_cache(State(state): State<Arc<ServerState>>) -> ApiResult<Json<SyncStats>> {
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    tracing::info!("Clearing package cache on request");
    let stats = state.repository.clear_cache_and_rebuild(cancel).await?;
    Ok(Json(stats))
}
