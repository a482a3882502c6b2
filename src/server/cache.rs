// src/server/cache.rs
//! Background cache maintenance
//!
//! Periodically re-synchronizes the package cache with the package
//! directory so files copied in or removed by hand show up without a
//! restart or an explicit cache clear.

use crate::error::Error;
use crate::repository::ServerPackageRepository;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Re-synchronize every `interval` until `shutdown` fires
pub async fn run_rebuild_loop(
    repository: ServerPackageRepository,
    interval: Duration,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        match repository.synchronize(shutdown.child_token()).await {
            Ok(stats) => tracing::debug!("Background rebuild: {}", stats),
            Err(Error::Cancelled) => break,
            Err(e) => tracing::error!("Background rebuild failed: {}", e),
        }
    }
    tracing::debug!("Background rebuild loop stopped");
}
