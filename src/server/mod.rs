// src/server/mod.rs
//! HTTP feed server
//!
//! Serves the package repository over a small JSON API:
//! - Package lookup, version listing, search and update checks
//! - Package download (streamed from the package directory)
//! - Push, delete/delist and relist, guarded by an API key
//! - Cache clear + rebuild for operators
//!
//! The repository is built once at startup and shared with every handler;
//! an optional background loop keeps the cache in step with files copied
//! into the package directory by hand.

mod auth;
pub mod cache;
mod config;
mod error;
mod handlers;
mod routes;

pub use cache::run_rebuild_loop;
pub use config::{FeedConfig, parse_duration, parse_size};
pub use routes::create_router;

use crate::repository::{RepositoryOptions, ServerPackageRepository};
use crate::settings::SettingsProvider;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// Package directory and cache snapshot
    pub repository: RepositoryOptions,
    /// Key required on mutating requests (None = open feed)
    pub api_key: Option<String>,
    /// Largest accepted push body in bytes
    pub max_upload_bytes: usize,
    /// Background re-synchronization interval (None = disabled)
    pub rebuild_interval: Option<Duration>,
    /// Delay before the first synchronization (zero = before serving)
    pub initial_rebuild_delay: Duration,
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr, repository: RepositoryOptions) -> Self {
        Self {
            bind_addr,
            repository,
            api_key: None,
            max_upload_bytes: 250 * 1024 * 1024,
            rebuild_interval: None,
            initial_rebuild_delay: Duration::ZERO,
        }
    }
}

/// Shared server state
pub struct ServerState {
    pub repository: ServerPackageRepository,
    pub api_key: Option<String>,
}

impl ServerState {
    pub fn new(repository: ServerPackageRepository, api_key: Option<String>) -> Self {
        Self {
            repository,
            api_key,
        }
    }
}

/// Start the feed server and run until Ctrl-C
pub async fn run_server(config: ServerConfig, settings: Arc<dyn SettingsProvider>) -> Result<()> {
    tracing::info!("Starting NuGet feed on {}", config.bind_addr);
    tracing::info!("Packages: {}", config.repository.packages_path.display());
    tracing::info!("Cache snapshot: {}", config.repository.cache_file.display());
    if config.api_key.is_none() {
        tracing::warn!("No API key configured: push and delete are open to everyone");
    }

    let repository = ServerPackageRepository::new(config.repository.clone(), settings);
    let shutdown = CancellationToken::new();

    if config.initial_rebuild_delay.is_zero() {
        let stats = repository
            .synchronize(shutdown.child_token())
            .await
            .context("Initial package synchronization failed")?;
        tracing::info!("Initial synchronization: {}", stats);
    } else {
        let repository = repository.clone();
        let delay = config.initial_rebuild_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = repository.ensure_synced().await {
                tracing::error!("Initial package synchronization failed: {}", e);
            }
        });
    }

    if let Some(interval) = config.rebuild_interval {
        tracing::info!("Background rebuild every {:?}", interval);
        let repository = repository.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            run_rebuild_loop(repository, interval, shutdown).await;
        });
    }

    let state = Arc::new(ServerState::new(repository, config.api_key.clone()));
    let app = create_router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!("Feed is ready to serve");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
    shutdown.cancel();
}
