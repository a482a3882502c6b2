// src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nuget_feed::repository::ServerPackageRepository;
use nuget_feed::server::{FeedConfig, run_server};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "nuget-feed")]
#[command(author, version, about = "Self-hosted NuGet package feed", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP feed server
    Serve {
        /// Path to the TOML configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Drop the cache snapshot and rebuild it from the package directory
    Reindex {
        /// Path to the TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Package directory (overrides storage.packages_path)
        #[arg(short, long)]
        packages: Option<PathBuf>,
    },
    /// List packages in the feed
    List {
        /// Path to the TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Package directory (overrides storage.packages_path)
        #[arg(short, long)]
        packages: Option<PathBuf>,
        /// Only show versions of this package id
        #[arg(long)]
        id: Option<String>,
    },
    /// Add a .nupkg file to the package directory
    Push {
        /// Path to the .nupkg file
        package_path: PathBuf,
        /// Path to the TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Package directory (overrides storage.packages_path)
        #[arg(short, long)]
        packages: Option<PathBuf>,
    },
}

/// Load the config file if one was given, then apply the directory override
fn local_config(config: Option<&Path>, packages: Option<PathBuf>) -> Result<FeedConfig> {
    let mut feed_config = match config {
        Some(path) => FeedConfig::load(path)?,
        None => FeedConfig::default(),
    };
    if let Some(packages) = packages {
        feed_config.storage.packages_path = packages;
    }
    Ok(feed_config)
}

fn open_repository(config: &FeedConfig) -> Result<ServerPackageRepository> {
    Ok(ServerPackageRepository::new(
        config.repository_options()?,
        config.feed_settings().into_provider(),
    ))
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    match cli.command {
        Commands::Serve { config } => {
            info!("Loading configuration from {}", config.display());
            let feed_config = FeedConfig::load(&config)?;
            let server_config = feed_config.to_server_config()?;
            let settings = feed_config.feed_settings().into_provider();
            rt.block_on(run_server(server_config, settings))
        }
        Commands::Reindex { config, packages } => {
            let feed_config = local_config(config.as_deref(), packages)?;
            let repository = open_repository(&feed_config)?;
            let stats =
                rt.block_on(repository.clear_cache_and_rebuild(CancellationToken::new()))?;
            println!("Reindexed {}: {}", repository.root().display(), stats);
            Ok(())
        }
        Commands::List {
            config,
            packages,
            id,
        } => {
            let feed_config = local_config(config.as_deref(), packages)?;
            let repository = open_repository(&feed_config)?;
            let records = rt.block_on(async {
                match id.as_deref() {
                    Some(id) => repository.find_packages_by_id(id).await,
                    None => repository
                        .get_packages()
                        .await
                        .map(|set| set.iter().cloned().collect()),
                }
            })?;

            if records.is_empty() {
                println!("No packages found");
                return Ok(());
            }
            for record in &records {
                let mut markers = Vec::new();
                if record.is_absolute_latest_version {
                    markers.push("latest");
                }
                if record.is_latest_version {
                    markers.push("latest-stable");
                }
                if !record.listed {
                    markers.push("unlisted");
                }
                if markers.is_empty() {
                    println!("{} {}", record.id, record.version);
                } else {
                    println!("{} {} [{}]", record.id, record.version, markers.join(", "));
                }
            }
            Ok(())
        }
        Commands::Push {
            package_path,
            config,
            packages,
        } => {
            let feed_config = local_config(config.as_deref(), packages)?;
            let repository = open_repository(&feed_config)?;
            let bytes = std::fs::read(&package_path)
                .with_context(|| format!("Failed to read {}", package_path.display()))?;
            let record = rt.block_on(repository.add_package_bytes(bytes))?;
            println!(
                "Added {} {} ({} bytes)",
                record.id, record.version, record.package_size
            );
            Ok(())
        }
    }
}
