// src/server/config.rs
//! Configuration file parsing for the feed server
//!
//! Supports TOML configuration files with the following sections:
//! - [server] - Bind address, upload limit
//! - [storage] - Package directory, cache snapshot, scan mode, hash algorithm
//! - [security] - API key for push/delete
//! - [cache] - Background rebuild schedule
//! - [settings] - Feed behaviour switches (delisting, symbols, ...)

use crate::hash::HashAlgorithm;
use crate::repository::RepositoryOptions;
use crate::server::ServerConfig;
use crate::settings::{FeedSettings, SettingValue};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
pub struct FeedConfig {
    /// Server settings
    #[serde(default)]
    pub server: ServerSection,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageSection,

    /// Security settings
    #[serde(default)]
    pub security: SecuritySection,

    /// Cache maintenance settings
    #[serde(default)]
    pub cache: CacheSection,

    /// Feed behaviour switches, read through the settings provider
    #[serde(default)]
    pub settings: HashMap<String, SettingValue>,
}

/// Server configuration section
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Largest accepted push (e.g., "250MB")
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_max_upload_size() -> String {
    "250MB".to_string()
}

fn default_true() -> bool {
    true
}

/// Storage configuration section
#[derive(Debug, Deserialize)]
pub struct StorageSection {
    /// Directory holding the `.nupkg` files
    #[serde(default = "default_packages_path")]
    pub packages_path: PathBuf,

    /// Cache snapshot file (default: inside `packages_path`)
    #[serde(default)]
    pub cache_file: Option<PathBuf>,

    /// Scan subdirectories of `packages_path`
    #[serde(default = "default_true")]
    pub recursive: bool,

    /// Package hash algorithm ("SHA512" or "SHA256")
    #[serde(default = "default_hash_algorithm")]
    pub hash_algorithm: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            packages_path: default_packages_path(),
            cache_file: None,
            recursive: true,
            hash_algorithm: default_hash_algorithm(),
        }
    }
}

fn default_packages_path() -> PathBuf {
    PathBuf::from("./packages")
}

fn default_hash_algorithm() -> String {
    "SHA512".to_string()
}

/// Security configuration section
#[derive(Debug, Deserialize)]
pub struct SecuritySection {
    /// Key expected in the X-NuGet-ApiKey header
    #[serde(default)]
    pub api_key: Option<String>,

    /// Require the key for push, delete and admin calls
    #[serde(default = "default_true")]
    pub require_api_key: bool,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            api_key: None,
            require_api_key: true,
        }
    }
}

/// Cache maintenance section
#[derive(Debug, Deserialize)]
pub struct CacheSection {
    /// Periodic re-synchronization interval (e.g., "1h"; "0" disables)
    #[serde(default = "default_zero")]
    pub rebuild_interval: String,

    /// Delay before the first synchronization ("0" = eagerly at startup)
    #[serde(default = "default_zero")]
    pub initial_rebuild_delay: String,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            rebuild_interval: default_zero(),
            initial_rebuild_delay: default_zero(),
        }
    }
}

fn default_zero() -> String {
    "0".to_string()
}

impl FeedConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: FeedConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.server
            .bind
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid server.bind address: {}", self.server.bind))?;

        if self.security.require_api_key
            && self.security.api_key.as_deref().is_none_or(|key| key.trim().is_empty())
        {
            anyhow::bail!("security.api_key must be set when security.require_api_key is true");
        }

        parse_size(&self.server.max_upload_size).with_context(|| {
            format!("Invalid server.max_upload_size: {}", self.server.max_upload_size)
        })?;

        self.hash_algorithm()?;
        self.rebuild_interval()?;
        self.initial_rebuild_delay()?;

        Ok(())
    }

    pub fn hash_algorithm(&self) -> Result<HashAlgorithm> {
        self.storage
            .hash_algorithm
            .parse()
            .with_context(|| format!("Invalid storage.hash_algorithm: {}", self.storage.hash_algorithm))
    }

    /// Rebuild interval; `None` when disabled
    pub fn rebuild_interval(&self) -> Result<Option<Duration>> {
        let interval = parse_duration(&self.cache.rebuild_interval)
            .context("Invalid cache.rebuild_interval")?;
        Ok((!interval.is_zero()).then_some(interval))
    }

    pub fn initial_rebuild_delay(&self) -> Result<Duration> {
        parse_duration(&self.cache.initial_rebuild_delay).context("Invalid cache.initial_rebuild_delay")
    }

    /// Snapshot path, defaulting to a file inside the package directory
    pub fn cache_file(&self) -> PathBuf {
        self.storage
            .cache_file
            .clone()
            .unwrap_or_else(|| self.storage.packages_path.join("nuget-feed.cache.json"))
    }

    /// Repository construction options
    pub fn repository_options(&self) -> Result<RepositoryOptions> {
        Ok(RepositoryOptions {
            packages_path: self.storage.packages_path.clone(),
            cache_file: self.cache_file(),
            recursive: self.storage.recursive,
            hash_algorithm: self.hash_algorithm()?,
        })
    }

    /// Settings provider backed by the [settings] table
    pub fn feed_settings(&self) -> FeedSettings {
        FeedSettings::new(self.settings.clone())
    }

    /// Convert to the internal ServerConfig structure
    pub fn to_server_config(&self) -> Result<ServerConfig> {
        let bind_addr = self
            .server
            .bind
            .parse()
            .with_context(|| format!("Invalid server.bind address: {}", self.server.bind))?;

        let api_key = if self.security.require_api_key {
            self.security.api_key.clone()
        } else {
            None
        };

        let max_upload_bytes = usize::try_from(parse_size(&self.server.max_upload_size)?)
            .context("server.max_upload_size is too large for this platform")?;

        Ok(ServerConfig {
            bind_addr,
            repository: self.repository_options()?,
            api_key,
            max_upload_bytes,
            rebuild_interval: self.rebuild_interval()?,
            initial_rebuild_delay: self.initial_rebuild_delay()?,
        })
    }
}

/// Parse a human-readable size string (e.g., "250MB", "1GB", "512KB")
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_uppercase();

    let (num_str, multiplier) = if s.ends_with("GB") {
        (&s[..s.len() - 2], 1024u64 * 1024 * 1024)
    } else if s.ends_with("MB") {
        (&s[..s.len() - 2], 1024u64 * 1024)
    } else if s.ends_with("KB") {
        (&s[..s.len() - 2], 1024u64)
    } else if s.ends_with('B') {
        (&s[..s.len() - 1], 1u64)
    } else {
        // Assume bytes
        (s.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid size number: {}", num_str))?;

    Ok((num * multiplier as f64) as u64)
}

/// Parse a human-readable duration string (e.g., "15m", "1h", "30s")
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();

    let (num_str, multiplier) = if s.ends_with('d') {
        (&s[..s.len() - 1], 24 * 60 * 60)
    } else if s.ends_with('h') {
        (&s[..s.len() - 1], 60 * 60)
    } else if s.ends_with('m') {
        (&s[..s.len() - 1], 60)
    } else if s.ends_with('s') {
        (&s[..s.len() - 1], 1)
    } else {
        // Assume seconds
        (s.as_str(), 1)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid duration number: {}", num_str))?;

    Ok(Duration::from_secs(num * multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{ENABLE_DELISTING, SettingsProvider};

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("1KB").unwrap(), 1024);
        assert_eq!(parse_size("250MB").unwrap(), 250 * 1024 * 1024);
        assert_eq!(parse_size("1.5GB").unwrap(), (1.5 * 1024.0 * 1024.0 * 1024.0) as u64);
        assert!(parse_size("lots").is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(15 * 60));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("2d").unwrap(), Duration::from_secs(2 * 24 * 3600));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_default_config_requires_key() {
        let config = FeedConfig::default();
        assert_eq!(config.server.bind, "0.0.0.0:5000");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_paths() {
        let config = FeedConfig::default();
        assert_eq!(config.cache_file(), PathBuf::from("./packages/nuget-feed.cache.json"));
        assert_eq!(config.rebuild_interval().unwrap(), None);
        assert_eq!(config.initial_rebuild_delay().unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[server]
bind = "127.0.0.1:5555"

[storage]
packages_path = "/srv/nuget"
cache_file = "/var/cache/nuget-feed.json"
recursive = false
hash_algorithm = "sha256"

[security]
api_key = "secret"

[cache]
rebuild_interval = "1h"

[settings]
enableDelisting = true
"#;
        let config: FeedConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());

        let server = config.to_server_config().unwrap();
        assert_eq!(server.bind_addr.port(), 5555);
        assert_eq!(server.max_upload_bytes, 250 * 1024 * 1024);
        assert_eq!(server.api_key.as_deref(), Some("secret"));
        assert_eq!(server.rebuild_interval, Some(Duration::from_secs(3600)));
        assert_eq!(server.repository.packages_path, PathBuf::from("/srv/nuget"));
        assert_eq!(
            server.repository.cache_file,
            PathBuf::from("/var/cache/nuget-feed.json")
        );
        assert!(!server.repository.recursive);
        assert_eq!(server.repository.hash_algorithm, HashAlgorithm::Sha256);

        assert!(config.feed_settings().get_bool(ENABLE_DELISTING, false));
    }

    #[test]
    fn test_open_feed_without_key() {
        let toml_str = r#"
[security]
require_api_key = false
"#;
        let config: FeedConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        assert!(config.to_server_config().unwrap().api_key.is_none());
    }

    #[test]
    fn test_invalid_values() {
        let bad_bind: FeedConfig = toml::from_str(
            r#"
[server]
bind = "not-an-address"
[security]
require_api_key = false
"#,
        )
        .unwrap();
        assert!(bad_bind.validate().is_err());

        let bad_hash: FeedConfig = toml::from_str(
            r#"
[storage]
hash_algorithm = "md5"
[security]
require_api_key = false
"#,
        )
        .unwrap();
        assert!(bad_hash.validate().is_err());

        let bad_interval: FeedConfig = toml::from_str(
            r#"
[cache]
rebuild_interval = "often"
[security]
require_api_key = false
"#,
        )
        .unwrap();
        assert!(bad_interval.validate().is_err());
    }
}
