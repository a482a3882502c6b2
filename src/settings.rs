// src/settings.rs

//! Feed behaviour switches
//!
//! The repository reads these on every operation, so a provider backed by
//! reloadable configuration takes effect without a restart.

use std::collections::HashMap;
use std::sync::Arc;

/// Soft-delete (delist) instead of deleting package files
pub const ENABLE_DELISTING: &str = "enableDelisting";
/// Apply target framework filtering to search and update queries
pub const ENABLE_FRAMEWORK_FILTERING: &str = "enableFrameworkFiltering";
/// Reject symbols packages on push and skip them during synchronization
pub const IGNORE_SYMBOLS_PACKAGES: &str = "ignoreSymbolsPackages";
/// Allow re-pushing an existing id + version
pub const ALLOW_OVERRIDE_EXISTING_PACKAGE_ON_PUSH: &str = "allowOverrideExistingPackageOnPush";

/// Source of feed settings
pub trait SettingsProvider: Send + Sync {
    fn get_bool(&self, key: &str, default: bool) -> bool;

    fn get_string(&self, key: &str, default: &str) -> String;
}

/// A single setting value as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    String(String),
}

/// Settings backed by a key/value table
#[derive(Debug, Clone, Default)]
pub struct FeedSettings {
    values: HashMap<String, SettingValue>,
}

impl FeedSettings {
    pub fn new(values: HashMap<String, SettingValue>) -> Self {
        Self { values }
    }

    /// Builder-style override, mostly for tests and embedding
    pub fn with(mut self, key: &str, value: SettingValue) -> Self {
        self.values.insert(key.to_string(), value);
        self
    }

    pub fn into_provider(self) -> Arc<dyn SettingsProvider> {
        Arc::new(self)
    }
}

impl SettingsProvider for FeedSettings {
    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            Some(SettingValue::Bool(value)) => *value,
            Some(SettingValue::String(value)) => match value.trim().to_ascii_lowercase().as_str() {
                "true" => true,
                "false" => false,
                _ => {
                    tracing::warn!("Setting {} has non-boolean value '{}'", key, value);
                    default
                }
            },
            None => default,
        }
    }

    fn get_string(&self, key: &str, default: &str) -> String {
        match self.values.get(key) {
            Some(SettingValue::String(value)) => value.clone(),
            Some(SettingValue::Bool(value)) => value.to_string(),
            None => default.to_string(),
        }
    }
}
