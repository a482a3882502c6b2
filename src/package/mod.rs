// src/package/mod.rs

//! Package metadata model
//!
//! A [`PackageRecord`] is the cached description of one `id + version`
//! package file: everything the manifest declares, plus storage-derived
//! facts (hash, size, timestamps) and feed flags (listed, latest).

mod archive;
pub mod nuspec;

pub use archive::{NupkgReader, PackageArchive, PackageReader};
pub use nuspec::PackageManifest;

use crate::framework::Framework;
use crate::version::{NuGetVersion, VersionRange};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File extension of package archives
pub const PACKAGE_EXTENSION: &str = "nupkg";

/// Suffix of the sidecar marker that records a delisted package
pub const DELISTED_MARKER_SUFFIX: &str = ".delisted";

/// A single dependency entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDependency {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_range: Option<VersionRange>,
}

/// Dependencies that apply to one target framework (or to all, when `None`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_framework: Option<Framework>,
    #[serde(default)]
    pub dependencies: Vec<PackageDependency>,
}

/// Cache key: case-insensitive id plus semantic version
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageKey {
    id: String,
    version: NuGetVersion,
}

impl PackageKey {
    pub fn new(id: &str, version: &NuGetVersion) -> Self {
        Self {
            id: normalize_id(id),
            version: version.clone(),
        }
    }

    /// Lowercased id
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &NuGetVersion {
        &self.version
    }
}

/// Ids compare case-insensitively
pub fn normalize_id(id: &str) -> String {
    id.to_ascii_lowercase()
}

/// An id + version pair supplied by a caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageIdentity {
    pub id: String,
    pub version: NuGetVersion,
}

impl PackageIdentity {
    pub fn new(id: impl Into<String>, version: NuGetVersion) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version.to_normalized_string())
    }
}

/// Storage facts gathered when a package file is indexed
#[derive(Debug, Clone)]
pub struct StorageInfo {
    pub hash: String,
    pub hash_algorithm: String,
    pub size: u64,
    pub full_path: PathBuf,
    pub last_updated: DateTime<Utc>,
    pub published: DateTime<Utc>,
    pub listed: bool,
}

/// Cached metadata for one package file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRecord {
    pub id: String,
    pub version: NuGetVersion,

    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: String,
    #[serde(default)]
    pub owners: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub release_notes: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub license_url: Option<String>,
    #[serde(default)]
    pub license_expression: Option<String>,
    #[serde(default)]
    pub project_url: Option<String>,
    #[serde(default)]
    pub copyright: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub min_client_version: Option<String>,

    #[serde(default)]
    pub dependency_groups: Vec<DependencyGroup>,
    #[serde(default)]
    pub supported_frameworks: Vec<Framework>,

    pub package_hash: String,
    pub package_hash_algorithm: String,
    pub package_size: u64,
    pub full_path: PathBuf,
    pub last_updated: DateTime<Utc>,
    pub published: DateTime<Utc>,

    pub listed: bool,
    #[serde(default)]
    pub is_latest_version: bool,
    #[serde(default)]
    pub is_absolute_latest_version: bool,
    #[serde(default)]
    pub require_license_acceptance: bool,
    #[serde(default)]
    pub development_dependency: bool,
    #[serde(default)]
    pub is_symbols_package: bool,
}

impl PackageRecord {
    /// Build a record from an opened archive and its storage facts.
    ///
    /// Latest-version flags start out false; they are owned by the
    /// repository and recomputed whenever the id's version set changes.
    pub fn from_archive(archive: &PackageArchive, storage: StorageInfo) -> Self {
        let manifest = archive.manifest();
        Self {
            id: manifest.id.clone(),
            version: manifest.version.clone(),
            title: manifest.title.clone(),
            authors: manifest.authors.clone(),
            owners: manifest.owners.clone(),
            description: manifest.description.clone(),
            summary: manifest.summary.clone(),
            release_notes: manifest.release_notes.clone(),
            tags: manifest.tags.clone(),
            icon_url: manifest.icon_url.clone(),
            license_url: manifest.license_url.clone(),
            license_expression: manifest.license_expression.clone(),
            project_url: manifest.project_url.clone(),
            copyright: manifest.copyright.clone(),
            language: manifest.language.clone(),
            min_client_version: manifest.min_client_version.clone(),
            dependency_groups: manifest.dependency_groups.clone(),
            supported_frameworks: archive.supported_frameworks(),
            package_hash: storage.hash,
            package_hash_algorithm: storage.hash_algorithm,
            package_size: storage.size,
            full_path: storage.full_path,
            last_updated: storage.last_updated,
            published: storage.published,
            listed: storage.listed,
            is_latest_version: false,
            is_absolute_latest_version: false,
            require_license_acceptance: manifest.require_license_acceptance,
            development_dependency: manifest.development_dependency,
            is_symbols_package: archive.is_symbols_package(),
        }
    }

    pub fn key(&self) -> PackageKey {
        PackageKey::new(&self.id, &self.version)
    }

    pub fn is_prerelease(&self) -> bool {
        self.version.is_prerelease()
    }

    pub fn is_semver2(&self) -> bool {
        self.version.is_semver2()
            || self.dependency_groups.iter().any(|group| {
                group.dependencies.iter().any(|dep| {
                    dep.version_range.as_ref().is_some_and(|range| {
                        range.min().is_some_and(NuGetVersion::is_semver2)
                            || range.max().is_some_and(NuGetVersion::is_semver2)
                    })
                })
            })
    }

    /// Whitespace-delimited tags
    pub fn tag_list(&self) -> impl Iterator<Item = &str> {
        self.tags.as_deref().unwrap_or_default().split_whitespace()
    }
}

/// Where a package's metadata comes from during synchronization
#[derive(Debug, Clone)]
pub enum PackageSource {
    /// File is new or changed: open and hash it
    FromArchive(PathBuf),
    /// File is unchanged since it was cached: reuse the record
    FromCache(Arc<PackageRecord>),
}

/// File name a pushed package is stored under
pub fn package_file_name(id: &str, version: &NuGetVersion) -> String {
    format!(
        "{}.{}.{}",
        id,
        version.to_normalized_string(),
        PACKAGE_EXTENSION
    )
}

/// Path of the marker that records a package as delisted
pub fn delisted_marker_path(package_path: &Path) -> PathBuf {
    let mut name = package_path.as_os_str().to_os_string();
    name.push(DELISTED_MARKER_SUFFIX);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_case_insensitive() {
        let a = PackageKey::new("Newtonsoft.Json", &NuGetVersion::parse("13.0.1").unwrap());
        let b = PackageKey::new("newtonsoft.json", &NuGetVersion::parse("13.0.1.0").unwrap());
        assert_eq!(a, b);
        assert_eq!(a.id(), "newtonsoft.json");
    }

    #[test]
    fn test_package_file_name_uses_normalized_version() {
        let version = NuGetVersion::parse("1.0+build").unwrap();
        assert_eq!(package_file_name("Foo", &version), "Foo.1.0.0.nupkg");
    }

    #[test]
    fn test_delisted_marker_path() {
        let marker = delisted_marker_path(Path::new("/feed/Foo.1.0.0.nupkg"));
        assert_eq!(marker, PathBuf::from("/feed/Foo.1.0.0.nupkg.delisted"));
    }
}
