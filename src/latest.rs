// src/latest.rs

//! "Latest version" flags for a group of packages sharing an id
//!
//! - `is_absolute_latest_version`: the highest version, prerelease included
//! - `is_latest_version`: the highest version without a release label;
//!   no record carries it when the id only has prereleases
//!
//! The listed state is not considered. Callers that hide
//! unlisted packages filter on `listed` themselves.

use crate::package::PackageRecord;
use crate::version::NuGetVersion;
use std::collections::BTreeMap;
use std::sync::Arc;

/// All versions of one id, ascending
pub type VersionGroup = BTreeMap<NuGetVersion, Arc<PackageRecord>>;

/// The two "latest" positions within a version group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatestVersions {
    pub absolute: Option<NuGetVersion>,
    pub stable: Option<NuGetVersion>,
}

impl LatestVersions {
    /// Pick the latest versions from any iterator of versions
    pub fn of<'a>(versions: impl IntoIterator<Item = &'a NuGetVersion>) -> Self {
        let mut latest = Self::default();
        for version in versions {
            if latest.absolute.as_ref().is_none_or(|current| version > current) {
                latest.absolute = Some(version.clone());
            }
            if !version.is_prerelease()
                && latest.stable.as_ref().is_none_or(|current| version > current)
            {
                latest.stable = Some(version.clone());
            }
        }
        latest
    }
}

/// Recompute both flags for every record in the group
pub fn update_latest_flags(group: &mut VersionGroup) {
    let latest = LatestVersions::of(group.keys());

    for (version, record) in group.iter_mut() {
        let is_absolute = latest.absolute.as_ref() == Some(version);
        let is_latest = latest.stable.as_ref() == Some(version);

        if record.is_absolute_latest_version != is_absolute || record.is_latest_version != is_latest
        {
            let record = Arc::make_mut(record);
            record.is_absolute_latest_version = is_absolute;
            record.is_latest_version = is_latest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn record(version: &str) -> PackageRecord {
        PackageRecord {
            id: "Foo".to_string(),
            version: NuGetVersion::parse(version).unwrap(),
            title: None,
            authors: String::new(),
            owners: None,
            description: String::new(),
            summary: None,
            release_notes: None,
            tags: None,
            icon_url: None,
            license_url: None,
            license_expression: None,
            project_url: None,
            copyright: None,
            language: None,
            min_client_version: None,
            dependency_groups: Vec::new(),
            supported_frameworks: Vec::new(),
            package_hash: String::new(),
            package_hash_algorithm: "SHA512".to_string(),
            package_size: 0,
            full_path: PathBuf::from(format!("/feed/Foo.{}.nupkg", version)),
            last_updated: Utc::now(),
            published: Utc::now(),
            listed: true,
            is_latest_version: true,
            is_absolute_latest_version: true,
            require_license_acceptance: false,
            development_dependency: false,
            is_symbols_package: false,
        }
    }

    fn group(versions: &[&str]) -> VersionGroup {
        versions
            .iter()
            .map(|v| {
                let record = record(v);
                (record.version.clone(), Arc::new(record))
            })
            .collect()
    }

    fn flagged(group: &VersionGroup) -> (Vec<String>, Vec<String>) {
        let latest = group
            .values()
            .filter(|r| r.is_latest_version)
            .map(|r| r.version.to_string())
            .collect();
        let absolute = group
            .values()
            .filter(|r| r.is_absolute_latest_version)
            .map(|r| r.version.to_string())
            .collect();
        (latest, absolute)
    }

    #[test]
    fn test_stable_and_prerelease() {
        let mut g = group(&["1.0.0", "1.0.1-a", "0.9.0"]);
        update_latest_flags(&mut g);
        let (latest, absolute) = flagged(&g);
        assert_eq!(latest, vec!["1.0.0"]);
        assert_eq!(absolute, vec!["1.0.1-a"]);
    }

    #[test]
    fn test_prerelease_only_group_has_no_latest() {
        let mut g = group(&["1.0.0-alpha", "1.0.0-beta"]);
        update_latest_flags(&mut g);
        let (latest, absolute) = flagged(&g);
        assert!(latest.is_empty());
        assert_eq!(absolute, vec!["1.0.0-beta"]);
    }

    #[test]
    fn test_single_stable_holds_both_flags() {
        let mut g = group(&["2.0.0"]);
        update_latest_flags(&mut g);
        let record = g.values().next().unwrap();
        assert!(record.is_latest_version);
        assert!(record.is_absolute_latest_version);
    }

    #[test]
    fn test_revision_counts() {
        let mut g = group(&["1.0.0", "1.0.0.1"]);
        update_latest_flags(&mut g);
        let (latest, _) = flagged(&g);
        assert_eq!(latest, vec!["1.0.0.1"]);
    }

    #[test]
    fn test_latest_versions_of_empty() {
        let latest = LatestVersions::of(std::iter::empty());
        assert_eq!(latest, LatestVersions::default());
    }
}
