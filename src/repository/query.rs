// src/repository/query.rs

//! Query pipeline over a cache snapshot
//!
//! Every function here is pure: it takes a [`PackageSet`] and returns
//! matching records, so one request observes a single point-in-time view.

use crate::framework::{Framework, any_compatible};
use crate::package::{PackageIdentity, PackageKey, PackageRecord};
use crate::store::PackageSet;
use crate::version::{NuGetVersion, VersionRange};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

/// Search parameters
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Whitespace-separated search words; empty matches everything
    pub term: String,
    pub target_frameworks: Vec<Framework>,
    pub include_prerelease: bool,
    /// Only honored when delisting is enabled
    pub include_delisted: bool,
    /// Show packages that need a SemVer 2.0 aware client
    pub allow_semver2: bool,
}

impl SearchOptions {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            ..Default::default()
        }
    }
}

/// Update check parameters
///
/// `version_constraints` is either empty or aligned by index with
/// `packages`; any other length yields no results.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub packages: Vec<PackageIdentity>,
    pub version_constraints: Vec<Option<VersionRange>>,
    pub target_frameworks: Vec<Framework>,
    pub include_prerelease: bool,
    pub include_all_versions: bool,
    pub allow_semver2: bool,
}

/// Feed policy switches that shape query results
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryPolicy {
    pub enable_delisting: bool,
    pub enable_framework_filtering: bool,
}

impl QueryPolicy {
    fn visible(&self, record: &PackageRecord) -> bool {
        record.listed || !self.enable_delisting
    }

    fn framework_match(&self, requested: &[Framework], record: &PackageRecord) -> bool {
        !self.enable_framework_filtering
            || requested.is_empty()
            || any_compatible(requested, &record.supported_frameworks)
    }
}

/// Id ascending (case-insensitive), then version descending
fn result_order(a: &Arc<PackageRecord>, b: &Arc<PackageRecord>) -> Ordering {
    a.id.to_ascii_lowercase()
        .cmp(&b.id.to_ascii_lowercase())
        .then_with(|| b.version.cmp(&a.version))
}

/// Default version for an id: highest stable, else highest prerelease
pub fn find_latest(set: &PackageSet, id: &str, policy: QueryPolicy) -> Option<Arc<PackageRecord>> {
    let mut best_stable: Option<&Arc<PackageRecord>> = None;
    let mut best_any: Option<&Arc<PackageRecord>> = None;

    // Ascending, so the last candidate seen wins
    for record in set.versions_of(id).filter(|r| policy.visible(r)) {
        if !record.is_prerelease() {
            best_stable = Some(record);
        }
        best_any = Some(record);
    }

    best_stable.or(best_any).cloned()
}

/// Exact id + version lookup; unlisted records are still returned
pub fn find_exact(set: &PackageSet, id: &str, version: &NuGetVersion) -> Option<Arc<PackageRecord>> {
    set.get(id, version).cloned()
}

/// Every version of an id, ascending
pub fn find_by_id(set: &PackageSet, id: &str) -> Vec<Arc<PackageRecord>> {
    set.versions_of(id).cloned().collect()
}

fn matches_term(record: &PackageRecord, words: &[String]) -> bool {
    if words.is_empty() {
        return true;
    }
    let id = record.id.to_ascii_lowercase();
    let description = record.description.to_lowercase();
    let tags: Vec<String> = record.tag_list().map(str::to_lowercase).collect();

    words.iter().any(|word| {
        id.contains(word.as_str())
            || description.contains(word.as_str())
            || tags.iter().any(|tag| tag.contains(word.as_str()))
    })
}

pub fn search(set: &PackageSet, options: &SearchOptions, policy: QueryPolicy) -> Vec<Arc<PackageRecord>> {
    let words: Vec<String> = options
        .term
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();
    let include_unlisted = options.include_delisted && policy.enable_delisting;

    let mut results: Vec<Arc<PackageRecord>> = set
        .iter()
        .filter(|r| policy.visible(r) || include_unlisted)
        .filter(|r| options.include_prerelease || !r.is_prerelease())
        .filter(|r| options.allow_semver2 || !r.is_semver2())
        .filter(|r| policy.framework_match(&options.target_frameworks, r))
        .filter(|r| matches_term(r, &words))
        .cloned()
        .collect();

    results.sort_by(result_order);
    results
}

pub fn get_updates(set: &PackageSet, request: &UpdateRequest, policy: QueryPolicy) -> Vec<Arc<PackageRecord>> {
    let constraints = &request.version_constraints;
    if !constraints.is_empty() && constraints.len() != request.packages.len() {
        return Vec::new();
    }

    let mut seen: HashSet<PackageKey> = HashSet::new();
    let mut results = Vec::new();

    for (index, current) in request.packages.iter().enumerate() {
        let constraint = constraints.get(index).and_then(Option::as_ref);

        let candidates: Vec<&Arc<PackageRecord>> = set
            .versions_of(&current.id)
            .filter(|r| policy.visible(r))
            .filter(|r| r.version > current.version)
            .filter(|r| request.include_prerelease || !r.is_prerelease())
            .filter(|r| request.allow_semver2 || !r.is_semver2())
            .filter(|r| constraint.is_none_or(|range| range.satisfies(&r.version)))
            .filter(|r| policy.framework_match(&request.target_frameworks, r))
            .collect();

        let selected: Vec<&Arc<PackageRecord>> = if request.include_all_versions {
            candidates
        } else {
            candidates.last().copied().into_iter().collect()
        };

        for record in selected {
            if seen.insert(record.key()) {
                results.push(Arc::clone(record));
            }
        }
    }

    results
}
