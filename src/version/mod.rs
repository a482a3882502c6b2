// src/version/mod.rs

//! Package version handling
//!
//! NuGet versions are semantic versions with an optional fourth "revision"
//! component: `major.minor[.patch[.revision]][-release][+metadata]`.
//!
//! Ordering rules:
//! - numeric components compare left to right
//! - a version with a release label sorts before the same numbers without one
//! - release labels compare segment by segment (split on `.`): two numeric
//!   segments compare numerically, a numeric segment sorts before an
//!   alphanumeric one, and alphanumeric segments compare ASCII
//!   case-insensitively; a label that is a prefix of another sorts first
//! - build metadata never affects ordering or equality

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A parsed NuGet package version
#[derive(Debug, Clone)]
pub struct NuGetVersion {
    major: u64,
    minor: u64,
    patch: u64,
    revision: u64,
    release: Vec<String>,
    metadata: Option<String>,
}

impl NuGetVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            revision: 0,
            release: Vec::new(),
            metadata: None,
        }
    }

    /// Parse a version string
    ///
    /// Examples:
    /// - "1" → 1.0.0
    /// - "1.2.3.4" → 1.2.3.4
    /// - "1.0.0-beta.2+sha.5114f85" → 1.0.0-beta.2 with metadata
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidVersion("empty version string".to_string()));
        }

        let (rest, metadata) = match s.split_once('+') {
            Some((rest, meta)) => {
                if meta.is_empty() || !meta.split('.').all(is_valid_identifier) {
                    return Err(Error::InvalidVersion(format!(
                        "invalid build metadata in '{}'",
                        s
                    )));
                }
                (rest, Some(meta.to_string()))
            }
            None => (s, None),
        };

        let (core, release) = match rest.split_once('-') {
            Some((core, label)) => {
                if label.is_empty() || !label.split('.').all(is_valid_identifier) {
                    return Err(Error::InvalidVersion(format!(
                        "invalid release label in '{}'",
                        s
                    )));
                }
                (core, label.split('.').map(str::to_string).collect())
            }
            None => (rest, Vec::new()),
        };

        let parts: Vec<&str> = core.split('.').collect();
        if parts.is_empty() || parts.len() > 4 {
            return Err(Error::InvalidVersion(format!(
                "expected 1 to 4 numeric components in '{}'",
                s
            )));
        }

        let mut numbers = [0u64; 4];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::InvalidVersion(format!(
                    "non-numeric component '{}' in '{}'",
                    part, s
                )));
            }
            *slot = part
                .parse()
                .map_err(|e| Error::InvalidVersion(format!("'{}': {}", s, e)))?;
        }

        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            revision: numbers[3],
            release,
            metadata,
        })
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Release label without the leading dash, if any
    pub fn release_label(&self) -> Option<String> {
        if self.release.is_empty() {
            None
        } else {
            Some(self.release.join("."))
        }
    }

    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }

    pub fn is_prerelease(&self) -> bool {
        !self.release.is_empty()
    }

    /// SemVer 2.0 packages are hidden from clients that don't opt in
    pub fn is_semver2(&self) -> bool {
        self.release.len() > 1 || self.metadata.is_some()
    }

    /// Normalized form: no metadata, revision only when non-zero
    pub fn to_normalized_string(&self) -> String {
        let mut out = format!("{}.{}.{}", self.major, self.minor, self.patch);
        if self.revision > 0 {
            out.push_str(&format!(".{}", self.revision));
        }
        if let Some(label) = self.release_label() {
            out.push('-');
            out.push_str(&label);
        }
        out
    }

    /// Normalized form plus build metadata
    pub fn to_full_string(&self) -> String {
        match &self.metadata {
            Some(meta) => format!("{}+{}", self.to_normalized_string(), meta),
            None => self.to_normalized_string(),
        }
    }

    fn release_cmp(&self, other: &Self) -> Ordering {
        match (self.release.is_empty(), other.release.is_empty()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }

        for (a, b) in self.release.iter().zip(&other.release) {
            match compare_label_segment(a, b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        self.release.len().cmp(&other.release.len())
    }
}

fn is_valid_identifier(part: &str) -> bool {
    !part.is_empty() && part.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

fn compare_label_segment(a: &str, b: &str) -> Ordering {
    let a_numeric = a.bytes().all(|c| c.is_ascii_digit());
    let b_numeric = b.bytes().all(|c| c.is_ascii_digit());

    match (a_numeric, b_numeric) {
        (true, true) => {
            // Compare by magnitude without overflowing on very long segments
            let a = a.trim_start_matches('0');
            let b = b.trim_start_matches('0');
            a.len().cmp(&b.len()).then_with(|| a.cmp(b))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => {
            let a = a.bytes().map(|c| c.to_ascii_lowercase());
            let b = b.bytes().map(|c| c.to_ascii_lowercase());
            a.cmp(b)
        }
    }
}

impl Ord for NuGetVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch, self.revision)
            .cmp(&(other.major, other.minor, other.patch, other.revision))
            .then_with(|| self.release_cmp(other))
    }
}

impl PartialOrd for NuGetVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for NuGetVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NuGetVersion {}

impl Hash for NuGetVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.major, self.minor, self.patch, self.revision).hash(state);
        for segment in &self.release {
            if segment.bytes().all(|c| c.is_ascii_digit()) {
                segment.trim_start_matches('0').hash(state);
            } else {
                segment.to_ascii_lowercase().hash(state);
            }
        }
    }
}

impl fmt::Display for NuGetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_full_string())
    }
}

impl FromStr for NuGetVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for NuGetVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_full_string())
    }
}

impl<'de> Deserialize<'de> for NuGetVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A version range in NuGet interval notation
///
/// - `1.0` → `>= 1.0`
/// - `[1.0]` → `== 1.0`
/// - `(1.0,)` → `> 1.0`
/// - `[1.0,2.0)` → `>= 1.0 && < 2.0`
/// - `(,2.0]` → `<= 2.0`
/// - `*` or empty → any version
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionRange {
    min: Option<NuGetVersion>,
    min_inclusive: bool,
    max: Option<NuGetVersion>,
    max_inclusive: bool,
}

impl VersionRange {
    /// Range accepting every version
    pub fn all() -> Self {
        Self::default()
    }

    /// Range accepting exactly one version
    pub fn exact(version: NuGetVersion) -> Self {
        Self {
            min: Some(version.clone()),
            min_inclusive: true,
            max: Some(version),
            max_inclusive: true,
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s == "*" {
            return Ok(Self::all());
        }

        let first = s.as_bytes()[0];
        if first != b'[' && first != b'(' {
            // Bare version means minimum inclusive
            return Ok(Self {
                min: Some(NuGetVersion::parse(s)?),
                min_inclusive: true,
                max: None,
                max_inclusive: false,
            });
        }

        let min_inclusive = first == b'[';
        let max_inclusive = match s.as_bytes()[s.len() - 1] {
            b']' => true,
            b')' => false,
            _ => {
                return Err(Error::InvalidVersion(format!(
                    "unterminated version range '{}'",
                    s
                )));
            }
        };
        if s.len() < 2 {
            return Err(Error::InvalidVersion(format!("empty version range '{}'", s)));
        }
        let inner = &s[1..s.len() - 1];

        let Some((low, high)) = inner.split_once(',') else {
            // "[1.0]" is the only legal form without a comma
            if !(min_inclusive && max_inclusive) {
                return Err(Error::InvalidVersion(format!(
                    "exact version range must use brackets: '{}'",
                    s
                )));
            }
            return Ok(Self::exact(NuGetVersion::parse(inner)?));
        };

        if high.contains(',') {
            return Err(Error::InvalidVersion(format!(
                "too many bounds in version range '{}'",
                s
            )));
        }

        let parse_bound = |bound: &str| -> Result<Option<NuGetVersion>> {
            let bound = bound.trim();
            if bound.is_empty() {
                Ok(None)
            } else {
                NuGetVersion::parse(bound).map(Some)
            }
        };

        let range = Self {
            min: parse_bound(low)?,
            min_inclusive,
            max: parse_bound(high)?,
            max_inclusive,
        };

        if let (Some(min), Some(max)) = (&range.min, &range.max) {
            let empty = match min.cmp(max) {
                Ordering::Greater => true,
                Ordering::Equal => !(range.min_inclusive && range.max_inclusive),
                Ordering::Less => false,
            };
            if empty {
                return Err(Error::InvalidVersion(format!(
                    "version range '{}' matches nothing",
                    s
                )));
            }
        }

        Ok(range)
    }

    pub fn min(&self) -> Option<&NuGetVersion> {
        self.min.as_ref()
    }

    pub fn max(&self) -> Option<&NuGetVersion> {
        self.max.as_ref()
    }

    /// Check if a version falls within this range
    pub fn satisfies(&self, version: &NuGetVersion) -> bool {
        let above_min = match &self.min {
            Some(min) if self.min_inclusive => version >= min,
            Some(min) => version > min,
            None => true,
        };
        let below_max = match &self.max {
            Some(max) if self.max_inclusive => version <= max,
            Some(max) => version < max,
            None => true,
        };
        above_min && below_max
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.min, &self.max) {
            (None, None) => write!(f, "*"),
            (Some(min), Some(max)) if min == max && self.min_inclusive && self.max_inclusive => {
                write!(f, "[{}]", min.to_normalized_string())
            }
            (min, max) => {
                write!(f, "{}", if self.min_inclusive { '[' } else { '(' })?;
                if let Some(min) = min {
                    write!(f, "{}", min.to_normalized_string())?;
                }
                write!(f, ", ")?;
                if let Some(max) = max {
                    write!(f, "{}", max.to_normalized_string())?;
                }
                write!(f, "{}", if self.max_inclusive { ']' } else { ')' })
            }
        }
    }
}

impl FromStr for VersionRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> NuGetVersion {
        NuGetVersion::parse(s).unwrap()
    }

    #[test]
    fn test_parse_short_forms() {
        let version = v("1");
        assert_eq!(version.to_normalized_string(), "1.0.0");

        let version = v("1.2");
        assert_eq!(version.to_normalized_string(), "1.2.0");

        let version = v("1.2.3.0");
        assert_eq!(version.to_normalized_string(), "1.2.3");

        let version = v("1.2.3.4");
        assert_eq!(version.revision(), 4);
        assert_eq!(version.to_normalized_string(), "1.2.3.4");
    }

    #[test]
    fn test_parse_release_and_metadata() {
        let version = v("1.0.0-beta.2+sha.5114f85");
        assert_eq!(version.release_label().as_deref(), Some("beta.2"));
        assert_eq!(version.metadata(), Some("sha.5114f85"));
        assert_eq!(version.to_normalized_string(), "1.0.0-beta.2");
        assert_eq!(version.to_full_string(), "1.0.0-beta.2+sha.5114f85");
        assert!(version.is_prerelease());
        assert!(version.is_semver2());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(NuGetVersion::parse("").is_err());
        assert!(NuGetVersion::parse("a.b.c").is_err());
        assert!(NuGetVersion::parse("1.2.3.4.5").is_err());
        assert!(NuGetVersion::parse("1.0-").is_err());
        assert!(NuGetVersion::parse("1.0-beta..1").is_err());
        assert!(NuGetVersion::parse("1.0+").is_err());
    }

    #[test]
    fn test_prerelease_sorts_before_release() {
        assert!(v("1.0.1-a") < v("1.0.1"));
        assert!(v("1.0.1-a") > v("1.0.0"));
    }

    #[test]
    fn test_label_segment_ordering() {
        assert!(v("1.0.0-alpha") < v("1.0.0-alpha.1"));
        assert!(v("1.0.0-alpha.1") < v("1.0.0-alpha.beta"));
        assert!(v("1.0.0-beta.2") < v("1.0.0-beta.11"));
        assert!(v("1.0.0-beta.11") < v("1.0.0-rc.1"));
        assert!(v("1.0.0-1") < v("1.0.0-alpha"));
    }

    #[test]
    fn test_equality_ignores_case_and_metadata() {
        assert_eq!(v("1.0.0-Beta"), v("1.0.0-beta"));
        assert_eq!(v("1.0.0+build.1"), v("1.0.0+build.2"));
        assert_eq!(v("1.0"), v("1.0.0.0"));
        assert_ne!(v("1.0.0.1"), v("1.0.0"));
    }

    #[test]
    fn test_revision_ordering() {
        assert!(v("1.0.0.1") > v("1.0.0"));
        assert!(v("1.0.0.10") > v("1.0.0.9"));
    }

    #[test]
    fn test_semver2_detection() {
        assert!(!v("1.0.0").is_semver2());
        assert!(!v("1.0.0-beta").is_semver2());
        assert!(v("1.0.0-beta.1").is_semver2());
        assert!(v("1.0.0+meta").is_semver2());
    }

    #[test]
    fn test_serde_round_trip_keeps_metadata() {
        let json = serde_json::to_string(&v("2.1.0-rc.1+abc")).unwrap();
        assert_eq!(json, "\"2.1.0-rc.1+abc\"");
        let back: NuGetVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back.metadata(), Some("abc"));
    }

    #[test]
    fn test_range_bare_version_is_minimum() {
        let range = VersionRange::parse("1.0").unwrap();
        assert!(range.satisfies(&v("1.0.0")));
        assert!(range.satisfies(&v("5.0.0")));
        assert!(!range.satisfies(&v("0.9.0")));
    }

    #[test]
    fn test_range_exact() {
        let range = VersionRange::parse("[1.2.3]").unwrap();
        assert!(range.satisfies(&v("1.2.3")));
        assert!(!range.satisfies(&v("1.2.4")));
        assert_eq!(range.to_string(), "[1.2.3]");
    }

    #[test]
    fn test_range_intervals() {
        let range = VersionRange::parse("[1.0,2.0)").unwrap();
        assert!(range.satisfies(&v("1.0.0")));
        assert!(range.satisfies(&v("1.9.9")));
        assert!(!range.satisfies(&v("2.0.0")));

        let range = VersionRange::parse("(1.0,)").unwrap();
        assert!(!range.satisfies(&v("1.0.0")));
        assert!(range.satisfies(&v("1.0.1")));

        let range = VersionRange::parse("(,2.0]").unwrap();
        assert!(range.satisfies(&v("2.0.0")));
        assert!(range.satisfies(&v("0.1.0")));
        assert!(!range.satisfies(&v("2.0.1")));
    }

    #[test]
    fn test_range_any() {
        assert!(VersionRange::parse("*").unwrap().satisfies(&v("99.0.0")));
        assert!(VersionRange::parse("").unwrap().satisfies(&v("0.0.1")));
    }

    #[test]
    fn test_range_rejects_invalid() {
        assert!(VersionRange::parse("(1.0)").is_err());
        assert!(VersionRange::parse("[2.0,1.0]").is_err());
        assert!(VersionRange::parse("[1.0,2.0").is_err());
        assert!(VersionRange::parse("[1.0,2.0,3.0]").is_err());
        assert!(VersionRange::parse("(1.0,1.0]").is_err());
    }

    #[test]
    fn test_range_display() {
        assert_eq!(VersionRange::parse("[1.0,2.0)").unwrap().to_string(), "[1.0.0, 2.0.0)");
        assert_eq!(VersionRange::parse("1.0").unwrap().to_string(), "[1.0.0, )");
        assert_eq!(VersionRange::all().to_string(), "*");
    }
}
