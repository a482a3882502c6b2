// src/framework/mod.rs

//! Target framework identifiers and compatibility
//!
//! Packages declare the frameworks they ship assets for, either through
//! dependency groups in the manifest or through `lib/<tfm>/` style folders.
//! Clients ask for packages usable from *their* framework. Compatibility is
//! a partial order: a project targeting `net48` can consume `net45` and
//! `netstandard2.0` assets, but not `net5.0` ones.
//!
//! Both naming styles are accepted:
//! - short folder names: `net45`, `net472`, `net6.0-windows`, `netstandard2.0`, `netcoreapp3.1`
//! - long names: `.NETFramework4.5`, `.NETFramework,Version=v4.5`, `.NETStandard2.0`

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Framework family
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrameworkFamily {
    /// .NET Framework (net20 .. net48)
    NetFramework,
    /// .NET Standard
    NetStandard,
    /// .NET Core and .NET 5+
    NetCoreApp,
    /// Framework-neutral assets
    Any,
    /// Anything else, matched by name only
    Other(String),
}

/// Up to four numeric components, compared lexicographically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FrameworkVersion(pub [u32; 4]);

impl FrameworkVersion {
    pub const fn new(major: u32, minor: u32, build: u32) -> Self {
        Self([major, minor, build, 0])
    }

    /// Parse a dotted version ("4.5", "2.0.1")
    fn parse_dotted(s: &str) -> Option<Self> {
        let mut parts = [0u32; 4];
        let mut count = 0;
        for piece in s.split('.') {
            if count == 4 || piece.is_empty() {
                return None;
            }
            parts[count] = piece.parse().ok()?;
            count += 1;
        }
        Some(Self(parts))
    }

    /// Parse a short folder version: "45" → 4.5, "472" → 4.7.2, "5.0" → 5.0
    fn parse_compact(s: &str) -> Option<Self> {
        if s.contains('.') {
            return Self::parse_dotted(s);
        }
        if s.is_empty() || s.len() > 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let mut parts = [0u32; 4];
        for (slot, digit) in parts.iter_mut().zip(s.bytes()) {
            *slot = u32::from(digit - b'0');
        }
        Some(Self(parts))
    }
}

impl fmt::Display for FrameworkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [major, minor, build, revision] = self.0;
        write!(f, "{}.{}", major, minor)?;
        if build > 0 || revision > 0 {
            write!(f, ".{}", build)?;
        }
        if revision > 0 {
            write!(f, ".{}", revision)?;
        }
        Ok(())
    }
}

/// A target framework moniker
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Framework {
    pub family: FrameworkFamily,
    pub version: FrameworkVersion,
}

impl Framework {
    pub fn new(family: FrameworkFamily, version: FrameworkVersion) -> Self {
        Self { family, version }
    }

    pub fn any() -> Self {
        Self::new(FrameworkFamily::Any, FrameworkVersion::default())
    }

    pub fn parse(s: &str) -> Result<Self> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(Error::InvalidFramework("empty framework name".to_string()));
        }

        let lower = raw.to_ascii_lowercase();
        if lower == "any" || lower == "dotnet" {
            return Ok(Self::any());
        }

        if lower.starts_with('.') {
            return Self::parse_long(raw, &lower);
        }
        Self::parse_short(raw, &lower)
    }

    /// `.NETFramework4.5`, `.NETFramework,Version=v4.5`, `.NETStandard2.0`
    fn parse_long(raw: &str, lower: &str) -> Result<Self> {
        let (name, version) = match lower.split_once(",version=") {
            Some((name, version)) => (name, version.trim_start_matches('v')),
            None => {
                let split = lower
                    .find(|c: char| c.is_ascii_digit())
                    .unwrap_or(lower.len());
                (&lower[..split], &lower[split..])
            }
        };

        let family = match name {
            ".netframework" => FrameworkFamily::NetFramework,
            ".netstandard" => FrameworkFamily::NetStandard,
            ".netcoreapp" => FrameworkFamily::NetCoreApp,
            other => FrameworkFamily::Other(other.trim_start_matches('.').to_string()),
        };

        let version = if version.is_empty() {
            FrameworkVersion::default()
        } else {
            FrameworkVersion::parse_dotted(version)
                .ok_or_else(|| Error::InvalidFramework(raw.to_string()))?
        };

        Ok(Self::new(family, version))
    }

    /// `net45`, `net6.0-windows`, `netstandard2.0`, `netcoreapp3.1`, `uap10.0`
    fn parse_short(raw: &str, lower: &str) -> Result<Self> {
        // Platform suffixes ("-windows", "-android") don't affect compatibility here
        let lower = lower.split('-').next().unwrap_or(lower);

        let (family, version) = if let Some(rest) = lower.strip_prefix("netstandard") {
            (FrameworkFamily::NetStandard, rest)
        } else if let Some(rest) = lower.strip_prefix("netcoreapp") {
            (FrameworkFamily::NetCoreApp, rest)
        } else if let Some(rest) = lower.strip_prefix("net") {
            if rest.bytes().next().is_some_and(|b| b.is_ascii_digit()) {
                // net5.0 and later are .NET Core; net45..net48 are .NET Framework
                let version = FrameworkVersion::parse_compact(rest)
                    .ok_or_else(|| Error::InvalidFramework(raw.to_string()))?;
                let family = if rest.contains('.') && version.0[0] >= 5 {
                    FrameworkFamily::NetCoreApp
                } else {
                    FrameworkFamily::NetFramework
                };
                return Ok(Self::new(family, version));
            }
            (FrameworkFamily::Other(lower.to_string()), "")
        } else {
            let split = lower
                .find(|c: char| c.is_ascii_digit())
                .unwrap_or(lower.len());
            if split == 0 {
                return Err(Error::InvalidFramework(raw.to_string()));
            }
            (
                FrameworkFamily::Other(lower[..split].to_string()),
                &lower[split..],
            )
        };

        let version = if version.is_empty() {
            FrameworkVersion::default()
        } else {
            FrameworkVersion::parse_compact(version)
                .ok_or_else(|| Error::InvalidFramework(raw.to_string()))?
        };

        Ok(Self::new(family, version))
    }

    /// Short folder name ("net45", "netstandard2.0", "net8.0")
    pub fn short_name(&self) -> String {
        match &self.family {
            FrameworkFamily::Any => "any".to_string(),
            FrameworkFamily::NetFramework => {
                let [major, minor, build, _] = self.version.0;
                if build > 0 {
                    format!("net{}{}{}", major, minor, build)
                } else {
                    format!("net{}{}", major, minor)
                }
            }
            FrameworkFamily::NetStandard => format!("netstandard{}", self.version),
            FrameworkFamily::NetCoreApp if self.version.0[0] >= 5 => {
                format!("net{}", self.version)
            }
            FrameworkFamily::NetCoreApp => format!("netcoreapp{}", self.version),
            FrameworkFamily::Other(name) if self.version == FrameworkVersion::default() => {
                name.clone()
            }
            FrameworkFamily::Other(name) => format!("{}{}", name, self.version),
        }
    }

    /// Highest .NET Standard version a project on this framework can consume
    fn max_netstandard(&self) -> Option<FrameworkVersion> {
        let v = self.version;
        match self.family {
            FrameworkFamily::NetFramework => {
                if v >= FrameworkVersion::new(4, 6, 1) {
                    Some(FrameworkVersion::new(2, 0, 0))
                } else if v >= FrameworkVersion::new(4, 6, 0) {
                    Some(FrameworkVersion::new(1, 3, 0))
                } else if v >= FrameworkVersion::new(4, 5, 1) {
                    Some(FrameworkVersion::new(1, 2, 0))
                } else if v >= FrameworkVersion::new(4, 5, 0) {
                    Some(FrameworkVersion::new(1, 1, 0))
                } else {
                    None
                }
            }
            FrameworkFamily::NetCoreApp => {
                if v >= FrameworkVersion::new(3, 0, 0) {
                    Some(FrameworkVersion::new(2, 1, 0))
                } else if v >= FrameworkVersion::new(2, 0, 0) {
                    Some(FrameworkVersion::new(2, 0, 0))
                } else {
                    Some(FrameworkVersion::new(1, 6, 0))
                }
            }
            _ => None,
        }
    }
}

/// Can a project targeting `project` consume assets built for `candidate`?
pub fn is_compatible(project: &Framework, candidate: &Framework) -> bool {
    if candidate.family == FrameworkFamily::Any {
        return true;
    }
    if project.family == FrameworkFamily::Any {
        return false;
    }
    if project.family == candidate.family {
        return candidate.version <= project.version;
    }
    if candidate.family == FrameworkFamily::NetStandard {
        return project
            .max_netstandard()
            .is_some_and(|max| candidate.version <= max);
    }
    false
}

/// True if any requested framework can consume any of the supported ones.
///
/// An empty `supported` list means the package has no framework-specific
/// assets and is usable everywhere.
pub fn any_compatible(requested: &[Framework], supported: &[Framework]) -> bool {
    supported.is_empty()
        || requested
            .iter()
            .any(|project| supported.iter().any(|candidate| is_compatible(project, candidate)))
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

impl FromStr for Framework {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl serde::Serialize for Framework {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.short_name())
    }
}

impl<'de> serde::Deserialize<'de> for Framework {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fw(s: &str) -> Framework {
        Framework::parse(s).unwrap()
    }

    #[test]
    fn test_parse_short_net_framework() {
        let f = fw("net45");
        assert_eq!(f.family, FrameworkFamily::NetFramework);
        assert_eq!(f.version, FrameworkVersion::new(4, 5, 0));

        let f = fw("net472");
        assert_eq!(f.version, FrameworkVersion::new(4, 7, 2));
        assert_eq!(f.short_name(), "net472");
    }

    #[test]
    fn test_parse_modern_net() {
        let f = fw("net8.0");
        assert_eq!(f.family, FrameworkFamily::NetCoreApp);
        assert_eq!(f.version, FrameworkVersion::new(8, 0, 0));
        assert_eq!(f.short_name(), "net8.0");

        let f = fw("net6.0-windows");
        assert_eq!(f.family, FrameworkFamily::NetCoreApp);
        assert_eq!(f.version, FrameworkVersion::new(6, 0, 0));
    }

    #[test]
    fn test_parse_netstandard_and_core() {
        assert_eq!(fw("netstandard2.0").family, FrameworkFamily::NetStandard);
        assert_eq!(fw("netcoreapp3.1").version, FrameworkVersion::new(3, 1, 0));
        assert_eq!(fw("netcoreapp3.1").short_name(), "netcoreapp3.1");
    }

    #[test]
    fn test_parse_long_names() {
        assert_eq!(fw(".NETFramework4.5"), fw("net45"));
        assert_eq!(fw(".NETFramework,Version=v4.6.1"), fw("net461"));
        assert_eq!(fw(".NETStandard2.0"), fw("netstandard2.0"));
        assert_eq!(fw(".NETCoreApp,Version=v3.1"), fw("netcoreapp3.1"));
    }

    #[test]
    fn test_parse_other_and_any() {
        assert_eq!(fw("any").family, FrameworkFamily::Any);
        let f = fw("uap10.0");
        assert_eq!(f.family, FrameworkFamily::Other("uap".to_string()));
        assert!(Framework::parse("").is_err());
        assert!(Framework::parse("123").is_err());
    }

    #[test]
    fn test_same_family_compatibility() {
        assert!(is_compatible(&fw("net48"), &fw("net45")));
        assert!(!is_compatible(&fw("net45"), &fw("net48")));
        assert!(is_compatible(&fw("net8.0"), &fw("netcoreapp3.1")));
    }

    #[test]
    fn test_netstandard_compatibility() {
        assert!(is_compatible(&fw("net461"), &fw("netstandard2.0")));
        assert!(!is_compatible(&fw("net46"), &fw("netstandard2.0")));
        assert!(is_compatible(&fw("net46"), &fw("netstandard1.3")));
        assert!(is_compatible(&fw("netcoreapp2.1"), &fw("netstandard2.0")));
        assert!(!is_compatible(&fw("netcoreapp2.1"), &fw("netstandard2.1")));
        assert!(is_compatible(&fw("net6.0"), &fw("netstandard2.1")));
        assert!(!is_compatible(&fw("net40"), &fw("netstandard1.0")));
    }

    #[test]
    fn test_cross_family_is_incompatible() {
        assert!(!is_compatible(&fw("net48"), &fw("net5.0")));
        assert!(!is_compatible(&fw("netstandard2.0"), &fw("net45")));
        assert!(!is_compatible(&fw("uap10.0"), &fw("net45")));
    }

    #[test]
    fn test_any_compatible() {
        let supported = vec![fw("net45"), fw("netstandard2.0")];
        assert!(any_compatible(&[fw("net40"), fw("net461")], &supported));
        assert!(!any_compatible(&[fw("net40")], &supported));
        assert!(any_compatible(&[fw("net40")], &[]));
        assert!(any_compatible(&[fw("net40")], &[Framework::any()]));
    }
}
