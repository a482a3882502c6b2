// src/package/nuspec.rs

//! `.nuspec` manifest parsing
//!
//! The manifest lives at the root of every `.nupkg`. Only the `<metadata>`
//! block matters to the feed; `<files>` is a pack-time instruction and is
//! ignored. Namespaces vary across nuspec schema revisions, so elements are
//! matched by local name.

use crate::error::{Error, Result};
use crate::framework::Framework;
use crate::package::{DependencyGroup, PackageDependency};
use crate::version::{NuGetVersion, VersionRange};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;

/// Longest package id accepted by NuGet clients
pub const MAX_PACKAGE_ID_LENGTH: usize = 100;

/// Metadata declared by a package manifest
#[derive(Debug, Clone)]
pub struct PackageManifest {
    pub id: String,
    pub version: NuGetVersion,
    pub title: Option<String>,
    pub authors: String,
    pub owners: Option<String>,
    pub description: String,
    pub summary: Option<String>,
    pub release_notes: Option<String>,
    pub tags: Option<String>,
    pub icon_url: Option<String>,
    pub license_url: Option<String>,
    pub license_expression: Option<String>,
    pub project_url: Option<String>,
    pub copyright: Option<String>,
    pub language: Option<String>,
    pub min_client_version: Option<String>,
    pub require_license_acceptance: bool,
    pub development_dependency: bool,
    pub dependency_groups: Vec<DependencyGroup>,
}

impl PackageManifest {
    /// Parse manifest XML
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut path: Vec<String> = Vec::new();
        let mut fields: HashMap<String, String> = HashMap::new();
        let mut state = DependencyState::default();
        let mut min_client_version = None;
        let mut license_type = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = local_name(&e);
                    state.on_element(&path, &name, &e)?;
                    match (path.as_slice(), name.as_str()) {
                        ([p], "metadata") if p == "package" => {
                            min_client_version = attribute(&e, "minClientVersion")?;
                        }
                        ([p, m], "license") if p == "package" && m == "metadata" => {
                            license_type = attribute(&e, "type")?;
                        }
                        _ => {}
                    }
                    path.push(name);
                }
                Ok(Event::Empty(e)) => {
                    let name = local_name(&e);
                    state.on_element(&path, &name, &e)?;
                }
                Ok(Event::End(_)) => {
                    path.pop();
                }
                Ok(Event::Text(t)) => {
                    let text = t.unescape().map_err(malformed)?;
                    record_text(&path, &text, &mut fields);
                }
                Ok(Event::CData(c)) => {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    record_text(&path, &text, &mut fields);
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(malformed(e)),
                _ => {}
            }
        }

        let mut take = |key: &str| {
            fields
                .remove(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let id = take("id").ok_or_else(|| {
            Error::InvalidPackage("manifest is missing the package id".to_string())
        })?;
        validate_id(&id)?;

        let version_str = take("version").ok_or_else(|| {
            Error::InvalidPackage(format!("manifest for {} is missing the version", id))
        })?;
        let version = NuGetVersion::parse(&version_str)
            .map_err(|e| Error::InvalidPackage(format!("{}: {}", id, e)))?;

        let license = take("license");
        let license_expression = match license_type.as_deref() {
            Some(kind) if kind.eq_ignore_ascii_case("expression") => license,
            _ => None,
        };

        Ok(Self {
            version,
            title: take("title"),
            authors: take("authors").unwrap_or_default(),
            owners: take("owners"),
            description: take("description").unwrap_or_default(),
            summary: take("summary"),
            release_notes: take("releaseNotes"),
            tags: take("tags"),
            icon_url: take("iconUrl"),
            license_url: take("licenseUrl"),
            license_expression,
            project_url: take("projectUrl"),
            copyright: take("copyright"),
            language: take("language"),
            require_license_acceptance: parse_flag(take("requireLicenseAcceptance")),
            development_dependency: parse_flag(take("developmentDependency")),
            min_client_version,
            dependency_groups: state.finish(),
            id,
        })
    }
}

/// Collects `<dependencies>` in either the flat or grouped layout
#[derive(Default)]
struct DependencyState {
    flat: Vec<PackageDependency>,
    groups: Vec<DependencyGroup>,
}

impl DependencyState {
    fn on_element(&mut self, path: &[String], name: &str, e: &BytesStart) -> Result<()> {
        let parent = path.last().map(String::as_str);
        let in_metadata_deps = path.len() >= 2
            && path[path.len() - 2] == "metadata"
            && parent == Some("dependencies");

        match name {
            "group" if in_metadata_deps => {
                let target_framework = match attribute(e, "targetFramework")? {
                    Some(tfm) if !tfm.trim().is_empty() => Some(
                        Framework::parse(&tfm)
                            .map_err(|err| Error::InvalidPackage(err.to_string()))?,
                    ),
                    _ => None,
                };
                self.groups.push(DependencyGroup {
                    target_framework,
                    dependencies: Vec::new(),
                });
            }
            "dependency" if in_metadata_deps => {
                self.flat.push(parse_dependency(e)?);
            }
            "dependency"
                if parent == Some("group")
                    && path.len() >= 2
                    && path[path.len() - 2] == "dependencies" =>
            {
                let dependency = parse_dependency(e)?;
                if let Some(group) = self.groups.last_mut() {
                    group.dependencies.push(dependency);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> Vec<DependencyGroup> {
        if self.groups.is_empty() && !self.flat.is_empty() {
            return vec![DependencyGroup {
                target_framework: None,
                dependencies: self.flat,
            }];
        }
        self.groups
    }
}

fn parse_dependency(e: &BytesStart) -> Result<PackageDependency> {
    let id = attribute(e, "id")?
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| Error::InvalidPackage("dependency without an id".to_string()))?;

    let version_range = match attribute(e, "version")? {
        Some(range) if !range.trim().is_empty() => Some(
            VersionRange::parse(&range)
                .map_err(|err| Error::InvalidPackage(format!("dependency {}: {}", id, err)))?,
        ),
        _ => None,
    };

    Ok(PackageDependency {
        id: id.trim().to_string(),
        version_range,
    })
}

fn record_text(path: &[String], text: &str, fields: &mut HashMap<String, String>) {
    if let [package, metadata, field] = path
        && package == "package"
        && metadata == "metadata"
    {
        fields.entry(field.clone()).or_default().push_str(text);
    }
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart, key: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| {
            Error::InvalidPackage(format!("malformed nuspec attribute: {}", err))
        })?;
        if attr.key.local_name().as_ref() == key.as_bytes() {
            let value = attr.unescape_value().map_err(malformed)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn parse_flag(value: Option<String>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

fn malformed(err: quick_xml::Error) -> Error {
    Error::InvalidPackage(format!("malformed nuspec: {}", err))
}

/// Package ids: letters, digits, '.', '-', '_'; no leading/trailing dot
pub fn validate_id(id: &str) -> Result<()> {
    if id.len() > MAX_PACKAGE_ID_LENGTH {
        return Err(Error::InvalidPackage(format!(
            "package id exceeds {} characters",
            MAX_PACKAGE_ID_LENGTH
        )));
    }
    let valid_chars = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if !valid_chars || id.starts_with('.') || id.ends_with('.') || id.contains("..") {
        return Err(Error::InvalidPackage(format!("invalid package id '{}'", id)));
    }
    Ok(())
}
