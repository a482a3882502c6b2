// src/package/archive.rs

//! `.nupkg` archive access
//!
//! A `.nupkg` is a zip file with the manifest at its root plus OPC
//! packaging parts (`[Content_Types].xml`, `_rels/`, `package/`) that are
//! not package content.

use crate::error::{Error, Result};
use crate::framework::Framework;
use crate::package::nuspec::PackageManifest;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

/// Folders whose first path segment below them names a target framework
const FRAMEWORK_FOLDERS: &[&str] = &["lib", "ref", "build", "tools", "content", "contentfiles"];

/// Opens package archives and exposes their declared metadata
pub trait PackageReader: Send + Sync {
    fn open(&self, path: &Path) -> Result<PackageArchive>;
}

/// Default reader for zip-based `.nupkg` files
#[derive(Debug, Clone, Copy, Default)]
pub struct NupkgReader;

impl PackageReader for NupkgReader {
    fn open(&self, path: &Path) -> Result<PackageArchive> {
        let file = File::open(path)?;
        let mut zip = ZipArchive::new(BufReader::new(file))
            .map_err(|e| invalid(path, format!("not a zip archive: {}", e)))?;

        let mut nuspec_index = None;
        let mut files = Vec::new();

        for index in 0..zip.len() {
            let entry = zip
                .by_index(index)
                .map_err(|e| invalid(path, format!("unreadable entry: {}", e)))?;
            if entry.is_dir() {
                continue;
            }

            let name = entry.name().replace('\\', "/");
            if !name.contains('/') && name.to_ascii_lowercase().ends_with(".nuspec") {
                if nuspec_index.is_some() {
                    return Err(invalid(path, "multiple .nuspec files".to_string()));
                }
                nuspec_index = Some(index);
                continue;
            }
            if is_packaging_part(&name) {
                continue;
            }
            files.push(name);
        }

        let index =
            nuspec_index.ok_or_else(|| invalid(path, "no .nuspec manifest".to_string()))?;

        let mut xml = String::new();
        zip.by_index(index)
            .map_err(|e| invalid(path, format!("unreadable manifest: {}", e)))?
            .read_to_string(&mut xml)
            .map_err(|e| invalid(path, format!("unreadable manifest: {}", e)))?;

        let manifest = PackageManifest::parse(&xml)?;
        debug!(
            "Opened {} {} ({} files) from {}",
            manifest.id,
            manifest.version,
            files.len(),
            path.display()
        );

        Ok(PackageArchive {
            path: path.to_path_buf(),
            manifest,
            files,
        })
    }
}

fn invalid(path: &Path, reason: String) -> Error {
    Error::InvalidPackage(format!("{}: {}", path.display(), reason))
}

fn is_packaging_part(name: &str) -> bool {
    name == "[Content_Types].xml"
        || name.starts_with("_rels/")
        || name.starts_with("package/services/metadata/")
}

/// An opened package archive
#[derive(Debug, Clone)]
pub struct PackageArchive {
    path: PathBuf,
    manifest: PackageManifest,
    files: Vec<String>,
}

impl PackageArchive {
    pub fn new(path: PathBuf, manifest: PackageManifest, files: Vec<String>) -> Self {
        Self {
            path,
            manifest,
            files,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest(&self) -> &PackageManifest {
        &self.manifest
    }

    /// Declared content files (packaging parts excluded)
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Fresh stream over the raw archive bytes
    pub fn content_stream(&self) -> std::io::Result<File> {
        File::open(&self.path)
    }

    /// A symbols package ships debug symbols together with its sources
    pub fn is_symbols_package(&self) -> bool {
        let has_pdb = self
            .files
            .iter()
            .any(|f| f.to_ascii_lowercase().ends_with(".pdb"));
        let has_sources = self
            .files
            .iter()
            .any(|f| f.to_ascii_lowercase().starts_with("src/"));
        has_pdb && has_sources
    }

    /// Frameworks this package ships assets or dependencies for
    pub fn supported_frameworks(&self) -> Vec<Framework> {
        let mut seen = BTreeSet::new();
        let mut frameworks = Vec::new();

        let from_groups = self
            .manifest
            .dependency_groups
            .iter()
            .filter_map(|group| group.target_framework.clone());

        let from_folders = self.files.iter().filter_map(|file| {
            let mut segments = file.split('/');
            let folder = segments.next()?.to_ascii_lowercase();
            if !FRAMEWORK_FOLDERS.contains(&folder.as_str()) {
                return None;
            }
            // contentFiles/<language>/<tfm>/...
            if folder == "contentfiles" {
                segments.next()?;
            }
            let tfm = segments.next()?;
            // A file directly under lib/ has no framework folder
            segments.next()?;
            Framework::parse(tfm).ok()
        });

        for framework in from_groups.chain(from_folders) {
            if seen.insert(framework.short_name()) {
                frameworks.push(framework);
            }
        }
        frameworks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::NuGetVersion;

    fn archive(files: &[&str]) -> PackageArchive {
        let manifest = PackageManifest {
            id: "Sample".to_string(),
            version: NuGetVersion::new(1, 0, 0),
            title: None,
            authors: "me".to_string(),
            owners: None,
            description: "sample".to_string(),
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
            require_license_acceptance: false,
            development_dependency: false,
            dependency_groups: Vec::new(),
        };
        PackageArchive::new(
            PathBuf::from("/tmp/sample.nupkg"),
            manifest,
            files.iter().map(|f| f.to_string()).collect(),
        )
    }

    #[test]
    fn test_symbols_detection() {
        assert!(archive(&["lib/net45/a.dll", "lib/net45/a.pdb", "src/a.cs"]).is_symbols_package());
        assert!(!archive(&["lib/net45/a.dll", "lib/net45/a.pdb"]).is_symbols_package());
        assert!(!archive(&["lib/net45/a.dll", "src/a.cs"]).is_symbols_package());
    }

    #[test]
    fn test_supported_frameworks_from_folders() {
        let frameworks = archive(&[
            "lib/net45/a.dll",
            "lib/net45/a.xml",
            "lib/netstandard2.0/a.dll",
            "lib/readme.txt",
            "contentFiles/cs/net6.0/x.cs",
            "docs/net45/ignored.md",
        ])
        .supported_frameworks();

        let names: Vec<String> = frameworks.iter().map(|f| f.short_name()).collect();
        assert_eq!(names, vec!["net45", "netstandard2.0", "net6.0"]);
    }

    #[test]
    fn test_packaging_parts() {
        assert!(is_packaging_part("[Content_Types].xml"));
        assert!(is_packaging_part("_rels/.rels"));
        assert!(is_packaging_part("package/services/metadata/core-properties/x.psmdcp"));
        assert!(!is_packaging_part("lib/net45/a.dll"));
    }
}
