// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use nuget_feed::package::PackageReader;
use nuget_feed::repository::{RepositoryOptions, ServerPackageRepository};
use nuget_feed::settings::{FeedSettings, SettingValue};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Builds `.nupkg` archives in memory.
pub struct NupkgBuilder {
    id: String,
    version: String,
    description: String,
    tags: Option<String>,
    dependencies: Vec<(Option<String>, String, Option<String>)>,
    files: Vec<(String, Vec<u8>)>,
}

impl NupkgBuilder {
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            version: version.to_string(),
            description: format!("{} test package", id),
            tags: None,
            dependencies: Vec::new(),
            files: vec![(format!("lib/net45/{}.dll", id), b"MZ".to_vec())],
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn tags(mut self, tags: &str) -> Self {
        self.tags = Some(tags.to_string());
        self
    }

    /// Add a dependency, optionally inside a target framework group
    pub fn dependency(mut self, framework: Option<&str>, id: &str, range: Option<&str>) -> Self {
        self.dependencies.push((
            framework.map(str::to_string),
            id.to_string(),
            range.map(str::to_string),
        ));
        self
    }

    /// Replace the content files
    pub fn files(mut self, files: &[&str]) -> Self {
        self.files = files
            .iter()
            .map(|name| (name.to_string(), name.as_bytes().to_vec()))
            .collect();
        self
    }

    fn nuspec(&self) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata>
"#,
        );
        xml.push_str(&format!("    <id>{}</id>\n", self.id));
        xml.push_str(&format!("    <version>{}</version>\n", self.version));
        xml.push_str("    <authors>Test Author</authors>\n");
        xml.push_str(&format!("    <description>{}</description>\n", self.description));
        if let Some(tags) = &self.tags {
            xml.push_str(&format!("    <tags>{}</tags>\n", tags));
        }
        if !self.dependencies.is_empty() {
            xml.push_str("    <dependencies>\n");
            for (framework, id, range) in &self.dependencies {
                let version = range
                    .as_ref()
                    .map(|r| format!(r#" version="{}""#, r))
                    .unwrap_or_default();
                match framework {
                    Some(framework) => xml.push_str(&format!(
                        "      <group targetFramework=\"{}\"><dependency id=\"{}\"{} /></group>\n",
                        framework, id, version
                    )),
                    None => xml.push_str(&format!(
                        "      <group><dependency id=\"{}\"{} /></group>\n",
                        id, version
                    )),
                }
            }
            xml.push_str("    </dependencies>\n");
        }
        xml.push_str("  </metadata>\n</package>\n");
        xml
    }

    /// Archive bytes
    pub fn build(&self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        zip.start_file(format!("{}.nuspec", self.id), options).unwrap();
        zip.write_all(self.nuspec().as_bytes()).unwrap();

        zip.start_file("[Content_Types].xml", options).unwrap();
        zip.write_all(b"<Types />").unwrap();

        for (name, content) in &self.files {
            zip.start_file(name.as_str(), options).unwrap();
            zip.write_all(content).unwrap();
        }

        zip.finish().unwrap().into_inner()
    }

    /// Write the archive into `dir` under its conventional file name
    pub fn write_to(&self, dir: &Path) -> PathBuf {
        let path = dir.join(format!("{}.{}.nupkg", self.id, self.version));
        self.write_as(&path);
        path
    }

    pub fn write_as(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, self.build()).unwrap();
    }
}

/// Settings with only the given boolean switches turned on
pub fn settings(enabled: &[&str]) -> FeedSettings {
    enabled.iter().fold(FeedSettings::default(), |settings, key| {
        settings.with(key, SettingValue::Bool(true))
    })
}

/// Repository over a fresh temp directory.
///
/// Returns (TempDir, repository) - keep the TempDir alive to prevent cleanup.
pub fn temp_repository(settings: FeedSettings) -> (TempDir, ServerPackageRepository) {
    let temp_dir = tempfile::tempdir().unwrap();
    let repository = open_repository(temp_dir.path(), settings);
    (temp_dir, repository)
}

/// A new repository handle over an existing directory, as after a restart
pub fn open_repository(root: &Path, settings: FeedSettings) -> ServerPackageRepository {
    ServerPackageRepository::new(RepositoryOptions::new(root), settings.into_provider())
}

/// Repository over `root` that opens archives through `reader`
pub fn repository_with_reader(
    root: &Path,
    settings: FeedSettings,
    reader: Arc<dyn PackageReader>,
) -> ServerPackageRepository {
    ServerPackageRepository::with_reader(RepositoryOptions::new(root), settings.into_provider(), reader)
}
