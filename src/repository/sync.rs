// src/repository/sync.rs

//! Directory synchronization
//!
//! Reconciles the cached record set with the package files actually on
//! disk. Files whose path and modification time match a cached record
//! reuse that record; new or changed files are opened and hashed; cached
//! records whose file is gone are dropped. Runs on a blocking thread.

use crate::error::{Error, Result};
use crate::hash::HashProvider;
use crate::package::{
    PACKAGE_EXTENSION, PackageArchive, PackageReader, PackageRecord, PackageSource, StorageInfo,
    delisted_marker_path,
};
use crate::store::PackageSet;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A package file found on disk
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub last_updated: DateTime<Utc>,
}

/// Counters for one synchronization pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SyncStats {
    pub discovered: usize,
    pub reused: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub removed: usize,
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files: {} reused, {} indexed, {} skipped, {} removed",
            self.discovered, self.reused, self.indexed, self.skipped, self.removed
        )
    }
}

/// Build a record for an opened archive: hash, size, timestamps, listed state
pub fn index_archive(archive: &PackageArchive, hasher: &HashProvider) -> Result<PackageRecord> {
    let path = archive.path();
    let metadata = std::fs::metadata(path)?;
    let last_updated: DateTime<Utc> = metadata.modified()?.into();
    let published = metadata
        .created()
        .map(DateTime::<Utc>::from)
        .unwrap_or(last_updated);

    let hash = hasher.compute_hash(&mut archive.content_stream()?)?;

    let storage = StorageInfo {
        hash,
        hash_algorithm: hasher.algorithm().name().to_string(),
        size: metadata.len(),
        full_path: path.to_path_buf(),
        last_updated,
        published,
        listed: !delisted_marker_path(path).exists(),
    };
    Ok(PackageRecord::from_archive(archive, storage))
}

/// Find every `.nupkg` file under `root`, sorted by path
pub fn discover_packages(root: &Path, recursive: bool) -> Result<Vec<DiscoveredFile>> {
    if !root.exists() {
        debug!("Package root {} does not exist yet", root.display());
        return Ok(Vec::new());
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let is_package = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(PACKAGE_EXTENSION));
        if !is_package {
            continue;
        }

        let modified = match entry.metadata().map_err(std::io::Error::from).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                warn!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };

        files.push(DiscoveredFile {
            path: entry.into_path(),
            last_updated: modified.into(),
        });
    }

    Ok(files)
}

/// Decide, per file, whether the cached record can be reused
pub fn plan_sources(cached: &PackageSet, files: &[DiscoveredFile]) -> Vec<PackageSource> {
    let by_path: HashMap<&Path, &Arc<PackageRecord>> = cached
        .iter()
        .map(|record| (record.full_path.as_path(), record))
        .collect();

    files
        .iter()
        .map(|file| match by_path.get(file.path.as_path()) {
            Some(record) if record.last_updated == file.last_updated => {
                PackageSource::FromCache(Arc::clone(record))
            }
            _ => PackageSource::FromArchive(file.path.clone()),
        })
        .collect()
}

/// One synchronization pass over a package root
pub struct Synchronizer<'a> {
    pub root: &'a Path,
    pub recursive: bool,
    pub ignore_symbols: bool,
    pub reader: &'a dyn PackageReader,
    pub hasher: &'a HashProvider,
}

impl Synchronizer<'_> {
    /// Build the new record set from `cached` and the directory contents.
    ///
    /// Per-file failures are logged and the file skipped. Returns
    /// [`Error::Cancelled`] as soon as `cancel` fires.
    pub fn run(&self, cached: &PackageSet, cancel: &CancellationToken) -> Result<(PackageSet, SyncStats)> {
        let files = discover_packages(self.root, self.recursive)?;
        let sources = plan_sources(cached, &files);

        let mut stats = SyncStats {
            discovered: files.len(),
            ..Default::default()
        };
        let mut records = Vec::with_capacity(sources.len());

        for source in sources {
            if cancel.is_cancelled() {
                info!("Synchronization of {} cancelled", self.root.display());
                return Err(Error::Cancelled);
            }

            let record = match source {
                PackageSource::FromCache(record) => {
                    if self.ignore_symbols && record.is_symbols_package {
                        debug!("Ignoring symbols package {}", record.full_path.display());
                        stats.skipped += 1;
                        continue;
                    }
                    stats.reused += 1;
                    self.refresh_cached(&record)
                }
                PackageSource::FromArchive(path) => match self.index_file(&path) {
                    Ok(Some(record)) => {
                        stats.indexed += 1;
                        record
                    }
                    Ok(None) => {
                        stats.skipped += 1;
                        continue;
                    }
                    Err(e) => {
                        warn!("Skipping package {}: {}", path.display(), e);
                        stats.skipped += 1;
                        continue;
                    }
                },
            };

            records.push(record);
        }

        let set = PackageSet::from_records(records);
        stats.removed = cached
            .iter()
            .filter(|record| set.get(&record.id, &record.version).is_none())
            .count();

        info!("Synchronized {}: {}", self.root.display(), stats);
        Ok((set, stats))
    }

    /// Reuse a cached record, picking up a marker added or removed by hand
    fn refresh_cached(&self, record: &Arc<PackageRecord>) -> PackageRecord {
        let mut record = PackageRecord::clone(record);
        record.listed = !delisted_marker_path(&record.full_path).exists();
        record
    }

    fn index_file(&self, path: &Path) -> Result<Option<PackageRecord>> {
        let archive = self.reader.open(path)?;
        if self.ignore_symbols && archive.is_symbols_package() {
            debug!("Ignoring symbols package {}", path.display());
            return Ok(None);
        }
        let record = index_archive(&archive, self.hasher)?;
        debug!("Indexed {} {} from {}", record.id, record.version, path.display());
        Ok(Some(record))
    }
}
