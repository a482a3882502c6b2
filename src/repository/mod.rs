// src/repository/mod.rs

//! Server package repository
//!
//! Owns the package directory and the metadata cache in front of it.
//! Reads are served from an immutable snapshot of the cache; every
//! mutation (push, delete, relist, cache clear, directory sync) runs under
//! a single async mutex so at most one of them touches the directory at a
//! time. The first access after startup, or after a cache clear,
//! synchronizes the cache with the directory.

mod query;
mod sync;

pub use query::{QueryPolicy, SearchOptions, UpdateRequest};
pub use sync::{SyncStats, Synchronizer, discover_packages, index_archive};

use crate::error::{Error, Result};
use crate::hash::{HashAlgorithm, HashProvider};
use crate::package::{
    NupkgReader, PackageReader, PackageRecord, delisted_marker_path, package_file_name,
};
use crate::settings::{
    ALLOW_OVERRIDE_EXISTING_PACKAGE_ON_PUSH, ENABLE_DELISTING, ENABLE_FRAMEWORK_FILTERING,
    IGNORE_SYMBOLS_PACKAGES, SettingsProvider,
};
use crate::store::{PackageSet, PackageStore};
use crate::version::NuGetVersion;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where and how the repository stores packages
#[derive(Debug, Clone)]
pub struct RepositoryOptions {
    /// Directory holding the `.nupkg` files
    pub packages_path: PathBuf,
    /// Persisted cache snapshot
    pub cache_file: PathBuf,
    /// Scan subdirectories of `packages_path`
    pub recursive: bool,
    pub hash_algorithm: HashAlgorithm,
}

impl RepositoryOptions {
    /// Defaults for a package directory: recursive scan, SHA512, snapshot
    /// stored inside the directory
    pub fn new(packages_path: impl Into<PathBuf>) -> Self {
        let packages_path = packages_path.into();
        Self {
            cache_file: packages_path.join("nuget-feed.cache.json"),
            packages_path,
            recursive: true,
            hash_algorithm: HashAlgorithm::default(),
        }
    }
}

struct Inner {
    root: PathBuf,
    recursive: bool,
    store: PackageStore,
    reader: Arc<dyn PackageReader>,
    hasher: HashProvider,
    settings: Arc<dyn SettingsProvider>,
    write_lock: Arc<Mutex<()>>,
    needs_sync: AtomicBool,
}

/// Cloneable handle to the repository
#[derive(Clone)]
pub struct ServerPackageRepository {
    inner: Arc<Inner>,
}

impl ServerPackageRepository {
    /// Repository reading `.nupkg` files with the default zip reader
    pub fn new(options: RepositoryOptions, settings: Arc<dyn SettingsProvider>) -> Self {
        Self::with_reader(options, settings, Arc::new(NupkgReader))
    }

    pub fn with_reader(
        options: RepositoryOptions,
        settings: Arc<dyn SettingsProvider>,
        reader: Arc<dyn PackageReader>,
    ) -> Self {
        info!(
            "Package repository at {} (snapshot {})",
            options.packages_path.display(),
            options.cache_file.display()
        );
        Self {
            inner: Arc::new(Inner {
                root: options.packages_path,
                recursive: options.recursive,
                store: PackageStore::open(options.cache_file),
                reader,
                hasher: HashProvider::new(options.hash_algorithm),
                settings,
                write_lock: Arc::new(Mutex::new(())),
                needs_sync: AtomicBool::new(true),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    fn policy(&self) -> QueryPolicy {
        QueryPolicy {
            enable_delisting: self.inner.settings.get_bool(ENABLE_DELISTING, false),
            enable_framework_filtering: self
                .inner
                .settings
                .get_bool(ENABLE_FRAMEWORK_FILTERING, false),
        }
    }

    // -- Queries ----------------------------------------------------------

    /// Synchronized point-in-time view of every record
    pub async fn get_packages(&self) -> Result<Arc<PackageSet>> {
        self.ensure_synced().await?;
        Ok(self.inner.store.get_all())
    }

    /// Default version of an id: highest listed stable, else highest
    /// listed prerelease
    pub async fn find_package(&self, id: &str) -> Result<Option<Arc<PackageRecord>>> {
        let set = self.get_packages().await?;
        Ok(query::find_latest(&set, id, self.policy()))
    }

    /// Exact lookup; unlisted packages are returned too
    pub async fn find_package_version(
        &self,
        id: &str,
        version: &NuGetVersion,
    ) -> Result<Option<Arc<PackageRecord>>> {
        let set = self.get_packages().await?;
        Ok(query::find_exact(&set, id, version))
    }

    pub async fn find_packages_by_id(&self, id: &str) -> Result<Vec<Arc<PackageRecord>>> {
        let set = self.get_packages().await?;
        Ok(query::find_by_id(&set, id))
    }

    pub async fn search(&self, options: &SearchOptions) -> Result<Vec<Arc<PackageRecord>>> {
        let set = self.get_packages().await?;
        Ok(query::search(&set, options, self.policy()))
    }

    pub async fn get_updates(&self, request: &UpdateRequest) -> Result<Vec<Arc<PackageRecord>>> {
        let set = self.get_packages().await?;
        Ok(query::get_updates(&set, request, self.policy()))
    }

    // -- Synchronization --------------------------------------------------

    /// Synchronize once if the cache is stale; concurrent callers wait for
    /// the same pass instead of scanning again
    pub async fn ensure_synced(&self) -> Result<()> {
        if !self.inner.needs_sync.load(Ordering::Acquire) {
            return Ok(());
        }
        self.run_locked(|inner| {
            if inner.needs_sync.load(Ordering::Acquire) {
                inner.synchronize(&CancellationToken::new())?;
            }
            Ok(())
        })
        .await
    }

    /// Incremental pass against the directory, regardless of staleness
    pub async fn synchronize(&self, cancel: CancellationToken) -> Result<SyncStats> {
        self.run_locked(move |inner| inner.synchronize(&cancel)).await
    }

    /// Drop the in-memory set and the snapshot; the next access rebuilds
    pub async fn clear_cache(&self) -> Result<()> {
        self.run_locked(|inner| {
            inner.needs_sync.store(true, Ordering::Release);
            inner.store.clear()
        })
        .await?;
        info!("Package cache cleared");
        Ok(())
    }

    /// Clear the cache and rebuild it from the directory right away.
    ///
    /// On cancellation the cache stays empty and stale, and the next
    /// access starts over.
    pub async fn clear_cache_and_rebuild(&self, cancel: CancellationToken) -> Result<SyncStats> {
        self.run_locked(move |inner| {
            inner.needs_sync.store(true, Ordering::Release);
            inner.store.clear()?;
            inner.synchronize(&cancel)
        })
        .await
    }

    // -- Mutations --------------------------------------------------------

    /// Push a package from raw archive bytes
    pub async fn add_package_bytes(&self, bytes: Vec<u8>) -> Result<Arc<PackageRecord>> {
        let root = self.inner.root.clone();
        let upload = tokio::task::spawn_blocking(move || write_upload(&root, &bytes)).await??;
        self.add_package(upload).await
    }

    /// Push a package from an upload file.
    ///
    /// The upload is moved into place on success and deleted on failure.
    pub async fn add_package(&self, upload: PathBuf) -> Result<Arc<PackageRecord>> {
        self.ensure_synced().await?;
        self.run_locked(move |inner| {
            let result = inner.install_upload(&upload);
            if let Err(e) = std::fs::remove_file(&upload)
                && e.kind() != ErrorKind::NotFound
            {
                warn!("Failed to remove upload {}: {}", upload.display(), e);
            }
            result
        })
        .await
    }

    /// Delete (or delist, when delisting is enabled) one package
    pub async fn remove_package(&self, id: &str, version: &NuGetVersion) -> Result<()> {
        self.ensure_synced().await?;
        let (id, version) = (id.to_string(), version.clone());
        self.run_locked(move |inner| inner.remove_package(&id, &version)).await
    }

    /// Make a delisted package visible again
    pub async fn relist_package(&self, id: &str, version: &NuGetVersion) -> Result<()> {
        self.ensure_synced().await?;
        let (id, version) = (id.to_string(), version.clone());
        self.run_locked(move |inner| inner.relist_package(&id, &version)).await
    }

    /// Run `work` on the blocking pool under the write lock.
    ///
    /// The guard moves into the blocking task, so the lock stays held until
    /// the work finishes even if the calling future is dropped.
    async fn run_locked<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T> + Send + 'static,
    {
        let guard = Arc::clone(&self.inner.write_lock).lock_owned().await;
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            work(&inner)
        })
        .await?
    }
}

/// Write pushed bytes to a temp file inside `root` (same filesystem, so
/// the later move into place is a rename)
fn write_upload(root: &Path, bytes: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(root)?;
    let mut temp = tempfile::Builder::new()
        .prefix(".upload-")
        .suffix(".tmp")
        .tempfile_in(root)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    let path = temp.into_temp_path().keep().map_err(|e| e.error)?;
    Ok(path)
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

impl Inner {
    fn synchronize(&self, cancel: &CancellationToken) -> Result<SyncStats> {
        let synchronizer = Synchronizer {
            root: &self.root,
            recursive: self.recursive,
            ignore_symbols: self.settings.get_bool(IGNORE_SYMBOLS_PACKAGES, false),
            reader: self.reader.as_ref(),
            hasher: &self.hasher,
        };

        let cached = self.store.get_all();
        let (set, stats) = synchronizer.run(&cached, cancel)?;
        self.store.replace_all(set);
        self.needs_sync.store(false, Ordering::Release);
        self.persist();
        Ok(stats)
    }

    /// Snapshot write failures are logged, never returned
    fn persist(&self) {
        if let Err(e) = self.store.persist() {
            warn!(
                "Failed to persist cache snapshot {}: {}",
                self.store.snapshot_path().display(),
                e
            );
        }
    }

    fn install_upload(&self, upload: &Path) -> Result<Arc<PackageRecord>> {
        let archive = self.reader.open(upload)?;
        let manifest = archive.manifest();
        let (id, version) = (manifest.id.clone(), manifest.version.clone());

        if archive.is_symbols_package() && self.settings.get_bool(IGNORE_SYMBOLS_PACKAGES, false) {
            return Err(Error::InvalidPackage(format!(
                "{} {} is a symbols package and symbols packages are not accepted",
                id, version
            )));
        }

        let existing = self.store.get_all().get(&id, &version).cloned();
        if existing.is_some()
            && !self
                .settings
                .get_bool(ALLOW_OVERRIDE_EXISTING_PACKAGE_ON_PUSH, false)
        {
            return Err(Error::DuplicatePackage {
                id,
                version: version.to_normalized_string(),
            });
        }

        // Index the upload before it replaces anything on disk
        let mut record = index_archive(&archive, &self.hasher)?;
        let target = self.root.join(package_file_name(&id, &version));
        std::fs::rename(upload, &target)?;
        record.full_path = target.clone();

        if let Some(existing) = &existing
            && existing.full_path != target
        {
            // Same package stored under another name (id casing, subfolder)
            if let Err(e) = remove_if_exists(&existing.full_path) {
                warn!("Failed to remove replaced {}: {}", existing.full_path.display(), e);
            }
            if let Err(e) = remove_if_exists(&delisted_marker_path(&existing.full_path)) {
                warn!("Failed to remove marker for {}: {}", existing.full_path.display(), e);
            }
        }
        let marker = delisted_marker_path(&target);
        if let Err(e) = remove_if_exists(&marker) {
            warn!("Failed to remove marker for {}: {}", target.display(), e);
        }
        record.listed = !marker.exists();

        let stored = self.store.update(|set| {
            set.insert(record);
            set.get(&id, &version).cloned()
        });
        self.persist();

        info!("Added package {} {}", id, version);
        stored.ok_or_else(|| Error::Task(format!("{} {} vanished after insert", id, version)))
    }

    fn remove_package(&self, id: &str, version: &NuGetVersion) -> Result<()> {
        let record = self
            .store
            .get_all()
            .get(id, version)
            .cloned()
            .ok_or_else(|| Error::PackageNotFound {
                id: id.to_string(),
                version: version.to_normalized_string(),
            })?;

        if self.settings.get_bool(ENABLE_DELISTING, false) {
            std::fs::write(delisted_marker_path(&record.full_path), b"")?;
            self.store
                .update(|set| set.modify(id, version, |r| r.listed = false));
            info!("Delisted package {} {}", record.id, record.version);
        } else {
            // A failed delete leaves the record in place
            remove_if_exists(&record.full_path)?;
            if let Err(e) = remove_if_exists(&delisted_marker_path(&record.full_path)) {
                warn!("Failed to remove marker for {}: {}", record.full_path.display(), e);
            }
            self.store.remove(id, version);
            info!("Deleted package {} {}", record.id, record.version);
        }

        self.persist();
        Ok(())
    }

    fn relist_package(&self, id: &str, version: &NuGetVersion) -> Result<()> {
        let record = self
            .store
            .get_all()
            .get(id, version)
            .cloned()
            .ok_or_else(|| Error::PackageNotFound {
                id: id.to_string(),
                version: version.to_normalized_string(),
            })?;

        if record.listed {
            debug!("Package {} {} is already listed", record.id, record.version);
            return Ok(());
        }

        remove_if_exists(&delisted_marker_path(&record.full_path))?;
        self.store
            .update(|set| set.modify(id, version, |r| r.listed = true));
        self.persist();

        info!("Relisted package {} {}", record.id, record.version);
        Ok(())
    }
}
