// src/store/mod.rs

//! Package metadata cache
//!
//! Holds the in-memory record set as an immutable snapshot behind a lock:
//! readers clone the `Arc` and work on a consistent point-in-time view,
//! writers build the next set (copy-on-write) and swap it in. The set is
//! persisted as a JSON array next to the package directory so a restart
//! does not have to re-open every archive.

use crate::error::Result;
use crate::latest::{VersionGroup, update_latest_flags};
use crate::package::{PackageRecord, normalize_id};
use crate::version::NuGetVersion;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Immutable view of every cached record, grouped by lowercased id
#[derive(Debug, Clone, Default)]
pub struct PackageSet {
    groups: BTreeMap<String, Arc<VersionGroup>>,
    len: usize,
}

impl PackageSet {
    /// Build a set from loose records, recomputing latest flags.
    ///
    /// Duplicate id + version pairs keep the first record seen.
    pub fn from_records(records: impl IntoIterator<Item = PackageRecord>) -> Self {
        let mut groups: BTreeMap<String, VersionGroup> = BTreeMap::new();
        let mut len = 0;

        for record in records {
            let group = groups.entry(normalize_id(&record.id)).or_default();
            if group.contains_key(&record.version) {
                warn!(
                    "Ignoring duplicate record for {} {} ({})",
                    record.id,
                    record.version,
                    record.full_path.display()
                );
                continue;
            }
            group.insert(record.version.clone(), Arc::new(record));
            len += 1;
        }

        let groups = groups
            .into_iter()
            .map(|(id, mut group)| {
                update_latest_flags(&mut group);
                (id, Arc::new(group))
            })
            .collect();

        Self { groups, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Every record, ordered by id then ascending version
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PackageRecord>> {
        self.groups.values().flat_map(|group| group.values())
    }

    /// Every version of one id, ascending
    pub fn versions_of(&self, id: &str) -> impl DoubleEndedIterator<Item = &Arc<PackageRecord>> {
        self.groups
            .get(&normalize_id(id))
            .into_iter()
            .flat_map(|group| group.values())
    }

    pub fn get(&self, id: &str, version: &NuGetVersion) -> Option<&Arc<PackageRecord>> {
        self.groups.get(&normalize_id(id))?.get(version)
    }

    /// Insert or replace a record and recompute its id's flags
    pub fn insert(&mut self, record: PackageRecord) -> Option<Arc<PackageRecord>> {
        let group = Arc::make_mut(self.groups.entry(normalize_id(&record.id)).or_default());
        let previous = group.insert(record.version.clone(), Arc::new(record));
        update_latest_flags(group);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Remove a record and recompute the flags of what remains
    pub fn remove(&mut self, id: &str, version: &NuGetVersion) -> Option<Arc<PackageRecord>> {
        let id = normalize_id(id);
        let group = Arc::make_mut(self.groups.get_mut(&id)?);
        let removed = group.remove(version)?;
        update_latest_flags(group);
        if group.is_empty() {
            self.groups.remove(&id);
        }
        self.len -= 1;
        Some(removed)
    }

    /// Apply `f` to one record in place; returns false if it is absent
    pub fn modify(
        &mut self,
        id: &str,
        version: &NuGetVersion,
        f: impl FnOnce(&mut PackageRecord),
    ) -> bool {
        let Some(group) = self.groups.get_mut(&normalize_id(id)) else {
            return false;
        };
        let group = Arc::make_mut(group);
        let Some(record) = group.get_mut(version) else {
            return false;
        };
        f(Arc::make_mut(record));
        update_latest_flags(group);
        true
    }
}

/// Shared, persisted package metadata cache
pub struct PackageStore {
    snapshot_path: PathBuf,
    current: RwLock<Arc<PackageSet>>,
}

impl PackageStore {
    /// Open the store, loading the persisted snapshot if there is one
    pub fn open(snapshot_path: impl Into<PathBuf>) -> Self {
        let snapshot_path = snapshot_path.into();
        let set = Self::load(&snapshot_path);
        Self {
            snapshot_path,
            current: RwLock::new(Arc::new(set)),
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Current point-in-time view
    pub fn get_all(&self) -> Arc<PackageSet> {
        Arc::clone(&self.current.read())
    }

    pub fn add(&self, record: PackageRecord) -> Option<Arc<PackageRecord>> {
        self.update(|set| set.insert(record))
    }

    pub fn remove(&self, id: &str, version: &NuGetVersion) -> Option<Arc<PackageRecord>> {
        self.update(|set| set.remove(id, version))
    }

    /// Mutate the set; readers see either the old or the new state
    pub fn update<T>(&self, f: impl FnOnce(&mut PackageSet) -> T) -> T {
        let mut guard = self.current.write();
        // Clones only when a reader still holds the current snapshot
        f(Arc::make_mut(&mut guard))
    }

    /// Swap in an entirely new set
    pub fn replace_all(&self, set: PackageSet) {
        *self.current.write() = Arc::new(set);
    }

    /// Drop the in-memory set and the persisted snapshot
    pub fn clear(&self) -> Result<()> {
        self.replace_all(PackageSet::default());
        match std::fs::remove_file(&self.snapshot_path) {
            Ok(()) => {
                info!("Removed cache snapshot {}", self.snapshot_path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the current set to the snapshot file (atomically, via rename)
    pub fn persist(&self) -> Result<()> {
        let set = self.get_all();
        let records: Vec<&PackageRecord> = set.iter().map(|r| r.as_ref()).collect();
        let json = serde_json::to_vec_pretty(&records)?;

        if let Some(parent) = self.snapshot_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut temp_name = self.snapshot_path.as_os_str().to_os_string();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        std::fs::write(&temp_path, json)?;
        std::fs::rename(&temp_path, &self.snapshot_path)?;

        debug!(
            "Persisted {} records to {}",
            records.len(),
            self.snapshot_path.display()
        );
        Ok(())
    }

    /// Read a snapshot file.
    ///
    /// A missing file yields an empty set. A file that fails to parse is
    /// logged, deleted, and also yields an empty set; the next directory
    /// synchronization rebuilds it.
    pub fn load(path: &Path) -> PackageSet {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No cache snapshot at {}", path.display());
                return PackageSet::default();
            }
            Err(e) => {
                warn!("Failed to read cache snapshot {}: {}", path.display(), e);
                return PackageSet::default();
            }
        };

        match serde_json::from_slice::<Vec<PackageRecord>>(&bytes) {
            Ok(records) => {
                let set = PackageSet::from_records(records);
                info!("Loaded {} cached records from {}", set.len(), path.display());
                set
            }
            Err(e) => {
                warn!(
                    "Cache snapshot {} is corrupt ({}); discarding it",
                    path.display(),
                    e
                );
                if let Err(e) = std::fs::remove_file(path) {
                    warn!("Failed to delete corrupt snapshot {}: {}", path.display(), e);
                }
                PackageSet::default()
            }
        }
    }
}
