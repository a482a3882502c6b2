// tests/sync.rs

//! Directory synchronization tests: incremental reuse, change detection, cancellation.

mod common;

use common::{NupkgBuilder, open_repository, repository_with_reader, settings, temp_repository};
use filetime::FileTime;
use nuget_feed::package::{NupkgReader, PackageArchive, PackageReader};
use nuget_feed::repository::{RepositoryOptions, ServerPackageRepository};
use nuget_feed::{Error, NuGetVersion};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn v(s: &str) -> NuGetVersion {
    NuGetVersion::parse(s).unwrap()
}

#[tokio::test]
async fn test_sync_twice_is_idempotent() {
    let (temp_dir, repository) = temp_repository(settings(&[]));
    NupkgBuilder::new("Alpha", "1.0.0").write_to(temp_dir.path());
    NupkgBuilder::new("Alpha", "1.1.0-pre").write_to(temp_dir.path());
    NupkgBuilder::new("Beta", "2.0.0").write_to(temp_dir.path());

    let first = repository.synchronize(CancellationToken::new()).await.unwrap();
    assert_eq!(first.discovered, 3);
    assert_eq!(first.indexed, 3);
    let before = repository.get_packages().await.unwrap();

    let second = repository.synchronize(CancellationToken::new()).await.unwrap();
    assert_eq!(second.reused, 3);
    assert_eq!(second.indexed, 0);
    assert_eq!(second.removed, 0);
    let after = repository.get_packages().await.unwrap();

    let summary = |set: &nuget_feed::PackageSet| {
        set.iter()
            .map(|r| {
                (
                    r.id.clone(),
                    r.version.clone(),
                    r.package_hash.clone(),
                    r.is_latest_version,
                    r.is_absolute_latest_version,
                )
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(summary(&before), summary(&after));
}

#[tokio::test]
async fn test_changed_mtime_is_reindexed() {
    let (temp_dir, repository) = temp_repository(settings(&[]));
    let path = NupkgBuilder::new("Touched", "1.0.0").write_to(temp_dir.path());
    NupkgBuilder::new("Untouched", "1.0.0").write_to(temp_dir.path());
    repository.synchronize(CancellationToken::new()).await.unwrap();

    NupkgBuilder::new("Touched", "1.0.0")
        .description("rebuilt in place")
        .write_as(&path);
    filetime::set_file_mtime(&path, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

    let stats = repository.synchronize(CancellationToken::new()).await.unwrap();
    assert_eq!(stats.indexed, 1);
    assert_eq!(stats.reused, 1);

    let record = repository
        .find_package_version("Touched", &v("1.0.0"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.description, "rebuilt in place");
    assert_eq!(record.last_updated.timestamp(), 1_600_000_000);
}

#[tokio::test]
async fn test_removed_files_are_dropped() {
    let (temp_dir, repository) = temp_repository(settings(&[]));
    let doomed = NupkgBuilder::new("Doomed", "1.0.0").write_to(temp_dir.path());
    NupkgBuilder::new("Doomed", "0.9.0").write_to(temp_dir.path());
    repository.synchronize(CancellationToken::new()).await.unwrap();

    std::fs::remove_file(&doomed).unwrap();
    let stats = repository.synchronize(CancellationToken::new()).await.unwrap();
    assert_eq!(stats.removed, 1);

    let remaining = repository.find_packages_by_id("Doomed").await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].version, v("0.9.0"));
    assert!(remaining[0].is_latest_version);
    assert!(remaining[0].is_absolute_latest_version);
}

#[tokio::test]
async fn test_broken_archive_is_skipped() {
    let (temp_dir, repository) = temp_repository(settings(&[]));
    std::fs::write(temp_dir.path().join("Broken.1.0.0.nupkg"), b"not a zip").unwrap();
    NupkgBuilder::new("Healthy", "1.0.0").write_to(temp_dir.path());

    let stats = repository.synchronize(CancellationToken::new()).await.unwrap();
    assert_eq!(stats.discovered, 2);
    assert_eq!(stats.indexed, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(repository.get_packages().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_recursive_and_flat_scans() {
    let temp_dir = tempfile::tempdir().unwrap();
    NupkgBuilder::new("Top", "1.0.0").write_to(temp_dir.path());
    NupkgBuilder::new("Nested", "1.0.0").write_to(&temp_dir.path().join("nested").join("deeper"));

    let recursive = open_repository(temp_dir.path(), settings(&[]));
    assert_eq!(recursive.get_packages().await.unwrap().len(), 2);

    let mut options = RepositoryOptions::new(temp_dir.path());
    options.recursive = false;
    options.cache_file = temp_dir.path().join("flat.cache.json");
    let flat = ServerPackageRepository::new(options, settings(&[]).into_provider());
    let packages = flat.get_packages().await.unwrap();
    assert_eq!(packages.len(), 1);
    assert!(packages.get("Top", &v("1.0.0")).is_some());
}

#[tokio::test]
async fn test_missing_root_is_empty_feed() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path().join("not-created-yet");
    let mut options = RepositoryOptions::new(&root);
    options.cache_file = temp_dir.path().join("cache.json");
    let repository = ServerPackageRepository::new(options, settings(&[]).into_provider());

    assert!(repository.get_packages().await.unwrap().is_empty());
    assert!(repository.find_package("Anything").await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancelled_sync_leaves_cache_stale() {
    let (temp_dir, repository) = temp_repository(settings(&[]));
    NupkgBuilder::new("Later", "1.0.0").write_to(temp_dir.path());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = repository.synchronize(cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled), "got {err:?}");

    // The cancelled pass did not mark the cache fresh
    assert_eq!(repository.get_packages().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_readers_share_one_sync() {
    let (temp_dir, repository) = temp_repository(settings(&[]));
    for minor in 0..5 {
        NupkgBuilder::new("Shared", &format!("1.{}.0", minor)).write_to(temp_dir.path());
    }

    let readers: Vec<_> = (0..6)
        .map(|_| {
            let repository = repository.clone();
            tokio::spawn(async move { repository.find_packages_by_id("Shared").await })
        })
        .collect();
    for reader in readers {
        assert_eq!(reader.await.unwrap().unwrap().len(), 5);
    }

    let stats = repository.synchronize(CancellationToken::new()).await.unwrap();
    assert_eq!(stats.reused, 5);
}

/// Slow reader that records how many opens ever ran at the same time
#[derive(Default)]
struct OverlapCountingReader {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl PackageReader for OverlapCountingReader {
    fn open(&self, path: &Path) -> nuget_feed::Result<PackageArchive> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(100));
        let result = NupkgReader.open(path);
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[tokio::test]
async fn test_abandoned_sync_still_blocks_the_next_one() {
    let temp_dir = tempfile::tempdir().unwrap();
    for minor in 0..4 {
        NupkgBuilder::new("Slow", &format!("1.{}.0", minor)).write_to(temp_dir.path());
    }
    let reader = Arc::new(OverlapCountingReader::default());
    let repository = repository_with_reader(temp_dir.path(), settings(&[]), reader.clone());

    // The first access starts a sync; its caller goes away mid-pass
    let abandoned = {
        let repository = repository.clone();
        tokio::spawn(async move { repository.get_packages().await })
    };
    tokio::time::sleep(Duration::from_millis(150)).await;
    abandoned.abort();
    let _ = abandoned.await;

    let stats = repository.synchronize(CancellationToken::new()).await.unwrap();
    assert_eq!(reader.peak.load(Ordering::SeqCst), 1);
    // The abandoned pass ran to completion before this one started
    assert_eq!(stats.reused, 4);
    assert_eq!(stats.indexed, 0);
}
