// src/lib.rs

//! NuGet Feed
//!
//! Self-hosted NuGet package feed backed by a plain directory of `.nupkg`
//! files.
//!
//! # Architecture
//!
//! - Directory-first: the package directory is the source of truth, the
//!   in-memory cache and its JSON snapshot are derived and rebuildable
//! - Copy-on-write snapshots: readers never block on a rebuild
//! - Soft delete: delisting writes a marker file next to the package
//! - Latest flags: each id group carries its absolute and stable latest
//!   version, recomputed on every mutation

mod error;
pub mod framework;
pub mod hash;
pub mod latest;
pub mod package;
pub mod repository;
pub mod settings;
pub mod store;
pub mod version;

#[cfg(feature = "server")]
pub mod server;

pub use error::{Error, Result};
pub use framework::{Framework, FrameworkFamily};
pub use hash::{HashAlgorithm, HashProvider};
pub use package::{PackageIdentity, PackageKey, PackageRecord};
pub use repository::{
    RepositoryOptions, SearchOptions, ServerPackageRepository, SyncStats, UpdateRequest,
};
pub use settings::{FeedSettings, SettingValue, SettingsProvider};
pub use store::{PackageSet, PackageStore};
pub use version::{NuGetVersion, VersionRange};
