//! Test fixtures.
//!
//! Provides seeded clusters, hosts and lock directories for common test
//! scenarios.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rbdsync_cluster::InMemoryCluster;
use rbdsync_host::InMemoryHost;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A production and a backup cluster that share nothing.
#[derive(Debug, Clone, Default)]
pub struct TestClusters {
    /// The production (source) cluster.
    pub production: InMemoryCluster,
    /// The backup (destination) cluster.
    pub backup: InMemoryCluster,
}

impl TestClusters {
    /// Creates two empty clusters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an image to the production cluster.
    pub fn production(self, image: &str, snapshots: &[&str]) -> Self {
        self.production.add_image(image, snapshots);
        self
    }

    /// Adds an image to the backup cluster.
    pub fn backup(self, image: &str, snapshots: &[&str]) -> Self {
        self.backup.add_image(image, snapshots);
        self
    }

    /// Adds an image with the same history to both clusters.
    pub fn replicated(self, image: &str, snapshots: &[&str]) -> Self {
        self.production(image, snapshots).backup(image, snapshots)
    }

    /// Maps a production image on this host as `device`.
    pub fn mapped(self, image: &str, device: &str) -> Self {
        self.production.map_device(image, device);
        self
    }

    /// Returns an image's backup history, or an empty list if it is missing.
    pub fn backup_history(&self, image: &str) -> Vec<String> {
        self.backup.snapshots(image).unwrap_or_default()
    }
}

/// A temporary directory for lock markers, removed on drop.
pub struct TempLockDir {
    dir: TempDir,
}

impl TempLockDir {
    /// Creates a new empty directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the names of the markers currently in the directory.
    pub fn markers(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dir.path())
            .expect("Failed to read lock directory")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Creates a marker file, as a crashed run would leave behind.
    pub fn plant(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"").expect("Failed to write marker");
        path
    }
}

impl Default for TempLockDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates a host with the given `(device, mountpoint)` pairs mounted.
pub fn mounted_host(mounts: &[(&str, &str)]) -> InMemoryHost {
    mounts
        .iter()
        .fold(InMemoryHost::new(), |host, (device, mountpoint)| {
            host.with_mount(device, *mountpoint)
        })
}

/// Shorthand for a calendar date.
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("Invalid date")
}

/// Shorthand for a date at a whole hour.
pub fn date_at(year: i32, month: u32, day: u32, hour: u32) -> NaiveDateTime {
    date(year, month, day).and_time(NaiveTime::from_hms_opt(hour, 0, 0).expect("Invalid hour"))
}
