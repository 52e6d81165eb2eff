//! Configuration for backup runs.

use crate::error::{BackupError, BackupResult};
use chrono::NaiveTime;
use rbdsync_cluster::RbdCredentials;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How the status checker decides whether a backup is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckPolicy {
    /// The backup's latest snapshot is one of the production image's two
    /// most recent snapshots. Does not depend on the time of day.
    LatestTwo,
    /// Before `check_threshold`, the anchor (previous period) snapshot must
    /// exist on both clusters; from then on, today's snapshot must.
    Threshold,
}

/// Configuration for snapshot, replicate and check runs.
///
/// Every component receives the values it needs from here at construction;
/// nothing is read from global state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Credentials for the production (source) cluster.
    pub production: RbdCredentials,
    /// Credentials for the backup (destination) cluster.
    pub backup: RbdCredentials,
    /// Day-boundary policy: replication expects labels this many hours
    /// (in whole days) behind the wall-clock date.
    pub stamp_offset_hours: u32,
    /// Only snapshot volumes that are mounted on this host.
    pub snapshot_mounted_only: bool,
    /// Up-to-date policy for `check`.
    pub check_policy: CheckPolicy,
    /// Time of day at which the threshold policy switches expectations.
    pub check_threshold: NaiveTime,
    /// Directory holding per-volume lock markers.
    pub lock_dir: PathBuf,
    /// File name prefix of lock markers.
    pub lock_prefix: String,
    /// Size given to newly created destination images. The backend grows
    /// them on import.
    pub initial_volume_size_mb: u64,
    /// Log mutations instead of running them.
    pub dry_run: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            production: RbdCredentials::new(
                "/etc/ceph/ceph.conf",
                "/etc/ceph/ceph.client.rbd.keyring",
                "rbd",
            ),
            backup: RbdCredentials::new(
                "/etc/ceph/ceph-backup.conf",
                "/etc/ceph/ceph.client.rbd_backup.keyring",
                "rbd_backup",
            ),
            stamp_offset_hours: 0,
            snapshot_mounted_only: true,
            check_policy: CheckPolicy::LatestTwo,
            check_threshold: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            lock_dir: PathBuf::from("/var/lock"),
            lock_prefix: String::from("rbdsync-replicate-"),
            initial_volume_size_mb: 1,
            dry_run: false,
        }
    }
}

impl BackupConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a TOML or JSON file.
    ///
    /// Missing keys take their default values.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed,
    /// or has an unsupported extension.
    pub fn from_file(path: &Path) -> BackupResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            BackupError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents).map_err(|e| {
                BackupError::configuration(format!("invalid {}: {}", path.display(), e))
            }),
            "json" => serde_json::from_str(&contents).map_err(|e| {
                BackupError::configuration(format!("invalid {}: {}", path.display(), e))
            }),
            _ => Err(BackupError::configuration(format!(
                "unsupported config file extension: {:?}",
                ext
            ))),
        }
    }

    /// Checks the configuration for values that cannot work.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first problem found.
    pub fn validate(&self) -> BackupResult<()> {
        if self.production == self.backup {
            return Err(BackupError::configuration(
                "production and backup clusters use identical credentials",
            ));
        }
        if self.lock_dir.as_os_str().is_empty() {
            return Err(BackupError::configuration("lock_dir is empty"));
        }
        if self.lock_prefix.is_empty() || self.lock_prefix.contains('/') {
            return Err(BackupError::configuration(
                "lock_prefix must be a non-empty file name prefix",
            ));
        }
        if self.initial_volume_size_mb == 0 {
            return Err(BackupError::configuration(
                "initial_volume_size_mb must be at least 1",
            ));
        }
        Ok(())
    }

    /// Sets the day-boundary offset in hours.
    #[must_use]
    pub fn with_stamp_offset_hours(mut self, hours: u32) -> Self {
        self.stamp_offset_hours = hours;
        self
    }

    /// Sets whether only mounted volumes are snapshotted.
    #[must_use]
    pub fn with_snapshot_mounted_only(mut self, value: bool) -> Self {
        self.snapshot_mounted_only = value;
        self
    }

    /// Sets the check policy.
    #[must_use]
    pub fn with_check_policy(mut self, policy: CheckPolicy) -> Self {
        self.check_policy = policy;
        self
    }

    /// Sets the threshold time for the threshold check policy.
    #[must_use]
    pub fn with_check_threshold(mut self, time: NaiveTime) -> Self {
        self.check_threshold = time;
        self
    }

    /// Sets the lock marker directory.
    #[must_use]
    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = dir.into();
        self
    }

    /// Sets the size of newly created destination images.
    #[must_use]
    pub fn with_initial_volume_size_mb(mut self, size_mb: u64) -> Self {
        self.initial_volume_size_mb = size_mb;
        self
    }

    /// Sets dry-run mode.
    #[must_use]
    pub fn with_dry_run(mut self, value: bool) -> Self {
        self.dry_run = value;
        self
    }
}
