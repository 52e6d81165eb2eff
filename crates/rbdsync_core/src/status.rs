//! Backup freshness checks for monitoring.
//!
//! The checker is read-only. Its report renders as a single status line
//! (plus one line per error when there are several) in the format monitoring
//! plugins expect, and maps to the plugin exit codes.

use crate::config::{BackupConfig, CheckPolicy};
use crate::error::{BackupError, BackupResult, ClusterRole, VolumeFailure};
use crate::stamp::SnapshotNamer;
use chrono::{Local, NaiveDateTime};
use rbdsync_cluster::StorageCluster;
use std::fmt;
use tracing::{debug, info};

/// Exit code when every backup is current.
pub const EXIT_OK: u8 = 0;
/// Exit code when at least one backup is missing or stale.
pub const EXIT_ERROR: u8 = 2;
/// Exit code when the check itself could not run.
pub const EXIT_UNKNOWN: u8 = 3;

/// Which volumes a check covered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckScope {
    /// Every production volume.
    All,
    /// A single named volume.
    Image(String),
}

/// Result of a status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    /// Which volumes were checked.
    pub scope: CheckScope,
    /// One message per failing volume, in listing order.
    pub errors: Vec<String>,
}

impl CheckReport {
    /// Returns true if no volume failed the check.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the monitoring exit code for this report.
    pub fn exit_code(&self) -> u8 {
        if self.is_ok() {
            EXIT_OK
        } else {
            EXIT_ERROR
        }
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => match &self.scope {
                CheckScope::All => write!(f, "BACKUP OK - All backups OK"),
                CheckScope::Image(image) => {
                    write!(f, "BACKUP OK - Backup for image {} OK", image)
                }
            },
            [only] => write!(f, "BACKUP ERROR - {}", only),
            many => write!(f, "BACKUP ERROR - {} errors\n{}", many.len(), many.join("\n")),
        }
    }
}

/// Renders the status line for a check that could not run.
pub fn render_unknown(error: &BackupError) -> String {
    format!("BACKUP UNKNOWN - {}", error)
}

/// Checks that every production volume has a current backup.
///
/// See [`CheckPolicy`] for the two definitions of "current".
pub struct StatusChecker<S, D> {
    config: BackupConfig,
    namer: SnapshotNamer,
    source: S,
    destination: D,
}

impl<S: StorageCluster, D: StorageCluster> StatusChecker<S, D> {
    /// Creates a checker over the production and backup clusters.
    pub fn new(config: BackupConfig, source: S, destination: D) -> Self {
        let namer = SnapshotNamer::new(config.stamp_offset_hours);
        Self {
            config,
            namer,
            source,
            destination,
        }
    }

    /// Checks every volume, or only `filter`, as of now.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if either cluster cannot be queried.
    pub fn check(&self, filter: Option<&str>) -> BackupResult<CheckReport> {
        self.check_at(Local::now().naive_local(), filter)
    }

    /// Checks every volume, or only `filter`, as of `now`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if either cluster cannot be queried.
    pub fn check_at(&self, now: NaiveDateTime, filter: Option<&str>) -> BackupResult<CheckReport> {
        let volumes = self.source.list_volumes().map_err(|e| {
            BackupError::configuration(format!(
                "cannot list images on {} cluster: {}",
                ClusterRole::Production,
                e
            ))
        })?;
        let existing = self.destination.list_volumes().map_err(|e| {
            BackupError::configuration(format!(
                "cannot list images on {} cluster: {}",
                ClusterRole::Backup,
                e
            ))
        })?;

        let mut report = CheckReport {
            scope: filter.map_or(CheckScope::All, |f| CheckScope::Image(f.to_string())),
            errors: Vec::new(),
        };
        if let Some(name) = filter {
            if !volumes.iter().any(|v| v == name) {
                report.errors.push(format!(
                    "{}: image missing on {} cluster",
                    name,
                    ClusterRole::Production
                ));
                return Ok(report);
            }
        }

        for volume in volumes.iter().filter(|v| filter.map_or(true, |f| f == v.as_str())) {
            let exists = existing.contains(volume);
            let problem = match self.config.check_policy {
                CheckPolicy::LatestTwo => self.check_latest_two(volume, exists)?,
                CheckPolicy::Threshold => self.check_threshold(volume, exists, now)?,
            };
            match problem {
                Some(message) => {
                    info!("{}", message);
                    report.errors.push(message);
                }
                None => debug!("{}: backup OK", volume),
            }
        }
        Ok(report)
    }

    fn check_latest_two(&self, volume: &str, exists: bool) -> BackupResult<Option<String>> {
        if !exists {
            return Ok(Some(missing_image(volume)));
        }
        let source = match history(&self.source, ClusterRole::Production, volume)? {
            Ok(snapshots) => snapshots,
            Err(message) => return Ok(Some(message)),
        };
        let destination = match history(&self.destination, ClusterRole::Backup, volume)? {
            Ok(snapshots) => snapshots,
            Err(message) => return Ok(Some(message)),
        };

        if source.is_empty() {
            return Ok(Some(format!(
                "{}: no snapshots on {} cluster",
                volume,
                ClusterRole::Production
            )));
        }
        let Some(latest) = destination.last() else {
            return Ok(Some(format!(
                "{}: no snapshots on {} cluster",
                volume,
                ClusterRole::Backup
            )));
        };

        let recent = &source[source.len().saturating_sub(2)..];
        if recent.contains(latest) {
            Ok(None)
        } else {
            Ok(Some(format!(
                "{}: backup snapshot {} is stale ({} has {})",
                volume,
                latest,
                ClusterRole::Production,
                recent.join(", ")
            )))
        }
    }

    fn check_threshold(
        &self,
        volume: &str,
        exists: bool,
        now: NaiveDateTime,
    ) -> BackupResult<Option<String>> {
        let before = now.time() < self.config.check_threshold;
        let label = if before {
            self.namer.anchor_label_on(now.date())
        } else {
            if !exists {
                return Ok(Some(missing_image(volume)));
            }
            self.namer.today_label_on(now.date())
        };

        let source = match history(&self.source, ClusterRole::Production, volume)? {
            Ok(snapshots) => snapshots,
            Err(message) => return Ok(Some(message)),
        };
        if !source.contains(&label) {
            return Ok(Some(missing_snapshot(volume, &label, ClusterRole::Production)));
        }

        if !exists {
            return Ok(Some(missing_snapshot(volume, &label, ClusterRole::Backup)));
        }
        let destination = match history(&self.destination, ClusterRole::Backup, volume)? {
            Ok(snapshots) => snapshots,
            Err(message) => return Ok(Some(message)),
        };
        if !destination.contains(&label) {
            return Ok(Some(missing_snapshot(volume, &label, ClusterRole::Backup)));
        }
        Ok(None)
    }
}

/// Lists a volume's snapshots, turning non-fatal failures into a message.
fn history<C: StorageCluster>(
    cluster: &C,
    role: ClusterRole,
    volume: &str,
) -> BackupResult<Result<Vec<String>, String>> {
    match cluster.list_snapshots(volume) {
        Ok(snapshots) => Ok(Ok(snapshots)),
        Err(e) if e.is_fatal() => Err(BackupError::configuration(e.to_string())),
        Err(e) => Ok(Err(format!(
            "{}: cannot list snapshots on {} cluster: {}",
            volume, role, e
        ))),
    }
}

fn missing_image(volume: &str) -> String {
    format!("{}: image missing on {} cluster", volume, ClusterRole::Backup)
}

fn missing_snapshot(volume: &str, label: &str, role: ClusterRole) -> String {
    let failure = VolumeFailure::MissingSnapshot {
        snapshot: label.to_string(),
        cluster: role,
    };
    format!("{}: {}", volume, failure)
}
