//! The replication engine.

use crate::config::BackupConfig;
use crate::error::{BackupError, BackupResult, ClusterRole, VolumeFailure};
use crate::lock::LockManager;
use crate::plan::{select_strategy, Decision, ReplicationPlan, VolumeState};
use crate::report::RunReport;
use crate::stamp::SnapshotNamer;
use rbdsync_cluster::{ClusterError, StorageCluster};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What happened to a volume that was processed without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeOutcome {
    /// A transfer ran.
    Replicated {
        /// Destination state before the run.
        state: VolumeState,
        /// The transfer performed.
        plan: ReplicationPlan,
    },
    /// Both sides already share the latest snapshot.
    UpToDate {
        /// The shared snapshot.
        snapshot: String,
    },
}

/// Replicates volumes from a source cluster to a destination cluster.
///
/// Volumes are processed one at a time. For each, the engine takes the
/// volume's lock, compares the two snapshot histories, and pipes an export
/// from the source into an import on the destination. A failure on one
/// volume is recorded in the report and the run moves on.
///
/// # Example
///
/// ```rust
/// use rbdsync_cluster::InMemoryCluster;
/// use rbdsync_core::{BackupConfig, MemoryLockManager, ReplicationEngine};
///
/// let source = InMemoryCluster::new().with_image("vm", &["2024-01-01", "2024-01-02"]);
/// let backup = InMemoryCluster::new().with_image("vm", &["2024-01-01"]);
///
/// let engine = ReplicationEngine::new(
///     BackupConfig::default(),
///     source,
///     backup.clone(),
///     MemoryLockManager::new(),
/// );
/// let report = engine.run(None).unwrap();
/// assert!(!report.has_errors());
/// assert_eq!(
///     backup.snapshots("vm").unwrap(),
///     vec!["2024-01-01".to_string(), "2024-01-02".to_string()]
/// );
/// ```
pub struct ReplicationEngine<S, D, L> {
    config: BackupConfig,
    namer: SnapshotNamer,
    source: S,
    destination: D,
    locks: L,
}

impl<S, D, L> ReplicationEngine<S, D, L>
where
    S: StorageCluster,
    D: StorageCluster,
    L: LockManager,
{
    /// Creates an engine.
    pub fn new(config: BackupConfig, source: S, destination: D, locks: L) -> Self {
        let namer = SnapshotNamer::new(config.stamp_offset_hours);
        Self {
            config,
            namer,
            source,
            destination,
            locks,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Returns the source cluster.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Returns the destination cluster.
    pub fn destination(&self) -> &D {
        &self.destination
    }

    /// Returns the lock manager.
    pub fn locks(&self) -> &L {
        &self.locks
    }

    /// Replicates every source volume, or only `filter` if given.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if either cluster cannot be listed, or
    /// if a cluster client fails in a way no other volume would survive
    /// (missing `rbd` binary, bad credentials). Per-volume failures are
    /// returned in the report instead.
    pub fn run(&self, filter: Option<&str>) -> BackupResult<RunReport<VolumeOutcome>> {
        let started = Instant::now();
        let mut report = RunReport::new();

        let volumes = self
            .source
            .list_volumes()
            .map_err(|e| list_error(ClusterRole::Production, e))?;

        let selected: Vec<&String> = volumes
            .iter()
            .filter(|v| filter.map_or(true, |f| f == v.as_str()))
            .collect();
        if let Some(name) = filter {
            if selected.is_empty() {
                warn!("Image {} not found on {} cluster", name, ClusterRole::Production);
            }
        }

        info!("Starting replication of images to destination");
        for volume in selected {
            match self.replicate_volume(volume) {
                Err(e) if e.is_fatal() => return Err(e),
                result => {
                    if let Err(e) = &result {
                        error!("{}", e);
                    }
                    report.record(volume, result);
                }
            }
        }

        report.duration = started.elapsed();
        info!(
            "Finished replication of images to destination{}",
            report.suffix()
        );
        Ok(report)
    }

    /// Replicates one volume under its lock.
    ///
    /// The lock is released on every path after a successful acquire. A
    /// failed release turns an otherwise successful outcome into an error.
    ///
    /// # Errors
    ///
    /// Returns a per-volume error if the lock is held or the transfer fails.
    pub fn replicate_volume(&self, volume: &str) -> BackupResult<VolumeOutcome> {
        match self.locks.try_acquire(volume) {
            Ok(true) => {}
            Ok(false) => {
                return Err(BackupError::volume(
                    volume,
                    VolumeFailure::LockHeld {
                        marker: self.locks.describe(volume),
                    },
                ));
            }
            Err(e) => return Err(BackupError::volume(volume, VolumeFailure::Lock(e))),
        }
        debug!("Acquired lock {}", self.locks.describe(volume));

        let result = self.replicate_locked(volume);

        match self.locks.release(volume) {
            Ok(()) => result,
            Err(e) if result.is_ok() => Err(BackupError::volume(volume, VolumeFailure::Lock(e))),
            Err(e) => {
                error!("Releasing lock {} failed: {}", self.locks.describe(volume), e);
                result
            }
        }
    }

    /// Resolves the volume's state and transfers. Must run under the lock.
    fn replicate_locked(&self, volume: &str) -> BackupResult<VolumeOutcome> {
        let destination_exists = self
            .destination
            .list_volumes()
            .map_err(|e| list_error(ClusterRole::Backup, e))?
            .iter()
            .any(|v| v == volume);
        let source_snapshots = self
            .source
            .list_snapshots(volume)
            .map(|s| labelled(volume, ClusterRole::Production, s))
            .map_err(|e| BackupError::cluster(volume, e))?;
        let Some(latest) = source_snapshots.last() else {
            return Err(BackupError::volume(volume, VolumeFailure::NoSourceSnapshots));
        };
        let expected = self.namer.today_label();
        if *latest != expected {
            warn!(
                "{}: latest production snapshot is {}, expected {}",
                volume, latest, expected
            );
        }

        let (state, destination_snapshots) = if destination_exists {
            let snapshots = self
                .destination
                .list_snapshots(volume)
                .map(|s| labelled(volume, ClusterRole::Backup, s))
                .map_err(|e| BackupError::cluster(volume, e))?;
            let state = VolumeState::classify(&source_snapshots, Some(snapshots.as_slice()));
            (state, snapshots)
        } else {
            self.create_destination(volume)?;
            (VolumeState::DestinationMissing, Vec::new())
        };
        debug!("{}: {}", volume, state);

        let plan = match select_strategy(&source_snapshots, &destination_snapshots)
            .map_err(|f| BackupError::volume(volume, f))?
        {
            Decision::UpToDate { snapshot } => {
                info!("{}: backup is up to date at {}", volume, snapshot);
                return Ok(VolumeOutcome::UpToDate { snapshot });
            }
            Decision::Transfer(plan) => plan,
        };

        info!("{}: replicating ({})", volume, plan);
        let stream = self
            .source
            .export_diff(volume, &plan.target, plan.base.as_deref())
            .map_err(|e| BackupError::cluster(volume, e))?;
        self.destination
            .import_diff(volume, stream)
            .map_err(|e| BackupError::cluster(volume, e))?;

        Ok(VolumeOutcome::Replicated { state, plan })
    }

    fn create_destination(&self, volume: &str) -> BackupResult<()> {
        info!(
            "{}: creating image on {} cluster",
            volume,
            ClusterRole::Backup
        );
        self.destination
            .create_volume(volume, self.config.initial_volume_size_mb)
            .map_err(|e| BackupError::cluster(volume, e))?;

        let listed = self
            .destination
            .list_volumes()
            .map_err(|e| BackupError::cluster(volume, e))?;
        if listed.iter().any(|v| v == volume) {
            Ok(())
        } else {
            Err(BackupError::volume(volume, VolumeFailure::DestinationCreateFailed))
        }
    }
}

fn list_error(role: ClusterRole, e: ClusterError) -> BackupError {
    BackupError::configuration(format!("cannot list images on {} cluster: {}", role, e))
}

/// Drops snapshots whose names are not date labels, such as manual ones.
fn labelled(volume: &str, role: ClusterRole, snapshots: Vec<String>) -> Vec<String> {
    let (labels, other): (Vec<_>, Vec<_>) = snapshots
        .into_iter()
        .partition(|s| SnapshotNamer::is_label(s));
    if !other.is_empty() {
        debug!(
            "{}: ignoring snapshots {:?} on {} cluster",
            volume, other, role
        );
    }
    labels
}
