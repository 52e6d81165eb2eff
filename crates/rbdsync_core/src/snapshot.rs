//! Snapshot creation for images mapped on this host.

use crate::config::BackupConfig;
use crate::error::{BackupError, BackupResult, VolumeFailure};
use crate::guard::ConsistencyGuard;
use crate::report::RunReport;
use crate::stamp::SnapshotNamer;
use chrono::{Local, NaiveDate};
use rbdsync_cluster::{MappedDevice, StorageCluster};
use rbdsync_host::{HostFilesystem, HostVolume};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What happened to an image that was snapshotted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// A snapshot was created.
    Created {
        /// Label of the new snapshot.
        label: String,
        /// Whether the filesystem was frozen around the snapshot.
        frozen: bool,
    },
}

/// Creates today's snapshot of every image mapped on this host.
///
/// Mounted images are frozen for the duration of the snapshot. Unmounted
/// images are skipped unless `snapshot_mounted_only` is off, in which case
/// they are snapshotted without a freeze.
pub struct SnapshotWorkflow<C, H> {
    config: BackupConfig,
    namer: SnapshotNamer,
    cluster: C,
    host: H,
}

impl<C: StorageCluster, H: HostFilesystem> SnapshotWorkflow<C, H> {
    /// Creates a workflow over the production cluster and this host.
    pub fn new(config: BackupConfig, cluster: C, host: H) -> Self {
        let namer = SnapshotNamer::new(config.stamp_offset_hours);
        Self {
            config,
            namer,
            cluster,
            host,
        }
    }

    /// Returns the cluster.
    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    /// Returns the host.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Snapshots every mapped image, or only `filter`, using today's date.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the mapped images cannot be listed.
    pub fn run(&self, filter: Option<&str>) -> BackupResult<RunReport<SnapshotOutcome>> {
        self.run_on(Local::now().date_naive(), filter)
    }

    /// Snapshots every mapped image, or only `filter`, as of `date`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the mapped images cannot be listed.
    pub fn run_on(
        &self,
        date: NaiveDate,
        filter: Option<&str>,
    ) -> BackupResult<RunReport<SnapshotOutcome>> {
        let started = Instant::now();
        let mut report = RunReport::new();
        let label = self.namer.creation_label_on(date);

        let mapped = self.cluster.list_mapped().map_err(|e| {
            BackupError::configuration(format!("cannot list mapped images: {}", e))
        })?;
        let selected: Vec<&MappedDevice> = mapped
            .iter()
            .filter(|m| filter.map_or(true, |f| f == m.image))
            .collect();
        if let Some(name) = filter {
            if selected.is_empty() {
                warn!("Image {} is not mapped on this host", name);
            }
        }

        info!("Starting snapshot of mapped images");
        for device in selected {
            let volume = match HostVolume::resolve(&self.host, &device.image, &device.device) {
                Ok(volume) => volume,
                Err(e) => {
                    let err = BackupError::consistency(&device.image, e);
                    error!("{}", err);
                    report.errors.push(err);
                    continue;
                }
            };
            if !volume.is_mounted() && self.config.snapshot_mounted_only {
                debug!("{} ({}) is not mounted, skipping", volume.image(), volume.device());
                report.skipped.push(volume.image().to_string());
                continue;
            }

            match self.snapshot_volume(&volume, &label) {
                Err(e) if e.is_fatal() => return Err(e),
                result => {
                    if let Err(e) = &result {
                        error!("{}", e);
                    }
                    report.record(volume.image(), result);
                }
            }
        }

        report.duration = started.elapsed();
        info!("Finished snapshot of mapped images{}", report.suffix());
        Ok(report)
    }

    fn snapshot_volume(&self, volume: &HostVolume, label: &str) -> BackupResult<SnapshotOutcome> {
        let image = volume.image();
        let existing = self
            .cluster
            .list_snapshots(image)
            .map_err(|e| BackupError::cluster(image, e))?;
        if existing.iter().any(|s| s == label) {
            return Err(BackupError::volume(
                image,
                VolumeFailure::SnapshotExists(label.to_string()),
            ));
        }

        info!("{}: creating snapshot {}", image, label);
        ConsistencyGuard::new(&self.host).with_frozen(volume, || {
            self.cluster
                .create_snapshot(image, label)
                .map_err(|e| BackupError::cluster(image, e))
        })?;

        Ok(SnapshotOutcome::Created {
            label: label.to_string(),
            frozen: volume.is_mounted(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rbdsync_cluster::{FailPoint, InMemoryCluster};
    use rbdsync_host::{HostEvent, InMemoryHost};
    use std::path::PathBuf;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    fn setup() -> (InMemoryCluster, InMemoryHost) {
        let cluster = InMemoryCluster::new()
            .with_image("web", &["2024-01-01"])
            .with_image("db", &["2024-01-01"]);
        cluster.map_device("web", "/dev/rbd0");
        cluster.map_device("db", "/dev/rbd1");
        let host = InMemoryHost::new().with_mount("/dev/rbd0", "/srv/web");
        (cluster, host)
    }

    #[test]
    fn snapshot_mounted_only_skips_unmounted() {
        let (cluster, host) = setup();
        let workflow = SnapshotWorkflow::new(BackupConfig::default(), cluster.clone(), host.clone());

        let report = workflow.run_on(day(), None).unwrap();

        assert_eq!(
            report.outcome("web"),
            Some(&SnapshotOutcome::Created {
                label: "2024-01-02".into(),
                frozen: true,
            })
        );
        assert_eq!(report.skipped, vec!["db".to_string()]);
        assert_eq!(
            cluster.snapshots("db").unwrap(),
            vec!["2024-01-01".to_string()]
        );
        assert_eq!(
            host.events(),
            vec![
                HostEvent::Freeze(PathBuf::from("/srv/web")),
                HostEvent::Unfreeze(PathBuf::from("/srv/web")),
            ]
        );
    }

    #[test]
    fn snapshot_all_mapped_without_freeze_for_unmounted() {
        let (cluster, host) = setup();
        let config = BackupConfig::default().with_snapshot_mounted_only(false);
        let workflow = SnapshotWorkflow::new(config, cluster.clone(), host);

        let report = workflow.run_on(day(), None).unwrap();

        assert_eq!(
            report.outcome("db"),
            Some(&SnapshotOutcome::Created {
                label: "2024-01-02".into(),
                frozen: false,
            })
        );
        assert!(cluster.snapshots("db").unwrap().contains(&"2024-01-02".to_string()));
    }

    #[test]
    fn snapshot_existing_label_is_volume_error() {
        let (cluster, host) = setup();
        cluster.push_snapshot("web", "2024-01-02");
        let workflow = SnapshotWorkflow::new(BackupConfig::default(), cluster, host.clone());

        let report = workflow.run_on(day(), None).unwrap();

        assert!(matches!(
            report.error_for("web"),
            Some(BackupError::Volume {
                failure: VolumeFailure::SnapshotExists(_),
                ..
            })
        ));
        assert!(host.events().is_empty());
    }

    #[test]
    fn snapshot_failure_still_unfreezes() {
        let (cluster, host) = setup();
        cluster.inject_failure(FailPoint::CreateSnapshot, Some("web"));
        let workflow = SnapshotWorkflow::new(BackupConfig::default(), cluster, host.clone());

        let report = workflow.run_on(day(), None).unwrap();

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind(), ErrorKind::Volume);
        assert_eq!(host.events().len(), 2);
    }

    #[test]
    fn snapshot_filter_selects_one_image() {
        let (cluster, host) = setup();
        let config = BackupConfig::default().with_snapshot_mounted_only(false);
        let workflow = SnapshotWorkflow::new(config, cluster.clone(), host);

        let report = workflow.run_on(day(), Some("db")).unwrap();

        assert_eq!(report.total(), 1);
        assert_eq!(cluster.snapshots("web").unwrap(), vec!["2024-01-01".to_string()]);
    }

    #[test]
    fn snapshot_listing_failure_is_fatal() {
        let (cluster, host) = setup();
        cluster.inject_failure(FailPoint::ListMapped, None);
        let workflow = SnapshotWorkflow::new(BackupConfig::default(), cluster, host);

        assert!(workflow.run_on(day(), None).unwrap_err().is_fatal());
    }
}
