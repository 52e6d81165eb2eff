//! Snapshot action implementation.

use super::connect;
use rbdsync_core::{BackupConfig, BackupResult, ClusterRole, SnapshotWorkflow};
use rbdsync_host::{DryRunHost, FsfreezeHost, HostFilesystem};
use tracing::info;

/// Runs the snapshot action.
pub fn run(config: &BackupConfig, image: Option<&str>) -> BackupResult<()> {
    let cluster = connect(&config.production, ClusterRole::Production, config.dry_run)?;
    let host: Box<dyn HostFilesystem> = if config.dry_run {
        Box::new(DryRunHost::new(FsfreezeHost::new()))
    } else {
        Box::new(FsfreezeHost::new())
    };

    let workflow = SnapshotWorkflow::new(config.clone(), cluster, host);
    let report = workflow.run(image)?;

    info!(
        "{} snapshotted, {} skipped, {} failed",
        report.completed.len(),
        report.skipped.len(),
        report.errors.len()
    );
    Ok(())
}
