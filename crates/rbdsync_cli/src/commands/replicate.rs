//! Replicate action implementation.

use super::connect;
use rbdsync_core::{
    BackupConfig, BackupError, BackupResult, ClusterRole, FileLockManager, ReplicationEngine,
    RunReport, VolumeOutcome,
};
use tracing::info;

/// Runs the replicate action.
pub fn run(config: &BackupConfig, image: Option<&str>) -> BackupResult<()> {
    let source = connect(&config.production, ClusterRole::Production, config.dry_run)?;
    let destination = connect(&config.backup, ClusterRole::Backup, config.dry_run)?;
    let locks = FileLockManager::new(&config.lock_dir, &config.lock_prefix).map_err(|e| {
        BackupError::configuration(format!(
            "cannot create lock directory {}: {}",
            config.lock_dir.display(),
            e
        ))
    })?;

    let engine = ReplicationEngine::new(config.clone(), source, destination, locks);
    let report = engine.run(image)?;

    let (replicated, up_to_date) = tally(&report);
    info!(
        "{} replicated, {} up to date, {} failed in {:.1}s",
        replicated,
        up_to_date,
        report.errors.len(),
        report.duration.as_secs_f64()
    );
    Ok(())
}

/// Counts transferred and already-current volumes.
fn tally(report: &RunReport<VolumeOutcome>) -> (usize, usize) {
    report
        .completed
        .iter()
        .fold((0, 0), |(replicated, current), (_, outcome)| match outcome {
            VolumeOutcome::Replicated { .. } => (replicated + 1, current),
            VolumeOutcome::UpToDate { .. } => (replicated, current + 1),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbdsync_core::ReplicationPlan;

    #[test]
    fn tally_separates_transfers_from_current_volumes() {
        let mut report = RunReport::new();
        report.completed.push((
            "a".to_string(),
            VolumeOutcome::Replicated {
                state: rbdsync_core::VolumeState::DestinationMissing,
                plan: ReplicationPlan::full("2024-01-02"),
            },
        ));
        report.completed.push((
            "b".to_string(),
            VolumeOutcome::UpToDate {
                snapshot: "2024-01-02".into(),
            },
        ));
        report.completed.push((
            "c".to_string(),
            VolumeOutcome::UpToDate {
                snapshot: "2024-01-01".into(),
            },
        ));

        assert_eq!(tally(&report), (1, 2));
    }
}
