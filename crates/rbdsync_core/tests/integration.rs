//! End-to-end tests of the snapshot, replicate and check workflows.

use proptest::prelude::*;
use rbdsync_cluster::{ClusterCall, DryRunCluster, FailPoint, StorageCluster};
use rbdsync_core::{
    select_strategy, BackupConfig, BackupError, CheckPolicy, Decision, FileLockManager,
    LockManager, MemoryLockManager, ReplicationEngine, ReplicationPlan, SnapshotWorkflow,
    StatusChecker, Strategy, VolumeFailure, VolumeOutcome, VolumeState, EXIT_ERROR, EXIT_OK,
};
use rbdsync_host::{DryRunHost, HostEvent};
use rbdsync_testkit::prelude::*;

fn file_engine(
    clusters: &TestClusters,
    locks: &TempLockDir,
) -> ReplicationEngine<rbdsync_cluster::InMemoryCluster, rbdsync_cluster::InMemoryCluster, FileLockManager>
{
    let config = BackupConfig::default().with_lock_dir(locks.path());
    let manager = FileLockManager::new(&config.lock_dir, &config.lock_prefix).unwrap();
    ReplicationEngine::new(
        config,
        clusters.production.clone(),
        clusters.backup.clone(),
        manager,
    )
}

#[test]
fn incremental_after_previous_day() {
    let clusters = TestClusters::new()
        .production("vm", &["2024-01-01", "2024-01-02"])
        .backup("vm", &["2024-01-01"]);
    let locks = TempLockDir::new();

    let report = file_engine(&clusters, &locks).run(None).unwrap();

    assert_eq!(
        report.outcome("vm"),
        Some(&VolumeOutcome::Replicated {
            state: VolumeState::DestinationBehind,
            plan: ReplicationPlan::incremental("2024-01-01", "2024-01-02"),
        })
    );
    assert_eq!(clusters.backup_history("vm"), vec!["2024-01-01", "2024-01-02"]);
    assert!(locks.markers().is_empty());
}

#[test]
fn missing_destination_is_created_then_full() {
    let clusters = TestClusters::new().production("vm", &["2024-01-01"]);
    let locks = TempLockDir::new();

    file_engine(&clusters, &locks).run(None).unwrap();

    let calls = clusters.backup.calls();
    assert_eq!(
        calls[0],
        ClusterCall::CreateVolume {
            image: "vm".into(),
            size_mb: 1
        }
    );
    assert!(clusters.production.calls().contains(&ClusterCall::ExportDiff {
        image: "vm".into(),
        snapshot: "2024-01-01".into(),
        from_snapshot: None,
    }));
    assert_eq!(clusters.backup_history("vm"), vec!["2024-01-01"]);
}

#[test]
fn diverged_destination_gets_full_transfer() {
    let clusters = TestClusters::new()
        .production("vm", &["2024-01-01", "2024-01-02"])
        .backup("vm", &["2023-12-25"]);
    let locks = TempLockDir::new();

    let report = file_engine(&clusters, &locks).run(None).unwrap();

    assert_eq!(
        report.outcome("vm"),
        Some(&VolumeOutcome::Replicated {
            state: VolumeState::DestinationDiverged,
            plan: ReplicationPlan::full("2024-01-02"),
        })
    );
}

#[test]
fn stale_marker_skips_volume_and_names_marker() {
    let clusters = TestClusters::new()
        .production("a", &["2024-01-01"])
        .production("b", &["2024-01-01"]);
    let locks = TempLockDir::new();
    let marker = locks.plant("rbdsync-replicate-a");

    let report = file_engine(&clusters, &locks).run(None).unwrap();

    assert_eq!(report.errors.len(), 1);
    let message = report.errors[0].to_string();
    assert!(message.contains(&marker.display().to_string()));
    assert!(!clusters.backup.has_image("a"));
    assert_eq!(clusters.backup_history("b"), vec!["2024-01-01"]);
    assert_eq!(locks.markers(), vec!["rbdsync-replicate-a"]);
}

#[test]
fn lock_released_exactly_once_on_every_path() {
    let clusters = TestClusters::new()
        .production("ok", &["2024-01-01"])
        .production("empty", &[])
        .production("broken", &["2024-01-01"])
        .replicated("current", &["2024-01-01"]);
    clusters
        .backup
        .inject_failure(FailPoint::ImportDiff, Some("broken"));
    let engine = ReplicationEngine::new(
        BackupConfig::default(),
        clusters.production.clone(),
        clusters.backup.clone(),
        MemoryLockManager::new(),
    );

    let report = engine.run(None).unwrap();
    assert_eq!(report.errors.len(), 2);

    let events = engine.locks().events();
    for volume in ["ok", "empty", "broken", "current"] {
        let acquired = events
            .iter()
            .filter(|e| **e == rbdsync_core::LockEvent::Acquired(volume.into()))
            .count();
        let released = events
            .iter()
            .filter(|e| **e == rbdsync_core::LockEvent::Released(volume.into()))
            .count();
        assert_eq!((acquired, released), (1, 1), "volume {}", volume);
        assert!(!engine.locks().is_held(volume));
    }
}

#[test]
fn second_run_is_up_to_date() {
    let clusters = TestClusters::new().production("vm", &["2024-01-01"]);
    let locks = TempLockDir::new();
    let engine = file_engine(&clusters, &locks);

    engine.run(None).unwrap();
    let report = engine.run(None).unwrap();

    assert_eq!(
        report.outcome("vm"),
        Some(&VolumeOutcome::UpToDate {
            snapshot: "2024-01-01".into()
        })
    );
}

#[test]
fn dry_run_replication_leaves_backup_untouched() {
    let clusters = TestClusters::new()
        .production("new", &["2024-01-01"])
        .production("vm", &["2024-01-01", "2024-01-02"])
        .backup("vm", &["2024-01-01"]);
    let engine = ReplicationEngine::new(
        BackupConfig::default().with_dry_run(true),
        DryRunCluster::new(clusters.production.clone()),
        DryRunCluster::new(clusters.backup.clone()),
        MemoryLockManager::new(),
    );

    let report = engine.run(None).unwrap();

    assert!(!report.has_errors());
    assert_eq!(report.completed.len(), 2);
    assert!(clusters.backup.calls().is_empty());
    assert!(clusters.production.calls().is_empty());
    assert!(!clusters.backup.has_image("new"));
    assert_eq!(clusters.backup_history("vm"), vec!["2024-01-01"]);
}

#[test]
fn dry_run_snapshot_does_not_freeze() {
    let clusters = TestClusters::new()
        .production("vm", &["2024-01-01"])
        .mapped("vm", "/dev/rbd0");
    let host = mounted_host(&[("/dev/rbd0", "/srv/vm")]);
    let workflow = SnapshotWorkflow::new(
        BackupConfig::default(),
        DryRunCluster::new(clusters.production.clone()),
        DryRunHost::new(host.clone()),
    );

    let report = workflow.run_on(date(2024, 1, 2), None).unwrap();

    assert_eq!(report.completed.len(), 1);
    assert!(host.events().is_empty());
    assert_eq!(
        clusters.production.snapshots("vm").unwrap(),
        vec!["2024-01-01".to_string()]
    );
}

#[test]
fn snapshot_replicate_check_cycle() {
    let clusters = TestClusters::new()
        .production("web", &["2024-01-01"])
        .production("db", &["2024-01-01"])
        .mapped("web", "/dev/rbd0")
        .mapped("db", "/dev/rbd1");
    let host = mounted_host(&[("/dev/rbd0", "/srv/web"), ("/dev/rbd1", "/srv/db")]);

    let snapshot = SnapshotWorkflow::new(
        BackupConfig::default(),
        clusters.production.clone(),
        host.clone(),
    )
    .run_on(date(2024, 1, 2), None)
    .unwrap();
    assert_eq!(snapshot.completed.len(), 2);
    assert_eq!(
        host.events()
            .iter()
            .filter(|e| matches!(e, HostEvent::Unfreeze(_)))
            .count(),
        2
    );

    let engine = ReplicationEngine::new(
        BackupConfig::default(),
        clusters.production.clone(),
        clusters.backup.clone(),
        MemoryLockManager::new(),
    );
    assert!(!engine.run(None).unwrap().has_errors());

    let checker = StatusChecker::new(
        BackupConfig::default().with_check_policy(CheckPolicy::Threshold),
        clusters.production.clone(),
        clusters.backup.clone(),
    );
    let report = checker.check_at(date_at(2024, 1, 2, 9), None).unwrap();
    assert_eq!(report.to_string(), "BACKUP OK - All backups OK");
}

fn three_volumes() -> TestClusters {
    TestClusters::new()
        .production("a", &["2024-01-01", "2024-01-02"])
        .production("b", &["2024-01-01", "2024-01-02"])
        .production("c", &["2024-01-01", "2024-01-02"])
        .backup("a", &["2024-01-02"])
        .backup("b", &["2024-01-02"])
        .backup("c", &["2024-01-02"])
}

fn check(clusters: &TestClusters) -> rbdsync_core::CheckReport {
    StatusChecker::new(
        BackupConfig::default(),
        clusters.production.clone(),
        clusters.backup.clone(),
    )
    .check_at(date_at(2024, 1, 2, 12), None)
    .unwrap()
}

#[test]
fn check_three_volumes_no_errors() {
    let report = check(&three_volumes());
    assert_eq!(report.exit_code(), EXIT_OK);
    assert_eq!(report.to_string(), "BACKUP OK - All backups OK");
}

#[test]
fn check_three_volumes_one_error() {
    let clusters = three_volumes().backup("b", &["2023-12-01"]);
    let report = check(&clusters);
    assert_eq!(report.exit_code(), EXIT_ERROR);
    assert_eq!(
        report.to_string(),
        "BACKUP ERROR - b: backup snapshot 2023-12-01 is stale \
         (production has 2024-01-01, 2024-01-02)"
    );
    assert_eq!(report.to_string().lines().count(), 1);
}

#[test]
fn check_three_volumes_two_errors() {
    let clusters = three_volumes().backup("a", &[]).backup("c", &["2023-12-01"]);
    let report = check(&clusters);
    assert_eq!(report.exit_code(), EXIT_ERROR);

    let text = report.to_string();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "BACKUP ERROR - 2 errors");
    assert_eq!(lines[1], "a: no snapshots on backup cluster");
    assert!(lines[2].starts_with("c: backup snapshot 2023-12-01 is stale"));
    assert_eq!(lines.len(), 3);
}

#[test]
fn file_locks_are_exclusive_across_managers() {
    let locks = TempLockDir::new();
    let a = FileLockManager::new(locks.path(), "rbdsync-").unwrap();
    let b = FileLockManager::new(locks.path(), "rbdsync-").unwrap();

    assert!(a.try_acquire("vm").unwrap());
    assert!(!b.try_acquire("vm").unwrap());
    a.release("vm").unwrap();
    assert!(b.try_acquire("vm").unwrap());
}

#[test]
fn destination_listing_failure_aborts_run() {
    let clusters = TestClusters::new().production("vm", &["2024-01-01"]);
    clusters.backup.inject_failure(FailPoint::ListVolumes, None);
    let engine = ReplicationEngine::new(
        BackupConfig::default(),
        clusters.production.clone(),
        clusters.backup.clone(),
        MemoryLockManager::new(),
    );

    let err = engine.run(None).unwrap_err();
    assert!(matches!(err, BackupError::Configuration(_)));
    assert!(engine.locks().events().is_empty());
}

#[test]
fn import_failure_reports_cluster_error() {
    let clusters = TestClusters::new()
        .production("vm", &["2024-01-01", "2024-01-02"])
        .backup("vm", &["2024-01-01"]);
    clusters.backup.inject_failure(FailPoint::ImportDiff, Some("vm"));
    let engine = ReplicationEngine::new(
        BackupConfig::default(),
        clusters.production.clone(),
        clusters.backup.clone(),
        MemoryLockManager::new(),
    );

    let report = engine.run(None).unwrap();
    assert!(matches!(
        report.error_for("vm"),
        Some(BackupError::Volume {
            failure: VolumeFailure::Cluster(_),
            ..
        })
    ));
    assert_eq!(
        clusters.backup.list_snapshots("vm").unwrap(),
        vec!["2024-01-01".to_string()]
    );
}

proptest! {
    #[test]
    fn prefix_destination_is_incremental_or_current((source, destination) in prefix_pair_strategy(12)) {
        let decision = select_strategy(&source, &destination).unwrap();
        let latest = source.last().unwrap().clone();
        match destination.last() {
            None => prop_assert_eq!(decision, Decision::Transfer(ReplicationPlan::full(latest))),
            Some(d) if *d == latest => {
                prop_assert_eq!(decision, Decision::UpToDate { snapshot: latest })
            }
            Some(d) => prop_assert_eq!(
                decision,
                Decision::Transfer(ReplicationPlan::incremental(d.clone(), latest))
            ),
        }
    }

    #[test]
    fn diverged_destination_is_always_full((source, destination) in diverged_pair_strategy(8)) {
        let decision = select_strategy(&source, &destination).unwrap();
        let expected = ReplicationPlan::full(source.last().unwrap().clone());
        prop_assert_eq!(decision, Decision::Transfer(expected));
    }

    #[test]
    fn incremental_base_is_in_source(
        source in non_empty_history_strategy(10),
        destination in history_strategy(10)
    ) {
        if let Decision::Transfer(plan) = select_strategy(&source, &destination).unwrap() {
            prop_assert_eq!(plan.target.as_str(), source.last().unwrap().as_str());
            match plan.strategy {
                Strategy::Incremental => {
                    let base = plan.base.unwrap();
                    prop_assert!(source.contains(&base));
                    prop_assert_eq!(Some(&base), destination.last());
                }
                Strategy::Full => prop_assert!(plan.base.is_none()),
            }
        }
    }

    #[test]
    fn replication_converges(source in non_empty_history_strategy(6)) {
        let refs: Vec<&str> = source.iter().map(String::as_str).collect();
        let clusters = TestClusters::new().production("vm", &refs);
        let engine = ReplicationEngine::new(
            BackupConfig::default(),
            clusters.production.clone(),
            clusters.backup.clone(),
            MemoryLockManager::new(),
        );

        engine.run(None).unwrap();
        let second = engine.run(None).unwrap();
        let is_up_to_date = matches!(second.outcome("vm"), Some(VolumeOutcome::UpToDate { .. }));
        prop_assert!(is_up_to_date);
        let history = clusters.backup_history("vm");
        prop_assert_eq!(history.last(), source.last());
    }
}
