//! # rbdsync Core
//!
//! Snapshot-based replication of block storage volumes from a production
//! cluster to a backup cluster.
//!
//! This crate decides *what* to do; the cluster and host crates do it:
//!
//! - **Snapshot naming**: date labels, with a day-boundary offset
//! - **Locking**: one replication attempt per volume at a time
//! - **Consistency**: freeze a mounted filesystem around snapshot creation
//! - **Replication**: full or incremental transfer, chosen per volume
//! - **Status**: whether each backup is current, for monitoring
//!
//! ## Design Principles
//!
//! - Strategy selection is a pure function of the two snapshot histories
//! - A failure on one volume never stops the run; only configuration
//!   errors do
//! - A frozen filesystem is thawed before the enclosing call returns
//! - Configuration is passed to each component, never read from globals
//!
//! ## Example
//!
//! ```rust
//! use rbdsync_cluster::InMemoryCluster;
//! use rbdsync_core::{BackupConfig, MemoryLockManager, ReplicationEngine, StatusChecker};
//!
//! let production = InMemoryCluster::new().with_image("vm", &["2024-01-01"]);
//! let backup = InMemoryCluster::new();
//!
//! let engine = ReplicationEngine::new(
//!     BackupConfig::default(),
//!     production.clone(),
//!     backup.clone(),
//!     MemoryLockManager::new(),
//! );
//! engine.run(None).unwrap();
//!
//! let checker = StatusChecker::new(BackupConfig::default(), production, backup);
//! let report = checker.check(None).unwrap();
//! assert!(report.is_ok());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod guard;
mod lock;
mod plan;
mod report;
mod snapshot;
mod stamp;
mod status;

pub use config::{BackupConfig, CheckPolicy};
pub use engine::{ReplicationEngine, VolumeOutcome};
pub use error::{BackupError, BackupResult, ClusterRole, ErrorKind, VolumeFailure};
pub use guard::ConsistencyGuard;
pub use lock::{FileLockManager, LockEvent, LockManager, MemoryLockManager};
pub use plan::{select_strategy, Decision, ReplicationPlan, Strategy, VolumeState};
pub use report::RunReport;
pub use snapshot::{SnapshotOutcome, SnapshotWorkflow};
pub use stamp::{SnapshotNamer, LABEL_FORMAT};
pub use status::{
    render_unknown, CheckReport, CheckScope, StatusChecker, EXIT_ERROR, EXIT_OK, EXIT_UNKNOWN,
};
