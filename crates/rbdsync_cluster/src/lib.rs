//! # rbdsync Cluster
//!
//! Storage cluster client trait and implementations for rbdsync.
//!
//! This crate provides the lowest-level cluster abstraction. Clients are
//! **thin call-throughs**: they list images and snapshots, create them, and
//! move snapshot diffs around as byte streams. They make no replication
//! decisions of their own.
//!
//! ## Design Principles
//!
//! - Every operation is blocking and may fail with a [`ClusterError`]
//! - Diffs travel as a [`DiffStream`], never buffered whole in memory
//! - Must be `Send + Sync`
//! - Decision logic lives in `rbdsync_core`
//!
//! ## Available Clients
//!
//! - [`RbdCli`] - Drives the `rbd` command-line tool
//! - [`InMemoryCluster`] - For testing
//! - [`DryRunCluster`] - Wrapper that logs mutations instead of running them
//!
//! ## Example
//!
//! ```rust
//! use rbdsync_cluster::{InMemoryCluster, StorageCluster};
//!
//! let cluster = InMemoryCluster::new().with_image("vm-disk", &["2024-01-01"]);
//! assert_eq!(cluster.list_volumes().unwrap(), vec!["vm-disk".to_string()]);
//! assert_eq!(cluster.list_snapshots("vm-disk").unwrap(), vec!["2024-01-01".to_string()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cluster;
mod dry_run;
mod error;
mod memory;
mod rbd;
mod stream;

pub use cluster::{MappedDevice, StorageCluster};
pub use dry_run::DryRunCluster;
pub use error::{ClusterError, ClusterResult};
pub use memory::{ClusterCall, FailPoint, InMemoryCluster};
pub use rbd::{RbdCli, RbdCredentials};
pub use stream::DiffStream;
