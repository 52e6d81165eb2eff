//! # rbdsync Host
//!
//! Host-side filesystem helpers for rbdsync.
//!
//! Creating a crash-consistent snapshot of a mounted block device means
//! suspending writes on the filesystem above it for the duration of the
//! snapshot. This crate resolves where a device is mounted and freezes or
//! thaws that filesystem. It does not decide *when* to do so; the
//! consistency guard in `rbdsync_core` owns the freeze/unfreeze scope.
//!
//! ## Available Implementations
//!
//! - [`FsfreezeHost`] - Uses `findmnt` and `fsfreeze`
//! - [`InMemoryHost`] - For testing
//! - [`DryRunHost`] - Wrapper that logs freezes instead of running them

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod dry_run;
mod error;
mod fsfreeze;
mod host;
mod memory;
mod volume;

pub use dry_run::DryRunHost;
pub use error::{HostError, HostResult};
pub use fsfreeze::FsfreezeHost;
pub use host::HostFilesystem;
pub use memory::{HostEvent, InMemoryHost};
pub use volume::HostVolume;
