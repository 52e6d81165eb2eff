//! Host filesystem trait definition.

use crate::error::HostResult;
use std::path::{Path, PathBuf};

/// Access to the filesystems mounted on this host.
///
/// # Invariants
///
/// - `freeze` and `unfreeze` are only called with a path returned by
///   `resolve_mountpoint`
/// - every successful `freeze` is followed by exactly one `unfreeze`
///
/// # Implementors
///
/// - [`super::FsfreezeHost`] - Uses `findmnt` and `fsfreeze`
/// - [`super::InMemoryHost`] - For testing
/// - [`super::DryRunHost`] - Logs instead of freezing
pub trait HostFilesystem: Send + Sync {
    /// Returns the mountpoint of a block device, or `None` if it is not mounted.
    ///
    /// # Errors
    ///
    /// Returns an error if the mount table cannot be queried.
    fn resolve_mountpoint(&self, device: &str) -> HostResult<Option<PathBuf>>;

    /// Suspends write activity on the filesystem mounted at `mountpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem cannot be frozen.
    fn freeze(&self, mountpoint: &Path) -> HostResult<()>;

    /// Resumes write activity on the filesystem mounted at `mountpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem cannot be thawed.
    fn unfreeze(&self, mountpoint: &Path) -> HostResult<()>;
}

impl<T: HostFilesystem + ?Sized> HostFilesystem for Box<T> {
    fn resolve_mountpoint(&self, device: &str) -> HostResult<Option<PathBuf>> {
        (**self).resolve_mountpoint(device)
    }

    fn freeze(&self, mountpoint: &Path) -> HostResult<()> {
        (**self).freeze(mountpoint)
    }

    fn unfreeze(&self, mountpoint: &Path) -> HostResult<()> {
        (**self).unfreeze(mountpoint)
    }
}
