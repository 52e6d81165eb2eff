//! Dry-run wrapper for host operations.

use crate::error::HostResult;
use crate::host::HostFilesystem;
use std::path::{Path, PathBuf};
use tracing::info;

/// A host wrapper for `--noop` runs.
///
/// Mountpoint lookups go to the wrapped host; freezes and thaws are only
/// logged.
#[derive(Debug, Clone)]
pub struct DryRunHost<H: HostFilesystem> {
    inner: H,
}

impl<H: HostFilesystem> DryRunHost<H> {
    /// Wraps a host.
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    /// Returns the wrapped host.
    pub fn inner(&self) -> &H {
        &self.inner
    }
}

impl<H: HostFilesystem> HostFilesystem for DryRunHost<H> {
    fn resolve_mountpoint(&self, device: &str) -> HostResult<Option<PathBuf>> {
        self.inner.resolve_mountpoint(device)
    }

    fn freeze(&self, mountpoint: &Path) -> HostResult<()> {
        info!(mountpoint = %mountpoint.display(), "[noop] would freeze filesystem");
        Ok(())
    }

    fn unfreeze(&self, mountpoint: &Path) -> HostResult<()> {
        info!(mountpoint = %mountpoint.display(), "[noop] would unfreeze filesystem");
        Ok(())
    }
}
