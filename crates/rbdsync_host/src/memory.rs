//! In-memory host for testing.

use crate::error::{HostError, HostResult};
use crate::host::HostFilesystem;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A freeze or unfreeze seen by the in-memory host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A filesystem was frozen.
    Freeze(PathBuf),
    /// A filesystem was thawed.
    Unfreeze(PathBuf),
}

#[derive(Debug, Default)]
struct HostState {
    mounts: BTreeMap<String, PathBuf>,
    frozen: BTreeSet<PathBuf>,
    events: Vec<HostEvent>,
    fail_freeze: bool,
    fail_unfreeze: bool,
}

/// An in-memory host with a fake mount table.
///
/// Freezing an already frozen filesystem or thawing one that is not frozen
/// fails, as `fsfreeze` does. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHost {
    state: Arc<RwLock<HostState>>,
}

impl InMemoryHost {
    /// Creates a host with nothing mounted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounts a device at a path.
    #[must_use]
    pub fn with_mount(self, device: &str, mountpoint: impl Into<PathBuf>) -> Self {
        self.state
            .write()
            .mounts
            .insert(device.to_string(), mountpoint.into());
        self
    }

    /// Makes every subsequent freeze fail.
    pub fn fail_freeze(&self, fail: bool) {
        self.state.write().fail_freeze = fail;
    }

    /// Makes every subsequent unfreeze fail.
    pub fn fail_unfreeze(&self, fail: bool) {
        self.state.write().fail_unfreeze = fail;
    }

    /// Returns true if the filesystem at `mountpoint` is frozen.
    #[must_use]
    pub fn is_frozen(&self, mountpoint: &Path) -> bool {
        self.state.read().frozen.contains(mountpoint)
    }

    /// Returns every successful freeze and unfreeze, in order.
    #[must_use]
    pub fn events(&self) -> Vec<HostEvent> {
        self.state.read().events.clone()
    }
}

impl HostFilesystem for InMemoryHost {
    fn resolve_mountpoint(&self, device: &str) -> HostResult<Option<PathBuf>> {
        Ok(self.state.read().mounts.get(device).cloned())
    }

    fn freeze(&self, mountpoint: &Path) -> HostResult<()> {
        let mut state = self.state.write();
        if state.fail_freeze {
            return Err(HostError::CommandFailed {
                command: format!("fsfreeze --freeze {}", mountpoint.display()),
                status: "exit status: 1".into(),
                stderr: "injected failure".into(),
            });
        }
        if !state.frozen.insert(mountpoint.to_path_buf()) {
            return Err(HostError::AlreadyFrozen(mountpoint.to_path_buf()));
        }
        state.events.push(HostEvent::Freeze(mountpoint.to_path_buf()));
        Ok(())
    }

    fn unfreeze(&self, mountpoint: &Path) -> HostResult<()> {
        let mut state = self.state.write();
        if state.fail_unfreeze {
            return Err(HostError::CommandFailed {
                command: format!("fsfreeze --unfreeze {}", mountpoint.display()),
                status: "exit status: 1".into(),
                stderr: "injected failure".into(),
            });
        }
        if !state.frozen.remove(mountpoint) {
            return Err(HostError::NotFrozen(mountpoint.to_path_buf()));
        }
        state.events.push(HostEvent::Unfreeze(mountpoint.to_path_buf()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_unmounted_device_resolves_to_none() {
        let host = InMemoryHost::new().with_mount("/dev/rbd0", "/mnt/a");
        assert_eq!(host.resolve_mountpoint("/dev/rbd1").unwrap(), None);
        assert_eq!(
            host.resolve_mountpoint("/dev/rbd0").unwrap(),
            Some(PathBuf::from("/mnt/a"))
        );
    }

    #[test]
    fn memory_double_freeze_fails() {
        let host = InMemoryHost::new();
        let path = Path::new("/mnt/a");
        host.freeze(path).unwrap();
        assert!(matches!(host.freeze(path), Err(HostError::AlreadyFrozen(_))));
    }

    #[test]
    fn memory_unfreeze_without_freeze_fails() {
        let host = InMemoryHost::new();
        let result = host.unfreeze(Path::new("/mnt/a"));
        assert!(matches!(result, Err(HostError::NotFrozen(_))));
    }

    #[test]
    fn memory_injected_unfreeze_failure_keeps_frozen() {
        let host = InMemoryHost::new();
        let path = Path::new("/mnt/a");
        host.freeze(path).unwrap();
        host.fail_unfreeze(true);

        assert!(host.unfreeze(path).is_err());
        assert!(host.is_frozen(path));
        assert_eq!(host.events(), vec![HostEvent::Freeze(path.to_path_buf())]);
    }
}
