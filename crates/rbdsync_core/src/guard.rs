//! Freeze/unfreeze scope around snapshot creation.

use crate::error::{BackupError, BackupResult};
use rbdsync_host::{HostFilesystem, HostVolume};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error};

/// Runs actions with a volume's filesystem frozen.
///
/// The frozen state is an explicit scope: once [`ConsistencyGuard::with_frozen`]
/// has frozen a filesystem it thaws it before returning, whether the action
/// succeeds, fails or panics.
pub struct ConsistencyGuard<'a, H: HostFilesystem + ?Sized> {
    host: &'a H,
}

impl<'a, H: HostFilesystem + ?Sized> ConsistencyGuard<'a, H> {
    /// Creates a guard over the given host.
    pub fn new(host: &'a H) -> Self {
        Self { host }
    }

    /// Runs `action`, freezing `volume` around it if the volume is mounted.
    ///
    /// Unmounted volumes run `action` directly.
    ///
    /// # Errors
    ///
    /// - A consistency error if the freeze fails; `action` does not run.
    /// - The action's error if the action fails and the thaw succeeds.
    /// - A consistency error if the thaw fails. Any action error is logged.
    pub fn with_frozen<T, F>(&self, volume: &HostVolume, action: F) -> BackupResult<T>
    where
        F: FnOnce() -> BackupResult<T>,
    {
        let Some(mountpoint) = volume.mountpoint() else {
            debug!("{} is not mounted, running without freeze", volume.device());
            return action();
        };

        debug!("Freezing {}", mountpoint.display());
        volume
            .freeze(self.host)
            .map_err(|e| BackupError::consistency(volume.image(), e))?;

        let outcome = panic::catch_unwind(AssertUnwindSafe(action));

        debug!("Unfreezing {}", mountpoint.display());
        let thawed = volume.unfreeze(self.host);

        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                if let Err(e) = thawed {
                    error!("Unfreezing {} failed: {}", mountpoint.display(), e);
                }
                panic::resume_unwind(payload);
            }
        };

        match thawed {
            Ok(()) => result,
            Err(e) => {
                if let Err(action_error) = result {
                    error!("{}", action_error);
                }
                Err(BackupError::consistency(volume.image(), e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, VolumeFailure};
    use rbdsync_host::{HostError, HostEvent, InMemoryHost};
    use std::cell::Cell;
    use std::path::{Path, PathBuf};

    fn mounted(host: &InMemoryHost) -> HostVolume {
        HostVolume::resolve(host, "vm", "/dev/rbd0").unwrap()
    }

    fn cycle() -> Vec<HostEvent> {
        vec![
            HostEvent::Freeze(PathBuf::from("/srv/vm")),
            HostEvent::Unfreeze(PathBuf::from("/srv/vm")),
        ]
    }

    #[test]
    fn guard_freezes_around_action() {
        let host = InMemoryHost::new().with_mount("/dev/rbd0", "/srv/vm");
        let guard = ConsistencyGuard::new(&host);
        let volume = mounted(&host);

        let value = guard
            .with_frozen(&volume, || {
                assert!(host.is_frozen(Path::new("/srv/vm")));
                Ok(7)
            })
            .unwrap();

        assert_eq!(value, 7);
        assert!(!host.is_frozen(Path::new("/srv/vm")));
        assert_eq!(host.events(), cycle());
    }

    #[test]
    fn guard_unfreezes_when_action_fails() {
        let host = InMemoryHost::new().with_mount("/dev/rbd0", "/srv/vm");
        let guard = ConsistencyGuard::new(&host);
        let volume = mounted(&host);

        let err = guard
            .with_frozen::<(), _>(&volume, || {
                Err(BackupError::volume("vm", VolumeFailure::SnapshotExists("x".into())))
            })
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Volume);
        assert_eq!(host.events(), cycle());
    }

    #[test]
    fn guard_unfreezes_when_action_panics() {
        let host = InMemoryHost::new().with_mount("/dev/rbd0", "/srv/vm");
        let volume = mounted(&host);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            ConsistencyGuard::new(&host).with_frozen::<(), _>(&volume, || panic!("boom"))
        }));

        assert!(result.is_err());
        assert_eq!(host.events(), cycle());
    }

    #[test]
    fn guard_skips_freeze_for_unmounted_volume() {
        let host = InMemoryHost::new();
        let guard = ConsistencyGuard::new(&host);
        let volume = HostVolume::new("vm", "/dev/rbd3", None);
        let ran = Cell::new(false);

        guard
            .with_frozen(&volume, || {
                ran.set(true);
                Ok(())
            })
            .unwrap();

        assert!(ran.get());
        assert!(host.events().is_empty());
    }

    #[test]
    fn guard_freeze_failure_skips_action() {
        let host = InMemoryHost::new().with_mount("/dev/rbd0", "/srv/vm");
        host.fail_freeze(true);
        let guard = ConsistencyGuard::new(&host);
        let ran = Cell::new(false);

        let err = guard
            .with_frozen(&mounted(&host), || {
                ran.set(true);
                Ok(())
            })
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Consistency);
        assert!(!ran.get());
    }

    #[test]
    fn guard_unfreeze_failure_is_consistency_error() {
        let host = InMemoryHost::new().with_mount("/dev/rbd0", "/srv/vm");
        host.fail_unfreeze(true);
        let guard = ConsistencyGuard::new(&host);

        let err = guard
            .with_frozen::<(), _>(&mounted(&host), || {
                Err(BackupError::volume("vm", VolumeFailure::NoSourceSnapshots))
            })
            .unwrap_err();

        assert!(matches!(
            err,
            BackupError::Consistency {
                source: HostError::CommandFailed { .. },
                ..
            }
        ));
    }
}
