//! Per-volume replication locks.
//!
//! A lock marks a volume as having a replication attempt in flight so a
//! second invocation on the same host skips it instead of running an
//! overlapping transfer.
//!
//! # Known limitation
//!
//! [`FileLockManager`] markers carry no owner identity and never expire. If
//! the process dies between acquire and release, the marker stays and every
//! later attempt on that volume is skipped until an operator deletes it. The
//! lock error names the marker path for that purpose.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

/// An exclusive marker per volume.
///
/// The replication engine only talks to this trait, so a distributed or
/// expiring lock can replace the file marker without touching the engine.
pub trait LockManager: Send + Sync {
    /// Tries to take the lock for `volume`.
    ///
    /// Returns `Ok(false)` if it is already held.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock state cannot be read or written.
    fn try_acquire(&self, volume: &str) -> io::Result<bool>;

    /// Releases the lock for `volume`. Releasing a free lock is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock state cannot be written.
    fn release(&self, volume: &str) -> io::Result<()>;

    /// Describes where the lock for `volume` lives, for log messages.
    fn describe(&self, volume: &str) -> String;
}

/// Locks backed by marker files in a directory.
///
/// The marker for volume `v` is `<dir>/<prefix>v`, with any `/` in the
/// volume id replaced by `_`. Its existence is the held state; it is
/// created with `O_CREAT | O_EXCL` so two processes cannot both acquire it.
#[derive(Debug, Clone)]
pub struct FileLockManager {
    dir: PathBuf,
    prefix: String,
}

impl FileLockManager {
    /// Creates a lock manager, creating `dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            prefix: prefix.into(),
        })
    }

    /// Returns the marker path for a volume.
    #[must_use]
    pub fn marker_path(&self, volume: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}", self.prefix, volume.replace('/', "_")))
    }

    /// Returns true if the marker for `volume` exists.
    #[must_use]
    pub fn is_held(&self, volume: &str) -> bool {
        self.marker_path(volume).exists()
    }

    /// Returns the marker directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl LockManager for FileLockManager {
    fn try_acquire(&self, volume: &str) -> io::Result<bool> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.marker_path(volume))
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn release(&self, volume: &str) -> io::Result<()> {
        match fs::remove_file(self.marker_path(volume)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn describe(&self, volume: &str) -> String {
        self.marker_path(volume).display().to_string()
    }
}

/// A lock operation seen by [`MemoryLockManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockEvent {
    /// The lock was taken.
    Acquired(String),
    /// An acquire found the lock already held.
    Contended(String),
    /// The lock was released.
    Released(String),
}

#[derive(Debug, Default)]
struct MemoryLocks {
    held: BTreeSet<String>,
    events: Vec<LockEvent>,
}

/// An in-memory lock manager for tests that records every operation.
#[derive(Debug, Default)]
pub struct MemoryLockManager {
    inner: Mutex<MemoryLocks>,
}

impl MemoryLockManager {
    /// Creates a lock manager with no locks held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `volume` as held by someone else, without recording an event.
    pub fn hold(&self, volume: &str) {
        self.inner.lock().held.insert(volume.to_string());
    }

    /// Returns true if `volume` is held.
    #[must_use]
    pub fn is_held(&self, volume: &str) -> bool {
        self.inner.lock().held.contains(volume)
    }

    /// Returns every recorded operation, in order.
    #[must_use]
    pub fn events(&self) -> Vec<LockEvent> {
        self.inner.lock().events.clone()
    }
}

impl LockManager for MemoryLockManager {
    fn try_acquire(&self, volume: &str) -> io::Result<bool> {
        let mut inner = self.inner.lock();
        if inner.held.insert(volume.to_string()) {
            inner.events.push(LockEvent::Acquired(volume.to_string()));
            Ok(true)
        } else {
            inner.events.push(LockEvent::Contended(volume.to_string()));
            Ok(false)
        }
    }

    fn release(&self, volume: &str) -> io::Result<()> {
        let mut inner = self.inner.lock();
        inner.held.remove(volume);
        inner.events.push(LockEvent::Released(volume.to_string()));
        Ok(())
    }

    fn describe(&self, volume: &str) -> String {
        format!("memory:{}", volume)
    }
}
