//! Error types for rbdsync core.

use rbdsync_cluster::ClusterError;
use rbdsync_host::HostError;
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type BackupResult<T> = Result<T, BackupError>;

/// Which cluster an error or message refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterRole {
    /// The production (source) cluster.
    Production,
    /// The backup (destination) cluster.
    Backup,
}

impl fmt::Display for ClusterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterRole::Production => f.write_str("production"),
            ClusterRole::Backup => f.write_str("backup"),
        }
    }
}

/// The three error kinds a caller can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fatal; the whole run stops.
    Configuration,
    /// Scoped to one volume; the run continues.
    Volume,
    /// A freeze or unfreeze failed.
    Consistency,
}

/// Why processing of a single volume failed.
#[derive(Debug, Error)]
pub enum VolumeFailure {
    /// Another replication attempt holds the volume's lock.
    #[error("replication already in progress (lock {marker} is held)")]
    LockHeld {
        /// Where the lock lives, for manual cleanup.
        marker: String,
    },

    /// The lock could not be taken or released.
    #[error("lock error: {0}")]
    Lock(#[source] io::Error),

    /// The source image has no snapshot to replicate.
    #[error("no snapshots on production cluster")]
    NoSourceSnapshots,

    /// A snapshot the operation relies on is absent.
    #[error("missing snapshot {snapshot} on {cluster} cluster")]
    MissingSnapshot {
        /// Snapshot label.
        snapshot: String,
        /// Cluster it was expected on.
        cluster: ClusterRole,
    },

    /// The snapshot about to be created already exists.
    #[error("already has snapshot {0}")]
    SnapshotExists(String),

    /// The destination image did not appear after creating it.
    #[error("error creating new image on backup cluster")]
    DestinationCreateFailed,

    /// A cluster command failed.
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// Errors produced by rbdsync operations.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Bad credentials, paths or settings, or an unreachable cluster.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Processing of one volume failed.
    #[error("image '{image}': {failure}")]
    Volume {
        /// Image name.
        image: String,
        /// What went wrong.
        failure: VolumeFailure,
    },

    /// A filesystem freeze or unfreeze failed.
    #[error("image '{image}': filesystem consistency error: {source}")]
    Consistency {
        /// Image name.
        image: String,
        /// The host error.
        #[source]
        source: HostError,
    },
}

impl BackupError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a per-volume error.
    pub fn volume(image: impl Into<String>, failure: impl Into<VolumeFailure>) -> Self {
        Self::Volume {
            image: image.into(),
            failure: failure.into(),
        }
    }

    /// Creates a consistency error.
    pub fn consistency(image: impl Into<String>, source: HostError) -> Self {
        Self::Consistency {
            image: image.into(),
            source,
        }
    }

    /// Wraps a cluster error raised while processing `image`.
    ///
    /// Errors that would fail every other volume too, such as a missing
    /// `rbd` binary, become configuration errors so the run stops.
    pub fn cluster(image: impl Into<String>, source: ClusterError) -> Self {
        if source.is_fatal() {
            Self::Configuration(source.to_string())
        } else {
            Self::volume(image, source)
        }
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackupError::Configuration(_) => ErrorKind::Configuration,
            BackupError::Volume { .. } => ErrorKind::Volume,
            BackupError::Consistency { .. } => ErrorKind::Consistency,
        }
    }

    /// Returns the image this error is scoped to, if any.
    pub fn image(&self) -> Option<&str> {
        match self {
            BackupError::Configuration(_) => None,
            BackupError::Volume { image, .. } | BackupError::Consistency { image, .. } => {
                Some(image)
            }
        }
    }

    /// Returns true if the run must stop.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}
