//! Error types for cluster operations.

use std::io;
use thiserror::Error;

/// Result type for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors that can occur while talking to a storage cluster.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The cluster command could not be started at all.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// The command line that was attempted.
        command: String,
        /// The underlying spawn error.
        source: io::Error,
    },

    /// The cluster command exited unsuccessfully.
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        /// The command line that failed.
        command: String,
        /// Exit status description.
        status: String,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// The cluster command produced output that could not be parsed.
    #[error("unexpected output from `{command}`: {message}")]
    Parse {
        /// The command line whose output was rejected.
        command: String,
        /// Description of the parse failure.
        message: String,
    },

    /// Credentials or configuration files are missing or unusable.
    #[error("invalid cluster credentials: {0}")]
    InvalidCredentials(String),

    /// The image does not exist.
    #[error("image not found: {0}")]
    ImageNotFound(String),

    /// The image already exists.
    #[error("image already exists: {0}")]
    ImageExists(String),

    /// The snapshot does not exist on the image.
    #[error("snapshot {snapshot} not found on image {image}")]
    SnapshotNotFound {
        /// Image name.
        image: String,
        /// Snapshot label.
        snapshot: String,
    },

    /// The snapshot already exists on the image.
    #[error("snapshot {snapshot} already exists on image {image}")]
    SnapshotExists {
        /// Image name.
        image: String,
        /// Snapshot label.
        snapshot: String,
    },

    /// A diff stream was malformed or did not match its target image.
    #[error("diff stream error: {0}")]
    Stream(String),
}

impl ClusterError {
    /// Creates a command failure error.
    pub fn command_failed(
        command: impl Into<String>,
        status: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            command: command.into(),
            status: status.into(),
            stderr: stderr.into(),
        }
    }

    /// Returns true if the error means the cluster cannot be used at all,
    /// as opposed to a failure scoped to one image.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClusterError::InvalidCredentials(_) | ClusterError::Spawn { .. }
        )
    }
}
