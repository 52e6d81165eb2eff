//! Error types for host filesystem operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for host filesystem operations.
pub type HostResult<T> = Result<T, HostError>;

/// Errors that can occur while inspecting or freezing filesystems.
#[derive(Debug, Error)]
pub enum HostError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The helper command could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// The command line that was attempted.
        command: String,
        /// The underlying spawn error.
        source: io::Error,
    },

    /// The helper command exited unsuccessfully.
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        /// The command line that failed.
        command: String,
        /// Exit status description.
        status: String,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// Freeze or unfreeze was requested for a volume with no mountpoint.
    #[error("cannot freeze or unfreeze unmounted volume {device}")]
    NotMounted {
        /// The device that is not mounted.
        device: String,
    },

    /// The filesystem is already frozen.
    #[error("filesystem already frozen: {0}")]
    AlreadyFrozen(PathBuf),

    /// The filesystem is not frozen.
    #[error("filesystem not frozen: {0}")]
    NotFrozen(PathBuf),
}
