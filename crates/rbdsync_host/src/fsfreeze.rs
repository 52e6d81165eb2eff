//! Host implementation backed by `findmnt` and `fsfreeze`.

use crate::error::{HostError, HostResult};
use crate::host::HostFilesystem;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::debug;

/// Resolves mountpoints with `findmnt` and freezes with `fsfreeze`.
///
/// Both tools ship with util-linux. Freezing requires root.
#[derive(Debug, Clone)]
pub struct FsfreezeHost {
    findmnt: PathBuf,
    fsfreeze: PathBuf,
}

impl Default for FsfreezeHost {
    fn default() -> Self {
        Self {
            findmnt: PathBuf::from("findmnt"),
            fsfreeze: PathBuf::from("fsfreeze"),
        }
    }
}

impl FsfreezeHost {
    /// Creates a host using `findmnt` and `fsfreeze` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a different `findmnt` executable.
    #[must_use]
    pub fn with_findmnt(mut self, path: impl Into<PathBuf>) -> Self {
        self.findmnt = path.into();
        self
    }

    /// Uses a different `fsfreeze` executable.
    #[must_use]
    pub fn with_fsfreeze(mut self, path: impl Into<PathBuf>) -> Self {
        self.fsfreeze = path.into();
        self
    }

    fn exec<I, S>(program: &Path, args: I) -> HostResult<(String, Output)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(program);
        cmd.args(args);
        let mut parts = vec![program.to_string_lossy().into_owned()];
        parts.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
        let line = parts.join(" ");
        debug!(cmd = %line, "host exec");

        let output = cmd
            .stdin(Stdio::null())
            .output()
            .map_err(|source| HostError::Spawn {
                command: line.clone(),
                source,
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(stdout = %stdout.trim(), "host output");
        Ok((line, output))
    }

    fn exec_checked(program: &Path, flag: &str, mountpoint: &Path) -> HostResult<()> {
        let (line, output) = Self::exec(program, [OsStr::new(flag), mountpoint.as_os_str()])?;
        if output.status.success() {
            Ok(())
        } else {
            Err(HostError::CommandFailed {
                command: line,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl HostFilesystem for FsfreezeHost {
    fn resolve_mountpoint(&self, device: &str) -> HostResult<Option<PathBuf>> {
        // findmnt exits non-zero when nothing matches; empty output is the signal.
        let (_, output) = Self::exec(&self.findmnt, ["-o", "TARGET", "-n", device])?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(PathBuf::from))
    }

    fn freeze(&self, mountpoint: &Path) -> HostResult<()> {
        Self::exec_checked(&self.fsfreeze, "--freeze", mountpoint)
    }

    fn unfreeze(&self, mountpoint: &Path) -> HostResult<()> {
        Self::exec_checked(&self.fsfreeze, "--unfreeze", mountpoint)
    }
}
