//! Cluster client backed by the `rbd` command-line tool.

use crate::cluster::{MappedDevice, StorageCluster};
use crate::error::{ClusterError, ClusterResult};
use crate::stream::{DiffStream, Source};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Credentials used to reach one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RbdCredentials {
    /// Path to the cluster configuration file (`-c`).
    pub conf: PathBuf,
    /// Path to the client keyring (`--keyring`).
    pub keyring: PathBuf,
    /// Client user name without the `client.` prefix (`--id`).
    pub user: String,
}

impl RbdCredentials {
    /// Creates a new set of credentials.
    pub fn new(conf: impl Into<PathBuf>, keyring: impl Into<PathBuf>, user: impl Into<String>) -> Self {
        Self {
            conf: conf.into(),
            keyring: keyring.into(),
            user: user.into(),
        }
    }
}

/// A cluster client that shells out to `rbd`.
///
/// Every call runs
/// `rbd -c <conf> --keyring <keyring> --id <user> [--format json] ...`
/// and blocks until it completes. Listing commands parse the JSON output.
///
/// Exports and imports are wired together through OS pipes; see
/// [`DiffStream`].
///
/// # Example
///
/// ```no_run
/// use rbdsync_cluster::{RbdCli, RbdCredentials, StorageCluster};
///
/// let creds = RbdCredentials::new(
///     "/etc/ceph/ceph.conf",
///     "/etc/ceph/ceph.client.rbd.keyring",
///     "rbd",
/// );
/// let cluster = RbdCli::connect(creds).unwrap();
/// for image in cluster.list_volumes().unwrap() {
///     println!("{image}");
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RbdCli {
    credentials: RbdCredentials,
    binary: PathBuf,
}

#[derive(Deserialize)]
struct SnapEntry {
    name: String,
}

#[derive(Deserialize)]
struct MappedEntry {
    name: String,
    device: String,
}

/// `rbd showmapped` emits an object keyed by device id on older releases
/// and a list on newer ones.
#[derive(Deserialize)]
#[serde(untagged)]
enum ShowMapped {
    List(Vec<MappedEntry>),
    Map(BTreeMap<String, MappedEntry>),
}

impl RbdCli {
    /// Creates a client without checking the credential files.
    pub fn new(credentials: RbdCredentials) -> Self {
        Self {
            credentials,
            binary: PathBuf::from("rbd"),
        }
    }

    /// Creates a client after checking that the credential files exist.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::InvalidCredentials`] if the configuration file
    /// or keyring is missing or the user name is empty.
    pub fn connect(credentials: RbdCredentials) -> ClusterResult<Self> {
        check_file("configuration file", &credentials.conf)?;
        check_file("keyring", &credentials.keyring)?;
        if credentials.user.trim().is_empty() {
            return Err(ClusterError::InvalidCredentials("empty client id".into()));
        }
        Ok(Self::new(credentials))
    }

    /// Uses a different `rbd` executable.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Returns the credentials in use.
    #[must_use]
    pub fn credentials(&self) -> &RbdCredentials {
        &self.credentials
    }

    fn command(&self, json: bool, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-c")
            .arg(&self.credentials.conf)
            .arg("--keyring")
            .arg(&self.credentials.keyring)
            .arg("--id")
            .arg(&self.credentials.user);
        if json {
            cmd.args(["--format", "json"]);
        }
        cmd.args(args);
        cmd
    }

    fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> ClusterResult<T> {
        let mut cmd = self.command(true, args);
        let line = describe(&cmd);
        debug!(cmd = %line, "rbd exec");

        let output = cmd
            .stdin(Stdio::null())
            .output()
            .map_err(|source| spawn_error(&line, source))?;
        if !output.status.success() {
            return Err(ClusterError::command_failed(
                line,
                output.status.to_string(),
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(stdout = %stdout.trim(), "rbd output");
        serde_json::from_str(&stdout).map_err(|e| ClusterError::Parse {
            command: line,
            message: e.to_string(),
        })
    }

    fn run(&self, args: &[&str]) -> ClusterResult<()> {
        let mut cmd = self.command(false, args);
        let line = describe(&cmd);
        debug!(cmd = %line, "rbd exec");

        let output = cmd
            .stdin(Stdio::null())
            .output()
            .map_err(|source| spawn_error(&line, source))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ClusterError::command_failed(
                line,
                output.status.to_string(),
                String::from_utf8_lossy(&output.stderr).trim(),
            ))
        }
    }
}

impl StorageCluster for RbdCli {
    fn list_volumes(&self) -> ClusterResult<Vec<String>> {
        self.run_json(&["list"])
    }

    fn create_volume(&self, image: &str, size_mb: u64) -> ClusterResult<()> {
        let size = size_mb.to_string();
        self.run(&["create", image, "--size", &size])
    }

    fn list_snapshots(&self, image: &str) -> ClusterResult<Vec<String>> {
        let entries: Vec<SnapEntry> = self.run_json(&["snap", "list", image])?;
        Ok(entries.into_iter().map(|e| e.name).collect())
    }

    fn create_snapshot(&self, image: &str, snapshot: &str) -> ClusterResult<()> {
        self.run(&["snap", "create", image, "--snap", snapshot])
    }

    fn export_diff(
        &self,
        image: &str,
        snapshot: &str,
        from_snapshot: Option<&str>,
    ) -> ClusterResult<DiffStream> {
        let mut args = vec!["export-diff", "--no-progress", image, "-", "--snap", snapshot];
        if let Some(from) = from_snapshot {
            args.extend(["--from-snap", from]);
        }
        let mut cmd = self.command(false, &args);
        let line = describe(&cmd);
        debug!(cmd = %line, "rbd export");

        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| spawn_error(&line, source))?;
        DiffStream::from_child(child, line)
    }

    fn import_diff(&self, image: &str, stream: DiffStream) -> ClusterResult<()> {
        let mut cmd = self.command(false, &["import-diff", "--no-progress", "-", image]);
        let line = describe(&cmd);
        debug!(cmd = %line, pipe = stream.is_pipe(), "rbd import");

        let (source, producer) = stream.into_parts();
        let imported = match source {
            Source::Pipe(stdout) => {
                cmd.stdin(Stdio::from(stdout))
                    .stdout(Stdio::null())
                    .stderr(Stdio::piped());
                let child = cmd.spawn().map_err(|source| spawn_error(&line, source));
                // Our copy of the pipe's read end must close, otherwise the
                // exporter never sees EPIPE if the importer dies.
                drop(cmd);
                child.and_then(|child| {
                    let output = child.wait_with_output()?;
                    if output.status.success() {
                        Ok(())
                    } else {
                        Err(ClusterError::command_failed(
                            line.clone(),
                            output.status.to_string(),
                            String::from_utf8_lossy(&output.stderr).trim(),
                        ))
                    }
                })
            }
            Source::Reader(mut reader) => {
                cmd.stdin(Stdio::piped()).stdout(Stdio::null());
                cmd.spawn()
                    .map_err(|source| spawn_error(&line, source))
                    .and_then(|mut child| {
                        if let Some(mut stdin) = child.stdin.take() {
                            let copied = io::copy(&mut reader, &mut stdin);
                            drop(stdin);
                            if let Err(e) = copied {
                                let _ = child.wait();
                                return Err(ClusterError::Io(e));
                            }
                        }
                        let status = child.wait()?;
                        if status.success() {
                            Ok(())
                        } else {
                            Err(ClusterError::command_failed(
                                line.clone(),
                                status.to_string(),
                                "see stderr",
                            ))
                        }
                    })
            }
        };

        let exported = match producer {
            Some(producer) => producer.finish(),
            None => Ok(()),
        };
        imported.and(exported)
    }

    fn list_mapped(&self) -> ClusterResult<Vec<MappedDevice>> {
        let mapped: ShowMapped = self.run_json(&["showmapped"])?;
        let entries: Vec<MappedEntry> = match mapped {
            ShowMapped::List(list) => list,
            ShowMapped::Map(map) => map.into_values().collect(),
        };
        Ok(entries
            .into_iter()
            .map(|e| MappedDevice::new(e.name, e.device))
            .collect())
    }
}

fn check_file(what: &str, path: &Path) -> ClusterResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ClusterError::InvalidCredentials(format!(
            "{} not found: {}",
            what,
            path.display()
        )))
    }
}

fn spawn_error(line: &str, source: io::Error) -> ClusterError {
    ClusterError::Spawn {
        command: line.to_string(),
        source,
    }
}

fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}
