//! CLI action implementations.

pub mod check;
pub mod replicate;
pub mod snapshot;

use rbdsync_cluster::{DryRunCluster, RbdCli, RbdCredentials, StorageCluster};
use rbdsync_core::{BackupConfig, BackupError, BackupResult, ClusterRole};
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, error};

/// Configuration file read when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/rbdsync/rbdsync.toml";

/// Loads and validates the configuration.
///
/// `--noop` forces dry-run mode on top of whatever the file says.
pub fn load_config(path: Option<&Path>, noop: bool) -> BackupResult<BackupConfig> {
    let config = match path {
        Some(path) => BackupConfig::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            BackupConfig::from_file(Path::new(DEFAULT_CONFIG_PATH))?
        }
        None => {
            debug!("No configuration file, using defaults");
            BackupConfig::default()
        }
    };
    let config = if noop { config.with_dry_run(true) } else { config };
    config.validate()?;
    Ok(config)
}

/// Opens a cluster client, wrapped for dry runs if requested.
pub fn connect(
    credentials: &RbdCredentials,
    role: ClusterRole,
    dry_run: bool,
) -> BackupResult<Box<dyn StorageCluster>> {
    let client = RbdCli::connect(credentials.clone()).map_err(|e| {
        BackupError::configuration(format!("cannot connect to {} cluster: {}", role, e))
    })?;
    if dry_run {
        Ok(Box::new(DryRunCluster::new(client)))
    } else {
        Ok(Box::new(client))
    }
}

/// Maps the result of `snapshot` or `replicate` to the process exit code.
///
/// Per-volume errors are already logged and do not fail the process.
pub fn finish(result: BackupResult<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_config_applies_noop() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "stamp_offset_hours = 24").unwrap();

        let config = load_config(Some(file.path()), true).unwrap();
        assert!(config.dry_run);
        assert_eq!(config.stamp_offset_hours, 24);
    }

    #[test]
    fn load_config_validates() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "initial_volume_size_mb = 0").unwrap();

        assert!(load_config(Some(file.path()), false).unwrap_err().is_fatal());
    }

    #[test]
    fn connect_rejects_missing_keyring() {
        let credentials = RbdCredentials::new("/nonexistent/ceph.conf", "/nonexistent/keyring", "rbd");
        let err = connect(&credentials, ClusterRole::Production, false).err().unwrap();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("production"));
    }
}
