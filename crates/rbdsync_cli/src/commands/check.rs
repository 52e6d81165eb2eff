//! Check action implementation.
//!
//! Prints one status line for monitoring and returns its exit code.

use super::connect;
use rbdsync_core::{
    render_unknown, BackupConfig, BackupResult, ClusterRole, StatusChecker, EXIT_UNKNOWN,
};

/// Runs the check action and returns the process exit code.
pub fn run(config: BackupResult<BackupConfig>, image: Option<&str>) -> u8 {
    match check(config, image) {
        Ok((line, code)) => {
            println!("{}", line);
            code
        }
        Err(e) => {
            println!("{}", render_unknown(&e));
            EXIT_UNKNOWN
        }
    }
}

fn check(config: BackupResult<BackupConfig>, image: Option<&str>) -> BackupResult<(String, u8)> {
    let config = config?;
    let source = connect(&config.production, ClusterRole::Production, false)?;
    let destination = connect(&config.backup, ClusterRole::Backup, false)?;

    let checker = StatusChecker::new(config, source, destination);
    let report = checker.check(image)?;
    Ok((report.to_string(), report.exit_code()))
}
