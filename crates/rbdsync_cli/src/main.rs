//! rbdsync CLI
//!
//! Snapshots, replicates and checks Ceph RBD images.
//!
//! # Actions
//!
//! - `snapshot` - Snapshot every image mapped on this host
//! - `replicate` - Copy new snapshots from the production to the backup cluster
//! - `check` - Report backup freshness for monitoring (exit 0, 2 or 3)

mod commands;

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Ceph RBD snapshot and backup replication.
#[derive(Parser, Debug)]
#[command(name = "rbdsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Action to perform
    #[arg(value_enum)]
    action: Action,

    /// Only process this image
    #[arg(long)]
    image: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Log what would be done without changing anything
    #[arg(long)]
    noop: bool,

    /// Configuration file (TOML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Action {
    /// Snapshot mapped images
    Snapshot,
    /// Replicate snapshots to the backup cluster
    Replicate,
    /// Check that backups are current
    Check,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let image = cli.image.as_deref();
    let config = commands::load_config(cli.config.as_deref(), cli.noop);

    match cli.action {
        Action::Check => ExitCode::from(commands::check::run(config, image)),
        Action::Replicate => {
            commands::finish(config.and_then(|c| commands::replicate::run(&c, image)))
        }
        Action::Snapshot => {
            commands::finish(config.and_then(|c| commands::snapshot::run(&c, image)))
        }
    }
}
