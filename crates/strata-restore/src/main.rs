//! strata-restore
//!
//! Populates the ephemeral tier from the remote mirror. All inputs come from
//! the environment; flags exist for local testing.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use strata_common::config::ConfigOverrides;
use strata_common::telemetry::{init_logging, LogFormat};
use strata_common::StrataConfig;
use strata_restore::RestoreOutcome;
use strata_transfer::PathToolProbe;
use tracing::{error, info};

/// Restore a model artifact into the ephemeral tier
#[derive(Parser, Debug)]
#[command(name = "strata-restore", version, about, long_about = None)]
struct Args {
    /// Configuration file (YAML)
    #[arg(long, short = 'f', env = "STRATA_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigOverrides,
}

#[tokio::main]
async fn main() -> ExitCode {
    let format = match LogFormat::from_env() {
        Ok(format) => format,
        Err(e) => {
            eprintln!("strata-restore: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_logging(format) {
        eprintln!("strata-restore: {}", e);
        return ExitCode::FAILURE;
    }

    let args = Args::parse();
    let config = match StrataConfig::load(args.config.as_deref(), args.overrides) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    match strata_restore::run(&config, &PathToolProbe).await {
        Ok(RestoreOutcome::AlreadyRestored) => ExitCode::SUCCESS,
        Ok(RestoreOutcome::Restored { destination, .. }) => {
            info!(destination = %destination.display(), "Artifact ready");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Restore failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
