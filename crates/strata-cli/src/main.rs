//! Strata CLI
//!
//! Keeps a model artifact in sync between the registry, the local cache and
//! the remote mirror.

use std::process::ExitCode;

use clap::Parser;
use strata_cli::Cli;
use strata_common::telemetry::{init_logging, LogFormat};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    let format = match LogFormat::from_env() {
        Ok(format) => format,
        Err(e) => {
            eprintln!("strata: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_logging(format) {
        eprintln!("strata: {}", e);
        return ExitCode::FAILURE;
    }

    let cli = Cli::parse();
    match cli.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "strata failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
