//! Strata CLI library

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use strata_common::config::ConfigOverrides;
use strata_common::{Artifact, Result, StrataConfig};
use strata_sync::dispatch::requirements;
use strata_sync::{dispatch, preflight, Command, SyncOrchestrator, USAGE};
use strata_transfer::{mirror_for, HfCliFetcher, PathToolProbe};
use tracing::info;

/// Strata - keep a model artifact in sync across registry, local cache and remote mirror
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Command to run: ensure, all, update, status, list or help
    #[arg(default_value = "all")]
    pub command: String,

    /// Configuration file (YAML)
    #[arg(short = 'f', long, env = "STRATA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print the plan for the command without running it
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

impl Cli {
    /// Run the CLI command against the process's stdout and stderr
    pub async fn run(self) -> Result<()> {
        self.run_with(&mut std::io::stdout(), &mut std::io::stderr()).await
    }

    /// Run the CLI command, writing reports to `out` and usage errors to `err`
    pub async fn run_with<O, E>(self, out: &mut O, err: &mut E) -> Result<()>
    where
        O: Write + Send,
        E: Write,
    {
        let command = match self.command.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                writeln!(err, "{}\n\n{}", e, USAGE)?;
                return Err(e);
            }
        };

        if command == Command::Help {
            writeln!(out, "{}", USAGE)?;
            return Ok(());
        }
        if self.dry_run {
            return describe_plan(command, out);
        }

        let config = Arc::new(StrataConfig::load(self.config.as_deref(), self.overrides)?);
        let artifact = Artifact::from_config(&config)?;

        let fetcher = Arc::new(
            HfCliFetcher::new(config.transfer.registry_tool.clone(), config.token.clone())
                .with_timeout(config.transfer.timeout()),
        );
        let mirror = mirror_for(
            &artifact.remote,
            &config.transfer,
            config.remote.region.clone(),
        );

        let plan = command.plan();
        preflight(
            plan,
            &config,
            fetcher.as_ref(),
            mirror.as_ref(),
            &PathToolProbe,
        )
        .await?;

        info!(
            command = %command,
            repo = %artifact.repo_id,
            remote = %artifact.remote,
            "Running plan"
        );
        let sync = SyncOrchestrator::new(config.clone(), fetcher, mirror);
        dispatch(plan, &sync, &artifact, out).await?;
        info!(command = %command, "Plan complete");
        Ok(())
    }
}

/// Write the operations and preconditions `command` would run
pub fn describe_plan<W: Write>(command: Command, out: &mut W) -> Result<()> {
    let plan = command.plan();
    writeln!(out, "command: {}", command)?;
    for (i, op) in plan.iter().enumerate() {
        writeln!(out, "  {}. {}", i + 1, op)?;
    }
    let needs = requirements(plan);
    if !needs.is_empty() {
        let names: Vec<String> = needs.iter().map(|r| format!("{:?}", r)).collect();
        writeln!(out, "requires: {}", names.join(", "))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_defaults_to_all() {
        let cli = Cli::try_parse_from(["strata"]).unwrap();
        assert_eq!(cli.command, "all");
        assert!(!cli.dry_run);
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "strata",
            "--repo-id",
            "acme/tiny-model",
            "--bucket",
            "weights",
            "--min-size-bytes",
            "1000000",
            "status-only",
        ])
        .unwrap();
        assert_eq!(cli.command, "status-only");

        let mut config = StrataConfig::default();
        cli.overrides.apply(&mut config);
        assert_eq!(config.artifact.repo_id, "acme/tiny-model");
        assert_eq!(config.artifact.min_size_bytes, 1_000_000);
        assert_eq!(config.remote.bucket.as_deref(), Some("weights"));
    }

    #[test]
    fn dry_run_describes_all_plan() {
        let mut out = Vec::new();
        describe_plan(Command::All, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "command: all\n  1. status\n  2. ensure\n  3. upload\n  4. list\n\
             requires: RegistryToken, RegistryTool, ObjectStoreTool\n"
        );
    }

    #[test]
    fn dry_run_status_needs_nothing() {
        let mut out = Vec::new();
        describe_plan(Command::Status, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "command: status\n  1. status\n");
    }

    #[tokio::test]
    async fn unknown_command_fails_before_loading_config() {
        let cli = Cli::try_parse_from(["strata", "--config", "/nonexistent/strata.yaml", "bogus"])
            .unwrap();
        let (mut out, mut stderr) = (Vec::new(), Vec::new());
        let err = cli.run_with(&mut out, &mut stderr).await.unwrap_err();
        assert!(matches!(err, strata_common::Error::Usage { .. }));
        assert_eq!(err.exit_code(), 1);

        let printed = String::from_utf8(stderr).unwrap();
        assert!(printed.starts_with("unknown command: bogus\n\n"));
        assert!(printed.contains(USAGE));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn help_prints_usage_to_stdout() {
        let cli = Cli::try_parse_from(["strata", "help"]).unwrap();
        let (mut out, mut stderr) = (Vec::new(), Vec::new());
        cli.run_with(&mut out, &mut stderr).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), format!("{}\n", USAGE));
        assert!(stderr.is_empty());
    }
}
