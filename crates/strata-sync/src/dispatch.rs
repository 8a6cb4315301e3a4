//! Command dispatch
//!
//! Maps a command name to a plan of [`SyncOperation`]s, checks the plan's
//! preconditions once, then runs the plan in order. Routing is pure: an
//! unknown name is rejected before anything touches the network.

use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use strata_common::{Artifact, Error, Result, StrataConfig};
use strata_transfer::{ObjectMirror, RegistryFetcher, ToolProbe, TOKEN_ENV};
use tracing::{debug, info};

use crate::operation::{OperationOutcome, Requirement, SyncContext, SyncOperation};

/// Usage text for the sync binary
pub const USAGE: &str = "\
Usage: strata [OPTIONS] [COMMAND]

Commands:
  ensure   Fetch into the local cache if not ready, then upload
           (alias: ensure-and-sync)
  all      Status, ensure, upload, then list the remote (default)
           (alias: ensure-and-sync-with-report)
  update   Force a full registry download, upload, then list
           (alias: force-refresh-and-sync)
  status   Report local cache state and the remote location
           (alias: status-only)
  list     List the remote mirror
           (alias: list-only)
  help     Print this message (aliases: -h, --help)

Run `strata --help` for options.";

/// A named dispatcher command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Ensure, Upload
    Ensure,
    /// Status, Ensure, Upload, List
    All,
    /// Update, List
    Update,
    /// Status
    Status,
    /// List
    List,
    /// Print usage
    Help,
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "ensure" | "ensure-and-sync" => Ok(Self::Ensure),
            "all" | "ensure-and-sync-with-report" => Ok(Self::All),
            "update" | "force-refresh-and-sync" => Ok(Self::Update),
            "status" | "status-only" => Ok(Self::Status),
            "list" | "list-only" => Ok(Self::List),
            "help" | "-h" | "--help" => Ok(Self::Help),
            other => Err(Error::usage(other)),
        }
    }
}

impl Command {
    /// Canonical name
    pub fn name(self) -> &'static str {
        match self {
            Self::Ensure => "ensure",
            Self::All => "all",
            Self::Update => "update",
            Self::Status => "status",
            Self::List => "list",
            Self::Help => "help",
        }
    }

    /// Operations this command runs, in order
    pub fn plan(self) -> &'static [SyncOperation] {
        use SyncOperation::*;
        match self {
            Self::Ensure => &[Ensure, Upload],
            Self::All => &[Status, Ensure, Upload, List],
            Self::Update => &[Update, List],
            Self::Status => &[Status],
            Self::List => &[List],
            Self::Help => &[],
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Union of the requirements of every operation in `plan`
pub fn requirements(plan: &[SyncOperation]) -> BTreeSet<Requirement> {
    plan.iter()
        .flat_map(|op| op.requirements().iter().copied())
        .collect()
}

/// Check every precondition `plan` needs, before any operation runs.
///
/// The token is checked first since it needs no I/O at all.
pub async fn preflight(
    plan: &[SyncOperation],
    config: &StrataConfig,
    fetcher: &dyn RegistryFetcher,
    mirror: &dyn ObjectMirror,
    probe: &dyn ToolProbe,
) -> Result<()> {
    let needed = requirements(plan);

    if needed.contains(&Requirement::RegistryToken) {
        let has_token = config
            .token
            .as_deref()
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false);
        if !has_token {
            return Err(Error::precondition(format!(
                "{} is not set; it is required to fetch from the registry",
                TOKEN_ENV
            )));
        }
    }

    let mut tools = BTreeSet::new();
    if needed.contains(&Requirement::RegistryTool) {
        tools.extend(fetcher.required_tool());
    }
    if needed.contains(&Requirement::ObjectStoreTool) {
        tools.extend(mirror.required_tool());
    }
    for tool in &tools {
        probe.check(tool).await?;
    }

    debug!(requirements = ?needed, tools = ?tools, "Preconditions satisfied");
    Ok(())
}

/// Run `plan` in order, writing reports to `out` as they are produced.
///
/// Stops at the first failing operation.
pub async fn dispatch<W: Write + Send>(
    plan: &[SyncOperation],
    context: &dyn SyncContext,
    artifact: &Artifact,
    out: &mut W,
) -> Result<Vec<OperationOutcome>> {
    let mut outcomes = Vec::with_capacity(plan.len());
    for op in plan {
        info!(operation = %op, repo = %artifact.repo_id, "Running operation");
        let outcome = op.execute(context, artifact).await?;
        if let Some(report) = outcome.report() {
            writeln!(out, "{}", report)?;
            out.flush()?;
        }
        outcomes.push(outcome);
    }
    Ok(outcomes)
}
