//! Restore side of Strata: remote mirror → ephemeral tier
//!
//! Intended to run once before a workload starts serving. A verified restore
//! leaves a completion marker so later starts skip the transfer entirely.

#![deny(missing_docs)]

pub mod marker;
pub mod restore;

use strata_common::{Artifact, Result, StrataConfig};
use strata_transfer::{mirror_for, ToolProbe};
use tracing::info;

pub use restore::{detect, RestoreOrchestrator, RestoreOutcome, RestoreState};

/// Restore the configured artifact using the real transfer backends.
///
/// The object-store tool is only probed when the marker is absent, so the
/// fast path needs nothing but the filesystem.
pub async fn run(config: &StrataConfig, probe: &dyn ToolProbe) -> Result<RestoreOutcome> {
    let artifact = Artifact::from_config(config)?;
    let mirror = mirror_for(
        &artifact.remote,
        &config.transfer,
        config.remote.region.clone(),
    );

    if detect(&artifact, &config.restore.ephemeral_root) != RestoreState::Restored {
        if let Some(tool) = mirror.required_tool() {
            probe.check(&tool).await?;
        }
    }

    info!(
        repo = %artifact.repo_id,
        root = %config.restore.ephemeral_root.display(),
        "Starting restore"
    );
    RestoreOrchestrator::new(config, mirror)
        .restore(&artifact)
        .await
}
