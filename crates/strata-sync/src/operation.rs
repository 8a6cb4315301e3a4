//! Sync operations as values
//!
//! A plan is a list of [`SyncOperation`]s. Each one runs against a
//! [`SyncContext`], so plans can be executed and tested without a network.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use strata_common::{Artifact, Result};

use crate::orchestrator::{EnsureOutcome, StatusReport};

/// What a sync operation needs before it may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Requirement {
    /// A registry bearer token is configured
    RegistryToken,
    /// The registry download tool is installed
    RegistryTool,
    /// The object-store tool is installed
    ObjectStoreTool,
}

/// The primitives a plan is executed against
#[async_trait]
pub trait SyncContext: Send + Sync {
    /// Fetch into the local cache unless it is Ready
    async fn ensure(&self, artifact: &Artifact) -> Result<EnsureOutcome>;

    /// Mirror the resolved snapshot to the remote tier
    async fn upload(&self, artifact: &Artifact) -> Result<PathBuf>;

    /// Forced fetch followed by upload
    async fn update(&self, artifact: &Artifact) -> Result<PathBuf>;

    /// Read-only state report
    async fn status(&self, artifact: &Artifact) -> Result<StatusReport>;

    /// Remote listing
    async fn list(&self, artifact: &Artifact) -> Result<String>;
}

/// One step of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    /// Fetch if the local cache is not Ready
    Ensure,
    /// Mirror the local snapshot to the remote tier
    Upload,
    /// Forced fetch, then upload
    Update,
    /// Report local and remote state
    Status,
    /// List the remote prefix
    List,
}

/// What a completed operation produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// Result of `ensure`
    Ensured(EnsureOutcome),
    /// Snapshot that was uploaded
    Uploaded(PathBuf),
    /// Snapshot that was uploaded after a forced fetch
    Updated(PathBuf),
    /// State report
    Status(StatusReport),
    /// Remote listing
    Listing(String),
}

impl OperationOutcome {
    /// Text to print for operations that report to the user
    pub fn report(&self) -> Option<String> {
        match self {
            Self::Status(report) => Some(report.to_string()),
            Self::Listing(listing) => Some(listing.trim_end().to_string()),
            Self::Ensured(_) | Self::Uploaded(_) | Self::Updated(_) => None,
        }
    }
}

impl SyncOperation {
    /// Run this operation
    pub async fn execute(
        self,
        context: &dyn SyncContext,
        artifact: &Artifact,
    ) -> Result<OperationOutcome> {
        Ok(match self {
            Self::Ensure => OperationOutcome::Ensured(context.ensure(artifact).await?),
            Self::Upload => OperationOutcome::Uploaded(context.upload(artifact).await?),
            Self::Update => OperationOutcome::Updated(context.update(artifact).await?),
            Self::Status => OperationOutcome::Status(context.status(artifact).await?),
            Self::List => OperationOutcome::Listing(context.list(artifact).await?),
        })
    }

    /// Preconditions this operation needs
    pub fn requirements(self) -> &'static [Requirement] {
        match self {
            Self::Ensure => &[Requirement::RegistryToken, Requirement::RegistryTool],
            Self::Upload | Self::List => &[Requirement::ObjectStoreTool],
            Self::Update => &[
                Requirement::RegistryToken,
                Requirement::RegistryTool,
                Requirement::ObjectStoreTool,
            ],
            Self::Status => &[],
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ensure => "ensure",
            Self::Upload => "upload",
            Self::Update => "update",
            Self::Status => "status",
            Self::List => "list",
        };
        f.write_str(s)
    }
}
