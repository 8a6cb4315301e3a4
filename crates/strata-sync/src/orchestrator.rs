//! Sync orchestration
//!
//! Moves an artifact from the registry into the local cache tier and from
//! the local cache tier to the remote mirror. Each public operation is
//! independently callable; composition into plans is the dispatcher's job.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use strata_cache::{classify, inspect, resolve, state_for, CacheState, Measurement};
use strata_common::config::RemoteLocation;
use strata_common::lease::Lease;
use strata_common::retry::{retry_with_backoff, RetryConfig};
use strata_common::units::human_bytes;
use strata_common::{Artifact, Error, Result, StrataConfig, SYNC_LEASE_FILE_NAME};
use strata_transfer::{FetchRequest, ObjectMirror, RegistryFetcher};
use tracing::{info, warn};

use crate::operation::SyncContext;

/// Result of an `ensure` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnsureOutcome {
    /// Local state observed before any fetch
    pub observed: CacheState,
    /// Whether a registry fetch ran
    pub fetched: bool,
}

/// Read-only view of an artifact across the local and remote tiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Registry repository id
    pub repo_id: String,
    /// Artifact directory in the local cache
    pub local_dir: PathBuf,
    /// Measured local size
    pub measurement: Measurement,
    /// Ready threshold in bytes
    pub threshold: u64,
    /// Classified local state
    pub state: CacheState,
    /// Resolved snapshot directory, or why resolution failed
    pub snapshot: std::result::Result<PathBuf, String>,
    /// Remote mirror location
    pub remote: RemoteLocation,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "artifact:  {}", self.repo_id)?;
        writeln!(f, "local:     {}", self.local_dir.display())?;
        match &self.measurement {
            Measurement::Absent => writeln!(f, "size:      0 B (absent)")?,
            Measurement::Present(bytes) => {
                writeln!(f, "size:      {} ({} bytes)", human_bytes(*bytes), bytes)?
            }
            Measurement::Indeterminate(reason) => writeln!(f, "size:      unknown ({})", reason)?,
        }
        writeln!(
            f,
            "threshold: {} ({} bytes)",
            human_bytes(self.threshold),
            self.threshold
        )?;
        writeln!(f, "state:     {}", self.state)?;
        match &self.snapshot {
            Ok(path) => writeln!(f, "snapshot:  {}", path.display())?,
            Err(reason) => writeln!(f, "snapshot:  none ({})", reason)?,
        }
        write!(f, "remote:    {}", self.remote)
    }
}

/// Drives the local and remote tiers for one configuration
pub struct SyncOrchestrator {
    config: Arc<StrataConfig>,
    fetcher: Arc<dyn RegistryFetcher>,
    mirror: Arc<dyn ObjectMirror>,
    retry: RetryConfig,
}

impl SyncOrchestrator {
    /// Create an orchestrator using the configured retry policy
    pub fn new(
        config: Arc<StrataConfig>,
        fetcher: Arc<dyn RegistryFetcher>,
        mirror: Arc<dyn ObjectMirror>,
    ) -> Self {
        let retry = config.transfer.retry();
        Self {
            config,
            fetcher,
            mirror,
            retry,
        }
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch from the registry unless the local cache is already Ready.
    ///
    /// Never uploads.
    pub async fn ensure(&self, artifact: &Artifact) -> Result<EnsureOutcome> {
        let _lease = self.lease(artifact)?;
        self.ensure_locked(artifact).await
    }

    /// Mirror the resolved local snapshot to the remote tier
    pub async fn upload(&self, artifact: &Artifact) -> Result<PathBuf> {
        let _lease = self.lease(artifact)?;
        self.upload_locked(artifact).await
    }

    /// Force a full registry download, then upload
    pub async fn update(&self, artifact: &Artifact) -> Result<PathBuf> {
        let _lease = self.lease(artifact)?;
        info!(repo = %artifact.repo_id, "Forcing registry refresh");
        self.fetch(artifact, true).await?;
        self.upload_locked(artifact).await
    }

    /// Report local and remote state without transferring anything
    pub fn status(&self, artifact: &Artifact) -> Result<StatusReport> {
        let local_dir = artifact.local_dir();
        let measurement = inspect(&local_dir);
        let state = state_for(
            &local_dir,
            &measurement,
            artifact.min_size_bytes,
            self.config.local.measurement,
        )?;
        let snapshot = resolve(&local_dir, &artifact.selector).map_err(|e| e.to_string());

        Ok(StatusReport {
            repo_id: artifact.repo_id.clone(),
            local_dir,
            measurement,
            threshold: artifact.min_size_bytes,
            state,
            snapshot,
            remote: artifact.remote.clone(),
        })
    }

    /// Listing of the artifact's remote prefix
    pub async fn list(&self, artifact: &Artifact) -> Result<String> {
        let location = artifact.remote.clone();
        let mirror = self.mirror.clone();
        retry_with_backoff(&self.retry, "list", || {
            let mirror = mirror.clone();
            let location = location.clone();
            async move { mirror.list(&location).await }
        })
        .await
    }

    fn lease(&self, artifact: &Artifact) -> Result<Lease> {
        Lease::acquire(&artifact.local_dir().join(SYNC_LEASE_FILE_NAME))
    }

    async fn ensure_locked(&self, artifact: &Artifact) -> Result<EnsureOutcome> {
        let local_dir = artifact.local_dir();
        let measurement = inspect(&local_dir);
        let observed = state_for(
            &local_dir,
            &measurement,
            artifact.min_size_bytes,
            self.config.local.measurement,
        )?;

        info!(
            repo = %artifact.repo_id,
            path = %local_dir.display(),
            size = %human_bytes(measurement.bytes_or_zero()),
            threshold = %human_bytes(artifact.min_size_bytes),
            state = %observed,
            "Inspected local cache"
        );

        if observed.is_ready() {
            info!(repo = %artifact.repo_id, "Local cache ready, skipping fetch");
            return Ok(EnsureOutcome {
                observed,
                fetched: false,
            });
        }

        self.fetch(artifact, false).await?;
        Ok(EnsureOutcome {
            observed,
            fetched: true,
        })
    }

    async fn upload_locked(&self, artifact: &Artifact) -> Result<PathBuf> {
        let local_dir = artifact.local_dir();
        let snapshot = resolve(&local_dir, &artifact.selector)?;
        let measurement = inspect(&local_dir);
        let state = state_for(
            &local_dir,
            &measurement,
            artifact.min_size_bytes,
            self.config.local.measurement,
        )?;
        if !state.is_ready() {
            return Err(Error::precondition(format!(
                "local cache for {} is {} ({} of {} required), run ensure first",
                artifact.repo_id,
                state,
                human_bytes(measurement.bytes_or_zero()),
                human_bytes(artifact.min_size_bytes)
            )));
        }
        let remote = artifact.remote.clone();

        info!(
            repo = %artifact.repo_id,
            snapshot = %snapshot.display(),
            remote = %remote,
            "Uploading snapshot"
        );

        let mirror = self.mirror.clone();
        let source = snapshot.clone();
        retry_with_backoff(&self.retry, "push", || {
            let mirror = mirror.clone();
            let source = source.clone();
            let remote = remote.clone();
            async move { mirror.push(&source, &remote).await }
        })
        .await?;

        Ok(snapshot)
    }

    async fn fetch(&self, artifact: &Artifact, force: bool) -> Result<()> {
        let request = FetchRequest {
            repo_id: artifact.repo_id.clone(),
            cache_root: artifact.cache_root.clone(),
            revision: artifact.revision().map(str::to_string),
            force,
        };

        let fetcher = self.fetcher.clone();
        let local_dir = artifact.local_dir();
        let threshold = artifact.min_size_bytes;
        retry_with_backoff(&self.retry, "fetch", || {
            let fetcher = fetcher.clone();
            let request = request.clone();
            let local_dir = local_dir.clone();
            async move {
                fetcher.fetch(&request).await?;
                // A download that exits cleanly but leaves the cache short is retried
                let after = inspect(&local_dir).bytes_or_zero();
                let state = classify(after, threshold);
                if state.is_ready() {
                    return Ok(());
                }
                warn!(
                    repo = %request.repo_id,
                    size = %human_bytes(after),
                    state = %state,
                    "Local cache still below threshold after fetch"
                );
                Err(Error::transfer(
                    "fetch",
                    format!(
                        "local cache is {} after fetch ({} of {} required)",
                        state,
                        human_bytes(after),
                        human_bytes(threshold)
                    ),
                ))
            }
        })
        .await
    }
}

#[async_trait]
impl SyncContext for SyncOrchestrator {
    async fn ensure(&self, artifact: &Artifact) -> Result<EnsureOutcome> {
        SyncOrchestrator::ensure(self, artifact).await
    }

    async fn upload(&self, artifact: &Artifact) -> Result<PathBuf> {
        SyncOrchestrator::upload(self, artifact).await
    }

    async fn update(&self, artifact: &Artifact) -> Result<PathBuf> {
        SyncOrchestrator::update(self, artifact).await
    }

    async fn status(&self, artifact: &Artifact) -> Result<StatusReport> {
        SyncOrchestrator::status(self, artifact)
    }

    async fn list(&self, artifact: &Artifact) -> Result<String> {
        SyncOrchestrator::list(self, artifact).await
    }
}
