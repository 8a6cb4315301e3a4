//! Restore state machine
//!
//! Runs once per workload start, before the workload serves traffic:
//! - marker present: `Restored`, nothing to do
//! - marker absent, data present: `Recovering` from an interrupted attempt
//! - marker absent, nothing present: `NotRestored`
//!
//! Recovering and NotRestored take the same path. The mirror only copies
//! files that differ, so re-running over a partial tree repairs it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use strata_cache::inspect;
use strata_common::config::StrataConfig;
use strata_common::lease::Lease;
use strata_common::retry::{retry_with_backoff, RetryConfig};
use strata_common::units::human_bytes;
use strata_common::{Artifact, Error, Result, RESTORE_LEASE_FILE_NAME};
use strata_transfer::ObjectMirror;
use tracing::{info, warn};

use crate::marker;

/// Restore state of an ephemeral tier, derived from disk on every call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreState {
    /// Marker present
    Restored,
    /// No marker, but an earlier attempt left data behind
    Recovering {
        /// Bytes already present in the artifact directory
        existing_bytes: u64,
    },
    /// No marker and no data
    NotRestored,
}

/// Inspect the ephemeral tier at `root` for `artifact`
pub fn detect(artifact: &Artifact, root: &Path) -> RestoreState {
    if marker::is_present(&artifact.marker_path(root)) {
        return RestoreState::Restored;
    }
    match inspect(&artifact.ephemeral_dir(root)).bytes_or_zero() {
        0 => RestoreState::NotRestored,
        existing_bytes => RestoreState::Recovering { existing_bytes },
    }
}

/// What a restore run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The marker was already present; nothing was transferred
    AlreadyRestored,
    /// The remote was mirrored and verified
    Restored {
        /// Snapshot directory the remote was mirrored into
        destination: PathBuf,
        /// Whether a previous partial attempt was repaired
        recovered: bool,
    },
}

/// Mirrors the remote tier into an ephemeral tier and verifies it
pub struct RestoreOrchestrator {
    mirror: Arc<dyn ObjectMirror>,
    ephemeral_root: PathBuf,
    excludes: Vec<String>,
    retry: RetryConfig,
}

impl RestoreOrchestrator {
    /// Create an orchestrator from configuration
    pub fn new(config: &StrataConfig, mirror: Arc<dyn ObjectMirror>) -> Self {
        Self {
            mirror,
            ephemeral_root: config.restore.ephemeral_root.clone(),
            excludes: config.restore.excludes.clone(),
            retry: config.transfer.retry(),
        }
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Restore `artifact`, or return immediately if it already is.
    pub async fn restore(&self, artifact: &Artifact) -> Result<RestoreOutcome> {
        let root = self.ephemeral_root.as_path();
        if detect(artifact, root) == RestoreState::Restored {
            info!(repo = %artifact.repo_id, "Artifact already restored, skipping transfer");
            return Ok(RestoreOutcome::AlreadyRestored);
        }

        let _lease = Lease::acquire(&artifact.ephemeral_dir(root).join(RESTORE_LEASE_FILE_NAME))?;

        // Re-check under the lease; a previous holder may have just finished
        let recovered = match detect(artifact, root) {
            RestoreState::Restored => return Ok(RestoreOutcome::AlreadyRestored),
            RestoreState::Recovering { existing_bytes } => {
                warn!(
                    repo = %artifact.repo_id,
                    existing = %human_bytes(existing_bytes),
                    "Found data without a completion marker, recovering interrupted restore"
                );
                true
            }
            RestoreState::NotRestored => false,
        };

        let destination = artifact.ephemeral_snapshot_dir(root);
        info!(
            repo = %artifact.repo_id,
            source = %artifact.remote,
            destination = %destination.display(),
            "Restoring artifact from remote"
        );

        let mirror = self.mirror.clone();
        let source = artifact.remote.clone();
        let dest = destination.clone();
        let excludes = self.excludes.clone();
        retry_with_backoff(&self.retry, "pull", || {
            let mirror = mirror.clone();
            let source = source.clone();
            let dest = dest.clone();
            let excludes = excludes.clone();
            async move { mirror.pull(&source, &dest, &excludes).await }
        })
        .await?;

        let manifest = destination.join(&artifact.manifest_file);
        if !manifest.is_file() {
            return Err(Error::verification(manifest));
        }

        marker::write(
            &artifact.marker_path(root),
            &artifact.remote,
            artifact.restore_revision(),
        )?;
        info!(
            repo = %artifact.repo_id,
            destination = %destination.display(),
            recovered,
            "Restore verified"
        );

        Ok(RestoreOutcome::Restored {
            destination,
            recovered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use mockall::mock;
    use strata_common::config::{RemoteLocation, SnapshotSelector};

    mock! {
        pub Mirror {}

        #[async_trait::async_trait]
        impl ObjectMirror for Mirror {
            fn required_tool(&self) -> Option<String>;
            async fn push(&self, source: &Path, dest: &RemoteLocation) -> Result<()>;
            async fn pull(&self, source: &RemoteLocation, dest: &Path, excludes: &[String]) -> Result<()>;
            async fn list(&self, location: &RemoteLocation) -> Result<String>;
        }
    }

    fn artifact() -> Artifact {
        Artifact {
            repo_id: "acme/tiny-model".to_string(),
            cache_root: PathBuf::from("/unused"),
            remote: RemoteLocation::parse("s3://weights/models/tiny-model").unwrap(),
            min_size_bytes: 1,
            selector: SnapshotSelector::Unique,
            manifest_file: "config.json".to_string(),
        }
    }

    fn orchestrator(root: &Path, mirror: MockMirror) -> RestoreOrchestrator {
        let mut config = StrataConfig::default();
        config.restore.ephemeral_root = root.to_path_buf();
        RestoreOrchestrator::new(&config, Arc::new(mirror)).with_retry(RetryConfig {
            max_attempts: 2,
            initial_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(1),
            backoff_multiplier: 1.0,
        })
    }

    /// A pull that writes `files` into the destination
    fn pull_writing(mirror: &mut MockMirror, files: &'static [(&'static str, &'static str)]) {
        mirror.expect_pull().times(1).returning(move |_, dest, _| {
            fs::create_dir_all(dest).unwrap();
            for (name, body) in files {
                fs::write(dest.join(name), body).unwrap();
            }
            Ok(())
        });
    }

    #[tokio::test]
    async fn marker_present_is_fast_path() {
        let root = tempfile::tempdir().unwrap();
        let artifact = artifact();
        marker::write(&artifact.marker_path(root.path()), &artifact.remote, "main").unwrap();

        let mut mirror = MockMirror::new();
        mirror.expect_pull().never();
        let outcome = orchestrator(root.path(), mirror)
            .restore(&artifact)
            .await
            .unwrap();
        assert_eq!(outcome, RestoreOutcome::AlreadyRestored);
    }

    #[tokio::test]
    async fn clean_restore_writes_marker() {
        let root = tempfile::tempdir().unwrap();
        let artifact = artifact();

        let mut mirror = MockMirror::new();
        mirror
            .expect_pull()
            .withf(|source, dest, excludes| {
                source.to_string() == "s3://weights/models/tiny-model/"
                    && dest.ends_with("models--acme--tiny-model/snapshots/main")
                    && excludes == [".cache/*".to_string()]
            })
            .times(1)
            .returning(|_, dest, _| {
                fs::create_dir_all(dest).unwrap();
                fs::write(dest.join("config.json"), b"{}").unwrap();
                Ok(())
            });

        let restorer = orchestrator(root.path(), mirror);
        let outcome = restorer.restore(&artifact).await.unwrap();
        assert!(matches!(outcome, RestoreOutcome::Restored { recovered: false, .. }));
        assert_eq!(detect(&artifact, root.path()), RestoreState::Restored);
    }

    #[tokio::test]
    async fn missing_manifest_withholds_marker() {
        let root = tempfile::tempdir().unwrap();
        let artifact = artifact();

        let mut mirror = MockMirror::new();
        pull_writing(&mut mirror, &[("model.safetensors", "weights")]);

        let err = orchestrator(root.path(), mirror)
            .restore(&artifact)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Verification { .. }));
        assert_eq!(err.exit_code(), 1);
        assert!(!artifact.marker_path(root.path()).exists());
    }

    #[tokio::test]
    async fn partial_tier_without_marker_is_recovered() {
        let root = tempfile::tempdir().unwrap();
        let artifact = artifact();
        let snapshot = artifact.ephemeral_snapshot_dir(root.path());
        fs::create_dir_all(&snapshot).unwrap();
        fs::write(snapshot.join("model.safetensors"), b"half").unwrap();

        assert_eq!(
            detect(&artifact, root.path()),
            RestoreState::Recovering { existing_bytes: 4 }
        );

        let mut mirror = MockMirror::new();
        pull_writing(
            &mut mirror,
            &[("model.safetensors", "all of it"), ("config.json", "{}")],
        );
        let outcome = orchestrator(root.path(), mirror)
            .restore(&artifact)
            .await
            .unwrap();

        assert!(matches!(outcome, RestoreOutcome::Restored { recovered: true, .. }));
        assert!(artifact.marker_path(root.path()).is_file());
    }

    #[tokio::test]
    async fn mirror_failure_is_retried_then_fatal() {
        let root = tempfile::tempdir().unwrap();
        let artifact = artifact();

        let mut mirror = MockMirror::new();
        mirror
            .expect_pull()
            .times(2)
            .returning(|_, _, _| Err(Error::transfer("pull", "exit status 1: access denied")));

        let err = orchestrator(root.path(), mirror)
            .restore(&artifact)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transfer { .. }));
        assert!(!artifact.marker_path(root.path()).exists());
    }

    #[tokio::test]
    async fn concurrent_restore_is_rejected_by_lease() {
        let root = tempfile::tempdir().unwrap();
        let artifact = artifact();
        let _held = Lease::acquire(
            &artifact
                .ephemeral_dir(root.path())
                .join(RESTORE_LEASE_FILE_NAME),
        )
        .unwrap();

        let mut mirror = MockMirror::new();
        mirror.expect_pull().never();
        let err = orchestrator(root.path(), mirror)
            .restore(&artifact)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Lease { .. }));
    }

    #[test]
    fn empty_tier_is_not_restored() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(detect(&artifact(), root.path()), RestoreState::NotRestored);
    }
}
