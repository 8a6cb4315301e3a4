//! Artifact identity and tier layout
//!
//! An [`Artifact`] is a transient value derived from configuration. It knows
//! where the artifact lives in each tier but holds no state of its own.

use std::path::{Path, PathBuf};

use crate::config::{RemoteLocation, SnapshotSelector, StrataConfig};
use crate::{Error, Result, MARKER_FILE_NAME, SNAPSHOTS_DIR};

/// A large, versioned content tree moved between tiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Registry repository id (`org/name`)
    pub repo_id: String,
    /// Registry cache root the artifact directory lives under
    pub cache_root: PathBuf,
    /// Remote mirror location for this artifact
    pub remote: RemoteLocation,
    /// Minimum local size for the cache to count as Ready
    pub min_size_bytes: u64,
    /// How the snapshot directory is chosen
    pub selector: SnapshotSelector,
    /// File whose presence marks a restore as usable
    pub manifest_file: String,
}

impl Artifact {
    /// Build the artifact described by `config`
    pub fn from_config(config: &StrataConfig) -> Result<Self> {
        let repo_id = config.artifact.repo_id.trim().to_string();
        let name = repo_name(&repo_id)?;
        let remote = config.remote.base_location()?.join(name);

        Ok(Self {
            cache_root: config.local.resolved_cache_root()?,
            remote,
            min_size_bytes: config.artifact.min_size_bytes,
            selector: config.artifact.selector(),
            manifest_file: config.artifact.manifest_file.clone(),
            repo_id,
        })
    }

    /// Short artifact name (the part after the org)
    pub fn name(&self) -> &str {
        self.repo_id
            .split_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.repo_id)
    }

    /// Registry cache directory name: `models--<org>--<name>`
    pub fn cache_dir_name(&self) -> String {
        cache_dir_name(&self.repo_id)
    }

    /// Artifact directory in the local cache tier
    pub fn local_dir(&self) -> PathBuf {
        self.cache_root.join(self.cache_dir_name())
    }

    /// Artifact directory in an ephemeral tier mounted at `root`
    pub fn ephemeral_dir(&self, root: &Path) -> PathBuf {
        root.join(self.cache_dir_name())
    }

    /// Explicitly pinned revision, if any
    pub fn revision(&self) -> Option<&str> {
        match &self.selector {
            SnapshotSelector::Revision(rev) => Some(rev.as_str()),
            _ => None,
        }
    }

    /// Snapshot directory name used when restoring into an ephemeral tier
    pub fn restore_revision(&self) -> &str {
        match &self.selector {
            SnapshotSelector::Revision(rev) => rev.as_str(),
            _ => crate::config::DEFAULT_RESTORE_REVISION,
        }
    }

    /// Where the remote mirror lands inside an ephemeral tier at `root`
    pub fn ephemeral_snapshot_dir(&self, root: &Path) -> PathBuf {
        self.ephemeral_dir(root)
            .join(SNAPSHOTS_DIR)
            .join(self.restore_revision())
    }

    /// Completion marker path inside an ephemeral tier at `root`
    pub fn marker_path(&self, root: &Path) -> PathBuf {
        self.ephemeral_dir(root).join(MARKER_FILE_NAME)
    }
}

/// Registry cache directory name for a repository id
pub fn cache_dir_name(repo_id: &str) -> String {
    format!("models--{}", repo_id.replace('/', "--"))
}

fn repo_name(repo_id: &str) -> Result<&str> {
    match repo_id.split_once('/') {
        Some((org, name)) if !org.is_empty() && !name.is_empty() => Ok(name),
        _ => Err(Error::config(format!(
            "artifact repo id '{}' must have the form org/name",
            repo_id
        ))),
    }
}
