//! Strata configuration
//!
//! One immutable [`StrataConfig`] value is built at startup and handed to
//! every component. Sources, lowest priority first:
//! 1. Built-in defaults
//! 2. Optional YAML file (`--config` / `STRATA_CONFIG`)
//! 3. Command-line flags, each with an environment variable fallback
//!
//! The registry token is never read from or written to the file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;
use crate::{Error, Result};

/// Default remote key prefix under the bucket
pub const DEFAULT_PREFIX: &str = "models";

/// Default minimum size for a cache to count as complete (1 GiB)
pub const DEFAULT_MIN_SIZE_BYTES: u64 = 1024 * 1024 * 1024;

/// Manifest file whose presence marks a restore as usable
pub const DEFAULT_MANIFEST_FILE: &str = "config.json";

/// Mount point of the ephemeral workload volume
pub const DEFAULT_EPHEMERAL_ROOT: &str = "/models";

/// Snapshot directory name used in the ephemeral tier when no revision is set
pub const DEFAULT_RESTORE_REVISION: &str = "main";

/// Registry cache-control sub-path skipped when restoring
pub const DEFAULT_RESTORE_EXCLUDE: &str = ".cache/*";

/// Default registry download tool
pub const DEFAULT_REGISTRY_TOOL: &str = "huggingface-cli";

/// Default object storage tool
pub const DEFAULT_OBJECT_STORE_TOOL: &str = "aws";

/// Location of the remote mirror tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteLocation {
    /// S3-compatible object store
    S3 {
        /// Bucket name
        bucket: String,
        /// Key prefix without leading or trailing slash (may be empty)
        key: String,
    },
    /// Directory on a shared filesystem
    Directory(PathBuf),
}

impl RemoteLocation {
    /// Parse `s3://bucket/key`, `file:///path` or a plain filesystem path
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(Error::config("remote location is empty"));
        }

        if let Some(rest) = uri.strip_prefix("s3://") {
            let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
            if bucket.is_empty() {
                return Err(Error::config(format!("remote '{}' has no bucket", uri)));
            }
            return Ok(Self::S3 {
                bucket: bucket.to_string(),
                key: key.trim_matches('/').to_string(),
            });
        }

        if let Some(path) = uri.strip_prefix("file://") {
            return Ok(Self::Directory(PathBuf::from(path)));
        }

        if uri.contains("://") {
            return Err(Error::config(format!(
                "unsupported remote scheme in '{}' (expected s3:// or a path)",
                uri
            )));
        }

        Ok(Self::Directory(PathBuf::from(uri)))
    }

    /// Append a path segment
    pub fn join(&self, segment: &str) -> Self {
        let segment = segment.trim_matches('/');
        match self {
            Self::S3 { bucket, key } => Self::S3 {
                bucket: bucket.clone(),
                key: if key.is_empty() {
                    segment.to_string()
                } else {
                    format!("{}/{}", key, segment)
                },
            },
            Self::Directory(path) => Self::Directory(path.join(segment)),
        }
    }
}

impl fmt::Display for RemoteLocation {
    /// S3 locations always render with a trailing slash so the mirror tool
    /// treats them as prefixes
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S3 { bucket, key } if key.is_empty() => write!(f, "s3://{}/", bucket),
            Self::S3 { bucket, key } => write!(f, "s3://{}/{}/", bucket, key),
            Self::Directory(path) => write!(f, "{}", path.display()),
        }
    }
}

/// How a snapshot directory is chosen when several exist
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotSelector {
    /// Exactly one snapshot must exist
    Unique,
    /// Lexicographically first directory name
    FirstSorted,
    /// A named revision (commit hash or ref name)
    Revision(String),
}

/// Tie-break policy when no explicit revision is configured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SnapshotPolicy {
    /// Fail when more than one snapshot exists
    #[default]
    Unique,
    /// Pick the lexicographically first snapshot
    FirstSorted,
}

/// What to do when a size measurement cannot be completed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MeasurementPolicy {
    /// Treat an indeterminate size as Missing, which triggers a re-fetch
    #[default]
    FailOpen,
    /// Surface an indeterminate size as an error
    FailSafe,
}

/// Artifact identity and completeness rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ArtifactConfig {
    /// Registry repository id (`org/name`)
    pub repo_id: String,
    /// Minimum local cache size for the artifact to count as Ready
    pub min_size_bytes: u64,
    /// Explicit revision to resolve and restore
    pub revision: Option<String>,
    /// Tie-break when no revision is set
    pub snapshot_policy: SnapshotPolicy,
    /// File that must exist for a restore to count as complete
    pub manifest_file: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            repo_id: String::new(),
            min_size_bytes: DEFAULT_MIN_SIZE_BYTES,
            revision: None,
            snapshot_policy: SnapshotPolicy::default(),
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
        }
    }
}

impl ArtifactConfig {
    /// Snapshot selector derived from revision and policy
    pub fn selector(&self) -> SnapshotSelector {
        match (&self.revision, self.snapshot_policy) {
            (Some(rev), _) => SnapshotSelector::Revision(rev.clone()),
            (None, SnapshotPolicy::Unique) => SnapshotSelector::Unique,
            (None, SnapshotPolicy::FirstSorted) => SnapshotSelector::FirstSorted,
        }
    }
}

/// Remote tier settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteConfig {
    /// Bucket name, combined with `prefix`
    pub bucket: Option<String>,
    /// Key prefix under the bucket
    pub prefix: String,
    /// Object store region
    pub region: Option<String>,
    /// Full base location, overrides `bucket` and `prefix`
    pub uri: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            prefix: DEFAULT_PREFIX.to_string(),
            region: None,
            uri: None,
        }
    }
}

impl RemoteConfig {
    /// Base location that artifact directories are placed under
    pub fn base_location(&self) -> Result<RemoteLocation> {
        if let Some(uri) = &self.uri {
            return RemoteLocation::parse(uri);
        }
        let bucket = self
            .bucket
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| Error::config("no remote configured: set a bucket or a remote uri"))?;
        Ok(RemoteLocation::S3 {
            bucket: bucket.to_string(),
            key: self.prefix.trim_matches('/').to_string(),
        })
    }
}

/// Local cache tier settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LocalConfig {
    /// Registry cache root; resolved from the environment when unset
    pub cache_root: Option<PathBuf>,
    /// How indeterminate size measurements are treated
    pub measurement: MeasurementPolicy,
}

impl LocalConfig {
    /// Registry cache root.
    ///
    /// Resolution: explicit value, `HF_HUB_CACHE`, `HF_HOME/hub`,
    /// then `~/.cache/huggingface/hub`.
    pub fn resolved_cache_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.cache_root {
            return Ok(root.clone());
        }
        if let Some(root) = non_empty_env("HF_HUB_CACHE") {
            return Ok(PathBuf::from(root));
        }
        if let Some(home) = non_empty_env("HF_HOME") {
            return Ok(Path::new(&home).join("hub"));
        }
        let home = dirs::home_dir()
            .ok_or_else(|| Error::config("could not determine home directory for cache root"))?;
        Ok(home.join(".cache").join("huggingface").join("hub"))
    }
}

/// Ephemeral tier settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RestoreConfig {
    /// Mount point of the ephemeral volume
    pub ephemeral_root: PathBuf,
    /// Sub-paths never mirrored into the ephemeral tier
    pub excludes: Vec<String>,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            ephemeral_root: PathBuf::from(DEFAULT_EPHEMERAL_ROOT),
            excludes: vec![DEFAULT_RESTORE_EXCLUDE.to_string()],
        }
    }
}

/// External transfer tool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransferConfig {
    /// Attempts per transfer (1 disables in-process retry)
    pub max_attempts: u32,
    /// First backoff delay in milliseconds
    pub initial_delay_ms: u64,
    /// Backoff cap in milliseconds
    pub max_delay_ms: u64,
    /// Per-attempt timeout in seconds; unset means no timeout
    pub timeout_secs: Option<u64>,
    /// Registry download tool binary
    pub registry_tool: String,
    /// Object storage tool binary
    pub object_store_tool: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            max_attempts: retry.max_attempts,
            initial_delay_ms: retry.initial_delay.as_millis() as u64,
            max_delay_ms: retry.max_delay.as_millis() as u64,
            timeout_secs: None,
            registry_tool: DEFAULT_REGISTRY_TOOL.to_string(),
            object_store_tool: DEFAULT_OBJECT_STORE_TOOL.to_string(),
        }
    }
}

impl TransferConfig {
    /// Retry policy for transfer primitives
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            ..RetryConfig::default()
        }
    }

    /// Per-attempt timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Complete Strata configuration
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StrataConfig {
    /// Artifact identity
    pub artifact: ArtifactConfig,
    /// Remote tier
    pub remote: RemoteConfig,
    /// Local cache tier
    pub local: LocalConfig,
    /// Ephemeral tier
    pub restore: RestoreConfig,
    /// Transfer tools and retry
    pub transfer: TransferConfig,
    /// Registry bearer token (environment only)
    #[serde(skip)]
    pub token: Option<String>,
}

impl fmt::Debug for StrataConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrataConfig")
            .field("artifact", &self.artifact)
            .field("remote", &self.remote)
            .field("local", &self.local)
            .field("restore", &self.restore)
            .field("transfer", &self.transfer)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl StrataConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Defaults, optionally layered with a file, then with overrides
    pub fn load(file: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        overrides.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no operation can run with
    pub fn validate(&self) -> Result<()> {
        let repo_id = self.artifact.repo_id.trim();
        if repo_id.is_empty() {
            return Err(Error::config("artifact repo id is empty"));
        }
        match repo_id.split_once('/') {
            Some((org, name)) if !org.is_empty() && !name.is_empty() && !name.contains('/') => {}
            _ => {
                return Err(Error::config(format!(
                    "artifact repo id '{}' must have the form org/name",
                    repo_id
                )))
            }
        }
        if self.artifact.min_size_bytes == 0 {
            return Err(Error::config("minimum size threshold must be greater than zero"));
        }
        if self.transfer.max_attempts == 0 {
            return Err(Error::config("transfer max attempts must be at least 1"));
        }
        if self.artifact.manifest_file.trim().is_empty() {
            return Err(Error::config("manifest file name is empty"));
        }
        self.remote.base_location()?;
        Ok(())
    }
}

/// Flag and environment overrides, shared by both binaries
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Registry repository id (org/name)
    #[arg(long, env = "STRATA_REPO_ID")]
    pub repo_id: Option<String>,

    /// Remote bucket
    #[arg(long, env = "STRATA_BUCKET")]
    pub bucket: Option<String>,

    /// Remote key prefix under the bucket
    #[arg(long, env = "STRATA_PREFIX")]
    pub prefix: Option<String>,

    /// Full remote base location (s3://bucket/prefix or a directory)
    #[arg(long, env = "STRATA_REMOTE")]
    pub remote: Option<String>,

    /// Object store region (falls back to AWS_REGION)
    #[arg(long, env = "STRATA_REGION")]
    pub region: Option<String>,

    /// Registry cache root
    #[arg(long, env = "STRATA_CACHE_ROOT")]
    pub cache_root: Option<PathBuf>,

    /// Minimum local cache size in bytes for the artifact to count as Ready
    #[arg(long, env = "STRATA_MIN_SIZE_BYTES")]
    pub min_size_bytes: Option<u64>,

    /// Revision to resolve and restore
    #[arg(long, env = "STRATA_REVISION")]
    pub revision: Option<String>,

    /// Manifest file that marks a restore as usable
    #[arg(long, env = "STRATA_MANIFEST_FILE")]
    pub manifest_file: Option<String>,

    /// Mount point of the ephemeral volume
    #[arg(long, env = "STRATA_EPHEMERAL_ROOT")]
    pub ephemeral_root: Option<PathBuf>,

    /// Registry bearer token
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

impl ConfigOverrides {
    /// Layer the set fields over `config`
    pub fn apply(self, config: &mut StrataConfig) {
        if let Some(v) = self.repo_id {
            config.artifact.repo_id = v;
        }
        if let Some(v) = self.bucket {
            config.remote.bucket = Some(v);
        }
        if let Some(v) = self.prefix {
            config.remote.prefix = v;
        }
        if let Some(v) = self.remote {
            config.remote.uri = Some(v);
        }
        match self.region {
            Some(v) => config.remote.region = Some(v),
            None if config.remote.region.is_none() => {
                config.remote.region = non_empty_env("AWS_REGION");
            }
            None => {}
        }
        if let Some(v) = self.cache_root {
            config.local.cache_root = Some(v);
        }
        if let Some(v) = self.min_size_bytes {
            config.artifact.min_size_bytes = v;
        }
        if let Some(v) = self.revision {
            config.artifact.revision = Some(v);
        }
        if let Some(v) = self.manifest_file {
            config.artifact.manifest_file = v;
        }
        if let Some(v) = self.ephemeral_root {
            config.restore.ephemeral_root = v;
        }
        config.token = self.token.filter(|t| !t.trim().is_empty());
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
