//! Registry download primitive
//!
//! Fetches a full artifact from the model registry into the local cache
//! using the registry CLI. The CLI is resumable: files already present and
//! complete are not downloaded again unless a forced download is requested.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use strata_common::{Error, Result};
use tokio::process::Command;
use tracing::info;

use crate::process::{check_status, run_tool};

/// Environment variable the registry CLI reads its bearer token from
pub const TOKEN_ENV: &str = "HF_TOKEN";

/// One recursive download of an artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Registry repository id (`org/name`)
    pub repo_id: String,
    /// Registry cache root to download into
    pub cache_root: PathBuf,
    /// Revision to fetch; the registry default branch when unset
    pub revision: Option<String>,
    /// Re-download every file, overwriting local content
    pub force: bool,
}

/// Downloads artifacts from the model registry
#[async_trait]
pub trait RegistryFetcher: Send + Sync {
    /// External tool this fetcher needs on `PATH`, if any
    fn required_tool(&self) -> Option<String>;

    /// Download the full artifact into the local cache
    async fn fetch(&self, request: &FetchRequest) -> Result<()>;
}

/// Fetcher backed by `huggingface-cli download`
#[derive(Clone)]
pub struct HfCliFetcher {
    binary: String,
    token: Option<String>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for HfCliFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HfCliFetcher")
            .field("binary", &self.binary)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HfCliFetcher {
    /// Create a fetcher running `binary` with the given bearer token
    pub fn new(binary: impl Into<String>, token: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            token,
            timeout: None,
        }
    }

    /// Bound each download attempt
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Arguments for `huggingface-cli` for one request
pub fn download_args(request: &FetchRequest) -> Vec<String> {
    let mut args = vec![
        "download".to_string(),
        request.repo_id.clone(),
        "--cache-dir".to_string(),
        request.cache_root.display().to_string(),
    ];
    if let Some(rev) = &request.revision {
        args.push("--revision".to_string());
        args.push(rev.clone());
    }
    if request.force {
        args.push("--force-download".to_string());
    }
    args
}

#[async_trait]
impl RegistryFetcher for HfCliFetcher {
    fn required_tool(&self) -> Option<String> {
        Some(self.binary.clone())
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<()> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| Error::precondition(format!("{} is not set", TOKEN_ENV)))?;

        info!(
            repo = %request.repo_id,
            cache_root = %request.cache_root.display(),
            revision = ?request.revision,
            force = request.force,
            "Downloading artifact from registry"
        );

        let mut cmd = Command::new(&self.binary);
        cmd.args(download_args(request))
            .env(TOKEN_ENV, token)
            .stderr(std::process::Stdio::inherit());

        let output = run_tool(&mut cmd, "fetch", self.timeout).await?;
        check_status("fetch", &output, &[])?;

        info!(repo = %request.repo_id, "Registry download complete");
        Ok(())
    }
}
