//! Object mirror primitive
//!
//! A mirror is one-way and overwrite-if-different: files whose size or
//! modification time differ are copied, identical files are skipped, and
//! files that exist only at the destination are left alone. That is what
//! makes an interrupted transfer safe to simply run again.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use strata_common::config::{RemoteLocation, TransferConfig};
use strata_common::{Error, Result};
use tokio::process::Command;
use tracing::info;

use crate::local::LocalMirror;
use crate::process::{check_status, run_tool};

/// `aws s3` exit code meaning some files were skipped but the rest transferred
const AWS_SKIPPED_FILES_EXIT: i32 = 2;

/// One-way mirror between a local directory and the remote tier
#[async_trait]
pub trait ObjectMirror: Send + Sync {
    /// External tool this mirror needs on `PATH`, if any
    fn required_tool(&self) -> Option<String>;

    /// Mirror a local directory to the remote location
    async fn push(&self, source: &Path, dest: &RemoteLocation) -> Result<()>;

    /// Mirror the remote location into a local directory, skipping `excludes`
    async fn pull(&self, source: &RemoteLocation, dest: &Path, excludes: &[String]) -> Result<()>;

    /// Human-readable recursive listing of the remote location
    async fn list(&self, location: &RemoteLocation) -> Result<String>;
}

/// Pick the mirror implementation for a remote location
pub fn mirror_for(
    location: &RemoteLocation,
    transfer: &TransferConfig,
    region: Option<String>,
) -> Arc<dyn ObjectMirror> {
    match location {
        RemoteLocation::S3 { .. } => Arc::new(
            AwsCliMirror::new(transfer.object_store_tool.clone(), region)
                .with_timeout(transfer.timeout()),
        ),
        RemoteLocation::Directory(_) => Arc::new(LocalMirror::new()),
    }
}

/// Mirror backed by `aws s3 sync`
#[derive(Debug, Clone)]
pub struct AwsCliMirror {
    binary: String,
    region: Option<String>,
    timeout: Option<Duration>,
}

impl AwsCliMirror {
    /// Create a mirror running `binary`, optionally pinned to `region`
    pub fn new(binary: impl Into<String>, region: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            region,
            timeout: None,
        }
    }

    /// Bound each transfer attempt
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments for `aws s3 sync <source> <dest>`
    pub fn sync_args(&self, source: &str, dest: &str, excludes: &[String]) -> Vec<String> {
        let mut args = vec![
            "s3".to_string(),
            "sync".to_string(),
            source.to_string(),
            dest.to_string(),
            "--only-show-errors".to_string(),
        ];
        for pattern in excludes {
            args.push("--exclude".to_string());
            args.push(pattern.clone());
        }
        self.push_region(&mut args);
        args
    }

    /// Arguments for a recursive, summarized `aws s3 ls`
    pub fn list_args(&self, location: &str) -> Vec<String> {
        let mut args = vec![
            "s3".to_string(),
            "ls".to_string(),
            location.to_string(),
            "--recursive".to_string(),
            "--human-readable".to_string(),
            "--summarize".to_string(),
        ];
        self.push_region(&mut args);
        args
    }

    fn push_region(&self, args: &mut Vec<String>) {
        if let Some(region) = &self.region {
            args.push("--region".to_string());
            args.push(region.clone());
        }
    }

    async fn sync(&self, operation: &str, args: Vec<String>) -> Result<()> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).stderr(std::process::Stdio::inherit());
        let output = run_tool(&mut cmd, operation, self.timeout).await?;
        check_status(operation, &output, &[AWS_SKIPPED_FILES_EXIT])?;
        Ok(())
    }
}

fn require_s3(operation: &str, location: &RemoteLocation) -> Result<String> {
    match location {
        RemoteLocation::S3 { .. } => Ok(location.to_string()),
        RemoteLocation::Directory(path) => Err(Error::transfer_permanent(
            operation,
            format!("{} is not an s3:// location", path.display()),
        )),
    }
}

#[async_trait]
impl ObjectMirror for AwsCliMirror {
    fn required_tool(&self) -> Option<String> {
        Some(self.binary.clone())
    }

    async fn push(&self, source: &Path, dest: &RemoteLocation) -> Result<()> {
        let dest = require_s3("push", dest)?;
        info!(source = %source.display(), dest = %dest, "Mirroring snapshot to remote");
        let args = self.sync_args(&source.display().to_string(), &dest, &[]);
        self.sync("push", args).await?;
        info!(dest = %dest, "Remote mirror updated");
        Ok(())
    }

    async fn pull(&self, source: &RemoteLocation, dest: &Path, excludes: &[String]) -> Result<()> {
        let source = require_s3("pull", source)?;
        info!(source = %source, dest = %dest.display(), "Mirroring remote into local tier");
        let args = self.sync_args(&source, &dest.display().to_string(), excludes);
        self.sync("pull", args).await?;
        info!(dest = %dest.display(), "Local tier updated from remote");
        Ok(())
    }

    async fn list(&self, location: &RemoteLocation) -> Result<String> {
        let location = require_s3("list", location)?;
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.list_args(&location));
        let output = run_tool(&mut cmd, "list", self.timeout).await?;
        check_status("list", &output, &[])
    }
}
