//! Directory-backed mirror
//!
//! Serves `file://` and plain-path remotes (shared filesystems) with the same
//! contract as the object-store mirror: copy when size differs or the source
//! is newer, never delete destination-only files, honour excludes. Each file
//! is written to a temporary sibling and renamed into place, so a crash never
//! leaves a truncated file under its final name.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use strata_common::config::RemoteLocation;
use strata_common::units::human_bytes;
use strata_common::{Error, Result};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::mirror::ObjectMirror;

/// Suffix of in-flight copies
const PARTIAL_SUFFIX: &str = ".strata-partial";

/// Per-run counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorStats {
    /// Files copied because they were missing or different
    pub copied: u64,
    /// Files skipped because the destination already matched
    pub unchanged: u64,
    /// Files skipped by an exclude pattern
    pub excluded: u64,
    /// Files that failed to copy
    pub failed: u64,
}

/// Mirror between two local directories
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalMirror;

impl LocalMirror {
    /// Create a directory mirror
    pub fn new() -> Self {
        Self
    }
}

fn require_dir<'a>(operation: &str, location: &'a RemoteLocation) -> Result<&'a Path> {
    match location {
        RemoteLocation::Directory(path) => Ok(path),
        RemoteLocation::S3 { .. } => Err(Error::transfer_permanent(
            operation,
            format!("{} is not a directory location", location),
        )),
    }
}

async fn blocking<T, F>(operation: &'static str, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::transfer_permanent(operation, format!("mirror task failed: {}", e)))?
}

#[async_trait]
impl ObjectMirror for LocalMirror {
    fn required_tool(&self) -> Option<String> {
        None
    }

    async fn push(&self, source: &Path, dest: &RemoteLocation) -> Result<()> {
        let dest = require_dir("push", dest)?.to_path_buf();
        let source = source.to_path_buf();
        info!(source = %source.display(), dest = %dest.display(), "Mirroring snapshot to remote");
        let stats = blocking("push", move || mirror_dir("push", &source, &dest, &[])).await?;
        info!(copied = stats.copied, unchanged = stats.unchanged, "Remote mirror updated");
        Ok(())
    }

    async fn pull(&self, source: &RemoteLocation, dest: &Path, excludes: &[String]) -> Result<()> {
        let source = require_dir("pull", source)?.to_path_buf();
        let dest = dest.to_path_buf();
        let excludes = excludes.to_vec();
        info!(source = %source.display(), dest = %dest.display(), "Mirroring remote into local tier");
        let stats = blocking("pull", move || mirror_dir("pull", &source, &dest, &excludes)).await?;
        info!(
            copied = stats.copied,
            unchanged = stats.unchanged,
            excluded = stats.excluded,
            failed = stats.failed,
            "Local tier updated from remote"
        );
        Ok(())
    }

    async fn list(&self, location: &RemoteLocation) -> Result<String> {
        let root = require_dir("list", location)?.to_path_buf();
        blocking("list", move || list_dir(&root)).await
    }
}

/// Mirror `source` into `dest`.
///
/// A missing or unreadable source is a mirror-level failure. Individual file
/// failures are logged and counted but do not abort the run.
pub fn mirror_dir(
    operation: &str,
    source: &Path,
    dest: &Path,
    excludes: &[String],
) -> Result<MirrorStats> {
    if !source.is_dir() {
        return Err(Error::transfer_permanent(
            operation,
            format!("source {} does not exist", source.display()),
        ));
    }
    fs::create_dir_all(dest)?;

    let mut stats = MirrorStats::default();
    for entry in WalkDir::new(source).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(operation = %operation, error = %e, "Skipping unreadable entry");
                stats.failed += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = match entry.path().strip_prefix(source) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let rel_str = rel_key(rel);
        // Leftovers of a copy that died mid-flight
        if rel_str.ends_with(PARTIAL_SUFFIX) {
            debug!(operation = %operation, file = %rel_str, "Skipping in-flight copy");
            continue;
        }
        if excludes.iter().any(|p| matches_pattern(p, &rel_str)) {
            stats.excluded += 1;
            continue;
        }

        let target = dest.join(rel);
        match copy_if_different(entry.path(), &target) {
            Ok(true) => stats.copied += 1,
            Ok(false) => stats.unchanged += 1,
            Err(e) => {
                warn!(
                    operation = %operation,
                    file = %rel_str,
                    error = %e,
                    "Failed to mirror file, continuing"
                );
                stats.failed += 1;
            }
        }
    }

    debug!(operation = %operation, ?stats, "Directory mirror finished");
    Ok(stats)
}

/// Copy `source` over `target` unless the target already matches.
///
/// Returns whether a copy happened.
fn copy_if_different(source: &Path, target: &Path) -> std::io::Result<bool> {
    let src_meta = fs::metadata(source)?;
    let src_mtime = src_meta.modified().ok();

    if let Ok(dst_meta) = fs::metadata(target) {
        let same_size = dst_meta.len() == src_meta.len();
        let not_older = match (src_mtime, dst_meta.modified().ok()) {
            (Some(src), Some(dst)) => dst >= src,
            _ => false,
        };
        if same_size && not_older {
            return Ok(false);
        }
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let partial = partial_path(target);
    fs::copy(source, &partial)?;
    if let Some(mtime) = src_mtime {
        set_mtime(&partial, mtime)?;
    }
    fs::rename(&partial, target)?;
    Ok(true)
}

fn set_mtime(path: &Path, mtime: SystemTime) -> std::io::Result<()> {
    let file = File::options().write(true).open(path)?;
    file.set_modified(mtime)
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(PARTIAL_SUFFIX);
    target.with_file_name(name)
}

/// Relative path with `/` separators, as exclude patterns are written
fn rel_key(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Match an exclude pattern in the object-store CLI style: `*` matches any
/// run of characters including `/`, `?` matches exactly one.
pub fn matches_pattern(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

fn list_dir(root: &Path) -> Result<String> {
    if !root.is_dir() {
        return Err(Error::transfer_permanent(
            "list",
            format!("{} does not exist", root.display()),
        ));
    }

    let mut entries: Vec<(String, u64)> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| !e.file_name().to_string_lossy().ends_with(PARTIAL_SUFFIX))
        .filter_map(|e| {
            let rel = e.path().strip_prefix(root).ok().map(rel_key)?;
            let len = e.metadata().ok()?.len();
            Some((rel, len))
        })
        .collect();
    entries.sort();

    let total: u64 = entries.iter().map(|(_, len)| len).sum();
    let mut out = String::new();
    for (rel, len) in &entries {
        out.push_str(&format!("{:>12}  {}\n", human_bytes(*len), rel));
    }
    out.push_str(&format!("\nTotal Objects: {}\n", entries.len()));
    out.push_str(&format!("   Total Size: {}\n", human_bytes(total)));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn pattern_matching() {
        assert!(matches_pattern(".cache/*", ".cache/huggingface/download/x.lock"));
        assert!(!matches_pattern(".cache/*", "config.json"));
        assert!(matches_pattern("*.lock", "a/b/c.lock"));
        assert!(matches_pattern("model-?.bin", "model-1.bin"));
        assert!(!matches_pattern("model-?.bin", "model-10.bin"));
        assert!(matches_pattern("*", ""));
        assert!(matches_pattern("config.json", "config.json"));
    }

    #[test]
    fn copies_new_files_and_skips_identical() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write(src.path(), "config.json", b"{\"a\":1}");
        write(src.path(), "weights/model.safetensors", &[7u8; 64]);

        let first = mirror_dir("pull", src.path(), dst.path(), &[]).unwrap();
        assert_eq!(first.copied, 2);
        assert_eq!(
            fs::read(dst.path().join("config.json")).unwrap(),
            b"{\"a\":1}"
        );

        let second = mirror_dir("pull", src.path(), dst.path(), &[]).unwrap();
        assert_eq!(second.copied, 0);
        assert_eq!(second.unchanged, 2);
    }

    #[test]
    fn overwrites_files_that_differ() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write(src.path(), "config.json", b"{\"complete\":true}");
        write(dst.path(), "config.json", b"{\"com");

        let stats = mirror_dir("pull", src.path(), dst.path(), &[]).unwrap();
        assert_eq!(stats.copied, 1);
        assert_eq!(
            fs::read(dst.path().join("config.json")).unwrap(),
            b"{\"complete\":true}"
        );
    }

    #[test]
    fn never_deletes_destination_only_files() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write(src.path(), "config.json", b"{}");
        write(dst.path(), "extra.bin", b"keep me");

        mirror_dir("push", src.path(), dst.path(), &[]).unwrap();
        assert!(dst.path().join("extra.bin").exists());
    }

    #[test]
    fn honours_excludes() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write(src.path(), "config.json", b"{}");
        write(src.path(), ".cache/huggingface/download/config.json.lock", b"");

        let stats =
            mirror_dir("pull", src.path(), dst.path(), &[".cache/*".to_string()]).unwrap();
        assert_eq!(stats.copied, 1);
        assert_eq!(stats.excluded, 1);
        assert!(!dst.path().join(".cache").exists());
    }

    #[test]
    fn skips_interrupted_copies() {
        let remote = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write(remote.path(), "config.json", b"{}");
        write(remote.path(), "model.safetensors.strata-partial", &[1u8; 32]);

        let stats = mirror_dir("pull", remote.path(), dst.path(), &[]).unwrap();
        assert_eq!(stats.copied, 1);
        assert!(dst.path().join("config.json").exists());
        assert!(!dst.path().join("model.safetensors.strata-partial").exists());

        let listing = list_dir(remote.path()).unwrap();
        assert!(!listing.contains("strata-partial"));
        assert!(listing.contains("Total Objects: 1"));
    }

    #[test]
    fn missing_source_is_a_mirror_level_failure() {
        let dst = tempfile::tempdir().unwrap();
        let err = mirror_dir("pull", Path::new("/nonexistent/strata"), dst.path(), &[])
            .unwrap_err();
        assert!(matches!(err, Error::Transfer { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn follows_snapshot_symlinks_into_blobs() {
        let cache = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write(cache.path(), "blobs/abc", b"{\"model_type\":\"llama\"}");
        let snapshot = cache.path().join("snapshots").join("rev");
        fs::create_dir_all(&snapshot).unwrap();
        std::os::unix::fs::symlink(cache.path().join("blobs/abc"), snapshot.join("config.json"))
            .unwrap();

        mirror_dir("push", &snapshot, dst.path(), &[]).unwrap();
        let copied = dst.path().join("config.json");
        assert!(fs::symlink_metadata(&copied).unwrap().file_type().is_file());
        assert_eq!(fs::read(copied).unwrap(), b"{\"model_type\":\"llama\"}");
    }

    #[tokio::test]
    async fn list_reports_totals() {
        let remote = tempfile::tempdir().unwrap();
        write(remote.path(), "config.json", &[0u8; 10]);
        write(remote.path(), "model.safetensors", &[0u8; 2048]);

        let listing = LocalMirror::new()
            .list(&RemoteLocation::Directory(remote.path().to_path_buf()))
            .await
            .unwrap();
        assert!(listing.contains("config.json"));
        assert!(listing.contains("model.safetensors"));
        assert!(listing.contains("Total Objects: 2"));
        assert!(listing.contains("Total Size: 2.0 KiB"));
    }

    #[tokio::test]
    async fn local_mirror_rejects_s3_locations() {
        let dst = tempfile::tempdir().unwrap();
        let s3 = RemoteLocation::parse("s3://bucket/prefix").unwrap();
        let err = LocalMirror::new().pull(&s3, dst.path(), &[]).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
