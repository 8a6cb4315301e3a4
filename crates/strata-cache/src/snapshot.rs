//! Snapshot resolution
//!
//! The registry cache nests content as
//! `<artifact dir>/snapshots/<revision>/...`. Uploads mirror exactly one
//! resolved snapshot directory, so a failure to resolve is fatal: there is no
//! safe fallback.

use std::path::{Path, PathBuf};

use strata_common::config::SnapshotSelector;
use strata_common::{Error, ResolutionFailure, Result, REFS_DIR, SNAPSHOTS_DIR};
use tracing::{debug, info};

/// Resolve the snapshot directory under `artifact_dir` using `selector`.
pub fn resolve(artifact_dir: &Path, selector: &SnapshotSelector) -> Result<PathBuf> {
    let snapshots = artifact_dir.join(SNAPSHOTS_DIR);
    let fail = |reason| Error::resolution(artifact_dir, reason);

    if let SnapshotSelector::Revision(rev) = selector {
        let dir = revision_dir_name(artifact_dir, rev);
        let path = snapshots.join(&dir);
        return if path.is_dir() {
            info!(snapshot = %path.display(), "Resolved snapshot by revision");
            Ok(path)
        } else {
            Err(fail(ResolutionFailure::RevisionMissing(rev.clone())))
        };
    }

    let candidates = candidates(&snapshots);
    debug!(dir = %snapshots.display(), count = candidates.len(), "Snapshot candidates");

    let chosen = match (selector, candidates.as_slice()) {
        (_, []) => return Err(fail(ResolutionFailure::NotFound)),
        (SnapshotSelector::Unique, [only]) => only,
        (SnapshotSelector::Unique, _) => {
            return Err(fail(ResolutionFailure::Ambiguous(candidates.clone())))
        }
        (_, [first, ..]) => first,
    };

    let path = snapshots.join(chosen);
    info!(snapshot = %path.display(), "Resolved snapshot");
    Ok(path)
}

/// Directory names under `snapshots`, sorted. Non-directories are ignored and
/// an unreadable or missing directory yields no candidates.
fn candidates(snapshots: &Path) -> Vec<String> {
    let entries = match std::fs::read_dir(snapshots) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Map a ref name to the commit it points at, if the registry recorded one
fn revision_dir_name(artifact_dir: &Path, rev: &str) -> String {
    let ref_file = artifact_dir.join(REFS_DIR).join(rev);
    match std::fs::read_to_string(&ref_file) {
        Ok(commit) if !commit.trim().is_empty() => commit.trim().to_string(),
        _ => rev.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact_with_snapshots(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::create_dir_all(dir.path().join(SNAPSHOTS_DIR).join(name)).unwrap();
        }
        dir
    }

    #[test]
    fn missing_snapshots_dir_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve(dir.path(), &SnapshotSelector::FirstSorted).unwrap_err();
        assert!(matches!(
            err,
            Error::Resolution {
                reason: ResolutionFailure::NotFound,
                ..
            }
        ));
    }

    #[test]
    fn empty_snapshots_dir_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(SNAPSHOTS_DIR)).unwrap();
        for selector in [SnapshotSelector::Unique, SnapshotSelector::FirstSorted] {
            let err = resolve(dir.path(), &selector).unwrap_err();
            assert!(matches!(
                err,
                Error::Resolution {
                    reason: ResolutionFailure::NotFound,
                    ..
                }
            ));
        }
    }

    #[test]
    fn files_are_not_candidates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(SNAPSHOTS_DIR)).unwrap();
        std::fs::write(dir.path().join(SNAPSHOTS_DIR).join("stray"), b"x").unwrap();
        assert!(resolve(dir.path(), &SnapshotSelector::FirstSorted).is_err());
    }

    #[test]
    fn single_snapshot_resolves_with_any_selector() {
        let dir = artifact_with_snapshots(&["0e9e39f"]);
        for selector in [SnapshotSelector::Unique, SnapshotSelector::FirstSorted] {
            let path = resolve(dir.path(), &selector).unwrap();
            assert_eq!(path, dir.path().join(SNAPSHOTS_DIR).join("0e9e39f"));
        }
    }

    #[test]
    fn first_sorted_picks_lexicographically_first() {
        let dir = artifact_with_snapshots(&["ffff", "1234", "abcd"]);
        let path = resolve(dir.path(), &SnapshotSelector::FirstSorted).unwrap();
        assert_eq!(path, dir.path().join(SNAPSHOTS_DIR).join("1234"));
    }

    #[test]
    fn unique_fails_loudly_on_ambiguity() {
        let dir = artifact_with_snapshots(&["bbb", "aaa"]);
        let err = resolve(dir.path(), &SnapshotSelector::Unique).unwrap_err();
        match err {
            Error::Resolution {
                reason: ResolutionFailure::Ambiguous(names),
                ..
            } => assert_eq!(names, vec!["aaa".to_string(), "bbb".to_string()]),
            other => panic!("expected ambiguity, got {}", other),
        }
    }

    #[test]
    fn revision_selects_named_snapshot() {
        let dir = artifact_with_snapshots(&["aaa", "bbb"]);
        let path = resolve(dir.path(), &SnapshotSelector::Revision("bbb".into())).unwrap();
        assert_eq!(path, dir.path().join(SNAPSHOTS_DIR).join("bbb"));
    }

    #[test]
    fn revision_follows_ref_file() {
        let dir = artifact_with_snapshots(&["aaa", "0e9e39f"]);
        std::fs::create_dir_all(dir.path().join(REFS_DIR)).unwrap();
        std::fs::write(dir.path().join(REFS_DIR).join("main"), "0e9e39f\n").unwrap();

        let path = resolve(dir.path(), &SnapshotSelector::Revision("main".into())).unwrap();
        assert_eq!(path, dir.path().join(SNAPSHOTS_DIR).join("0e9e39f"));
    }

    #[test]
    fn missing_revision_is_fatal() {
        let dir = artifact_with_snapshots(&["aaa"]);
        let err = resolve(dir.path(), &SnapshotSelector::Revision("zzz".into())).unwrap_err();
        assert!(matches!(
            err,
            Error::Resolution {
                reason: ResolutionFailure::RevisionMissing(_),
                ..
            }
        ));
    }
}
