//! Cache state inspection
//!
//! Measures how much of an artifact is present in a tier and classifies it
//! against the artifact's size threshold. Nothing here is persisted: the
//! state is recomputed on every inspection.

use std::fmt;
use std::io::ErrorKind;
use std::path::Path;

use strata_common::config::MeasurementPolicy;
use strata_common::{Error, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Completeness of an artifact in a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Nothing present
    Missing,
    /// Some data present, below the threshold
    Partial,
    /// At or above the threshold
    Ready,
}

impl CacheState {
    /// Whether the tier can be used without fetching
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Missing => "MISSING",
            Self::Partial => "PARTIAL",
            Self::Ready => "READY",
        };
        f.write_str(s)
    }
}

/// Outcome of measuring a tier path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Measurement {
    /// The path does not exist
    Absent,
    /// Total size in bytes of regular files under the path
    Present(u64),
    /// The traversal failed partway; the size is unknown
    Indeterminate(String),
}

impl Measurement {
    /// Size in bytes, with absent and indeterminate both counting as zero
    pub fn bytes_or_zero(&self) -> u64 {
        match self {
            Self::Present(bytes) => *bytes,
            Self::Absent | Self::Indeterminate(_) => 0,
        }
    }
}

/// Measure the total apparent size of regular files under `path`.
///
/// Symlinks are not followed, so a registry snapshot tree whose files link
/// into a blob store counts each blob once.
pub fn inspect(path: &Path) -> Measurement {
    match std::fs::symlink_metadata(path) {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Measurement::Absent,
        Err(e) => return Measurement::Indeterminate(e.to_string()),
    }

    let mut total = 0u64;
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => return Measurement::Indeterminate(e.to_string()),
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.metadata() {
            Ok(meta) => total = total.saturating_add(meta.len()),
            Err(e) => return Measurement::Indeterminate(e.to_string()),
        }
    }

    debug!(path = %path.display(), bytes = total, "Measured tier path");
    Measurement::Present(total)
}

/// Measure `path`, treating a missing path or a traversal error as size 0.
///
/// This is the fail-open-to-Missing policy: an unreadable cache looks empty
/// and therefore gets re-fetched. Use [`inspect`] to tell the cases apart.
pub fn measure(path: &Path) -> u64 {
    inspect(path).bytes_or_zero()
}

/// Classify a size against a threshold
pub fn classify(size_bytes: u64, threshold: u64) -> CacheState {
    if size_bytes == 0 {
        CacheState::Missing
    } else if size_bytes >= threshold {
        CacheState::Ready
    } else {
        CacheState::Partial
    }
}

/// Classify a measurement, applying `policy` when it is indeterminate
pub fn state_for(
    path: &Path,
    measurement: &Measurement,
    threshold: u64,
    policy: MeasurementPolicy,
) -> Result<CacheState> {
    match (measurement, policy) {
        (Measurement::Indeterminate(reason), MeasurementPolicy::FailOpen) => {
            warn!(
                path = %path.display(),
                error = %reason,
                "Size measurement failed, treating tier as missing"
            );
            Ok(CacheState::Missing)
        }
        (Measurement::Indeterminate(reason), MeasurementPolicy::FailSafe) => {
            Err(Error::Indeterminate {
                path: path.to_path_buf(),
                reason: reason.clone(),
            })
        }
        (m, _) => Ok(classify(m.bytes_or_zero(), threshold)),
    }
}
