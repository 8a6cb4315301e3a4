//! Completion marker
//!
//! The marker sits beside `snapshots/` in the ephemeral artifact directory
//! and is written only after a restore has been verified. Its content is
//! informational; presence alone is the signal.

use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use strata_common::config::RemoteLocation;
use strata_common::Result;
use tracing::debug;

/// Whether a verified restore has completed at `path`
pub fn is_present(path: &Path) -> bool {
    path.is_file()
}

/// Write the marker atomically: a reader sees either no marker or a
/// complete one.
pub fn write(path: &Path, source: &RemoteLocation, revision: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    let tmp = path.with_file_name(name);

    let body = format!(
        "completed_at: {}\nsource: {}\nrevision: {}\n",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        source,
        revision
    );

    let mut file = fs::File::create(&tmp)?;
    file.write_all(body.as_bytes())?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;

    debug!(marker = %path.display(), "Wrote completion marker");
    Ok(())
}
