//! Advisory lease on an artifact
//!
//! Two concurrent invocations against the same local cache or ephemeral tier
//! would race (duplicate fetches, interleaved writes). A [`Lease`] is an
//! exclusive OS file lock held for the duration of an operation. It is
//! released when the value is dropped, and by the kernel if the process dies.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs4::FileExt;
use tracing::debug;

use crate::{Error, Result};

/// Exclusive advisory lock on a lock file
#[derive(Debug)]
pub struct Lease {
    file: File,
    path: PathBuf,
}

impl Lease {
    /// Try to take the lease without blocking.
    ///
    /// Returns [`Error::Lease`] when another holder has it.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(path = %path.display(), "Lease acquired");
                Ok(Self {
                    file,
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(Error::Lease {
                path: path.to_path_buf(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            debug!(path = %self.path.display(), error = %e, "Failed to release lease");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_holder_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact").join(".strata.lock");

        let first = Lease::acquire(&path).unwrap();
        assert_eq!(first.path(), path.as_path());

        let second = Lease::acquire(&path);
        assert!(matches!(second, Err(Error::Lease { .. })));
    }

    #[test]
    fn lease_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".strata.lock");

        drop(Lease::acquire(&path).unwrap());
        assert!(Lease::acquire(&path).is_ok());
    }
}
