//! Common types for Strata: configuration, artifact layout, errors, and utilities
//!
//! Strata moves a large model artifact between three tiers: a local registry
//! cache, a durable remote mirror, and an ephemeral per-workload volume.

#![deny(missing_docs)]

pub mod artifact;
pub mod config;
pub mod error;
pub mod lease;
pub mod retry;
pub mod telemetry;
pub mod units;

pub use artifact::Artifact;
pub use config::StrataConfig;
pub use error::{Error, ResolutionFailure};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Sub-directory of an artifact directory holding revision snapshots
pub const SNAPSHOTS_DIR: &str = "snapshots";

/// Sub-directory of an artifact directory holding ref name → commit files
pub const REFS_DIR: &str = "refs";

/// Completion marker written beside `snapshots/` after a verified restore
pub const MARKER_FILE_NAME: &str = ".download-complete";

/// Lock file held in the local artifact directory during sync operations
pub const SYNC_LEASE_FILE_NAME: &str = ".strata.lock";

/// Lock file held in the ephemeral artifact directory during restore
pub const RESTORE_LEASE_FILE_NAME: &str = ".restore.lock";
