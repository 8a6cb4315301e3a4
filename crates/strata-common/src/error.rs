//! Error types for Strata
//!
//! Every fatal condition in the sync and restore paths maps to one variant
//! here. Variants carry the context an operator needs to act on the failure
//! (which path, which transfer, which command) rather than a bare string.

use std::path::PathBuf;

use thiserror::Error;

/// Why a snapshot directory could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionFailure {
    /// The `snapshots` directory is absent or holds no candidate directories
    #[error("no snapshot directory found")]
    NotFound,

    /// More than one candidate exists and the selector requires exactly one
    #[error("ambiguous snapshots: {}", .0.join(", "))]
    Ambiguous(Vec<String>),

    /// An explicit revision was requested but is not present
    #[error("revision '{0}' not present")]
    RevisionMissing(String),
}

/// Main error type for Strata operations
#[derive(Debug, Error)]
pub enum Error {
    /// A required tool, credential or token is missing
    #[error("precondition failed: {message}")]
    Precondition {
        /// What is missing and how to provide it
        message: String,
    },

    /// No usable snapshot directory in the local cache
    #[error("snapshot resolution failed under {}: {reason}", root.display())]
    Resolution {
        /// Artifact cache directory that was searched
        root: PathBuf,
        /// What went wrong
        reason: ResolutionFailure,
    },

    /// A fetch, mirror or listing against an external tier failed
    #[error("transfer error [{operation}]: {message}")]
    Transfer {
        /// Transfer that failed (e.g. "fetch", "mirror", "list")
        operation: String,
        /// Description of what failed
        message: String,
        /// Whether a bounded in-process retry may succeed
        retryable: bool,
    },

    /// The manifest file is absent after a completed restore mirror
    #[error("verification failed: {} missing after restore", path.display())]
    Verification {
        /// Manifest path that was expected
        path: PathBuf,
    },

    /// Unrecognized dispatcher command
    #[error("unknown command: {command}")]
    Usage {
        /// The command as given
        command: String,
    },

    /// Another invocation holds the advisory lease
    #[error("lease held on {}: another invocation is running", path.display())]
    Lease {
        /// Lock file path
        path: PathBuf,
    },

    /// Size measurement failed and the policy refuses to guess
    #[error("size of {} is indeterminate: {reason}", path.display())]
    Indeterminate {
        /// Path that was measured
        path: PathBuf,
        /// Underlying traversal failure
        reason: String,
    },

    /// Invalid configuration file or values
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
    },

    /// Local filesystem error
    #[error("io error: {source}")]
    Io {
        /// The underlying io error
        #[from]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed
    #[error("yaml error: {source}")]
    Yaml {
        /// The underlying serde_yaml error
        #[from]
        source: serde_yaml::Error,
    },
}

impl Error {
    /// Create a precondition error with the given message
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition {
            message: msg.into(),
        }
    }

    /// Create a resolution error for the given cache directory
    pub fn resolution(root: impl Into<PathBuf>, reason: ResolutionFailure) -> Self {
        Self::Resolution {
            root: root.into(),
            reason,
        }
    }

    /// Create a transfer error that a bounded retry may recover from
    pub fn transfer(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transfer {
            operation: operation.into(),
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a transfer error that retrying cannot fix (e.g. spawn failure)
    pub fn transfer_permanent(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transfer {
            operation: operation.into(),
            message: msg.into(),
            retryable: false,
        }
    }

    /// Create a verification error for the missing manifest path
    pub fn verification(path: impl Into<PathBuf>) -> Self {
        Self::Verification { path: path.into() }
    }

    /// Create a usage error for an unrecognized command
    pub fn usage(command: impl Into<String>) -> Self {
        Self::Usage {
            command: command.into(),
        }
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether a bounded in-process retry is allowed for this error.
    ///
    /// Only transfers are ever retried; everything else is either permanent
    /// or delegated to the outer invocation boundary.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transfer {
                retryable: true,
                ..
            }
        )
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_retryable_transfers_are_retryable() {
        assert!(Error::transfer("mirror", "connection reset").is_retryable());
        assert!(!Error::transfer_permanent("mirror", "aws: not found").is_retryable());
        assert!(!Error::precondition("HF_TOKEN is not set").is_retryable());
        assert!(!Error::verification("/models/config.json").is_retryable());
        assert!(!Error::resolution("/cache", ResolutionFailure::NotFound).is_retryable());
        assert!(!Error::usage("bogus").is_retryable());
    }

    #[test]
    fn every_fatal_error_exits_non_zero() {
        let errors = [
            Error::precondition("missing token"),
            Error::usage("bogus"),
            Error::verification("/models/config.json"),
            Error::config("repo id is empty"),
        ];
        for err in &errors {
            assert_eq!(err.exit_code(), 1, "{}", err);
        }
    }

    #[test]
    fn resolution_error_names_candidates_when_ambiguous() {
        let err = Error::resolution(
            "/cache/models--org--name",
            ResolutionFailure::Ambiguous(vec!["abc".into(), "def".into()]),
        );
        let msg = err.to_string();
        assert!(msg.contains("/cache/models--org--name"));
        assert!(msg.contains("abc, def"));
    }

    #[test]
    fn transfer_error_includes_operation() {
        let err = Error::transfer("fetch", "exit status 1");
        assert_eq!(err.to_string(), "transfer error [fetch]: exit status 1");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io { .. }));
        assert!(!err.is_retryable());
    }
}
