//! Transfer primitives for Strata
//!
//! - [`fetch`] downloads an artifact from the model registry into the local cache
//! - [`mirror`] mirrors directories to and from the remote tier
//! - [`local`] serves directory-backed remotes without an external tool
//!
//! Every primitive is a trait so orchestrators can be exercised without a
//! network or the external CLIs installed.

#![deny(missing_docs)]

pub mod fetch;
pub mod local;
pub mod mirror;
mod process;

pub use fetch::{FetchRequest, HfCliFetcher, RegistryFetcher, TOKEN_ENV};
pub use local::{LocalMirror, MirrorStats};
pub use mirror::{mirror_for, AwsCliMirror, ObjectMirror};
pub use process::{PathToolProbe, ToolProbe};
