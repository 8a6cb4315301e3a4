//! Sync side of Strata: registry → local cache → remote mirror
//!
//! - [`orchestrator`] implements ensure, upload, update, status and list
//! - [`operation`] turns those into plan steps with a uniform `execute`
//! - [`dispatch`] maps command names to plans and runs them

#![deny(missing_docs)]

pub mod dispatch;
pub mod operation;
pub mod orchestrator;

pub use dispatch::{dispatch, preflight, Command, USAGE};
pub use operation::{OperationOutcome, Requirement, SyncContext, SyncOperation};
pub use orchestrator::{EnsureOutcome, StatusReport, SyncOrchestrator};
