//! Tier inspection for Strata
//!
//! - [`inspector`] measures a tier path and classifies completeness
//! - [`snapshot`] locates the canonical content directory in a registry cache

#![deny(missing_docs)]

pub mod inspector;
pub mod snapshot;

pub use inspector::{classify, inspect, measure, state_for, CacheState, Measurement};
pub use snapshot::resolve;
