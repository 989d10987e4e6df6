//! Pipeline store backends for pipecraft.
//!
//! Provides backend implementations:
//! - HTTP orchestration API (production)

pub mod http;

pub use http::{BackendError, HttpBackend};
pub use pipecraft_core::backend::{Lookup, PipelineBackend};
