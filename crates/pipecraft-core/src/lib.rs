//! Pipeline document model and reconciliation engine for pipecraft.
//!
//! This crate contains:
//! - Pipeline documents and nested-pipeline reference variants
//! - The backend trait used to look up and save remote pipelines
//! - The identifier indexer and current-state normalizer
//! - The structural differ
//! - Reconcile and upsert entry points

pub mod backend;
pub mod diff;
pub mod error;
pub mod id;
pub mod index;
pub mod normalize;
pub mod pipeline;
pub mod publish;
pub mod reconcile;

pub use backend::{Lookup, PipelineBackend};
pub use diff::{Delta, MatchKind, StructuralDiff};
pub use error::{Error, Result};
pub use id::PipelineId;
pub use index::{IdentifierMap, MappedRef, build_identifier_map};
pub use normalize::normalize;
pub use pipeline::{PipelineDocument, PipelineRef, Side};
pub use publish::upsert;
pub use reconcile::{ReconcileOptions, Reconciliation, reconcile};
