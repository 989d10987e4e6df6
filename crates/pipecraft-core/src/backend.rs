//! Backend trait for the remote pipeline store.
//!
//! Backends look up and save pipeline documents in the orchestration service
//! (an HTTP API, or an in-memory store in tests). Timeouts and retries are the
//! backend's business; callers issue one request at a time and wait for it.

use async_trait::async_trait;

use crate::{PipelineDocument, PipelineId, Result};

/// Outcome of looking up a pipeline by application and name.
///
/// Absence is an expected answer, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(PipelineDocument),
    NotFound,
}

impl Lookup {
    /// Identifier of the stored document, if it exists and has one.
    pub fn id(&self) -> Option<PipelineId> {
        match self {
            Lookup::Found(doc) => doc.id(),
            Lookup::NotFound => None,
        }
    }
}

/// Trait for pipeline stores.
#[async_trait]
pub trait PipelineBackend: Send + Sync {
    /// Name of this backend.
    fn name(&self) -> &'static str;

    /// Fetch the stored document for `application`/`name`.
    ///
    /// Transport and authorization failures are `Error::BackendLookup`.
    async fn get_pipeline(&self, application: &str, name: &str) -> Result<Lookup>;

    /// Create or update a document.
    ///
    /// The backend matches on `id` when present, so callers must inject the
    /// existing identifier to update rather than duplicate.
    async fn save_pipeline(&self, document: &PipelineDocument) -> Result<()>;
}
