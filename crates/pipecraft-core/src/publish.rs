//! Identity-preserving upsert of rendered pipelines.

use async_recursion::async_recursion;
use serde_json::Value;
use tracing::{debug, info};

use crate::backend::PipelineBackend;
use crate::pipeline::{PipelineDocument, PipelineRef, Side};
use crate::{Error, PipelineId, Result};

/// Save a desired document so the stored copy matches it.
///
/// Nested references are rewritten into backend identifiers first: named
/// pipelines must already exist, inlined pipelines are upserted before their
/// parent. When the top-level pipeline is already stored its identifier is
/// injected so the backend updates it in place. Returns the document as sent.
pub async fn upsert(
    desired: PipelineDocument,
    backend: &dyn PipelineBackend,
) -> Result<PipelineDocument> {
    upsert_document(desired, backend).await
}

#[async_recursion]
async fn upsert_document(
    mut doc: PipelineDocument,
    backend: &dyn PipelineBackend,
) -> Result<PipelineDocument> {
    for nested in doc.nested_references(Side::Desired)? {
        let application = nested.owning_application(&doc)?.to_string();

        let id = match nested.reference {
            PipelineRef::Name(name) => {
                let found = existing_id(backend, &application, &name).await?;
                found.ok_or(Error::UnresolvedReference { application, name })?
            }
            PipelineRef::Embedded(embedded) => {
                // The child is stored under its own application.
                let application = embedded.application()?.to_string();
                let name = embedded.name()?.to_string();
                upsert_document(*embedded, backend).await?;
                let found = existing_id(backend, &application, &name).await?;
                found.ok_or(Error::UnresolvedReference { application, name })?
            }
            PipelineRef::Identifier(id) => id,
        };

        doc.set_stage_pipeline(nested.stage, Value::String(id.into()));
    }

    let application = doc.application()?.to_string();
    let name = doc.name()?.to_string();

    match existing_id(backend, &application, &name).await? {
        Some(id) => {
            debug!(application = %application, name = %name, id = %id, "Updating stored pipeline");
            doc.set_id(&id);
        }
        None => debug!(application = %application, name = %name, "Creating pipeline"),
    }

    backend.save_pipeline(&doc).await?;
    info!(application = %application, name = %name, "Saved pipeline");
    Ok(doc)
}

async fn existing_id(
    backend: &dyn PipelineBackend,
    application: &str,
    name: &str,
) -> Result<Option<PipelineId>> {
    Ok(backend.get_pipeline(application, name).await?.id())
}
