//! Identifier map construction.
//!
//! The desired document names its nested pipelines, while the stored document
//! only carries backend identifiers. The indexer walks the desired document,
//! asks the backend what identifier each nested pipeline currently has, and
//! records how the desired side expressed the reference so the normalizer can
//! rewrite the stored document into the same shape.

use async_recursion::async_recursion;
use std::collections::HashMap;
use tracing::debug;

use crate::backend::{Lookup, PipelineBackend};
use crate::pipeline::{PipelineDocument, PipelineRef, Side};
use crate::{PipelineId, Result};

/// What a backend identifier stands for on the desired side.
#[derive(Debug, Clone, PartialEq)]
pub enum MappedRef {
    /// The desired stage referenced the pipeline by name.
    Name(String),
    /// The desired stage inlined the pipeline; holds the stored document.
    Pipeline(Box<PipelineDocument>),
}

/// Backend identifier to desired-side reference, built fresh for each
/// reconciliation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentifierMap {
    entries: HashMap<PipelineId, MappedRef>,
}

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: PipelineId, reference: MappedRef) {
        self.entries.insert(id, reference);
    }

    pub fn get(&self, id: &PipelineId) -> Option<&MappedRef> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build the identifier map for a desired document.
///
/// Nested references the backend does not know are left out of the map. Any
/// other lookup failure aborts the whole build.
pub async fn build_identifier_map(
    desired: &PipelineDocument,
    backend: &dyn PipelineBackend,
) -> Result<IdentifierMap> {
    let mut map = IdentifierMap::new();
    index_document(desired, backend, &mut map).await?;
    debug!(
        pipeline = %desired.label(),
        entries = map.len(),
        "Built identifier map"
    );
    Ok(map)
}

#[async_recursion]
async fn index_document(
    doc: &PipelineDocument,
    backend: &dyn PipelineBackend,
    map: &mut IdentifierMap,
) -> Result<()> {
    for nested in doc.nested_references(Side::Desired)? {
        let application = nested.owning_application(doc)?;

        let name = match &nested.reference {
            PipelineRef::Name(name) => name.as_str(),
            PipelineRef::Embedded(embedded) => embedded.name()?,
            PipelineRef::Identifier(_) => continue,
        };

        let remote = match backend.get_pipeline(application, name).await? {
            Lookup::Found(remote) => remote,
            Lookup::NotFound => {
                debug!(application, name, "Nested pipeline not found in backend");
                continue;
            }
        };

        if let Some(id) = remote.id() {
            let entry = match &nested.reference {
                PipelineRef::Embedded(_) => MappedRef::Pipeline(Box::new(remote)),
                _ => MappedRef::Name(remote.name()?.to_string()),
            };
            debug!(application, name, id = %id, "Indexed nested pipeline");
            map.insert(id, entry);
        }

        // Only inlined pipelines describe their own nested stages.
        if let PipelineRef::Embedded(embedded) = &nested.reference {
            index_document(embedded, backend, map).await?;
        }
    }

    Ok(())
}
