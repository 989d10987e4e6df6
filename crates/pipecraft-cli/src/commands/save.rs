//! Save command.

use super::Project;
use anyhow::{Context, Result};
use async_trait::async_trait;
use pipecraft_config::DocumentKind;
use pipecraft_core::{Lookup, PipelineBackend, PipelineDocument, PipelineId, upsert};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

/// Render the project and upsert it. With `dry_run` the documents are
/// printed instead of saved.
pub async fn run(project: &Project, kind: DocumentKind, dry_run: bool) -> Result<()> {
    let rendered = project.render(kind)?;
    let desired = PipelineDocument::from_slice(rendered.as_bytes())
        .context("Rendered document is not a pipeline")?;
    let backend = project.backend()?;

    if dry_run {
        let dry = DryRunBackend::new(&backend);
        upsert(desired, &dry).await.context("Dry run failed")?;
        for document in dry.into_saved() {
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        return Ok(());
    }

    let sent = upsert(desired, &backend)
        .await
        .context("Failed to save pipeline")?;
    info!(pipeline = %sent.label(), "Pipeline saved");
    println!("Saved {}", sent.label());
    Ok(())
}

/// Forwards lookups to a real backend but keeps saves in memory.
///
/// Pipelines "saved" during the run get a placeholder identifier so parents
/// referencing them can still be rewritten.
pub struct DryRunBackend<'a> {
    inner: &'a dyn PipelineBackend,
    pending: Mutex<HashMap<(String, String), PipelineDocument>>,
    saved: Mutex<Vec<PipelineDocument>>,
}

impl<'a> DryRunBackend<'a> {
    pub fn new(inner: &'a dyn PipelineBackend) -> Self {
        Self {
            inner,
            pending: Mutex::new(HashMap::new()),
            saved: Mutex::new(Vec::new()),
        }
    }

    /// Documents that would have been saved, in save order.
    pub fn into_saved(self) -> Vec<PipelineDocument> {
        self.saved.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PipelineBackend for DryRunBackend<'_> {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn get_pipeline(&self, application: &str, name: &str) -> pipecraft_core::Result<Lookup> {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(application.to_string(), name.to_string()))
            .cloned();
        match pending {
            Some(document) => Ok(Lookup::Found(document)),
            None => self.inner.get_pipeline(application, name).await,
        }
    }

    async fn save_pipeline(&self, document: &PipelineDocument) -> pipecraft_core::Result<()> {
        let application = document.application()?.to_string();
        let name = document.name()?.to_string();

        let mut stored = document.clone();
        if stored.id().is_none() {
            stored.set_id(&PipelineId::new(format!("<new:{}/{}>", application, name)));
        }

        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((application, name), stored);
        self.saved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(document.clone());
        Ok(())
    }
}
