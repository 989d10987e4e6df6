//! Diff command.

use super::Project;
use anyhow::{Context, Result};
use pipecraft_core::{ReconcileOptions, reconcile};
use pipecraft_config::DocumentKind;

/// Print how the stored pipeline differs from the rendered one.
/// Returns whether the two fully match.
pub async fn run(project: &Project, kind: DocumentKind, full: bool) -> Result<bool> {
    let rendered = project.render(kind)?;
    let backend = project.backend()?;

    let options = ReconcileOptions {
        suppress_unchanged: !full,
    };
    let reconciliation = reconcile(rendered.as_bytes(), &backend, &options)
        .await
        .context("Failed to reconcile with the backend")?;

    println!("{}: {}", reconciliation.desired.label(), reconciliation.match_kind());
    print!("{}", reconciliation.render());

    let changed = reconciliation.diff.delta.changed_paths();
    if !changed.is_empty() {
        println!("Changed: {}", changed.join(", "));
    }

    Ok(reconciliation.is_full_match())
}
