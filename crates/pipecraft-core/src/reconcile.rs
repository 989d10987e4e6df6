//! Reconciliation of a rendered pipeline against the stored one.

use tracing::{info, warn};

use crate::backend::{Lookup, PipelineBackend};
use crate::diff::{MatchKind, StructuralDiff};
use crate::index::{IdentifierMap, build_identifier_map};
use crate::normalize::normalize;
use crate::pipeline::PipelineDocument;
use crate::Result;

/// Options for a reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    /// Leave unchanged properties out of the rendered diff.
    pub suppress_unchanged: bool,
}

/// Result of comparing a desired document with the stored one.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub desired: PipelineDocument,
    /// The stored document after normalization, if one exists.
    pub current: Option<PipelineDocument>,
    pub identifiers: IdentifierMap,
    pub diff: StructuralDiff,
    suppress_unchanged: bool,
}

impl Reconciliation {
    pub fn match_kind(&self) -> MatchKind {
        self.diff.match_kind
    }

    pub fn is_full_match(&self) -> bool {
        self.diff.match_kind == MatchKind::FullMatch
    }

    /// The diff as plain text, honoring the run's suppression option.
    pub fn render(&self) -> String {
        self.diff.render(self.suppress_unchanged)
    }
}

/// Compare serialized desired document bytes against the backend's copy.
///
/// Nested references are indexed first, then the stored document is fetched,
/// normalized and diffed. A missing stored document yields a
/// `NoComparableBase` result; every other failure aborts the run.
pub async fn reconcile(
    desired: &[u8],
    backend: &dyn PipelineBackend,
    options: &ReconcileOptions,
) -> Result<Reconciliation> {
    let desired = PipelineDocument::from_slice(desired)?;
    let application = desired.application()?;
    let name = desired.name()?;

    info!(application, name, backend = backend.name(), "Reconciling pipeline");

    let identifiers = build_identifier_map(&desired, backend).await?;

    let current = match backend.get_pipeline(application, name).await? {
        Lookup::Found(stored) => Some(normalize(stored, &identifiers)?),
        Lookup::NotFound => {
            warn!(application, name, "Pipeline not stored yet, nothing to compare against");
            None
        }
    };

    let desired_value = desired.to_value();
    let diff = match &current {
        Some(current) => StructuralDiff::compare(&current.to_value(), &desired_value),
        None => StructuralDiff::without_base(&desired_value),
    };

    info!(application, name, result = %diff.match_kind, "Reconciled pipeline");

    Ok(Reconciliation {
        desired,
        current,
        identifiers,
        diff,
        suppress_unchanged: options.suppress_unchanged,
    })
}
