//! Project configuration and template rendering for pipecraft.
//!
//! This crate handles:
//! - Project settings (pipecraft.kdl)
//! - Dependency manifests and library search roots
//! - Import resolution with a per-render cache
//! - The built-in JSON template renderer and its variables

pub mod error;
pub mod manifest;
pub mod project;
pub mod render;
pub mod resolver;
pub mod variables;

pub use error::{ConfigError, ConfigResult};
pub use manifest::{Manifest, library_roots, search_roots};
pub use project::{BackendSettings, Entrypoints, ProjectSettings, parse_project};
pub use render::{DocumentKind, JsonTemplateRenderer, RenderRequest, Renderer, render_project};
pub use resolver::{
    ImportCache, ImportSession, Importer, LocalFs, Resolved, Resolver, SearchRoots, SourceFs,
};
pub use variables::{TemplateContext, TemplateContextBuilder};
