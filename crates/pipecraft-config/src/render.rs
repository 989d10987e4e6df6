//! Template rendering.
//!
//! A [`Renderer`] turns a project into a serialized pipeline document. It never
//! touches the filesystem directly; every file it reads comes through the
//! [`Importer`] it is handed, so the render-scoped cache sees all reads.

use crate::project::Entrypoints;
use crate::resolver::{Importer, Resolved, Resolver, SourceFs};
use crate::variables::{TemplateContext, TemplateContextBuilder};
use crate::{ConfigError, ConfigResult};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Key of the single-entry object that pulls in another file.
pub const IMPORT_KEY: &str = "$import";

/// Which document a render produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DocumentKind {
    #[default]
    Pipeline,
    Template,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Pipeline => write!(f, "pipeline"),
            DocumentKind::Template => write!(f, "template"),
        }
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pipeline" => Ok(DocumentKind::Pipeline),
            "template" => Ok(DocumentKind::Template),
            other => Err(format!(
                "unknown document kind '{}', expected 'pipeline' or 'template'",
                other
            )),
        }
    }
}

impl Entrypoints {
    pub fn for_kind(&self, kind: DocumentKind) -> &str {
        match kind {
            DocumentKind::Pipeline => &self.pipeline,
            DocumentKind::Template => &self.template,
        }
    }
}

/// Inputs of one render.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub project_root: &'a Path,
    /// Caller arguments, visible to templates under `args`.
    pub args: &'a Map<String, Value>,
    pub kind: DocumentKind,
}

/// Produces a serialized pipeline document from a project.
pub trait Renderer {
    fn render(&self, request: &RenderRequest<'_>, importer: &mut dyn Importer)
    -> ConfigResult<String>;
}

/// Renders JSON templates with `$import` objects and `${...}` placeholders.
#[derive(Debug, Clone, Default)]
pub struct JsonTemplateRenderer {
    entrypoints: Entrypoints,
    env: HashMap<String, String>,
}

impl JsonTemplateRenderer {
    pub fn new(entrypoints: Entrypoints) -> Self {
        Self {
            entrypoints,
            env: HashMap::new(),
        }
    }

    /// Expose the current process environment as `${env.*}`.
    pub fn with_process_env(mut self) -> Self {
        self.env = std::env::vars().collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

impl Renderer for JsonTemplateRenderer {
    fn render(
        &self,
        request: &RenderRequest<'_>,
        importer: &mut dyn Importer,
    ) -> ConfigResult<String> {
        let entry = self.entrypoints.for_kind(request.kind);
        let ctx = TemplateContextBuilder::new()
            .with_args(request.args.clone())
            .with_envs(self.env.clone())
            .build();

        // Absolute so the entrypoint never falls through to the search roots.
        let path = request.project_root.join(entry);
        let path = std::path::absolute(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let resolved = importer.import(&path, &path.to_string_lossy())?;
        let mut expansion = Expansion {
            importer,
            ctx: &ctx,
            stack: Vec::new(),
        };
        let document = expansion.file(resolved)?;

        Ok(serde_json::to_string_pretty(&document)?)
    }
}

/// State of one render's walk through its files.
struct Expansion<'a> {
    importer: &'a mut dyn Importer,
    ctx: &'a TemplateContext,
    /// Files currently being expanded, outermost first.
    stack: Vec<PathBuf>,
}

impl Expansion<'_> {
    fn file(&mut self, resolved: Resolved) -> ConfigResult<Value> {
        if self.stack.contains(&resolved.path) {
            let chain: Vec<String> = self
                .stack
                .iter()
                .chain(std::iter::once(&resolved.path))
                .map(|p| p.display().to_string())
                .collect();
            return Err(ConfigError::ImportCycle(chain.join(" -> ")));
        }

        let value: Value =
            serde_json::from_slice(&resolved.content).map_err(|e| ConfigError::Render {
                file: resolved.path.clone(),
                message: e.to_string(),
            })?;

        debug!(file = %resolved.path.display(), depth = self.stack.len(), "Expanding template");
        self.stack.push(resolved.path.clone());
        let expanded = self.value(value, &resolved.path)?;
        self.stack.pop();
        Ok(expanded)
    }

    fn value(&mut self, value: Value, file: &Path) -> ConfigResult<Value> {
        match value {
            Value::Object(fields) => {
                if fields.len() == 1 {
                    if let Some(target) = fields.get(IMPORT_KEY) {
                        let name = target.as_str().ok_or_else(|| ConfigError::Render {
                            file: file.to_path_buf(),
                            message: format!("'{}' expects a file name, got {}", IMPORT_KEY, target),
                        })?;
                        let name = self.ctx.interpolate(name);
                        let resolved = self.importer.import(file, &name)?;
                        return self.file(resolved);
                    }
                }

                let mut out = Map::with_capacity(fields.len());
                for (key, field) in fields {
                    out.insert(key, self.value(field, file)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.value(item, file))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Array),
            Value::String(s) => Ok(self.ctx.substitute(&s)),
            other => Ok(other),
        }
    }
}

/// Render a project with a fresh import session.
pub fn render_project<F: SourceFs>(
    resolver: &Resolver<F>,
    renderer: &dyn Renderer,
    request: &RenderRequest<'_>,
) -> ConfigResult<String> {
    let mut session = resolver.session();
    let rendered = renderer.render(request, &mut session)?;
    info!(
        project = %request.project_root.display(),
        kind = %request.kind,
        files = session.cache().len(),
        "Rendered document"
    );
    Ok(rendered)
}
