//! CLI command implementations.

pub mod diff;
pub mod render;
pub mod save;
pub mod validate;

use anyhow::{Context, Result, bail};
use pipecraft_backend::HttpBackend;
use pipecraft_config::{
    BackendSettings, DocumentKind, JsonTemplateRenderer, ProjectSettings, RenderRequest, Resolver,
    project::DEFAULT_CONFIG_FILE, render_project,
};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Command-line inputs that shape a project.
#[derive(Debug, Default)]
pub struct ProjectOptions {
    pub root: PathBuf,
    pub config: Option<PathBuf>,
    pub api_url: Option<String>,
    pub args: Option<String>,
    pub args_file: Option<PathBuf>,
}

/// A loaded project: settings, merged arguments and the import resolver.
pub struct Project {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub settings: ProjectSettings,
    pub args: Map<String, Value>,
    pub resolver: Resolver,
}

impl Project {
    pub fn load(options: ProjectOptions) -> Result<Self> {
        let root = options.root;
        let config_path = options
            .config
            .unwrap_or_else(|| root.join(DEFAULT_CONFIG_FILE));

        let mut settings = ProjectSettings::load(&config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?;

        if let Some(url) = options.api_url {
            match settings.backend.as_mut() {
                Some(backend) => backend.url = url,
                None => {
                    settings.backend = Some(BackendSettings {
                        url,
                        timeout_secs: None,
                        headers: Vec::new(),
                    })
                }
            }
        }

        let mut args = settings.args.clone();
        if let Some(path) = &options.args_file {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read args file: {}", path.display()))?;
            args.extend(parse_args(&text).with_context(|| format!("Invalid args file: {}", path.display()))?);
        }
        if let Some(text) = &options.args {
            args.extend(parse_args(text).context("Invalid --args")?);
        }
        debug!(args = args.len(), "Merged template arguments");

        let resolver = Resolver::for_project(&root, &settings)?;

        Ok(Self {
            root,
            config_path,
            settings,
            args,
            resolver,
        })
    }

    /// Render one document of this project.
    pub fn render(&self, kind: DocumentKind) -> Result<String> {
        let renderer = JsonTemplateRenderer::new(self.settings.entrypoints.clone()).with_process_env();
        let request = RenderRequest {
            project_root: &self.root,
            args: &self.args,
            kind,
        };
        render_project(&self.resolver, &renderer, &request)
            .with_context(|| format!("Failed to render {} in {}", kind, self.root.display()))
    }

    pub fn backend(&self) -> Result<HttpBackend> {
        let Some(settings) = &self.settings.backend else {
            bail!(
                "No backend configured: pass --api-url or add a backend node to {}",
                self.config_path.display()
            );
        };
        Ok(HttpBackend::from_settings(settings)?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn parse_args(text: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(text)? {
        Value::Object(map) => Ok(map),
        other => bail!("expected a JSON object, got {}", other),
    }
}
