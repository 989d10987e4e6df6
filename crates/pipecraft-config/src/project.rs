//! Project settings parsing (pipecraft.kdl).

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "pipecraft.kdl";
pub const DEFAULT_LIBRARY_DIR: &str = "vendor";
pub const DEFAULT_MANIFEST: &str = "jsonnetfile.json";

/// Settings for one pipeline project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Remote pipeline store, if configured.
    pub backend: Option<BackendSettings>,
    /// Directory (relative to the project root) holding vendored libraries.
    pub library_dir: String,
    /// Dependency manifest file (relative to the project root).
    pub manifest: String,
    /// Entrypoint template per document kind.
    pub entrypoints: Entrypoints,
    /// Default template arguments, overridden by the command line.
    pub args: Map<String, Value>,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            backend: None,
            library_dir: DEFAULT_LIBRARY_DIR.to_string(),
            manifest: DEFAULT_MANIFEST.to_string(),
            entrypoints: Entrypoints::default(),
            args: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSettings {
    pub url: String,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Extra headers sent with every request.
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entrypoints {
    pub pipeline: String,
    pub template: String,
}

impl Default for Entrypoints {
    fn default() -> Self {
        Self {
            pipeline: "pipeline.json".to_string(),
            template: "template.json".to_string(),
        }
    }
}

impl ProjectSettings {
    /// Load settings from a file. A missing file yields the defaults.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => parse_project(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    pub fn manifest_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.manifest)
    }
}

/// Parse project settings from KDL text. Every node is optional.
pub fn parse_project(kdl: &str) -> ConfigResult<ProjectSettings> {
    let doc: KdlDocument = kdl.parse()?;
    let mut settings = ProjectSettings::default();

    for node in doc.nodes() {
        match node.name().value() {
            "backend" => {
                settings.backend = Some(parse_backend(node)?);
            }
            "library-dir" => {
                settings.library_dir = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("library-dir path".to_string()))?;
            }
            "manifest" => {
                settings.manifest = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("manifest path".to_string()))?;
            }
            "entrypoint" => {
                if let Some(pipeline) = get_string_prop(node, "pipeline") {
                    settings.entrypoints.pipeline = pipeline;
                }
                if let Some(template) = get_string_prop(node, "template") {
                    settings.entrypoints.template = template;
                }
            }
            "arg" => {
                let (name, value) = parse_arg(node)?;
                settings.args.insert(name, value);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(settings)
}

fn parse_backend(node: &KdlNode) -> ConfigResult<BackendSettings> {
    let url = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("backend url".to_string()))?;

    let timeout_secs = match node.get("timeout") {
        None => None,
        Some(value) => match value.as_integer() {
            Some(secs) if secs > 0 => Some(u64::try_from(secs).map_err(|_| {
                ConfigError::InvalidValue {
                    field: "backend timeout".to_string(),
                    message: format!("{} is out of range", secs),
                }
            })?),
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: "backend timeout".to_string(),
                    message: format!("expected a positive number of seconds, got {}", value),
                });
            }
        },
    };

    let mut headers = Vec::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() == "header" {
                match get_all_string_args(child).as_slice() {
                    [name, value] => headers.push((name.clone(), value.clone())),
                    _ => {
                        return Err(ConfigError::InvalidValue {
                            field: "backend header".to_string(),
                            message: "expected a name and a value".to_string(),
                        });
                    }
                }
            }
        }
    }

    Ok(BackendSettings {
        url,
        timeout_secs,
        headers,
    })
}

fn parse_arg(node: &KdlNode) -> ConfigResult<(String, Value)> {
    let mut positional = node.entries().iter().filter(|e| e.name().is_none());

    let name = positional
        .next()
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
        .ok_or_else(|| ConfigError::MissingField("arg name".to_string()))?;

    let value = positional
        .next()
        .map(|e| kdl_to_json(e.value()))
        .ok_or_else(|| ConfigError::MissingField(format!("value for arg '{}'", name)))?;

    Ok((name, value))
}

fn kdl_to_json(value: &KdlValue) -> Value {
    if let Some(s) = value.as_string() {
        Value::String(s.to_string())
    } else if let Some(b) = value.as_bool() {
        Value::Bool(b)
    } else if let Some(i) = value.as_integer() {
        i64::try_from(i)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(i.to_string()))
    } else if let Some(f) = value.as_float() {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    } else {
        Value::Null
    }
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}
