//! Configuration, import and render errors.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("KDL parse error: {0}")]
    Parse(#[from] kdl::KdlError),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error(
        "import '{import}' from {} not found next to the importing file or in any search root",
        .from.display()
    )]
    ImportNotFound { import: String, from: PathBuf },

    #[error("import cycle: {0}")]
    ImportCycle(String),

    #[error("malformed dependency manifest {}: {message}", .path.display())]
    ManifestParse { path: PathBuf, message: String },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("render failed in {}: {message}", .file.display())]
    Render { file: PathBuf, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
