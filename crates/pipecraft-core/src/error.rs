//! Error types for pipecraft.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid pipeline document: {0}")]
    InvalidDocument(String),

    #[error(
        "stage {stage} of pipeline '{pipeline}' references a nested pipeline but has no owning application"
    )]
    MissingOwningApplication { pipeline: String, stage: usize },

    #[error("lookup of pipeline {application}/{name} failed: {message}")]
    BackendLookup {
        application: String,
        name: String,
        message: String,
    },

    #[error("saving pipeline {application}/{name} failed: {message}")]
    BackendSave {
        application: String,
        name: String,
        message: String,
    },

    #[error("nested pipeline {application}/{name} does not exist in the backend")]
    UnresolvedReference { application: String, name: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
