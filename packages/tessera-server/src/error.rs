//! Error types for the graph-serving engine

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Failed to open {path}: {source}")]
    OpenFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Node map error in partition '{suffix}': {message}")]
    NodeMap { suffix: String, message: String },

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Storage backend '{0}' is not available in this build")]
    UnsupportedStorage(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}
