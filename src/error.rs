//! Error types owned by the router itself.
//!
//! Collaborator failures travel as `anyhow::Error` and are degraded at the
//! call site; only persistence and configuration have typed errors.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("snapshot I/O failed for {path}: {source}")]
    SnapshotIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RouterError>;
