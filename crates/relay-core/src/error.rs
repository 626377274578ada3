//! Error types for the RAG relay

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Embedding,
    Storage,
    Retrieval,
    Generation,
    Decode,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Embedding => "embedding",
            Stage::Storage => "storage",
            Stage::Retrieval => "retrieval",
            Stage::Generation => "generation",
            Stage::Decode => "decode",
        };
        f.write_str(name)
    }
}

/// Error types for the relay pipeline
#[derive(Error, Debug)]
pub enum Error {
    #[error("{stage} backend returned status {status}: {body}")]
    Upstream { stage: Stage, status: u16, body: String },

    #[error("{stage} backend returned an unusable payload: {detail}")]
    InvalidResponse { stage: Stage, detail: String },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("stream decode error: {0}")]
    Decode(String),

    #[error("{stage} network error: {message}")]
    Network { stage: Stage, message: String },

    #[error("vector index error during {stage}: {message}")]
    VectorIndex { stage: Stage, message: String },

    #[error("{0} stage timed out")]
    Timeout(Stage),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The pipeline stage that failed, if the error belongs to one
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Upstream { stage, .. }
            | Error::InvalidResponse { stage, .. }
            | Error::Network { stage, .. }
            | Error::VectorIndex { stage, .. } => Some(*stage),
            Error::Timeout(stage) => Some(*stage),
            Error::DimensionMismatch { .. } => Some(Stage::Storage),
            Error::Decode(_) => Some(Stage::Decode),
            Error::InvalidInput(_)
            | Error::Configuration(_)
            | Error::Serialization(_)
            | Error::Io(_) => None,
        }
    }

    /// True when the fault lies with a downstream dependency rather than this service
    pub fn is_upstream_fault(&self) -> bool {
        matches!(
            self,
            Error::Upstream { .. }
                | Error::InvalidResponse { .. }
                | Error::Network { .. }
                | Error::VectorIndex { .. }
                | Error::Timeout(_)
                | Error::Decode(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
