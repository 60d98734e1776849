use std::path::PathBuf;

use thiserror::Error;

/// Failures the library surfaces to its host.
///
/// Compilation ambiguities (missing rule id, unparseable age wording, no
/// action) are never errors; they land in audit notes and quality tags.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("guideline document not found: {}", path.display())]
    DocumentNotFound { path: PathBuf },

    #[error("cache file is corrupt: {} ({reason})", path.display())]
    CacheCorrupt { path: PathBuf, reason: String },

    #[error(
        "embedding dimension mismatch for model {model_id}: expected {expected}, got {actual}"
    )]
    EmbeddingDimensionMismatch {
        model_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("facts record has an invalid shape: {0}")]
    InvalidFactsShape(String),

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write cache file {}", path.display())]
    CacheWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("pattern compilation failed: {0}")]
    Pattern(#[from] regex::Error),
}

impl EngineError {
    /// True when rebuilding from the source document repairs the failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::CacheCorrupt { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CacheCorrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
