use thiserror::Error;

/// Result type for graph-store and analytics operations
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Errors that can occur in the graph store or the engines built on it
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("FalkorDB error: {0}")]
    Database(#[from] falkordb::FalkorDBError),

    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("not found: {key}")]
    NotFound { key: String },

    #[error("integrity violation: {message}")]
    Integrity { message: String },

    #[error("backend '{backend}' is not supported: {message}")]
    UnsupportedBackend { backend: String, message: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GraphError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    pub fn unsupported(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnsupportedBackend {
            backend: backend.into(),
            message: message.into(),
        }
    }
}
