use thiserror::Error;

use crate::application::repos::RepoError;

/// The store behind a search path failed. Distinct from an empty result.
#[derive(Debug, Error)]
pub enum SearchBackendError {
    #[error("search query rejected by backend: {message}")]
    Query { message: String },
    #[error("search backend unavailable: {message}")]
    Unavailable { message: String },
    #[error("search backend timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },
}

impl From<RepoError> for SearchBackendError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::InvalidInput { message } => Self::Query { message },
            RepoError::Timeout => Self::Timeout { elapsed_ms: 0 },
            other => Self::Unavailable {
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider failed: {message}")]
    Provider { message: String },
    #[error("embedding response missing data")]
    MissingVector,
    #[error("embedding provider timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },
}

impl EmbeddingError {
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("vector store failed: {message}")]
    Backend { message: String },
    #[error("vector store timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },
}

impl VectorStoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SemanticSearchError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),
}
