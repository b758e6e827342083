//! Error types for the `medirag` crate.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while indexing documents or answering questions.
#[derive(Debug, Error)]
pub enum RagError {
    /// The question was empty or contained only whitespace.
    #[error("question must not be empty")]
    EmptyQuestion,

    /// The configured collection is missing or could not be read at query time.
    #[error("index unavailable for collection '{collection}': {reason}")]
    IndexUnavailable {
        /// The collection the retriever was configured for.
        collection: String,
        /// Why the collection could not be used.
        reason: String,
    },

    /// The collection has never been populated.
    #[error("collection '{0}' does not exist")]
    CollectionNotFound(String),

    /// A vector's length disagrees with the collection's established dimension.
    #[error(
        "dimension mismatch in collection '{collection}': expected {expected}, got {actual}"
    )]
    DimensionMismatch {
        /// The collection being written or searched.
        collection: String,
        /// The dimension recorded for the collection.
        expected: usize,
        /// The dimension of the offending vector.
        actual: usize,
    },

    /// Vectors come from a different embedding model than the collection's.
    #[error(
        "embedding space mismatch in collection '{collection}': indexed with '{expected}', got '{actual}'"
    )]
    EmbeddingSpaceMismatch {
        /// The collection being written.
        collection: String,
        /// The embedding model recorded for the collection.
        expected: String,
        /// The embedding model of the incoming vectors.
        actual: String,
    },

    /// A backend was selected without the settings it needs.
    #[error("{backend} backend is not configured: {message}")]
    BackendUnconfigured {
        /// The backend that could not be constructed.
        backend: String,
        /// What is missing.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The language model call failed.
    #[error("Model error ({backend}): {message}")]
    ModelError {
        /// The completion backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The language model did not answer within the caller's deadline.
    #[error("generation timed out after {0:?}")]
    GenerationTimeout(Duration),

    /// A source document could not be read.
    #[error("failed to load '{path}': {message}")]
    LoaderError {
        /// The file that failed to load.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error in the ingestion pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RagError {
    /// Whether the error was caused by the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::EmptyQuestion)
    }

    /// Whether the error means ingested data cannot be used for this request.
    pub fn is_index_unavailable(&self) -> bool {
        matches!(self, Self::IndexUnavailable { .. } | Self::CollectionNotFound(_))
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_question_is_client_error() {
        assert!(RagError::EmptyQuestion.is_client_error());
        assert!(!RagError::ConfigError("x".into()).is_client_error());
    }

    #[test]
    fn missing_collection_counts_as_unavailable() {
        assert!(RagError::CollectionNotFound("medibot".into()).is_index_unavailable());
        let err = RagError::IndexUnavailable { collection: "medibot".into(), reason: "gone".into() };
        assert!(err.is_index_unavailable());
        assert_eq!(err.to_string(), "index unavailable for collection 'medibot': gone");
    }
}
