//! Embedding provider trait for generating vector embeddings from text.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{EmbeddingBackendKind, EmbeddingConfig};
use crate::error::Result;
use crate::hashing::HashingEmbeddingProvider;
use crate::ollama::OllamaEmbeddingProvider;
use crate::openai::OpenAIEmbeddingProvider;

/// Identifies the vector space a set of embeddings lives in.
///
/// Recorded alongside every collection so that vectors from a different
/// model or dimension are rejected instead of being mixed into one index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EmbeddingSpace {
    /// Model identifier, e.g. `ollama/all-minilm`.
    pub model: String,
    /// Length of every vector in the space.
    pub dimensions: usize,
}

impl EmbeddingSpace {
    /// Create a new embedding space descriptor.
    pub fn new(model: impl Into<String>, dimensions: usize) -> Self {
        Self { model: model.into(), dimensions }
    }
}

impl fmt::Display for EmbeddingSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} dims)", self.model, self.dimensions)
    }
}

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends (Ollama, OpenAI, local
/// hashing) behind a unified async interface. The default
/// [`embed_batch`](EmbeddingProvider::embed_batch) implementation calls
/// [`embed`](EmbeddingProvider::embed) sequentially; backends that support
/// native batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use medirag::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// Returns exactly one vector per input, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Return the identifier of the model that produces the embeddings.
    fn model_id(&self) -> &str;

    /// Return the embedding space recorded as collection metadata.
    fn space(&self) -> EmbeddingSpace {
        EmbeddingSpace::new(self.model_id(), self.dimensions())
    }
}

/// Build the embedding provider selected by `config`.
///
/// # Errors
///
/// Returns [`RagError::BackendUnconfigured`](crate::RagError::BackendUnconfigured)
/// if the selected backend is missing credentials or connection settings.
pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.backend {
        EmbeddingBackendKind::Local => Arc::new(OllamaEmbeddingProvider::from_config(config)?),
        EmbeddingBackendKind::Hosted => Arc::new(OpenAIEmbeddingProvider::from_config(config)?),
        EmbeddingBackendKind::Hashing => {
            Arc::new(HashingEmbeddingProvider::new(config.dimensions)?)
        }
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_display_includes_dimensions() {
        let space = EmbeddingSpace::new("ollama/all-minilm", 384);
        assert_eq!(space.to_string(), "ollama/all-minilm (384 dims)");
    }

    #[tokio::test]
    async fn default_batch_preserves_order() {
        let provider = HashingEmbeddingProvider::new(32).unwrap();
        let batch = provider.embed_batch(&["fever", "cough", "fever"]).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0], batch[2]);
        assert_ne!(batch[0], batch[1]);
        assert_eq!(batch[1], provider.embed("cough").await.unwrap());
    }

    #[test]
    fn builds_hashing_provider_from_config() {
        let config = EmbeddingConfig {
            backend: EmbeddingBackendKind::Hashing,
            dimensions: 64,
            ..EmbeddingConfig::default()
        };
        let provider = from_config(&config).unwrap();
        assert_eq!(provider.space(), EmbeddingSpace::new("hashing-64", 64));
    }
}
