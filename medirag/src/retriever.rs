//! Query-time retrieval against one collection.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::RagConfig;
use crate::document::SearchResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// Finds the passages most similar to a question.
///
/// The retriever must use the same embedder the collection was indexed
/// with; the collection's recorded embedding space is compared against the
/// embedder's on every call.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    collection: String,
    config: RagConfig,
}

impl Retriever {
    /// Create a retriever over `collection`.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        config: RagConfig,
    ) -> Self {
        Self { embedder, store, collection: collection.into(), config }
    }

    /// The collection this retriever reads.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The configured default for `k`.
    pub fn top_k(&self) -> usize {
        self.config.top_k
    }

    /// Return at most `k` passages for `question`, most similar first.
    ///
    /// When a similarity threshold is configured, results scoring below it
    /// are dropped; otherwise the `k` nearest entries are returned whatever
    /// their score.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexUnavailable`] if the collection is missing,
    /// was indexed in a different embedding space, or cannot be searched.
    /// Failures embedding the question propagate unchanged.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<SearchResult>> {
        let info = self
            .store
            .collection_info(&self.collection)
            .await
            .map_err(|e| self.unavailable(e.to_string()))?
            .ok_or_else(|| self.unavailable("collection has not been ingested".to_string()))?;

        let space = self.embedder.space();
        if info.space != space {
            return Err(self.unavailable(format!(
                "indexed with {}, but the configured embedder is {space}",
                info.space
            )));
        }

        let query_embedding = self.embedder.embed(question).await?;

        let results = self
            .store
            .search(&self.collection, &query_embedding, k)
            .await
            .map_err(|e| self.unavailable(e.to_string()))?;

        let found = results.len();
        let filtered: Vec<SearchResult> = match self.config.similarity_threshold {
            Some(threshold) => results.into_iter().filter(|r| r.score >= threshold).collect(),
            None => results,
        };

        debug!(
            collection = %self.collection,
            k,
            found,
            kept = filtered.len(),
            "retrieval completed"
        );
        Ok(filtered)
    }

    fn unavailable(&self, reason: String) -> RagError {
        warn!(collection = %self.collection, %reason, "index unavailable");
        RagError::IndexUnavailable { collection: self.collection.clone(), reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{Chunker, RecursiveChunker};
    use crate::document::{Chunk, Document};
    use crate::hashing::HashingEmbeddingProvider;
    use crate::localstore::LocalVectorStore;

    async fn indexed(texts: &[&str]) -> (Arc<dyn EmbeddingProvider>, Arc<LocalVectorStore>) {
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(HashingEmbeddingProvider::new(128).unwrap());
        let store = Arc::new(LocalVectorStore::in_memory());
        let chunker = RecursiveChunker::new(200, 20);
        for (i, text) in texts.iter().enumerate() {
            let mut chunks = chunker.chunk(&Document::new(format!("doc{i}"), *text));
            for chunk in &mut chunks {
                chunk.embedding = embedder.embed(&chunk.text).await.unwrap();
            }
            store.upsert("kb", &embedder.space(), &chunks).await.unwrap();
        }
        (embedder, store)
    }

    #[tokio::test]
    async fn missing_collection_is_unavailable() {
        let (embedder, store) = indexed(&[]).await;
        let retriever = Retriever::new(embedder, store, "kb", RagConfig::default());
        let err = retriever.retrieve("What is a fever?", 4).await.unwrap_err();
        assert!(matches!(err, RagError::IndexUnavailable { .. }));
    }

    #[tokio::test]
    async fn foreign_embedding_space_is_unavailable() {
        let (_, store) = indexed(&["Fever is a raised body temperature."]).await;
        let other: Arc<dyn EmbeddingProvider> =
            Arc::new(HashingEmbeddingProvider::new(64).unwrap());
        let retriever = Retriever::new(other, store, "kb", RagConfig::default());
        let err = retriever.retrieve("fever", 4).await.unwrap_err();
        match err {
            RagError::IndexUnavailable { reason, .. } => {
                assert!(reason.contains("hashing-128 (128 dims)"), "{reason}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn threshold_drops_weak_matches() {
        let (embedder, store) =
            indexed(&["Fever is a raised body temperature.", "Bread needs flour and yeast."])
                .await;
        let config = RagConfig { similarity_threshold: Some(0.3), ..RagConfig::default() };
        let retriever = Retriever::new(embedder, store, "kb", config);
        let results = retriever.retrieve("fever temperature", 4).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].chunk.text.contains("Fever"));
    }

    /// Always embeds to the same fixed vector.
    struct FixedEmbedder(Vec<f32>);

    #[async_trait::async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }

        fn dimensions(&self) -> usize {
            self.0.len()
        }

        fn model_id(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn dissimilar_entries_are_still_returned_without_threshold() {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(FixedEmbedder(vec![1.0, 0.0]));
        let store = Arc::new(LocalVectorStore::in_memory());
        let chunks: Vec<_> = [("a", vec![-1.0, 0.0]), ("b", vec![-1.0, -1.0])]
            .into_iter()
            .map(|(id, embedding)| Chunk {
                id: id.to_string(),
                text: format!("passage {id}"),
                embedding,
                metadata: Default::default(),
                document_id: id.to_string(),
            })
            .collect();
        store.upsert("kb", &embedder.space(), &chunks).await.unwrap();

        let retriever = Retriever::new(embedder, store, "kb", RagConfig::default());
        let results = retriever.retrieve("q", 4).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.score < 0.0));
        assert_eq!(results[0].chunk.document_id, "b");
    }

    #[tokio::test]
    async fn results_are_bounded_by_k() {
        let (embedder, store) = indexed(&["one fever", "two fever", "three fever"]).await;
        let retriever = Retriever::new(embedder, store, "kb", RagConfig::default());
        assert_eq!(retriever.retrieve("fever", 2).await.unwrap().len(), 2);
        assert_eq!(retriever.retrieve("fever", 0).await.unwrap().len(), 0);
    }
}
