//! Vector store trait for storing and searching vector embeddings.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{Chunk, SearchResult};
use crate::embedding::EmbeddingSpace;
use crate::error::Result;

/// Summary of a stored collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// The collection name.
    pub name: String,
    /// The embedding space every entry belongs to.
    pub space: EmbeddingSpace,
    /// Number of stored chunks.
    pub entry_count: usize,
}

/// A storage backend for vector embeddings with similarity search.
///
/// Implementations manage named collections of [`Chunk`]s. Each collection
/// records the [`EmbeddingSpace`] its vectors came from and refuses vectors
/// from any other space.
///
/// # Example
///
/// ```rust,ignore
/// use medirag::{LocalVectorStore, VectorStore};
///
/// let store = LocalVectorStore::open("./chroma").await?;
/// store.upsert("medibot", &embedder.space(), &chunks).await?;
/// store.persist().await?;
/// let results = store.search("medibot", &query_embedding, 4).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a named collection for vectors from `space`.
    ///
    /// No-op if it already exists with the same space.
    async fn create_collection(&self, name: &str, space: &EmbeddingSpace) -> Result<()>;

    /// Delete a named collection and all its data. No-op if it does not exist.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Insert or replace chunks by id, creating the collection when absent.
    ///
    /// Every chunk must carry an embedding from `space`. The whole batch is
    /// validated before anything is written; a rejected batch leaves the
    /// collection unchanged. An empty batch is a no-op.
    async fn upsert(&self, collection: &str, space: &EmbeddingSpace, chunks: &[Chunk])
    -> Result<()>;

    /// Replace the whole contents of a collection with `chunks`.
    ///
    /// The batch is validated against `space` first; a rejected batch leaves
    /// the existing collection, including its recorded space, untouched.
    async fn replace_collection(
        &self,
        collection: &str,
        space: &EmbeddingSpace,
        chunks: &[Chunk],
    ) -> Result<()>;

    /// Delete chunks by their IDs from a collection.
    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()>;

    /// Search for the `top_k` most similar chunks to the given embedding.
    ///
    /// Returns results ordered by descending similarity score; chunks with
    /// equal scores keep their insertion order.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>>;

    /// Describe a collection, or `None` if it does not exist.
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>>;

    /// Durably commit the current state.
    async fn persist(&self) -> Result<()>;
}
