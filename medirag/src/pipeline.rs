//! Ingestion pipeline.
//!
//! The [`IngestPipeline`] turns a directory of source documents into a
//! persisted collection: load → chunk → embed → upsert → persist. It composes
//! an [`EmbeddingProvider`], a [`VectorStore`] and a [`Chunker`].
//!
//! # Example
//!
//! ```rust,ignore
//! use medirag::{IngestPipeline, LocalVectorStore, RecursiveChunker};
//!
//! let pipeline = IngestPipeline::builder()
//!     .embedding_provider(embedder)
//!     .vector_store(Arc::new(LocalVectorStore::open("./chroma").await?))
//!     .chunker(Arc::new(RecursiveChunker::new(800, 120)))
//!     .build()?;
//!
//! let summary = pipeline.ingest("data/medical", "medibot").await?;
//! println!("{} chunks", summary.chunks_indexed);
//! ```

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use crate::chunking::Chunker;
use crate::document::{Chunk, Document};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::loader::DirectoryLoader;
use crate::vectorstore::VectorStore;

/// Number of chunk texts sent to the embedder per request.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 64;

/// Counts reported after an ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Documents read from the source.
    pub documents_loaded: usize,
    /// Chunks written to the collection.
    pub chunks_indexed: usize,
}

impl IngestSummary {
    /// Whether the run found nothing to index.
    pub fn is_empty(&self) -> bool {
        self.chunks_indexed == 0
    }
}

/// Indexes documents into a collection.
///
/// Ingestion needs exclusive write access to its collection. Callers must
/// not run two ingestions into the same collection at once, nor ingest
/// while another process holds the same persistence directory open for
/// writing. Concurrent queries against other collections are fine.
///
/// Chunk ids are derived from document ids, so re-ingesting the same
/// documents replaces their chunks instead of duplicating them.
pub struct IngestPipeline {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
    batch_size: usize,
}

impl IngestPipeline {
    /// Create a new [`IngestPipelineBuilder`].
    pub fn builder() -> IngestPipelineBuilder {
        IngestPipelineBuilder::default()
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Load every supported file under `source_dir` and index it into `collection`.
    ///
    /// A directory with nothing to index leaves the store untouched.
    ///
    /// # Errors
    ///
    /// - [`RagError::LoaderError`] if a file or directory cannot be read.
    /// - See [`ingest_documents`](Self::ingest_documents) for the rest.
    pub async fn ingest(&self, source_dir: impl AsRef<Path>, collection: &str) -> Result<IngestSummary> {
        let documents = load_directory(source_dir.as_ref()).await?;
        self.index(collection, &documents, WriteMode::Merge).await
    }

    /// Rebuild `collection` from the files under `source_dir`.
    ///
    /// Everything is loaded, chunked and embedded before the collection is
    /// touched; the old contents are then replaced and persisted in one step.
    /// A failed run, or a directory with nothing to index, leaves the
    /// persisted collection as it was.
    ///
    /// # Errors
    ///
    /// Same as [`ingest`](Self::ingest).
    pub async fn rebuild(&self, source_dir: impl AsRef<Path>, collection: &str) -> Result<IngestSummary> {
        let documents = load_directory(source_dir.as_ref()).await?;
        self.index(collection, &documents, WriteMode::Replace).await
    }

    /// Index `documents` into `collection`: chunk → embed → upsert → persist.
    ///
    /// All chunks are embedded before anything is written, and the store
    /// validates the whole set in one upsert, so a failed run leaves the
    /// collection as it was.
    ///
    /// # Errors
    ///
    /// - [`RagError::PipelineError`] if embedding fails or returns the wrong
    ///   number of vectors.
    /// - [`RagError::DimensionMismatch`] / [`RagError::EmbeddingSpaceMismatch`]
    ///   if the collection was built with a different embedder.
    /// - [`RagError::VectorStoreError`] if persisting fails.
    pub async fn ingest_documents(
        &self,
        collection: &str,
        documents: &[Document],
    ) -> Result<IngestSummary> {
        self.index(collection, documents, WriteMode::Merge).await
    }

    /// Replace the contents of `collection` with `documents`.
    ///
    /// Unlike [`ingest_documents`](Self::ingest_documents), chunks of
    /// documents no longer present are dropped, and the collection may switch
    /// to a new embedding space. Empty input changes nothing.
    ///
    /// # Errors
    ///
    /// Same as [`ingest_documents`](Self::ingest_documents), minus the
    /// embedding-space mismatch.
    pub async fn rebuild_documents(
        &self,
        collection: &str,
        documents: &[Document],
    ) -> Result<IngestSummary> {
        self.index(collection, documents, WriteMode::Replace).await
    }

    async fn index(
        &self,
        collection: &str,
        documents: &[Document],
        mode: WriteMode,
    ) -> Result<IngestSummary> {
        let mut chunks: Vec<Chunk> = documents.iter().flat_map(|d| self.chunker.chunk(d)).collect();
        let summary =
            IngestSummary { documents_loaded: documents.len(), chunks_indexed: chunks.len() };
        if chunks.is_empty() {
            info!(collection, documents = documents.len(), "nothing to index");
            return Ok(summary);
        }

        self.embed_chunks(&mut chunks).await?;

        let space = self.embedding_provider.space();
        let written = match mode {
            WriteMode::Merge => self.vector_store.upsert(collection, &space, &chunks).await,
            WriteMode::Replace => {
                self.vector_store.replace_collection(collection, &space, &chunks).await
            }
        };
        written.map_err(|e| {
            error!(collection, error = %e, "write failed during ingestion");
            e
        })?;
        self.vector_store.persist().await?;

        info!(
            collection,
            documents = summary.documents_loaded,
            chunk_count = summary.chunks_indexed,
            space = %space,
            rebuild = matches!(mode, WriteMode::Replace),
            "ingested documents"
        );
        Ok(summary)
    }

    async fn embed_chunks(&self, chunks: &mut [Chunk]) -> Result<()> {
        for batch in chunks.chunks_mut(self.batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let embeddings = self.embedding_provider.embed_batch(&texts).await.map_err(|e| {
                let first = batch.first().map(|c| c.id.as_str()).unwrap_or_default();
                error!(chunk.id = first, error = %e, "embedding failed during ingestion");
                RagError::PipelineError(format!("embedding failed at chunk '{first}': {e}"))
            })?;
            if embeddings.len() != batch.len() {
                return Err(RagError::PipelineError(format!(
                    "embedder returned {} vectors for {} chunks",
                    embeddings.len(),
                    batch.len()
                )));
            }
            for (chunk, embedding) in batch.iter_mut().zip(embeddings) {
                chunk.embedding = embedding;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum WriteMode {
    Merge,
    Replace,
}

/// Walk `dir` on the blocking pool so file reads and PDF extraction do not
/// stall the runtime.
async fn load_directory(dir: &Path) -> Result<Vec<Document>> {
    let loader = DirectoryLoader::new(dir);
    tokio::task::spawn_blocking(move || loader.load())
        .await
        .map_err(|e| RagError::PipelineError(format!("document loading task failed: {e}")))?
}

/// Builder for constructing an [`IngestPipeline`].
///
/// The embedding provider, vector store and chunker are required. Call
/// [`build()`](IngestPipelineBuilder::build) to validate and produce the
/// pipeline.
#[derive(Default)]
pub struct IngestPipelineBuilder {
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    batch_size: Option<usize>,
}

impl IngestPipelineBuilder {
    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set how many chunks are embedded per request (default 64).
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Build the [`IngestPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any required field is missing or
    /// the batch size is zero.
    pub fn build(self) -> Result<IngestPipeline> {
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let chunker =
            self.chunker.ok_or_else(|| RagError::ConfigError("chunker is required".to_string()))?;
        let batch_size = self.batch_size.unwrap_or(DEFAULT_EMBED_BATCH_SIZE);
        if batch_size == 0 {
            return Err(RagError::ConfigError("batch_size must be greater than zero".to_string()));
        }

        Ok(IngestPipeline { embedding_provider, vector_store, chunker, batch_size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::RecursiveChunker;
    use crate::hashing::HashingEmbeddingProvider;
    use crate::localstore::LocalVectorStore;

    fn pipeline(store: Arc<LocalVectorStore>, batch_size: usize) -> IngestPipeline {
        IngestPipeline::builder()
            .embedding_provider(Arc::new(HashingEmbeddingProvider::new(32).unwrap()))
            .vector_store(store)
            .chunker(Arc::new(RecursiveChunker::new(40, 5)))
            .batch_size(batch_size)
            .build()
            .unwrap()
    }

    #[test]
    fn builder_requires_components() {
        let err = IngestPipeline::builder().build().err().unwrap();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[tokio::test]
    async fn empty_input_creates_nothing() {
        let store = Arc::new(LocalVectorStore::in_memory());
        let summary = pipeline(store.clone(), 8)
            .ingest_documents("kb", &[Document::new("blank", "   \n")])
            .await
            .unwrap();
        assert_eq!(summary, IngestSummary { documents_loaded: 1, chunks_indexed: 0 });
        assert!(store.collection_info("kb").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn small_batches_embed_every_chunk() {
        let store = Arc::new(LocalVectorStore::in_memory());
        let text = "Fever is a temporary rise in body temperature. \
                    It is often a sign that the body is fighting an infection.";
        let summary = pipeline(store.clone(), 1)
            .ingest_documents("kb", &[Document::new("fever", text)])
            .await
            .unwrap();
        assert!(summary.chunks_indexed > 1);

        let info = store.collection_info("kb").await.unwrap().unwrap();
        assert_eq!(info.entry_count, summary.chunks_indexed);
        assert_eq!(info.space.model, "hashing-32");
    }

    #[tokio::test]
    async fn rebuild_drops_chunks_of_removed_documents() {
        let store = Arc::new(LocalVectorStore::in_memory());
        let pipeline = pipeline(store.clone(), 8);
        let docs = [
            Document::new("a", "Drink water when you have a fever."),
            Document::new("b", "Rest helps the body recover."),
        ];
        pipeline.ingest_documents("kb", &docs).await.unwrap();
        assert_eq!(store.collection_info("kb").await.unwrap().unwrap().entry_count, 2);

        pipeline.rebuild_documents("kb", &docs[..1]).await.unwrap();
        let info = store.collection_info("kb").await.unwrap().unwrap();
        assert_eq!(info.entry_count, 1);
    }

    #[tokio::test]
    async fn empty_rebuild_keeps_existing_collection() {
        let store = Arc::new(LocalVectorStore::in_memory());
        let pipeline = pipeline(store.clone(), 8);
        pipeline
            .ingest_documents("kb", &[Document::new("a", "Drink water when you have a fever.")])
            .await
            .unwrap();

        let summary = pipeline.rebuild_documents("kb", &[]).await.unwrap();
        assert!(summary.is_empty());
        assert_eq!(store.collection_info("kb").await.unwrap().unwrap().entry_count, 1);
    }

    #[tokio::test]
    async fn rebuild_from_unreadable_directory_keeps_collection() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("fever.md"), "Fever means a raised temperature.").unwrap();
        let store = Arc::new(LocalVectorStore::in_memory());
        let pipeline = pipeline(store.clone(), 8);
        pipeline.ingest(temp.path(), "kb").await.unwrap();

        std::fs::write(temp.path().join("zbad.txt"), [0xff, 0xfe, 0x00]).unwrap();
        let err = pipeline.rebuild(temp.path(), "kb").await.unwrap_err();
        assert!(matches!(err, RagError::LoaderError { .. }));
        assert_eq!(store.collection_info("kb").await.unwrap().unwrap().entry_count, 1);
    }

    #[tokio::test]
    async fn reingesting_replaces_chunks() {
        let store = Arc::new(LocalVectorStore::in_memory());
        let pipeline = pipeline(store.clone(), 8);
        let docs = [Document::new("a", "Drink water when you have a fever.")];
        pipeline.ingest_documents("kb", &docs).await.unwrap();
        pipeline.ingest_documents("kb", &docs).await.unwrap();
        let info = store.collection_info("kb").await.unwrap().unwrap();
        assert_eq!(info.entry_count, 1);
    }
}
