//! Retrieval-augmented answering for educational health information.
//!
//! This crate provides:
//! - Recursive, overlap-exact document chunking
//! - Embedding backends (Ollama, OpenAI, local feature hashing)
//! - A file-backed vector index with per-collection embedding spaces
//! - Retrieval, grounded prompt composition and model backends
//! - The [`AnswerService`] query entry point and the [`IngestPipeline`]
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use medirag::*;
//!
//! let config = AppConfig::from_env()?;
//! config.validate()?;
//!
//! let embedder = embedding::from_config(&config.embedding)?;
//! let store = Arc::new(LocalVectorStore::open(&config.persist_dir).await?);
//! let retriever = Retriever::new(embedder, store, &config.collection, config.rag.clone());
//! let service = AnswerService::new(retriever, PromptComposer::new(), llm::from_config(&config.llm)?);
//!
//! println!("{}", service.answer("What is a fever?").await?);
//! ```

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod hashing;
pub mod llm;
pub mod loader;
pub mod localstore;
pub mod ollama;
pub mod openai;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod service;
pub mod vectorstore;

pub use chunking::{Chunker, RecursiveChunker, split_documents};
pub use config::{
    AppConfig, EmbeddingBackendKind, EmbeddingConfig, LlmBackendKind, LlmConfig, RagConfig,
    RagConfigBuilder,
};
pub use document::{Chunk, Document, SearchResult};
pub use embedding::{EmbeddingProvider, EmbeddingSpace};
pub use error::{RagError, Result};
pub use hashing::HashingEmbeddingProvider;
pub use llm::{CompletionBackend, GenerationSettings, ModelOutput, UNPARSEABLE_OUTPUT_FALLBACK};
pub use loader::DirectoryLoader;
pub use localstore::LocalVectorStore;
pub use ollama::{OllamaBackend, OllamaEmbeddingProvider};
pub use openai::{OpenAIBackend, OpenAIEmbeddingProvider};
pub use pipeline::{IngestPipeline, IngestPipelineBuilder, IngestSummary};
pub use prompt::{NO_CONTEXT_MARKER, Prompt, PromptComposer, SAFETY_PREAMBLE};
pub use retriever::Retriever;
pub use service::{Answer, AnswerService, AnswerStage, DISCLAIMER};
pub use vectorstore::{CollectionInfo, VectorStore};
