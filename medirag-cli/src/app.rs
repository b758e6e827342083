//! Wiring configuration into the core components.

use std::sync::Arc;

use anyhow::Context;
use medirag::{
    AnswerService, AppConfig, IngestPipeline, IngestSummary, LocalVectorStore, PromptComposer,
    RecursiveChunker, Retriever, embedding, llm,
};
use tracing::info;

/// Open the persisted vector index named by `config`.
pub async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<LocalVectorStore>> {
    let store = LocalVectorStore::open(&config.persist_dir)
        .await
        .with_context(|| format!("failed to open index at {}", config.persist_dir.display()))?;
    Ok(Arc::new(store))
}

/// Build the answer service. The whole configuration is validated first.
pub async fn build_service(config: &AppConfig) -> anyhow::Result<AnswerService> {
    config.validate().context("invalid configuration")?;

    let embedder = embedding::from_config(&config.embedding)?;
    let backend = llm::from_config(&config.llm)?;
    let store = open_store(config).await?;

    let retriever = Retriever::new(embedder, store, &config.collection, config.rag.clone());
    let mut composer = PromptComposer::new();
    if let Some(language) = &config.language_hint {
        composer = composer.with_language_hint(language);
    }

    let mut service = AnswerService::new(retriever, composer, backend);
    if let Some(timeout) = config.llm.timeout() {
        service = service.with_generation_timeout(timeout);
    }

    info!(
        collection = %config.collection,
        llm = ?config.llm.backend,
        model = %config.llm.model,
        embedding = %config.embedding.model,
        "answer service ready"
    );
    Ok(service)
}

/// Build the ingestion pipeline. Only the settings ingestion uses are validated.
pub async fn build_pipeline(config: &AppConfig) -> anyhow::Result<IngestPipeline> {
    config.rag.validate().context("invalid chunking settings")?;
    config.embedding.check().context("invalid embedding settings")?;

    let pipeline = IngestPipeline::builder()
        .embedding_provider(embedding::from_config(&config.embedding)?)
        .vector_store(open_store(config).await?)
        .chunker(Arc::new(RecursiveChunker::new(config.rag.chunk_size, config.rag.chunk_overlap)))
        .build()?;
    Ok(pipeline)
}

/// Index the data directory and return the line to print.
///
/// With `rebuild`, the collection's previous contents are replaced once the
/// new ones are fully embedded; a failed rebuild keeps the old index.
pub async fn run_ingest(config: &AppConfig, rebuild: bool) -> anyhow::Result<String> {
    let pipeline = build_pipeline(config).await?;
    let run = if rebuild {
        info!(collection = %config.collection, "rebuilding collection");
        pipeline.rebuild(&config.data_dir, &config.collection).await
    } else {
        pipeline.ingest(&config.data_dir, &config.collection).await
    };
    let summary =
        run.with_context(|| format!("failed to ingest {}", config.data_dir.display()))?;
    Ok(ingest_report(config, &summary))
}

fn ingest_report(config: &AppConfig, summary: &IngestSummary) -> String {
    if summary.is_empty() {
        format!(
            "No documents found in {}. Add PDF, TXT or MD files and rerun.",
            config.data_dir.display()
        )
    } else {
        format!(
            "Indexed {} chunks into {} (collection: {}).",
            summary.chunks_indexed,
            config.persist_dir.display(),
            config.collection
        )
    }
}
