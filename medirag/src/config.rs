//! Configuration for indexing, retrieval, and the model backends.
//!
//! [`AppConfig`] is the single configuration object handed to component
//! constructors. It is read once at startup ([`AppConfig::from_env`]) and
//! validated once ([`AppConfig::validate`]); components never consult the
//! environment themselves.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Default Ollama server address.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
/// Default OpenAI-compatible API base.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Configuration parameters for chunking and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of top results to return from vector search.
    pub top_k: usize,
    /// Minimum similarity score for results. `None` keeps the k nearest
    /// entries whatever their score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_threshold: Option<f32>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self { chunk_size: 800, chunk_overlap: 120, top_k: 4, similarity_threshold: None }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of top results to return from vector search.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = Some(threshold);
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Which embedding backend produces vectors.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackendKind {
    /// A local Ollama server.
    #[default]
    Local,
    /// An OpenAI-compatible embeddings API.
    Hosted,
    /// Deterministic feature hashing, no model required.
    Hashing,
}

impl FromStr for EmbeddingBackendKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "ollama" => Ok(Self::Local),
            "hosted" | "openai" => Ok(Self::Hosted),
            "hashing" | "hash" => Ok(Self::Hashing),
            other => Err(RagError::ConfigError(format!(
                "unknown embedding backend '{other}' (use 'local', 'hosted' or 'hashing')"
            ))),
        }
    }
}

/// Which language model backend answers questions.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackendKind {
    /// A local Ollama server.
    #[default]
    Local,
    /// An OpenAI-compatible chat completions API.
    Hosted,
}

impl FromStr for LlmBackendKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "ollama" => Ok(Self::Local),
            "hosted" | "openai" => Ok(Self::Hosted),
            other => Err(RagError::ConfigError(format!(
                "unknown LLM backend '{other}' (use 'local' or 'hosted')"
            ))),
        }
    }
}

/// Settings for the embedding backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Selected backend.
    pub backend: EmbeddingBackendKind,
    /// Model name understood by the backend.
    pub model: String,
    /// Expected vector length.
    pub dimensions: usize,
    /// Base URL override for the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// API key for hosted embeddings.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackendKind::Local,
            model: "all-minilm".to_string(),
            dimensions: 384,
            base_url: None,
            api_key: None,
        }
    }
}

impl EmbeddingConfig {
    /// Default model and dimension for a backend.
    pub fn defaults_for(backend: EmbeddingBackendKind) -> (&'static str, usize) {
        match backend {
            EmbeddingBackendKind::Local => ("all-minilm", 384),
            EmbeddingBackendKind::Hosted => ("text-embedding-3-small", 1536),
            EmbeddingBackendKind::Hashing => ("hashing", 384),
        }
    }

    /// The base URL the backend talks to.
    pub fn base_url(&self) -> &str {
        match (&self.base_url, self.backend) {
            (Some(url), _) => url,
            (None, EmbeddingBackendKind::Hosted) => DEFAULT_OPENAI_URL,
            (None, _) => DEFAULT_OLLAMA_URL,
        }
    }

    /// Verify the selected backend has everything it needs.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::BackendUnconfigured`] naming the missing setting.
    pub fn check(&self) -> Result<()> {
        let backend = match self.backend {
            EmbeddingBackendKind::Local => "Ollama embedding",
            EmbeddingBackendKind::Hosted => "OpenAI embedding",
            EmbeddingBackendKind::Hashing => "hashing embedding",
        };
        if self.dimensions == 0 {
            return Err(unconfigured(backend, "dimensions must be greater than zero"));
        }
        match self.backend {
            EmbeddingBackendKind::Hashing => Ok(()),
            EmbeddingBackendKind::Local => {
                require_model(backend, &self.model)?;
                require_url(backend, self.base_url())
            }
            EmbeddingBackendKind::Hosted => {
                require_model(backend, &self.model)?;
                require_api_key(backend, self.api_key.as_deref(), "OPENAI_API_KEY")?;
                require_url(backend, self.base_url())
            }
        }
    }
}

/// Settings for the language model backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    /// Selected backend.
    pub backend: LlmBackendKind,
    /// Model name understood by the backend.
    pub model: String,
    /// Base URL override for the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// API key for the hosted backend.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Sampling temperature. Kept low so answers stay consistent.
    pub temperature: f32,
    /// Maximum number of tokens the model may generate.
    pub max_output_tokens: u32,
    /// Deadline for a single generation call, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackendKind::Local,
            model: Self::default_model(LlmBackendKind::Local).to_string(),
            base_url: None,
            api_key: None,
            temperature: 0.2,
            max_output_tokens: 512,
            timeout_secs: None,
        }
    }
}

impl LlmConfig {
    /// Default model name for a backend.
    pub fn default_model(backend: LlmBackendKind) -> &'static str {
        match backend {
            LlmBackendKind::Local => "llama3.1",
            LlmBackendKind::Hosted => "gpt-4o-mini",
        }
    }

    /// The base URL the backend talks to.
    pub fn base_url(&self) -> &str {
        match (&self.base_url, self.backend) {
            (Some(url), _) => url,
            (None, LlmBackendKind::Local) => DEFAULT_OLLAMA_URL,
            (None, LlmBackendKind::Hosted) => DEFAULT_OPENAI_URL,
        }
    }

    /// The generation deadline, if one is configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Verify the selected backend has everything it needs.
    ///
    /// Both variants are checked up front: the hosted backend needs an API
    /// key, and the local backend needs a model and a valid server URL.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::BackendUnconfigured`] naming the missing setting.
    pub fn check(&self) -> Result<()> {
        let backend = match self.backend {
            LlmBackendKind::Local => "Ollama",
            LlmBackendKind::Hosted => "OpenAI",
        };
        require_model(backend, &self.model)?;
        if self.backend == LlmBackendKind::Hosted {
            require_api_key(backend, self.api_key.as_deref(), "OPENAI_API_KEY")?;
        }
        require_url(backend, self.base_url())?;
        if self.max_output_tokens == 0 {
            return Err(unconfigured(backend, "max output tokens must be greater than zero"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(unconfigured(backend, "temperature must be between 0.0 and 2.0"));
        }
        Ok(())
    }
}

/// The full configuration surface consumed by the core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Directory holding the persisted vector index.
    pub persist_dir: PathBuf,
    /// Directory scanned for source documents during ingestion.
    pub data_dir: PathBuf,
    /// Name of the collection holding this corpus.
    pub collection: String,
    /// Embedding backend settings.
    pub embedding: EmbeddingConfig,
    /// Language model backend settings.
    pub llm: LlmConfig,
    /// Chunking and retrieval settings.
    pub rag: RagConfig,
    /// Language the assistant should answer in unless the user writes in another.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_hint: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            persist_dir: PathBuf::from("./chroma"),
            data_dir: PathBuf::from("data/medical"),
            collection: "medibot".to_string(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            rag: RagConfig::default(),
            language_hint: None,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a variable is present but malformed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps variable names to values.
    ///
    /// Empty values count as unset. Unset values fall back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a variable is present but malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let llm_backend = match get("LLM_BACKEND") {
            Some(value) => value.parse()?,
            None => LlmBackendKind::default(),
        };
        let (model_var, url_var) = match llm_backend {
            LlmBackendKind::Local => ("OLLAMA_MODEL", "OLLAMA_URL"),
            LlmBackendKind::Hosted => ("OPENAI_MODEL", "OPENAI_BASE_URL"),
        };
        let llm = LlmConfig {
            backend: llm_backend,
            model: get(model_var)
                .unwrap_or_else(|| LlmConfig::default_model(llm_backend).to_string()),
            base_url: get(url_var),
            api_key: get("OPENAI_API_KEY"),
            temperature: parse_or(&get, "LLM_TEMPERATURE", defaults.llm.temperature)?,
            max_output_tokens: parse_or(&get, "MAX_TOKENS", defaults.llm.max_output_tokens)?,
            timeout_secs: parse_opt(&get, "LLM_TIMEOUT_SECS")?,
        };

        let embedding_backend = match get("EMBEDDING_BACKEND") {
            Some(value) => value.parse()?,
            None => EmbeddingBackendKind::default(),
        };
        let (default_model, default_dims) = EmbeddingConfig::defaults_for(embedding_backend);
        let embedding_url = match embedding_backend {
            EmbeddingBackendKind::Hosted => get("EMBEDDING_URL").or_else(|| get("OPENAI_BASE_URL")),
            _ => get("EMBEDDING_URL").or_else(|| get("OLLAMA_URL")),
        };
        let embedding = EmbeddingConfig {
            backend: embedding_backend,
            model: get("EMBEDDING_MODEL").unwrap_or_else(|| default_model.to_string()),
            dimensions: parse_or(&get, "EMBEDDING_DIMENSIONS", default_dims)?,
            base_url: embedding_url,
            api_key: get("OPENAI_API_KEY"),
        };

        let rag = RagConfig {
            chunk_size: parse_or(&get, "CHUNK_SIZE", defaults.rag.chunk_size)?,
            chunk_overlap: parse_or(&get, "CHUNK_OVERLAP", defaults.rag.chunk_overlap)?,
            top_k: parse_or(&get, "RETRIEVAL_K", defaults.rag.top_k)?,
            similarity_threshold: parse_opt(&get, "SIMILARITY_THRESHOLD")?,
        };

        Ok(Self {
            persist_dir: get("PERSIST_DIR")
                .or_else(|| get("CHROMA_DIR"))
                .map(PathBuf::from)
                .unwrap_or(defaults.persist_dir),
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            collection: get("COLLECTION").unwrap_or(defaults.collection),
            embedding,
            llm,
            rag,
            language_hint: get("LANGUAGE_HINT"),
        })
    }

    /// Validate the whole configuration once, at startup.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for inconsistent retrieval settings and
    /// [`RagError::BackendUnconfigured`] for backends missing credentials or
    /// connection settings.
    pub fn validate(&self) -> Result<()> {
        self.rag.validate()?;
        if self.collection.trim().is_empty() {
            return Err(RagError::ConfigError("collection name must not be empty".to_string()));
        }
        self.embedding.check()?;
        self.llm.check()
    }
}

fn unconfigured(backend: &str, message: &str) -> RagError {
    RagError::BackendUnconfigured { backend: backend.to_string(), message: message.to_string() }
}

fn require_model(backend: &str, model: &str) -> Result<()> {
    if model.trim().is_empty() {
        return Err(unconfigured(backend, "model name is not set"));
    }
    Ok(())
}

fn require_api_key(backend: &str, api_key: Option<&str>, variable: &str) -> Result<()> {
    match api_key {
        Some(key) if !key.trim().is_empty() => Ok(()),
        _ => Err(unconfigured(backend, &format!("{variable} is not set"))),
    }
}

fn require_url(backend: &str, url: &str) -> Result<()> {
    reqwest::Url::parse(url)
        .map(|_| ())
        .map_err(|e| unconfigured(backend, &format!("invalid base URL '{url}': {e}")))
}

fn parse_opt<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|e| RagError::ConfigError(format!("invalid {key} '{value}': {e}")))
        })
        .transpose()
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(get, key)?.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn builder_rejects_overlap_not_smaller_than_size() {
        let err = RagConfig::builder().chunk_size(100).chunk_overlap(100).build().unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[test]
    fn builder_rejects_zero_top_k() {
        assert!(RagConfig::builder().top_k(0).build().is_err());
    }

    #[test]
    fn defaults_match_reference_deployment() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.rag, RagConfig::default());
        assert_eq!(config.rag.chunk_size, 800);
        assert_eq!(config.rag.chunk_overlap, 120);
        assert_eq!(config.rag.top_k, 4);
        assert_eq!(config.llm.max_output_tokens, 512);
        assert_eq!(config.llm.model, "llama3.1");
        assert_eq!(config.collection, "medibot");
        assert_eq!(config.persist_dir, PathBuf::from("./chroma"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn reads_overrides_and_aliases() {
        let config = config_from(&[
            ("LLM_BACKEND", "openai"),
            ("OPENAI_API_KEY", "sk-test"),
            ("CHROMA_DIR", "/var/lib/medirag"),
            ("RETRIEVAL_K", "6"),
            ("CHUNK_SIZE", "400"),
            ("CHUNK_OVERLAP", "40"),
            ("EMBEDDING_BACKEND", "hashing"),
            ("EMBEDDING_DIMENSIONS", "128"),
            ("LLM_TIMEOUT_SECS", "30"),
        ])
        .unwrap();

        assert_eq!(config.llm.backend, LlmBackendKind::Hosted);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.base_url(), DEFAULT_OPENAI_URL);
        assert_eq!(config.llm.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.persist_dir, PathBuf::from("/var/lib/medirag"));
        assert_eq!(config.rag.top_k, 6);
        assert_eq!(config.rag.similarity_threshold, None);
        assert_eq!(config.embedding.backend, EmbeddingBackendKind::Hashing);
        assert_eq!(config.embedding.dimensions, 128);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn similarity_threshold_is_opt_in() {
        assert_eq!(RagConfig::default().similarity_threshold, None);
        let config = config_from(&[("SIMILARITY_THRESHOLD", "0.25")]).unwrap();
        assert_eq!(config.rag.similarity_threshold, Some(0.25));
        let built = RagConfig::builder().similarity_threshold(0.5).build().unwrap();
        assert_eq!(built.similarity_threshold, Some(0.5));
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config = config_from(&[("OLLAMA_MODEL", "  "), ("COLLECTION", "")]).unwrap();
        assert_eq!(config.llm.model, "llama3.1");
        assert_eq!(config.collection, "medibot");
    }

    #[test]
    fn malformed_numbers_are_config_errors() {
        let err = config_from(&[("MAX_TOKENS", "lots")]).unwrap_err();
        assert!(err.to_string().contains("MAX_TOKENS"));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(matches!(config_from(&[("LLM_BACKEND", "gpt")]), Err(RagError::ConfigError(_))));
    }

    #[test]
    fn hosted_backend_without_key_fails_validation() {
        let config = config_from(&[("LLM_BACKEND", "hosted")]).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, RagError::BackendUnconfigured { .. }));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn local_backend_with_bad_url_fails_validation() {
        let config = config_from(&[("OLLAMA_URL", "not a url")]).unwrap();
        assert!(matches!(config.validate(), Err(RagError::BackendUnconfigured { .. })));
    }

    #[test]
    fn inconsistent_chunking_fails_validation() {
        let config = config_from(&[("CHUNK_SIZE", "100"), ("CHUNK_OVERLAP", "150")]).unwrap();
        assert!(matches!(config.validate(), Err(RagError::ConfigError(_))));
    }

    #[test]
    fn api_keys_are_not_serialized() {
        let config = config_from(&[("LLM_BACKEND", "hosted"), ("OPENAI_API_KEY", "sk-secret")])
            .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
