//! Local model support through an [Ollama](https://ollama.com) server.
//!
//! Provides [`OllamaEmbeddingProvider`] (`/api/embed`) and [`OllamaBackend`]
//! (`/api/generate`). Ollama loads a model into memory on its first request,
//! so the first call after startup is slower than the rest.
//!
//! # Example
//!
//! ```rust,ignore
//! use medirag::ollama::OllamaBackend;
//!
//! let backend = OllamaBackend::new("http://localhost:11434", "llama3.1", settings)?;
//! let text = backend.complete(&prompt).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, error};

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::llm::{CompletionBackend, GenerationSettings, ModelOutput};
use crate::prompt::Prompt;

const PROVIDER: &str = "Ollama";

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{path}", base_url.trim_end_matches('/'))
}

/// Turn a non-success response into an error message, preferring Ollama's
/// `{"error": "..."}` body.
async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error).unwrap_or(body);
    format!("API returned {status}: {detail}")
}

// ── Ollama API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

/// An [`EmbeddingProvider`] backed by a local Ollama server.
///
/// The configured dimension is checked against the first vector the server
/// returns; a model that produces a different size is reported once, before
/// any of its vectors reach an index.
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    model_id: String,
    dimensions: usize,
    verified: OnceCell<()>,
}

impl OllamaEmbeddingProvider {
    /// Create a provider for `model` on the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::BackendUnconfigured`] if the model name is empty,
    /// the URL is invalid, or `dimensions` is zero.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Result<Self> {
        let config = EmbeddingConfig {
            base_url: Some(base_url.into()),
            model: model.into(),
            dimensions,
            ..EmbeddingConfig::default()
        };
        Self::from_config(&config)
    }

    /// Create a provider from validated embedding settings.
    ///
    /// # Errors
    ///
    /// See [`EmbeddingConfig::check`].
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        config.check()?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config.base_url().to_string(),
            model: config.model.clone(),
            model_id: format!("ollama/{}", config.model),
            dimensions: config.dimensions,
            verified: OnceCell::new(),
        })
    }

    fn map_err(message: String) -> RagError {
        RagError::EmbeddingError { provider: PROVIDER.into(), message }
    }

    async fn verify_dimensions(&self, embeddings: &[Vec<f32>]) -> Result<()> {
        let Some(first) = embeddings.first() else {
            return Ok(());
        };
        let actual = first.len();
        self.verified
            .get_or_try_init(|| async {
                if actual == self.dimensions {
                    debug!(provider = PROVIDER, model = %self.model, dimensions = actual, "embedding model ready");
                    Ok(())
                } else {
                    Err(Self::map_err(format!(
                        "model '{}' returned {actual}-dimensional vectors, configured for {}",
                        self.model, self.dimensions
                    )))
                }
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| Self::map_err("API returned empty response".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let request_body = EmbedRequest { model: &self.model, input: texts.to_vec() };

        let response = self
            .client
            .post(endpoint(&self.base_url, "api/embed"))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                Self::map_err(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let message = error_detail(response).await;
            error!(provider = PROVIDER, %message, "API error");
            return Err(Self::map_err(message));
        }

        let embed_response: EmbedResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            Self::map_err(format!("failed to parse response: {e}"))
        })?;

        if embed_response.embeddings.len() != texts.len() {
            return Err(Self::map_err(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embed_response.embeddings.len()
            )));
        }

        self.verify_dimensions(&embed_response.embeddings).await?;
        Ok(embed_response.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// A [`CompletionBackend`] backed by a local Ollama server.
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    settings: GenerationSettings,
}

impl OllamaBackend {
    /// Create a backend for `model` on the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::BackendUnconfigured`] if the model name is empty or
    /// the URL is invalid.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        settings: GenerationSettings,
    ) -> Result<Self> {
        let config = LlmConfig {
            base_url: Some(base_url.into()),
            model: model.into(),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
            ..LlmConfig::default()
        };
        Self::from_config(&config)
    }

    /// Create a backend from validated model settings.
    ///
    /// # Errors
    ///
    /// See [`LlmConfig::check`].
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        config.check()?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config.base_url().to_string(),
            model: config.model.clone(),
            settings: GenerationSettings::from(config),
        })
    }

    fn map_err(message: String) -> RagError {
        RagError::ModelError { backend: PROVIDER.into(), message }
    }
}

#[async_trait]
impl CompletionBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        debug!(
            provider = PROVIDER,
            model = %self.model,
            prompt_len = prompt.user.len(),
            "requesting completion"
        );

        let request_body = GenerateRequest {
            model: &self.model,
            system: &prompt.system,
            prompt: &prompt.user,
            stream: false,
            options: GenerateOptions {
                temperature: self.settings.temperature,
                num_predict: self.settings.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, "api/generate"))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                Self::map_err(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let message = error_detail(response).await;
            error!(provider = PROVIDER, %message, "API error");
            return Err(Self::map_err(message));
        }

        let body = response.text().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to read response");
            Self::map_err(format!("failed to read response: {e}"))
        })?;

        Ok(ModelOutput::parse(&body).into_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(endpoint("http://localhost:11434/", "api/embed"), "http://localhost:11434/api/embed");
        assert_eq!(endpoint("http://h:1", "api/generate"), "http://h:1/api/generate");
    }

    #[test]
    fn embedding_provider_reports_namespaced_model_id() {
        let provider = OllamaEmbeddingProvider::new("http://localhost:11434", "all-minilm", 384).unwrap();
        assert_eq!(provider.model_id(), "ollama/all-minilm");
        assert_eq!(provider.dimensions(), 384);
    }

    #[test]
    fn empty_model_is_unconfigured() {
        let err = OllamaBackend::new("http://localhost:11434", " ", GenerationSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, RagError::BackendUnconfigured { .. }));
    }

    #[test]
    fn generate_request_disables_streaming() {
        let body = serde_json::to_value(GenerateRequest {
            model: "llama3.1",
            system: "sys",
            prompt: "user",
            stream: false,
            options: GenerateOptions { temperature: 0.2, num_predict: 512 },
        })
        .unwrap();
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 512);
    }
}
