//! Hosted model support through the OpenAI API (or any compatible endpoint).
//!
//! Provides [`OpenAIEmbeddingProvider`] (`/embeddings`) and [`OpenAIBackend`]
//! (`/chat/completions`). Both require an API key at construction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::{EmbeddingBackendKind, EmbeddingConfig, LlmBackendKind, LlmConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::llm::{CompletionBackend, GenerationSettings, ModelOutput};
use crate::prompt::Prompt;

const PROVIDER: &str = "OpenAI";

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{path}", base_url.trim_end_matches('/'))
}

async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail =
        serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
    format!("API returned {status}: {detail}")
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// # Configuration
///
/// - `model`: defaults to `text-embedding-3-small`.
/// - `dimensions`: passed to the API when it differs from the model default
///   (Matryoshka truncation).
/// - `api_key`: required.
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    model_id: String,
    dimensions: usize,
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a provider with the given API key and the default model.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::BackendUnconfigured`] if the key is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let (model, dimensions) = EmbeddingConfig::defaults_for(EmbeddingBackendKind::Hosted);
        let config = EmbeddingConfig {
            backend: EmbeddingBackendKind::Hosted,
            model: model.to_string(),
            dimensions,
            base_url: None,
            api_key: Some(api_key.into()),
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
        let (default_model, default_dimensions) =
            EmbeddingConfig::defaults_for(EmbeddingBackendKind::Hosted);
        let request_dimensions = (config.model != default_model
            || config.dimensions != default_dimensions)
            .then_some(config.dimensions);

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config.base_url().to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.model.clone(),
            model_id: format!("openai/{}", config.model),
            dimensions: config.dimensions,
            request_dimensions,
        })
    }

    fn map_err(message: String) -> RagError {
        RagError::EmbeddingError { provider: PROVIDER.into(), message }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
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

        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, "embeddings"))
            .bearer_auth(&self.api_key)
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

        let embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            Self::map_err(format!("failed to parse response: {e}"))
        })?;

        if embedding_response.data.len() != texts.len() {
            return Err(Self::map_err(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embedding_response.data.len()
            )));
        }

        Ok(embedding_response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// A [`CompletionBackend`] backed by an OpenAI-compatible chat completions API.
///
/// The prompt's system section becomes the system message and the user
/// section the user message.
pub struct OpenAIBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    settings: GenerationSettings,
}

impl OpenAIBackend {
    /// Create a backend for `model` using `api_key`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::BackendUnconfigured`] if the key or model is empty.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        settings: GenerationSettings,
    ) -> Result<Self> {
        let config = LlmConfig {
            backend: LlmBackendKind::Hosted,
            model: model.into(),
            api_key: Some(api_key.into()),
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
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.model.clone(),
            settings: GenerationSettings::from(config),
        })
    }

    fn map_err(message: String) -> RagError {
        RagError::ModelError { backend: PROVIDER.into(), message }
    }
}

#[async_trait]
impl CompletionBackend for OpenAIBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        debug!(
            provider = PROVIDER,
            model = %self.model,
            prompt_len = prompt.user.len(),
            "requesting completion"
        );

        let request_body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: &prompt.system },
                ChatMessage { role: "user", content: &prompt.user },
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_output_tokens,
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(&self.api_key)
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
    fn empty_key_is_unconfigured() {
        assert!(matches!(
            OpenAIEmbeddingProvider::new(""),
            Err(RagError::BackendUnconfigured { .. })
        ));
        assert!(matches!(
            OpenAIBackend::new("", "gpt-4o-mini", GenerationSettings::default()),
            Err(RagError::BackendUnconfigured { .. })
        ));
    }

    #[test]
    fn default_model_does_not_request_dimensions() {
        let provider = OpenAIEmbeddingProvider::new("sk-test").unwrap();
        assert_eq!(provider.request_dimensions, None);
        assert_eq!(provider.space().dimensions, 1536);
        assert_eq!(provider.model_id(), "openai/text-embedding-3-small");
    }

    #[test]
    fn truncated_dimensions_are_requested() {
        let config = EmbeddingConfig {
            backend: EmbeddingBackendKind::Hosted,
            model: "text-embedding-3-small".into(),
            dimensions: 256,
            base_url: None,
            api_key: Some("sk-test".into()),
        };
        let provider = OpenAIEmbeddingProvider::from_config(&config).unwrap();
        assert_eq!(provider.request_dimensions, Some(256));
    }

    #[test]
    fn chat_request_carries_both_sections() {
        let body = serde_json::to_value(ChatRequest {
            model: "gpt-4o-mini",
            messages: [
                ChatMessage { role: "system", content: "sys" },
                ChatMessage { role: "user", content: "question" },
            ],
            temperature: 0.2,
            max_tokens: 512,
        })
        .unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "question");
        assert_eq!(body["max_tokens"], 512);
    }
}
