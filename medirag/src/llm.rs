//! Language model backends.
//!
//! [`CompletionBackend`] is the capability interface the answer service talks
//! to. The set of variants is closed and picked by configuration:
//!
//! - [`OllamaBackend`](crate::ollama::OllamaBackend) for `local`
//! - [`OpenAIBackend`](crate::openai::OpenAIBackend) for `hosted`
//!
//! Whatever a backend receives over the wire goes through [`ModelOutput`],
//! which classifies the payload and always yields text.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::config::{LlmBackendKind, LlmConfig};
use crate::error::Result;
use crate::ollama::OllamaBackend;
use crate::openai::OpenAIBackend;
use crate::prompt::Prompt;

/// Returned in place of model output that carries no recognizable text.
pub const UNPARSEABLE_OUTPUT_FALLBACK: &str =
    "The model's output could not be read (the result was not in a supported text format).";

/// JSON locations that carry generated text, in lookup order.
const TEXT_POINTERS: [&str; 6] = [
    "/response",
    "/message/content",
    "/choices/0/message/content",
    "/choices/0/text",
    "/content",
    "/text",
];

/// Sampling settings shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum number of tokens to generate.
    pub max_output_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self { temperature: 0.2, max_output_tokens: 512 }
    }
}

impl From<&LlmConfig> for GenerationSettings {
    fn from(config: &LlmConfig) -> Self {
        Self { temperature: config.temperature, max_output_tokens: config.max_output_tokens }
    }
}

/// A language model that turns a composed prompt into answer text.
///
/// Implementations must be constructed from validated settings; a backend
/// that exists is ready to serve requests.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// A short name for logs and errors.
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`.
    ///
    /// Output the backend cannot interpret is replaced by
    /// [`UNPARSEABLE_OUTPUT_FALLBACK`] rather than reported as an error.
    /// Transport failures and error statuses are returned as
    /// [`RagError::ModelError`](crate::RagError::ModelError).
    async fn complete(&self, prompt: &Prompt) -> Result<String>;
}

/// The shape of a raw model result.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    /// A bare string.
    Text(String),
    /// A structured response with text in a known field.
    Structured {
        /// The extracted text.
        text: String,
    },
    /// Anything else.
    Unrecognized(Value),
}

impl ModelOutput {
    /// Classify a raw response body.
    ///
    /// Bodies that are not JSON are plain text.
    pub fn parse(body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => Self::from_value(value),
            Err(_) => Self::Text(body.to_string()),
        }
    }

    /// Classify a JSON value.
    pub fn from_value(value: Value) -> Self {
        if let Value::String(text) = value {
            return Self::Text(text);
        }
        let text = TEXT_POINTERS
            .iter()
            .find_map(|pointer| value.pointer(pointer).and_then(Value::as_str))
            .map(str::to_string);
        match text {
            Some(text) => Self::Structured { text },
            None => Self::Unrecognized(value),
        }
    }

    /// Extract the text, substituting [`UNPARSEABLE_OUTPUT_FALLBACK`] when
    /// there is none.
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) | Self::Structured { text } => text,
            Self::Unrecognized(value) => {
                warn!(kind = json_kind(&value), "model output has no recognizable text");
                UNPARSEABLE_OUTPUT_FALLBACK.to_string()
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Build the completion backend selected by `config`.
///
/// # Errors
///
/// Returns [`RagError::BackendUnconfigured`](crate::RagError::BackendUnconfigured)
/// if the selected backend is missing credentials or connection settings.
pub fn from_config(config: &LlmConfig) -> Result<Arc<dyn CompletionBackend>> {
    let backend: Arc<dyn CompletionBackend> = match config.backend {
        LlmBackendKind::Local => Arc::new(OllamaBackend::from_config(config)?),
        LlmBackendKind::Hosted => Arc::new(OpenAIBackend::from_config(config)?),
    };
    Ok(backend)
}
