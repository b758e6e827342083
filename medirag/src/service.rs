//! The question-answering entry point.
//!
//! [`AnswerService`] runs one request as a strictly sequential pipeline:
//!
//! ```text
//! Received -> Retrieving -> Composing -> Generating -> Completed
//! ```
//!
//! A missing or unusable index is not fatal: the request continues with no
//! passages and the prompt says so. Every successful answer ends with
//! [`DISCLAIMER`], including answers built from fallback output.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::document::SearchResult;
use crate::error::{RagError, Result};
use crate::llm::CompletionBackend;
use crate::prompt::PromptComposer;
use crate::retriever::Retriever;

/// Appended to every answer.
pub const DISCLAIMER: &str = "\n\nLimitations: this bot provides general information, not a medical \
diagnosis. If you have worrying symptoms, see a doctor or call emergency services.";

/// Stages of a single answer request, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnswerStage {
    /// The question has been accepted.
    Received,
    /// Passages are being retrieved.
    Retrieving,
    /// The prompt is being composed.
    Composing,
    /// The language model is generating.
    Generating,
    /// The answer is ready.
    Completed,
}

impl AnswerStage {
    /// Lower-case stage name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Retrieving => "retrieving",
            Self::Composing => "composing",
            Self::Generating => "generating",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for AnswerStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finished answer and the passages it was grounded on.
#[derive(Debug, Clone)]
pub struct Answer {
    /// Model output followed by [`DISCLAIMER`].
    pub text: String,
    /// Retrieved passages in the order they appeared in the prompt.
    pub passages: Vec<SearchResult>,
}

/// Answers health questions from the indexed knowledge base.
///
/// The service is `Send + Sync` and meant to be shared behind an [`Arc`].
/// Requests are independent; none of them write to the index.
pub struct AnswerService {
    retriever: Retriever,
    composer: PromptComposer,
    backend: Arc<dyn CompletionBackend>,
    generation_timeout: Option<Duration>,
}

impl AnswerService {
    /// Create a service from its collaborators.
    pub fn new(
        retriever: Retriever,
        composer: PromptComposer,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        Self { retriever, composer, backend, generation_timeout: None }
    }

    /// Bound the language model call by `timeout`.
    ///
    /// Retrieval and prompt composition are not covered.
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = Some(timeout);
        self
    }

    /// Answer `question`, returning the text only.
    ///
    /// # Errors
    ///
    /// See [`answer_with_sources`](Self::answer_with_sources).
    pub async fn answer(&self, question: &str) -> Result<String> {
        Ok(self.answer_with_sources(question).await?.text)
    }

    /// Answer `question`, returning the text and the passages used.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyQuestion`] if the question is blank.
    /// - [`RagError::GenerationTimeout`] if the model misses the deadline.
    /// - Embedding and model errors propagate unchanged.
    pub async fn answer_with_sources(&self, question: &str) -> Result<Answer> {
        let mut stage = StageTracker::new();

        if question.trim().is_empty() {
            return Err(RagError::EmptyQuestion);
        }

        stage.advance(AnswerStage::Retrieving);
        let passages = match self.retriever.retrieve(question, self.retriever.top_k()).await {
            Ok(passages) => passages,
            Err(e) if e.is_index_unavailable() => {
                warn!(
                    collection = self.retriever.collection(),
                    error = %e,
                    "answering without context"
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        stage.advance(AnswerStage::Composing);
        let date = chrono::Local::now().format("%Y-%m-%d").to_string();
        let prompt = self.composer.compose(question, &passages, &date);

        stage.advance(AnswerStage::Generating);
        let generation = self.backend.complete(&prompt);
        let reply = match self.generation_timeout {
            Some(limit) => tokio::time::timeout(limit, generation)
                .await
                .map_err(|_| RagError::GenerationTimeout(limit))??,
            None => generation.await?,
        };

        stage.advance(AnswerStage::Completed);
        info!(
            backend = self.backend.name(),
            passages = passages.len(),
            reply_len = reply.len(),
            "answered question"
        );

        Ok(Answer { text: format!("{reply}{DISCLAIMER}"), passages })
    }
}

/// Traces stage transitions and checks they only move forward.
struct StageTracker {
    current: AnswerStage,
}

impl StageTracker {
    fn new() -> Self {
        debug!(stage = %AnswerStage::Received, "answer stage");
        Self { current: AnswerStage::Received }
    }

    fn advance(&mut self, next: AnswerStage) {
        debug_assert!(next > self.current, "stage {next} cannot follow {}", self.current);
        debug!(stage = %next, "answer stage");
        self.current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered() {
        assert!(AnswerStage::Received < AnswerStage::Retrieving);
        assert!(AnswerStage::Generating < AnswerStage::Completed);
        assert_eq!(AnswerStage::Composing.to_string(), "composing");
    }

    #[test]
    fn disclaimer_starts_on_its_own_paragraph() {
        assert!(DISCLAIMER.starts_with("\n\n"));
    }

    #[test]
    #[should_panic]
    #[cfg(debug_assertions)]
    fn stages_cannot_go_backwards() {
        let mut stage = StageTracker::new();
        stage.advance(AnswerStage::Generating);
        stage.advance(AnswerStage::Retrieving);
    }
}
