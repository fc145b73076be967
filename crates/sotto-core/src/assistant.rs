//! Answering-service collaborator and the question classifier.

use async_trait::async_trait;
use thiserror::Error;

/// Literal marker that routes a message to the assistant pipeline.
pub const DEFAULT_TRIGGER_TOKEN: &str = "@assistant";

/// Prefix the hub puts on answers it relays back to the asker.
pub const ANSWER_PREFIX: &str = "assistant: ";

/// Errors from the answering service.
///
/// A failed question is dropped and logged; the asker gets no reply and
/// nothing is retried.
#[derive(Debug, Error)]
pub enum AssistantError {
    /// The service was reached but failed.
    #[error("answering service: {0}")]
    Backend(String),

    /// No answering service is configured.
    #[error("no answering service configured")]
    Unavailable,
}

/// External answering service: question text in, answer text out.
///
/// The hub awaits each answer to completion before taking the next
/// question, so implementations need no internal queueing.
#[async_trait]
pub trait AnswerService: Send + Sync {
    /// Answer one question.
    async fn ask(&self, question: &str) -> Result<String, AssistantError>;
}

/// Always-failing service for deployments without an assistant.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAnswerService;

#[async_trait]
impl AnswerService for NoAnswerService {
    async fn ask(&self, _question: &str) -> Result<String, AssistantError> {
        Err(AssistantError::Unavailable)
    }
}

/// Decide whether a decrypted message is a question for the assistant.
///
/// Contract: input is the full display text of one message, output is
/// whether it must be routed to the assistant queue instead of broadcast.
/// The check is a literal, case-sensitive substring match on `trigger`,
/// anywhere in the text. Dispatch logic depends only on this boolean, so
/// the classifier can be swapped without touching the workers.
pub fn is_assistant_question(text: &str, trigger: &str) -> bool {
    text.contains(trigger)
}
