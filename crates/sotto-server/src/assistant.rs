//! HTTP-backed answering service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sotto_core::{AnswerService, AssistantError};

#[derive(Serialize)]
struct AskRequest<'a> {
    question: &'a str,
}

#[derive(Deserialize)]
struct AskResponse {
    answer: String,
}

/// Answering service that POSTs questions to an HTTP endpoint.
///
/// Wire shape: request body `{"question": "..."}`, response body
/// `{"answer": "..."}`. Transport failures and non-2xx statuses both map to
/// [`AssistantError::Backend`]; the hub drops the question either way.
#[derive(Debug, Clone)]
pub struct HttpAnswerService {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpAnswerService {
    /// Service calling `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), http: reqwest::Client::new() }
    }
}

#[async_trait]
impl AnswerService for HttpAnswerService {
    async fn ask(&self, question: &str) -> Result<String, AssistantError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&AskRequest { question })
            .send()
            .await
            .map_err(|e| AssistantError::Backend(e.to_string()))?
            .error_for_status()
            .map_err(|e| AssistantError::Backend(e.to_string()))?;

        let body: AskResponse =
            response.json().await.map_err(|e| AssistantError::Backend(e.to_string()))?;
        Ok(body.answer)
    }
}
