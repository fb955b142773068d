//! Scripted LLM provider.
//!
//! Returns queued responses in order and records every request it receives.
//! Structured and free-text requests draw from separate queues so a chain
//! that constructs a filter and then synthesizes an answer can be scripted
//! in one go.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use docquery_core::{AppError, AppResult};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One scripted outcome.
#[derive(Debug, Clone)]
enum Scripted {
    Text(String),
    Failure(String),
}

/// Mock LLM client for tests and offline runs.
#[derive(Debug, Default)]
pub struct MockLlmClient {
    free_text: Mutex<VecDeque<Scripted>>,
    structured: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<LlmRequest>>,
    fallback: Option<String>,
}

impl MockLlmClient {
    /// Create a mock with empty queues. Unscripted calls fail.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that answers every unscripted call with `text`.
    pub fn with_fallback(text: impl Into<String>) -> Self {
        Self {
            fallback: Some(text.into()),
            ..Self::default()
        }
    }

    /// Queue a free-text completion.
    pub fn push_text(&self, text: impl Into<String>) -> &Self {
        lock(&self.free_text).push_back(Scripted::Text(text.into()));
        self
    }

    /// Queue a structured (JSON-mode) completion.
    pub fn push_structured(&self, text: impl Into<String>) -> &Self {
        lock(&self.structured).push_back(Scripted::Text(text.into()));
        self
    }

    /// Queue a transport failure for the next free-text call.
    pub fn push_failure(&self, message: impl Into<String>) -> &Self {
        lock(&self.free_text).push_back(Scripted::Failure(message.into()));
        self
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        lock(&self.requests).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // A poisoned mock only means another test thread panicked mid-call.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait::async_trait]
impl LlmClient for MockLlmClient {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        lock(&self.requests).push(request.clone());

        let queue = if request.is_structured() {
            &self.structured
        } else {
            &self.free_text
        };
        let next = lock(queue).pop_front();

        let content = match next {
            Some(Scripted::Text(text)) => text,
            Some(Scripted::Failure(message)) => return Err(AppError::Llm(message)),
            None => self.fallback.clone().ok_or_else(|| {
                AppError::Llm("Mock LLM has no scripted response".to_string())
            })?,
        };

        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::default(),
            done: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queues_are_separate() {
        let mock = MockLlmClient::new();
        mock.push_text("an answer");
        mock.push_structured(r#"{"query": "q", "filter": "NO_FILTER"}"#);

        let structured = mock
            .complete(&LlmRequest::new("p", "m").with_json_output())
            .await
            .unwrap();
        assert!(structured.content.contains("NO_FILTER"));

        let text = mock.complete(&LlmRequest::new("p", "m")).await.unwrap();
        assert_eq!(text.content, "an answer");

        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_unscripted_call_fails() {
        let mock = MockLlmClient::new();
        let result = mock.complete(&LlmRequest::new("p", "m")).await;
        assert!(matches!(result, Err(AppError::Llm(_))));
    }

    #[tokio::test]
    async fn test_fallback_and_failure() {
        let mock = MockLlmClient::with_fallback("default");
        mock.push_failure("connection refused");

        assert!(mock.complete(&LlmRequest::new("p", "m")).await.is_err());
        let response = mock.complete(&LlmRequest::new("p", "m")).await.unwrap();
        assert_eq!(response.content, "default");
    }
}
