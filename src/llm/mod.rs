//! Language model collaborators
//!
//! The orchestrator and summarizer only see the [`LanguageModel`] trait; the
//! Gemini client is the production implementation.

use crate::error::ChatError;
use crate::memory::TurnRole;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

pub mod gemini;
pub use gemini::GeminiClient;

/// Why a completion is requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPurpose {
    Reply,
    Summary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptMessage {
    pub role: TurnRole,
    pub text: String,
}

impl PromptMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
        }
    }
}

/// A fully composed prompt: system instruction plus ordered messages
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub purpose: CompletionPurpose,
    pub system: String,
    pub messages: Vec<PromptMessage>,
}

impl CompletionRequest {
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == TurnRole::User)
            .map(|m| m.text.as_str())
    }
}

/// Text completion service
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns generated text, or `ProviderTimeout` / `LlmError`.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Failure a [`MockLanguageModel`] can be scripted to return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Timeout,
    Provider,
}

enum Scripted {
    Reply(String),
    Fail(MockFailure),
}

/// Deterministic model for development & testing.
/// Keeps the relay functional without network access.
pub struct MockLanguageModel {
    default_reply: String,
    summary_text: String,
    scripted: Mutex<VecDeque<Scripted>>,
    fail_summaries: AtomicBool,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLanguageModel {
    pub fn new() -> Self {
        Self {
            default_reply: "Happy to help with that.".to_string(),
            summary_text: "The user and assistant discussed earlier financial questions."
                .to_string(),
            scripted: Mutex::new(VecDeque::new()),
            fail_summaries: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary_text = summary.into();
        self
    }

    /// Queue a reply for the next reply completion
    pub async fn push_reply(&self, reply: impl Into<String>) {
        self.scripted.lock().await.push_back(Scripted::Reply(reply.into()));
    }

    /// Queue a failure for the next reply completion
    pub async fn push_failure(&self, failure: MockFailure) {
        self.scripted.lock().await.push_back(Scripted::Fail(failure));
    }

    pub fn set_fail_summaries(&self, fail: bool) {
        self.fail_summaries.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn summary_call_count(&self) -> usize {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|r| r.purpose == CompletionPurpose::Summary)
            .count()
    }
}

impl Default for MockLanguageModel {
    fn default() -> Self {
        Self::new()
    }
}

fn mock_error(failure: MockFailure) -> ChatError {
    match failure {
        MockFailure::Timeout => ChatError::ProviderTimeout("mock model timed out".to_string()),
        MockFailure::Provider => ChatError::LlmError("mock model failure".to_string()),
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request.clone());

        match request.purpose {
            CompletionPurpose::Summary => {
                if self.fail_summaries.load(Ordering::SeqCst) {
                    Err(mock_error(MockFailure::Provider))
                } else {
                    Ok(self.summary_text.clone())
                }
            }
            CompletionPurpose::Reply => match self.scripted.lock().await.pop_front() {
                Some(Scripted::Reply(text)) => Ok(text),
                Some(Scripted::Fail(failure)) => Err(mock_error(failure)),
                None => Ok(self.default_reply.clone()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(purpose: CompletionPurpose) -> CompletionRequest {
        CompletionRequest {
            purpose,
            system: "You are a financial assistant".to_string(),
            messages: vec![
                PromptMessage::user("Hi"),
                PromptMessage::assistant("Hello!"),
                PromptMessage::user("What is an ETF?"),
            ],
        }
    }

    #[test]
    fn test_last_user_text() {
        assert_eq!(request(CompletionPurpose::Reply).last_user_text(), Some("What is an ETF?"));
    }

    #[tokio::test]
    async fn test_mock_scripted_replies() {
        let model = MockLanguageModel::new().with_reply("default");
        model.push_reply("first").await;
        model.push_failure(MockFailure::Timeout).await;

        let req = request(CompletionPurpose::Reply);
        assert_eq!(model.complete(&req).await.unwrap(), "first");
        assert!(matches!(
            model.complete(&req).await,
            Err(ChatError::ProviderTimeout(_))
        ));
        assert_eq!(model.complete(&req).await.unwrap(), "default");
        assert_eq!(model.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_summary_failures() {
        let model = MockLanguageModel::new().with_summary("short summary");
        let req = request(CompletionPurpose::Summary);

        assert_eq!(model.complete(&req).await.unwrap(), "short summary");
        model.set_fail_summaries(true);
        assert!(model.complete(&req).await.is_err());
        assert_eq!(model.summary_call_count().await, 2);
    }
}
