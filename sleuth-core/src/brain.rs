//! The language model collaborator contract.
//!
//! A provider takes one prompt and returns free text. Providers are stateless
//! request/response adapters, so a single shared instance serves every session.

use crate::error::LlmError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Trait for language model providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a single prompt and return the model's text reply.
    async fn run(&self, prompt: &str) -> Result<String, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// A scripted provider for tests and offline demos.
///
/// Replies are served in the order they were queued. Once the queue is empty
/// the fallback reply is returned. A failure can be injected for a specific
/// call number (1-based).
pub struct MockLlmProvider {
    model: String,
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: String,
    fail_on_call: Option<(usize, LlmError)>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            replies: Mutex::new(VecDeque::new()),
            fallback: "mock response".to_string(),
            fail_on_call: None,
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider that always answers with `text`.
    pub fn with_response(text: &str) -> Self {
        Self {
            fallback: text.to_string(),
            ..Self::new()
        }
    }

    /// Fail the `call`-th invocation (1-based) with `error`.
    pub fn failing_on_call(mut self, call: usize, error: LlmError) -> Self {
        self.fail_on_call = Some((call, error));
        self
    }

    /// Sleep before answering every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a reply for the next unanswered call.
    pub fn queue_response(&self, text: &str) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Ok(text.to_string()));
        }
    }

    /// Queue an error for the next unanswered call.
    pub fn queue_error(&self, error: LlmError) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Err(error));
        }
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn run(&self, prompt: &str) -> Result<String, LlmError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some((fail_at, err)) = &self.fail_on_call
            && *fail_at == call
        {
            return Err(err.clone());
        }

        let queued = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        queued.unwrap_or_else(|| Ok(self.fallback.clone()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
