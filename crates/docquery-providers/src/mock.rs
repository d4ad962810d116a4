//! Mock provider for testing analysis flows.
//!
//! Replays scripted outcomes (answers, rate limits, failures) in order, then
//! falls back to pattern-matched or default answers, recording every prompt
//! it receives so tests can count round trips.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docquery_core::{
    Completion, CompletionProvider, CompletionRequest, Error, IgnoreLock as _, Result, TokenUsage,
};
use tokio::time::sleep;

/// One scripted reaction of the mock provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    /// Answer with the given text.
    Answer(String),
    /// Fail with [`Error::RateLimited`].
    RateLimited,
    /// Fail with a terminal [`Error::Provider`].
    Fail(String),
}

/// Mock provider that returns pre-defined outcomes.
#[derive(Clone, Default)]
pub struct MockProvider {
    /// Outcomes consumed front to back before pattern matching applies
    script: Arc<Mutex<VecDeque<MockOutcome>>>,
    /// Predefined answers keyed by a prompt substring
    responses: Arc<Mutex<HashMap<String, String>>>,
    /// Default answer if nothing matches
    default_response: Arc<Mutex<Option<String>>>,
    /// Prompts received, in order
    call_history: Arc<Mutex<Vec<String>>>,
    /// Artificial latency applied to every call
    latency: Option<Duration>,
}

impl MockProvider {
    /// Create a new mock provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome for the next unscripted call.
    #[must_use]
    pub fn then(self, outcome: MockOutcome) -> Self {
        self.script.lock_ignore_poison().push_back(outcome);
        self
    }

    /// Queue `count` rate-limit failures.
    #[must_use]
    pub fn then_rate_limited(self, count: usize) -> Self {
        {
            let mut script = self.script.lock_ignore_poison();
            script.extend((0..count).map(|_| MockOutcome::RateLimited));
        }
        self
    }

    /// Answer with `response` whenever the prompt contains `pattern`.
    #[must_use]
    pub fn with_response(self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses
            .lock_ignore_poison()
            .insert(pattern.into(), response.into());
        self
    }

    /// Set a default answer for prompts that match nothing.
    #[must_use]
    pub fn with_default_response(self, response: impl Into<String>) -> Self {
        *self.default_response.lock_ignore_poison() = Some(response.into());
        self
    }

    /// Delay every call by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Get the prompts received so far.
    #[must_use]
    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock_ignore_poison().clone()
    }

    /// Get the number of calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_history.lock_ignore_poison().len()
    }

    /// Clear the call history.
    pub fn clear_history(&self) {
        self.call_history.lock_ignore_poison().clear();
    }

    fn next_outcome(&self, prompt: &str) -> MockOutcome {
        if let Some(outcome) = self.script.lock_ignore_poison().pop_front() {
            return outcome;
        }

        let matched = self
            .responses
            .lock_ignore_poison()
            .iter()
            .find(|(pattern, _)| prompt.contains(pattern.as_str()))
            .map(|(_, response)| response.clone());

        let text = matched.unwrap_or_else(|| {
            self.default_response
                .lock_ignore_poison()
                .clone()
                .unwrap_or_else(|| format!("Mock response for prompt of {} chars", prompt.len()))
        });
        MockOutcome::Answer(text)
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        self.call_history
            .lock_ignore_poison()
            .push(request.prompt.clone());

        if let Some(latency) = self.latency {
            sleep(latency).await;
        }

        match self.next_outcome(&request.prompt) {
            MockOutcome::Answer(text) => Ok(Completion {
                tokens_used: TokenUsage {
                    input: request.prompt.len() as u64,
                    output: text.len() as u64,
                },
                text,
                provider: self.name().to_owned(),
                latency_ms: 0,
            }),
            MockOutcome::RateLimited => Err(Error::RateLimited("mock rate limit".to_owned())),
            MockOutcome::Fail(message) => Err(Error::Provider(message)),
        }
    }
}
