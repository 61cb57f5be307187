//! Scriptable provider for tests: canned responses, failure injection, and
//! a call log for asserting on routing decisions.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use trellis_core::error::{KnowledgeError, KnowledgeResult};
use trellis_core::traits::{
    CompletionProvider, CompletionRequest, CompletionResponse, TokenUsage,
};

/// Test provider with a FIFO script of responses.
///
/// An empty script repeats `default_response` forever; `fail_next(n)` makes
/// the next `n` calls return provider errors.
pub struct MockProvider {
    name: String,
    local: bool,
    default_response: String,
    script: Mutex<VecDeque<String>>,
    failures_remaining: Mutex<u32>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    pub fn new(name: impl Into<String>, local: bool) -> Self {
        Self {
            name: name.into(),
            local,
            default_response: "ok".to_string(),
            script: Mutex::new(VecDeque::new()),
            failures_remaining: Mutex::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = response.into();
        self
    }

    /// Queue a one-shot response, consumed before `default_response`
    pub fn push_response(&self, response: impl Into<String>) {
        self.script.lock().push_back(response.into());
    }

    /// Make the next `n` calls fail
    pub fn fail_next(&self, n: u32) {
        *self.failures_remaining.lock() = n;
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Prompts received so far, in order
    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|r| r.prompt.clone()).collect()
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_local(&self) -> bool {
        self.local
    }

    async fn complete(&self, request: CompletionRequest) -> KnowledgeResult<CompletionResponse> {
        self.calls.lock().push(request.clone());

        {
            let mut failures = self.failures_remaining.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(KnowledgeError::Provider(format!(
                    "{} mock failure",
                    self.name
                )));
            }
        }

        let content = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_response.clone());
        let prompt_tokens = (request.prompt.len() / 4) as u64;
        let completion_tokens = (content.len() / 4) as u64;

        Ok(CompletionResponse {
            content,
            model: request.model,
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        })
    }
}
