//! OpenAI provider over the chat completions endpoint

use crate::error::LlmError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use trellis_core::error::KnowledgeResult;
use trellis_core::traits::{
    CompletionProvider, CompletionRequest, CompletionResponse, TokenUsage,
};

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Remote provider backed by the OpenAI API
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, timeout_secs: u64) -> Self {
        Self::with_base_url(DEFAULT_OPENAI_URL, api_key, timeout_secs)
    }

    /// Custom base URL, for OpenAI-compatible endpoints
    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn is_local(&self) -> bool {
        false
    }

    async fn complete(&self, request: CompletionRequest) -> KnowledgeResult<CompletionResponse> {
        if self.api_key.is_empty() {
            return Err(LlmError::Authentication("OpenAI API key not set".into()).into());
        }

        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": request.prompt}));

        let mut api_request = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
        });
        if let Some(max_tokens) = request.max_tokens {
            api_request["max_tokens"] = serde_json::json!(max_tokens);
        }

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&api_request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(LlmError::Authentication("OpenAI rejected the API key".into()).into());
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::InvalidResponse(format!(
                "OpenAI API error ({}): {}",
                status, error_text
            ))
            .into());
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("Response contained no choices".into()))?;
        let usage = body.usage.unwrap_or_default();

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            model: body.model,
            usage: TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            },
        })
    }
}

// OpenAI API response types
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_identity() {
        let provider = OpenAiProvider::new("sk-test", 60);
        assert_eq!(provider.name(), "openai");
        assert!(!provider.is_local());
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_request() {
        let provider = OpenAiProvider::new("", 60);
        let err = provider
            .complete(CompletionRequest::new("hello", "gpt-4"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("API key"));
    }
}
