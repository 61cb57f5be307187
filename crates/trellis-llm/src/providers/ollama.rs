//! Ollama provider: local model serving over the /api/chat endpoint

use crate::error::LlmError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use trellis_core::error::KnowledgeResult;
use trellis_core::traits::{
    CompletionProvider, CompletionRequest, CompletionResponse, TokenUsage,
};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Local provider backed by an Ollama daemon
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Provider pointed at the default local daemon
    pub fn local(timeout_secs: u64) -> Self {
        Self::new(DEFAULT_OLLAMA_URL, timeout_secs)
    }

    /// Whether the daemon is reachable
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl CompletionProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn complete(&self, request: CompletionRequest) -> KnowledgeResult<CompletionResponse> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": request.prompt}));

        let mut api_request = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": request.temperature,
            },
        });
        if let Some(max_tokens) = request.max_tokens {
            api_request["options"]["num_predict"] = serde_json::json!(max_tokens);
        }

        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&api_request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::InvalidResponse(format!(
                "Ollama API error ({}): {}",
                status, error_text
            ))
            .into());
        }

        let body: OllamaResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let prompt_tokens = body.prompt_eval_count.unwrap_or(0);
        let completion_tokens = body.eval_count.unwrap_or(0);

        Ok(CompletionResponse {
            content: body.message.content,
            model: body.model,
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        })
    }
}

// Ollama API response types
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    model: String,
    message: OllamaMessage,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_identity() {
        let provider = OllamaProvider::local(60);
        assert_eq!(provider.name(), "ollama");
        assert!(provider.is_local());
    }
}
