//! Language-model completion abstraction.

use crate::error::KnowledgeResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Pipeline stage issuing a model call; keys the per-purpose routing table
/// and the `purpose` column of cost records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmPurpose {
    Tagging,
    EntityExtraction,
    ConnectionDiscovery,
    Insight,
}

impl LlmPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tagging => "tagging",
            Self::EntityExtraction => "entity_extraction",
            Self::ConnectionDiscovery => "connection_discovery",
            Self::Insight => "insight",
        }
    }
}

/// Token usage reported by a provider
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// A single completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A successful completion
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
}

/// One model provider (local or remote).
///
/// Implementations map transport failures into
/// [`KnowledgeError::Provider`](crate::error::KnowledgeError); the manager
/// above this seam turns those into failure cost records.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name as recorded in cost records, e.g. "ollama"
    fn name(&self) -> &str;

    /// Whether calls stay on the local machine. Privacy routing only ever
    /// selects providers where this is true for sensitive content.
    fn is_local(&self) -> bool;

    async fn complete(&self, request: CompletionRequest) -> KnowledgeResult<CompletionResponse>;
}
