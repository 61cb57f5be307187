//! Error types for model providers

use thiserror::Error;
use trellis_core::error::KnowledgeError;

/// Provider-level error type
#[derive(Error, Debug)]
pub enum LlmError {
    /// Transport failure reaching the provider
    #[error("HTTP error: {0}")]
    Http(String),

    /// Provider returned a non-success status or unparseable body
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Missing or rejected credentials
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Call exceeded the configured timeout
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// No provider registered under the requested name
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

impl From<LlmError> for KnowledgeError {
    fn from(err: LlmError) -> Self {
        Self::Provider(err.to_string())
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}
