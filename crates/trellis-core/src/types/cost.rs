//! Cost records: one append-only entry per model call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Usage and outcome of a single language-model call.
///
/// Failed calls are recorded too, with `success = false` and `cost = 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    pub request_id: String,
    pub provider: String,
    pub model: String,
    /// Pipeline stage that issued the call, e.g. "tagging"
    pub purpose: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost: f64,
    pub latency_ms: u64,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CostRecord {
    /// Record for a failed call: zero cost, zero tokens, error preserved
    pub fn failure(
        provider: impl Into<String>,
        model: impl Into<String>,
        purpose: impl Into<String>,
        latency_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            provider: provider.into(),
            model: model.into(),
            purpose: purpose.into(),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            cost: 0.0,
            latency_ms,
            success: false,
            error: Some(error.into()),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_record_has_zero_cost() {
        let record = CostRecord::failure("ollama", "llama2", "tagging", 120, "timed out");
        assert!(!record.success);
        assert_eq!(record.cost, 0.0);
        assert_eq!(record.total_tokens, 0);
        assert_eq!(record.error.as_deref(), Some("timed out"));
    }
}
