//! Shared error taxonomy for the knowledge graph.
//!
//! Two propagation classes:
//! - data-integrity errors (`NotFound`, `Validation`) surface to the caller
//! - infrastructure errors (`Consistency`, `Provider`, `Algorithm`) are
//!   absorbed at component boundaries: compensated, retried, or degraded to
//!   an empty result. They must never abort an enrichment run or a
//!   traversal query.

use thiserror::Error;

/// Top-level error type crossing crate boundaries
#[derive(Error, Debug)]
pub enum KnowledgeError {
    /// Referenced node/edge/tag does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input: out-of-range strength, missing required field
    #[error("Validation error: {0}")]
    Validation(String),

    /// Dual-write partial failure; compensation was attempted
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// Model-call failure, captured per pipeline stage
    #[error("Provider error: {0}")]
    Provider(String),

    /// Failure in the graph-analytics capability
    #[error("Algorithm error: {0}")]
    Algorithm(String),

    /// Backend storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result alias used across the workspace
pub type KnowledgeResult<T> = Result<T, KnowledgeError>;

impl KnowledgeError {
    /// Whether the error should be returned to the immediate caller rather
    /// than absorbed at the component boundary.
    pub fn is_caller_facing(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Validation(_))
    }
}

impl From<serde_json::Error> for KnowledgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
