//! Edge types: typed, weighted relationships between nodes.
//!
//! Edges are stored directed; several traversal queries treat them as
//! undirected. Type semantics carry directionality meaning, not the storage
//! direction.

use crate::error::{KnowledgeError, KnowledgeResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Relationship type between two nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    References,
    SimilarTo,
    DerivedFrom,
    RelatedTo,
    Mentions,
    Contains,
    PartOf,
    AuthoredBy,
    OccurredBefore,
    OccurredAfter,
    Causes,
    CausedBy,
    Contradicts,
    Supports,
    DependsOn,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::References => "references",
            Self::SimilarTo => "similar_to",
            Self::DerivedFrom => "derived_from",
            Self::RelatedTo => "related_to",
            Self::Mentions => "mentions",
            Self::Contains => "contains",
            Self::PartOf => "part_of",
            Self::AuthoredBy => "authored_by",
            Self::OccurredBefore => "occurred_before",
            Self::OccurredAfter => "occurred_after",
            Self::Causes => "causes",
            Self::CausedBy => "caused_by",
            Self::Contradicts => "contradicts",
            Self::Supports => "supports",
            Self::DependsOn => "depends_on",
        }
    }
}

/// A stored edge. `strength` is a [0,1] confidence/importance weight used
/// for filtering and weighted algorithms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub edge_type: EdgeType,
    pub strength: f64,
    /// "user" or the name of the discovering algorithm/provider
    pub discovered_by: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied draft for edge creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDraft {
    pub source_id: String,
    pub target_id: String,
    pub edge_type: EdgeType,
    #[serde(default = "default_strength")]
    pub strength: f64,
    #[serde(default)]
    pub discovered_by: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_strength() -> f64 {
    0.5
}

impl EdgeDraft {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        edge_type: EdgeType,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            edge_type,
            strength: default_strength(),
            discovered_by: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_discovered_by(mut self, discovered_by: impl Into<String>) -> Self {
        self.discovered_by = Some(discovered_by.into());
        self
    }

    /// Validate the create contract: strength in [0, 1], distinct endpoints
    pub fn validate(&self) -> KnowledgeResult<()> {
        if !(0.0..=1.0).contains(&self.strength) || !self.strength.is_finite() {
            return Err(KnowledgeError::Validation(format!(
                "edge strength {} outside [0.0, 1.0]",
                self.strength
            )));
        }
        if self.source_id == self.target_id {
            return Err(KnowledgeError::Validation(
                "edge endpoints must be distinct nodes".into(),
            ));
        }
        Ok(())
    }
}
