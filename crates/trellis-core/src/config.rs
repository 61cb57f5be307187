//! Application configuration.
//!
//! One explicit struct, passed to components at construction. Privacy
//! routing reads `PrivacyConfig` at call time, never a cached copy.

use crate::traits::LlmPurpose;
use serde::{Deserialize, Serialize};

/// Hard cap on traversal depth; requests beyond it are clamped
pub const MAX_TRAVERSAL_DEPTH: usize = 5;

/// Hard ceiling on visualization subgraph size
pub const MAX_VISUALIZATION_NODES: usize = 500;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrellisConfig {
    pub graph: GraphLimits,
    pub llm: LlmConfig,
    pub privacy: PrivacyConfig,
    pub enrichment: EnrichmentConfig,
    pub tasks: TaskConfig,
}

/// Traversal and visualization bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphLimits {
    /// Default BFS depth for connection queries (1..=MAX_TRAVERSAL_DEPTH)
    pub max_depth: usize,
    /// Edges below this strength are excluded from visualization output
    pub min_connection_strength: f64,
    /// Default visualization node budget (<= MAX_VISUALIZATION_NODES)
    pub max_nodes: usize,
}

impl Default for GraphLimits {
    fn default() -> Self {
        Self {
            max_depth: 2,
            min_connection_strength: 0.3,
            max_nodes: 100,
        }
    }
}

impl GraphLimits {
    /// Clamp a requested depth into the supported range
    pub fn clamp_depth(&self, requested: usize) -> usize {
        requested.clamp(1, MAX_TRAVERSAL_DEPTH)
    }

    /// Clamp a requested node budget into the supported range
    pub fn clamp_max_nodes(&self, requested: usize) -> usize {
        requested.clamp(1, MAX_VISUALIZATION_NODES)
    }
}

/// Provider/model pair used for one pipeline stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRoute {
    pub provider: String,
    pub model: String,
}

impl StageRoute {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

/// Model-provider configuration with a per-purpose routing table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Route used when a purpose has no dedicated entry
    pub default_route: StageRoute,
    /// Per-stage overrides, resolved once at pipeline start
    pub tagging: Option<StageRoute>,
    pub entity_extraction: Option<StageRoute>,
    pub connection_discovery: Option<StageRoute>,
    pub insight: Option<StageRoute>,
    /// Route forced by privacy routing; must name a local provider
    pub local_route: StageRoute,
    /// Per-call timeout
    pub timeout_secs: u64,
    /// Bounded retry count per call; never retried indefinitely
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_route: StageRoute::new("ollama", "llama2"),
            tagging: None,
            entity_extraction: None,
            connection_discovery: None,
            insight: None,
            local_route: StageRoute::new("ollama", "llama2"),
            timeout_secs: 60,
            max_retries: 2,
        }
    }
}

impl LlmConfig {
    /// Resolve the configured route for a pipeline stage
    pub fn route_for(&self, purpose: LlmPurpose) -> &StageRoute {
        let override_route = match purpose {
            LlmPurpose::Tagging => &self.tagging,
            LlmPurpose::EntityExtraction => &self.entity_extraction,
            LlmPurpose::ConnectionDiscovery => &self.connection_discovery,
            LlmPurpose::Insight => &self.insight,
        };
        override_route.as_ref().unwrap_or(&self.default_route)
    }
}

/// Privacy routing rules, read at call time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    /// Tags that force local-only analysis
    pub sensitive_tags: Vec<String>,
    /// Route sensitive content to the local provider
    pub use_local_for_sensitive: bool,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            sensitive_tags: vec![
                "personal".into(),
                "anxiety".into(),
                "therapy".into(),
                "confidential".into(),
                "private".into(),
            ],
            use_local_for_sensitive: true,
        }
    }
}

impl PrivacyConfig {
    /// Absolute rule: any intersection between the node's tags and the
    /// sensitive set forces the local provider.
    pub fn requires_local(&self, tags: &[String]) -> bool {
        if !self.use_local_for_sensitive {
            return false;
        }
        tags.iter().any(|tag| {
            self.sensitive_tags
                .iter()
                .any(|sensitive| sensitive.eq_ignore_ascii_case(tag))
        })
    }
}

/// Enrichment pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Content characters sent for tag generation
    pub tag_snippet_chars: usize,
    /// Content characters sent for entity extraction
    pub entity_snippet_chars: usize,
    /// Upper bound on edges proposed per discovery run
    pub max_proposed_connections: usize,
    /// Minimum similarity score for a proposed edge
    pub min_similarity_score: i64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            tag_snippet_chars: 1000,
            entity_snippet_chars: 2000,
            max_proposed_connections: 5,
            min_similarity_score: 2,
        }
    }
}

/// Background task execution budget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Per-attempt timeout
    pub timeout_secs: u64,
    /// Retry budget per task; a task exceeding it is marked failed
    pub max_retries: u32,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            max_retries: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_is_clamped_to_hard_cap() {
        let limits = GraphLimits::default();
        assert_eq!(limits.clamp_depth(0), 1);
        assert_eq!(limits.clamp_depth(3), 3);
        assert_eq!(limits.clamp_depth(12), MAX_TRAVERSAL_DEPTH);
    }

    #[test]
    fn node_budget_is_clamped_to_hard_ceiling() {
        let limits = GraphLimits::default();
        assert_eq!(limits.clamp_max_nodes(1000), MAX_VISUALIZATION_NODES);
        assert_eq!(limits.clamp_max_nodes(50), 50);
    }

    #[test]
    fn route_override_takes_precedence() {
        let mut llm = LlmConfig::default();
        llm.tagging = Some(StageRoute::new("anthropic", "claude-3-haiku-20240307"));

        assert_eq!(llm.route_for(LlmPurpose::Tagging).provider, "anthropic");
        assert_eq!(
            llm.route_for(LlmPurpose::EntityExtraction),
            &llm.default_route
        );
    }

    #[test]
    fn sensitive_tag_intersection_forces_local() {
        let privacy = PrivacyConfig::default();
        assert!(privacy.requires_local(&["therapy".into(), "rust".into()]));
        assert!(privacy.requires_local(&["Therapy".into()]));
        assert!(!privacy.requires_local(&["rust".into()]));
        assert!(!privacy.requires_local(&[]));
    }

    #[test]
    fn disabled_routing_never_forces_local() {
        let privacy = PrivacyConfig {
            use_local_for_sensitive: false,
            ..Default::default()
        };
        assert!(!privacy.requires_local(&["therapy".into()]));
    }

    #[test]
    fn config_deserializes_from_empty_object() {
        let config: TrellisConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.graph.max_depth, 2);
        assert_eq!(config.llm.timeout_secs, 60);
        assert!(config.privacy.use_local_for_sensitive);
    }
}
