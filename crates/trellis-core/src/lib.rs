//! # Trellis Core
//!
//! Domain types, error taxonomy, configuration, and trait seams for the
//! Trellis personal knowledge graph.
//!
//! This crate defines the abstractions; backend crates implement them:
//! - `trellis-graph` implements the graph-native store and analytics
//! - `trellis-sqlite` implements the relational projection and cost sink
//! - `trellis-llm` implements the completion providers
//!
//! Keeping the seams here breaks dependency cycles between the storage and
//! enrichment layers: higher-level crates inject the implementations.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{
    EnrichmentConfig, GraphLimits, LlmConfig, PrivacyConfig, StageRoute, TaskConfig,
    TrellisConfig,
};
pub use error::{KnowledgeError, KnowledgeResult};
pub use traits::cost::NullCostSink;
pub use traits::{
    Community, CompletionProvider, CompletionRequest, CompletionResponse, CostSink,
    GraphAnalytics, LlmPurpose, ProjectionHandle, TaskHandle, TaskQueue, TaskStatus, TokenUsage,
    WeightedEdge,
};
pub use types::{
    CostRecord, Edge, EdgeDraft, EdgeType, Insight, InsightType, Node, NodeDraft, NodeType,
    NodeUpdate, PrivacyLevel, Tag,
};
