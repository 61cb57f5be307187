//! # Trellis Graph
//!
//! Graph-native storage and read-only graph algorithms:
//! - [`GraphStore`]: nodes, edges, tags, merge-based tag counting, and
//!   detach-delete, safe under concurrent callers
//! - [`TraversalEngine`]: bounded connection expansion, shortest path,
//!   similarity scoring, community detection, visualization subgraphs
//! - [`clustering`]: the default weighted community-detection backend
//!
//! The store keeps everything behind a single `RwLock`, which is what makes
//! the tag merge-increment atomic: create-or-increment and the node link
//! happen under one write guard, so concurrent tagging never loses counts.

pub mod clustering;
pub mod store;
pub mod traversal;

pub use clustering::LabelPropagation;
pub use store::{GraphSnapshot, GraphStatistics, GraphStore};
pub use traversal::{
    Cluster, ConnectedNode, ConnectionHop, NodeSummary, PathResult, SimilarNode, TraversalEngine,
    VisualizationGraph, VisualizationNode, VisualizationQuery,
};
