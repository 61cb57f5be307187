//! Graph-analytics capability: weighted community detection behind a narrow
//! project/run/release interface so the algorithm can be swapped.

use crate::error::KnowledgeResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque handle to a projected graph held by the analytics backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectionHandle(pub u64);

/// An edge in the projected graph; `weight` is the stored edge strength
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedEdge {
    pub source: String,
    pub target: String,
    pub weight: f64,
}

/// A detected community: a set of node ids
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    pub members: Vec<String>,
}

impl Community {
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// Weighted community detection over a projected snapshot of the graph.
///
/// Failures surface as `KnowledgeError::Algorithm` and are degraded to an
/// empty result by the traversal layer; clustering is best-effort.
#[async_trait]
pub trait GraphAnalytics: Send + Sync {
    /// Project a node/edge snapshot, treating edges as undirected
    async fn project(
        &self,
        nodes: Vec<String>,
        edges: Vec<WeightedEdge>,
    ) -> KnowledgeResult<ProjectionHandle>;

    /// Partition the projected graph into communities
    async fn run_community_detection(
        &self,
        handle: ProjectionHandle,
    ) -> KnowledgeResult<Vec<Community>>;

    /// Drop the projection
    async fn release(&self, handle: ProjectionHandle) -> KnowledgeResult<()>;
}
