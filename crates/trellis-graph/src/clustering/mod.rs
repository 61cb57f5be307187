//! Weighted community detection via label propagation.
//!
//! The default [`GraphAnalytics`] backend. Each node starts in its own
//! community and repeatedly adopts the label with the greatest incident
//! edge weight, ties resolved toward the smaller label, so runs are
//! deterministic for a given projection.

use parking_lot::Mutex;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use trellis_core::error::{KnowledgeError, KnowledgeResult};
use trellis_core::traits::{Community, GraphAnalytics, ProjectionHandle, WeightedEdge};

/// Passes before giving up on convergence
const MAX_PASSES: usize = 50;

struct Projection {
    graph: UnGraph<String, f64>,
}

/// In-process analytics backend over [`petgraph`]
#[derive(Default)]
pub struct LabelPropagation {
    projections: Mutex<HashMap<u64, Projection>>,
    next_handle: AtomicU64,
}

impl LabelPropagation {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl GraphAnalytics for LabelPropagation {
    async fn project(
        &self,
        nodes: Vec<String>,
        edges: Vec<WeightedEdge>,
    ) -> KnowledgeResult<ProjectionHandle> {
        let mut graph = UnGraph::<String, f64>::with_capacity(nodes.len(), edges.len());
        let mut indices: HashMap<String, NodeIndex> = HashMap::with_capacity(nodes.len());
        for id in nodes {
            let idx = graph.add_node(id.clone());
            indices.insert(id, idx);
        }
        for edge in edges {
            let (Some(&a), Some(&b)) = (indices.get(&edge.source), indices.get(&edge.target))
            else {
                return Err(KnowledgeError::Algorithm(format!(
                    "edge references unprojected node: {} -> {}",
                    edge.source, edge.target
                )));
            };
            graph.add_edge(a, b, edge.weight);
        }

        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.projections
            .lock()
            .insert(handle, Projection { graph });
        debug!(handle, "Projected graph for community detection");
        Ok(ProjectionHandle(handle))
    }

    async fn run_community_detection(
        &self,
        handle: ProjectionHandle,
    ) -> KnowledgeResult<Vec<Community>> {
        let projections = self.projections.lock();
        let projection = projections.get(&handle.0).ok_or_else(|| {
            KnowledgeError::Algorithm(format!("unknown projection handle {}", handle.0))
        })?;
        let graph = &projection.graph;

        let mut labels: Vec<usize> = (0..graph.node_count()).collect();
        for _ in 0..MAX_PASSES {
            let mut changed = false;
            for idx in graph.node_indices() {
                // Weight mass per neighboring label; BTreeMap keeps the
                // smallest-label tie-break deterministic
                let mut mass: BTreeMap<usize, f64> = BTreeMap::new();
                for edge in graph.edges(idx) {
                    let neighbor = if edge.source() == idx {
                        edge.target()
                    } else {
                        edge.source()
                    };
                    *mass.entry(labels[neighbor.index()]).or_insert(0.0) += *edge.weight();
                }
                let Some(best) = mass
                    .iter()
                    .fold(None::<(usize, f64)>, |acc, (&label, &w)| match acc {
                        Some((_, best_w)) if w <= best_w => acc,
                        _ => Some((label, w)),
                    })
                else {
                    continue;
                };
                if best.0 != labels[idx.index()] {
                    labels[idx.index()] = best.0;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let mut grouped: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for idx in graph.node_indices() {
            grouped
                .entry(labels[idx.index()])
                .or_default()
                .push(graph[idx].clone());
        }
        let mut communities: Vec<Community> = grouped
            .into_values()
            .map(|mut members| {
                members.sort();
                Community { members }
            })
            .collect();
        communities.sort_by(|a, b| {
            b.size()
                .cmp(&a.size())
                .then_with(|| a.members[0].cmp(&b.members[0]))
        });
        Ok(communities)
    }

    async fn release(&self, handle: ProjectionHandle) -> KnowledgeResult<()> {
        self.projections.lock().remove(&handle.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weighted(source: &str, target: &str, weight: f64) -> WeightedEdge {
        WeightedEdge {
            source: source.to_string(),
            target: target.to_string(),
            weight,
        }
    }

    #[tokio::test]
    async fn two_cliques_become_two_communities() {
        let backend = LabelPropagation::new();
        let nodes: Vec<String> = ["a", "b", "c", "x", "y", "z"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let edges = vec![
            weighted("a", "b", 1.0),
            weighted("b", "c", 1.0),
            weighted("a", "c", 1.0),
            weighted("x", "y", 1.0),
            weighted("y", "z", 1.0),
            weighted("x", "z", 1.0),
            // Weak bridge between the cliques
            weighted("c", "x", 0.05),
        ];

        let handle = backend.project(nodes, edges).await.unwrap();
        let communities = backend.run_community_detection(handle).await.unwrap();
        backend.release(handle).await.unwrap();

        assert_eq!(communities.len(), 2);
        assert_eq!(communities[0].size(), 3);
        assert_eq!(communities[1].size(), 3);
    }

    #[tokio::test]
    async fn isolated_nodes_are_singletons() {
        let backend = LabelPropagation::new();
        let handle = backend
            .project(vec!["a".into(), "b".into()], vec![])
            .await
            .unwrap();
        let communities = backend.run_community_detection(handle).await.unwrap();
        assert_eq!(communities.len(), 2);
        assert!(communities.iter().all(|c| c.size() == 1));
    }

    #[tokio::test]
    async fn unknown_handle_is_an_algorithm_error() {
        let backend = LabelPropagation::new();
        let err = backend
            .run_community_detection(ProjectionHandle(99))
            .await
            .unwrap_err();
        assert!(matches!(err, KnowledgeError::Algorithm(_)));
    }

    #[tokio::test]
    async fn edge_to_unprojected_node_is_rejected() {
        let backend = LabelPropagation::new();
        let err = backend
            .project(vec!["a".into()], vec![weighted("a", "ghost", 1.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, KnowledgeError::Algorithm(_)));
    }

    #[tokio::test]
    async fn release_drops_the_projection() {
        let backend = LabelPropagation::new();
        let handle = backend.project(vec!["a".into()], vec![]).await.unwrap();
        backend.release(handle).await.unwrap();
        assert!(backend.run_community_detection(handle).await.is_err());
    }
}
