//! Dual-store write coordination.
//!
//! Every node mutation touches two stores: the graph store (source of truth
//! for topology and tags) and the relational metadata index. The graph write
//! happens first; an index failure triggers compensation that restores the
//! graph to its prior state, so a caller-visible error means neither store
//! changed. Compensation failures are logged and left to [`reconcile`] to
//! repair.
//!
//! [`reconcile`]: ConsistencyCoordinator::reconcile

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};
use trellis_core::error::{KnowledgeError, KnowledgeResult};
use trellis_core::types::{Edge, EdgeDraft, Node, NodeDraft, NodeUpdate};
use trellis_graph::GraphStore;
use trellis_sqlite::MetadataIndex;

/// Outcome of a reconciliation pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Graph nodes that were missing from the index and got re-projected
    pub reprojected: Vec<String>,
    /// Index rows with no graph counterpart that were removed
    pub removed: Vec<String>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.reprojected.is_empty() && self.removed.is_empty()
    }
}

/// Coordinates writes across the graph store and the metadata index
#[derive(Clone)]
pub struct ConsistencyCoordinator {
    graph: GraphStore,
    index: MetadataIndex,
}

impl ConsistencyCoordinator {
    pub fn new(graph: GraphStore, index: MetadataIndex) -> Self {
        Self { graph, index }
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    pub fn index(&self) -> &MetadataIndex {
        &self.index
    }

    /// Create a node in both stores.
    ///
    /// Graph first, index second; an index failure detach-deletes the fresh
    /// graph node and surfaces `ConsistencyError`.
    pub async fn create_node(&self, draft: NodeDraft) -> KnowledgeResult<Node> {
        let node = self.graph.create_node(draft).await?;

        if let Err(index_err) = self.index.upsert(&node).await {
            warn!(node_id = %node.id, error = %index_err, "Index projection failed; compensating");
            if let Err(comp_err) = self.graph.delete_node(&node.id).await {
                error!(
                    node_id = %node.id,
                    error = %comp_err,
                    "Compensation failed; stores diverged until next reconcile"
                );
            }
            return Err(KnowledgeError::Consistency(format!(
                "node creation rolled back: {index_err}"
            )));
        }

        debug!(node_id = %node.id, "Created node in both stores");
        Ok(node)
    }

    /// Apply a partial update to both stores, restoring the prior graph
    /// state if the projection fails.
    pub async fn update_node(&self, node_id: &str, update: NodeUpdate) -> KnowledgeResult<Node> {
        let prior = self.graph.get_node(node_id).await?;
        let updated = self.graph.update_node(node_id, update).await?;

        if let Err(index_err) = self.index.upsert(&updated).await {
            warn!(node_id = %node_id, error = %index_err, "Index projection failed; restoring prior state");
            if let Err(comp_err) = self.graph.replace_node(prior).await {
                error!(
                    node_id = %node_id,
                    error = %comp_err,
                    "Compensation failed; stores diverged until next reconcile"
                );
            }
            return Err(KnowledgeError::Consistency(format!(
                "node update rolled back: {index_err}"
            )));
        }

        Ok(updated)
    }

    /// Delete a node from both stores. The graph detach-delete runs first;
    /// an index failure restores the node and its edges.
    pub async fn delete_node(&self, node_id: &str) -> KnowledgeResult<()> {
        let (node, edges) = self.graph.delete_node(node_id).await?;

        if let Err(index_err) = self.index.remove(node_id).await {
            warn!(node_id = %node_id, error = %index_err, "Index delete failed; restoring node");
            if let Err(comp_err) = self.graph.restore_node(node, edges).await {
                error!(
                    node_id = %node_id,
                    error = %comp_err,
                    "Compensation failed; stores diverged until next reconcile"
                );
            }
            return Err(KnowledgeError::Consistency(format!(
                "node deletion rolled back: {index_err}"
            )));
        }

        debug!(node_id = %node_id, "Deleted node from both stores");
        Ok(())
    }

    pub async fn get_node(&self, node_id: &str) -> KnowledgeResult<Node> {
        self.graph.get_node(node_id).await
    }

    /// Edges live only in the graph store, so edge operations need no
    /// cross-store coordination.
    pub async fn create_edge(&self, draft: EdgeDraft) -> KnowledgeResult<Edge> {
        self.graph.create_edge(draft).await
    }

    pub async fn delete_edge(&self, edge_id: &str) -> KnowledgeResult<Edge> {
        self.graph.delete_edge(edge_id).await
    }

    /// Merge enrichment output into a node: additional tags plus metadata
    /// entries, projected to the index with the same compensation shape as
    /// a plain update.
    pub async fn apply_enrichment(
        &self,
        node_id: &str,
        tags: &[String],
        metadata: std::collections::HashMap<String, serde_json::Value>,
    ) -> KnowledgeResult<Node> {
        let prior = self.graph.get_node(node_id).await?;

        if !tags.is_empty() {
            self.graph.merge_tags(node_id, tags).await?;
        }
        let updated = if metadata.is_empty() {
            self.graph.get_node(node_id).await?
        } else {
            self.graph.merge_node_metadata(node_id, metadata).await?
        };

        if let Err(index_err) = self.index.upsert(&updated).await {
            warn!(node_id = %node_id, error = %index_err, "Enrichment projection failed; restoring prior state");
            if let Err(comp_err) = self.graph.replace_node(prior).await {
                error!(
                    node_id = %node_id,
                    error = %comp_err,
                    "Compensation failed; stores diverged until next reconcile"
                );
            }
            return Err(KnowledgeError::Consistency(format!(
                "enrichment rolled back: {index_err}"
            )));
        }

        Ok(updated)
    }

    /// Repair divergence between the stores.
    ///
    /// Nodes present only in the graph are re-projected; index rows with no
    /// graph counterpart are removed. Running against consistent stores is a
    /// no-op, so the pass is idempotent.
    pub async fn reconcile(&self) -> KnowledgeResult<ReconciliationReport> {
        let graph_ids: HashSet<String> = self.graph.all_node_ids().await.into_iter().collect();
        let index_ids: HashSet<String> = self.index.all_ids().await?.into_iter().collect();

        let mut report = ReconciliationReport::default();

        for id in graph_ids.difference(&index_ids) {
            match self.graph.get_node(id).await {
                Ok(node) => {
                    self.index.upsert(&node).await?;
                    report.reprojected.push(id.clone());
                }
                // Deleted between the two snapshots; nothing to project
                Err(KnowledgeError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        for id in index_ids.difference(&graph_ids) {
            self.index.remove(id).await?;
            report.removed.push(id.clone());
        }

        report.reprojected.sort();
        report.removed.sort();
        if !report.is_clean() {
            info!(
                reprojected = report.reprojected.len(),
                removed = report.removed.len(),
                "Reconciled store divergence"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::types::{EdgeType, NodeType};
    use trellis_sqlite::SqlitePool;

    fn coordinator() -> ConsistencyCoordinator {
        let graph = GraphStore::new();
        let index = MetadataIndex::new(SqlitePool::memory().unwrap());
        ConsistencyCoordinator::new(graph, index)
    }

    #[tokio::test]
    async fn create_lands_in_both_stores() {
        let coordinator = coordinator();
        let node = coordinator
            .create_node(
                NodeDraft::new("dual write", NodeType::Note).with_tags(vec!["sync".into()]),
            )
            .await
            .unwrap();

        assert!(coordinator.graph().get_node(&node.id).await.is_ok());
        let row = coordinator.index().get(&node.id).await.unwrap().unwrap();
        assert_eq!(row.title, "dual write");
        assert_eq!(row.tags, vec!["sync".to_string()]);
    }

    #[tokio::test]
    async fn update_projects_new_state() {
        let coordinator = coordinator();
        let node = coordinator
            .create_node(NodeDraft::new("before", NodeType::Note))
            .await
            .unwrap();

        let update = NodeUpdate {
            title: Some("after".into()),
            ..Default::default()
        };
        coordinator.update_node(&node.id, update).await.unwrap();

        assert_eq!(
            coordinator.graph().get_node(&node.id).await.unwrap().title,
            "after"
        );
        assert_eq!(
            coordinator.index().get(&node.id).await.unwrap().unwrap().title,
            "after"
        );
    }

    #[tokio::test]
    async fn delete_removes_from_both_stores() {
        let coordinator = coordinator();
        let a = coordinator
            .create_node(NodeDraft::new("a", NodeType::Note))
            .await
            .unwrap();
        let b = coordinator
            .create_node(NodeDraft::new("b", NodeType::Note))
            .await
            .unwrap();
        coordinator
            .create_edge(EdgeDraft::new(a.id.clone(), b.id.clone(), EdgeType::References))
            .await
            .unwrap();

        coordinator.delete_node(&a.id).await.unwrap();

        assert!(matches!(
            coordinator.graph().get_node(&a.id).await,
            Err(KnowledgeError::NotFound(_))
        ));
        assert!(coordinator.index().get(&a.id).await.unwrap().is_none());
        // Incident edge went with it
        assert!(coordinator
            .graph()
            .incident_edges(&b.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn apply_enrichment_merges_tags_and_metadata() {
        let coordinator = coordinator();
        let node = coordinator
            .create_node(NodeDraft::new("plain", NodeType::Note))
            .await
            .unwrap();

        let mut metadata = std::collections::HashMap::new();
        metadata.insert(
            "entities".to_string(),
            serde_json::json!({"people": ["Ada"]}),
        );
        let updated = coordinator
            .apply_enrichment(&node.id, &["discovered".to_string()], metadata)
            .await
            .unwrap();

        assert_eq!(updated.tags, vec!["discovered".to_string()]);
        assert!(updated.metadata.contains_key("entities"));
        let row = coordinator.index().get(&node.id).await.unwrap().unwrap();
        assert_eq!(row.tags, vec!["discovered".to_string()]);
    }

    #[tokio::test]
    async fn failed_projection_rolls_back_the_graph_write() {
        let graph = GraphStore::new();
        let pool = SqlitePool::memory().unwrap();
        let coordinator = ConsistencyCoordinator::new(graph, MetadataIndex::new(pool.clone()));

        // Break the projection target so the index write must fail
        pool.with_connection(|conn| Ok(conn.execute_batch("DROP TABLE node_metadata")?))
            .unwrap();

        let err = coordinator
            .create_node(NodeDraft::new("doomed", NodeType::Note))
            .await
            .unwrap_err();
        assert!(matches!(err, KnowledgeError::Consistency(_)));

        // Compensation removed the graph copy too
        assert!(coordinator.graph().all_node_ids().await.is_empty());
    }

    #[tokio::test]
    async fn reconcile_is_clean_on_consistent_stores() {
        let coordinator = coordinator();
        coordinator
            .create_node(NodeDraft::new("n", NodeType::Note))
            .await
            .unwrap();
        let report = coordinator.reconcile().await.unwrap();
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn reconcile_reprojects_graph_only_nodes() {
        let coordinator = coordinator();
        // Write directly to the graph, bypassing the coordinator
        let orphan = coordinator
            .graph()
            .create_node(NodeDraft::new("orphan", NodeType::Note))
            .await
            .unwrap();

        let report = coordinator.reconcile().await.unwrap();
        assert_eq!(report.reprojected, vec![orphan.id.clone()]);
        assert!(coordinator.index().get(&orphan.id).await.unwrap().is_some());

        // Second pass has nothing left to repair
        assert!(coordinator.reconcile().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn reconcile_removes_index_only_rows() {
        let coordinator = coordinator();
        let node = coordinator
            .create_node(NodeDraft::new("stale", NodeType::Note))
            .await
            .unwrap();
        // Delete from the graph only, simulating a failed compensation
        coordinator.graph().delete_node(&node.id).await.unwrap();

        let report = coordinator.reconcile().await.unwrap();
        assert_eq!(report.removed, vec![node.id.clone()]);
        assert!(coordinator.index().get(&node.id).await.unwrap().is_none());
    }
}
