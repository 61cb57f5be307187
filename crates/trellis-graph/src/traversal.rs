//! Read-only graph algorithms: bounded connection expansion, shortest path,
//! tag/edge similarity, community detection, and visualization subgraphs.
//!
//! Every operation reads a consistent view of the store; nothing here
//! mutates the graph.

use crate::store::GraphStore;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};
use trellis_core::config::GraphLimits;
use trellis_core::error::{KnowledgeError, KnowledgeResult};
use trellis_core::traits::GraphAnalytics;
use trellis_core::types::{Edge, EdgeType, Node, NodeType};

/// Compact node projection returned by traversal operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSummary {
    pub id: String,
    pub title: String,
    pub node_type: NodeType,
    pub tags: Vec<String>,
}

impl NodeSummary {
    fn from_node(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            title: node.title.clone(),
            node_type: node.node_type,
            tags: node.tags.clone(),
        }
    }
}

/// One traversed edge in a relationship chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionHop {
    pub edge_type: EdgeType,
    pub strength: f64,
}

/// A node reached by connection expansion, with the chain that reached it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedNode {
    pub node: NodeSummary,
    /// Hops from the start node (1 = direct neighbor)
    pub depth: usize,
    /// Edges walked from the start node to this one, in order
    pub relationship_chain: Vec<ConnectionHop>,
}

/// A shortest path between two nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathResult {
    /// Nodes along the path, endpoints included
    pub nodes: Vec<NodeSummary>,
    /// Edges walked, in order; one fewer than `nodes`
    pub hops: Vec<ConnectionHop>,
    /// Hop count
    pub length: usize,
}

/// A similarity candidate with its score breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarNode {
    pub node: NodeSummary,
    pub common_tags: usize,
    pub direct_edges: usize,
    /// `common_tags * 2 + direct_edges * 5`
    pub score: i64,
}

/// A detected community of nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: usize,
    pub members: Vec<NodeSummary>,
    pub size: usize,
}

/// Parameters for a visualization subgraph query.
///
/// With `center_node` set the result is a bounded expansion around it;
/// otherwise it is a filtered slice of the whole graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizationQuery {
    pub center_node: Option<String>,
    pub depth: Option<usize>,
    pub node_types: Option<Vec<NodeType>>,
    pub min_strength: Option<f64>,
    pub max_nodes: Option<usize>,
}

/// A node in a visualization subgraph, with its visible neighbor ids
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizationNode {
    pub id: String,
    pub title: String,
    pub node_type: NodeType,
    pub tags: Vec<String>,
    /// Ids of neighbors reachable through edges that passed the strength
    /// filter; consistent with `edges` by construction
    pub connections: Vec<String>,
}

/// A renderable subgraph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizationGraph {
    pub nodes: Vec<VisualizationNode>,
    pub edges: Vec<Edge>,
    /// True when the node budget cut the result short
    pub truncated: bool,
}

/// Traversal and analytics over a [`GraphStore`].
pub struct TraversalEngine {
    store: GraphStore,
    analytics: Arc<dyn GraphAnalytics>,
    limits: GraphLimits,
    /// Serializes whole-graph clustering runs; concurrent requests queue
    /// rather than projecting the graph twice
    clustering_gate: tokio::sync::Mutex<()>,
}

impl TraversalEngine {
    pub fn new(store: GraphStore, analytics: Arc<dyn GraphAnalytics>, limits: GraphLimits) -> Self {
        Self {
            store,
            analytics,
            limits,
            clustering_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Expand outward from a node up to `depth` hops (clamped), returning
    /// each reached node once at its minimum depth, with the relationship
    /// chain that first reached it. Results are ordered by depth, then id.
    pub async fn get_connections(
        &self,
        node_id: &str,
        depth: usize,
    ) -> KnowledgeResult<Vec<ConnectedNode>> {
        let depth = self.limits.clamp_depth(depth);
        // Fails fast with NotFound before any expansion
        self.store.get_node(node_id).await?;

        let mut visited: HashSet<String> = HashSet::from([node_id.to_string()]);
        let mut chains: HashMap<String, Vec<ConnectionHop>> = HashMap::new();
        let mut results: Vec<ConnectedNode> = Vec::new();
        let mut frontier: VecDeque<(String, usize)> = VecDeque::from([(node_id.to_string(), 0)]);

        while let Some((current, current_depth)) = frontier.pop_front() {
            if current_depth >= depth {
                continue;
            }
            let mut edges = self.store.incident_edges(&current).await?;
            // Deterministic expansion order
            edges.sort_by(|a, b| {
                other_endpoint(a, &current)
                    .cmp(other_endpoint(b, &current))
                    .then(a.id.cmp(&b.id))
            });

            for edge in edges {
                let neighbor = other_endpoint(&edge, &current).to_string();
                if !visited.insert(neighbor.clone()) {
                    continue;
                }
                let mut chain = chains.get(&current).cloned().unwrap_or_default();
                chain.push(ConnectionHop {
                    edge_type: edge.edge_type,
                    strength: edge.strength,
                });
                chains.insert(neighbor.clone(), chain.clone());

                let node = self.store.get_node(&neighbor).await?;
                results.push(ConnectedNode {
                    node: NodeSummary::from_node(&node),
                    depth: current_depth + 1,
                    relationship_chain: chain,
                });
                frontier.push_back((neighbor, current_depth + 1));
            }
        }

        results.sort_by(|a, b| a.depth.cmp(&b.depth).then(a.node.id.cmp(&b.node.id)));
        Ok(results)
    }

    /// Shortest undirected path between two nodes.
    ///
    /// Missing endpoints and disconnected pairs both surface as `NotFound`;
    /// a node paired with itself yields a zero-length path.
    pub async fn shortest_path(&self, from: &str, to: &str) -> KnowledgeResult<PathResult> {
        let start = self.store.get_node(from).await?;
        self.store.get_node(to).await?;

        if from == to {
            return Ok(PathResult {
                nodes: vec![NodeSummary::from_node(&start)],
                hops: Vec::new(),
                length: 0,
            });
        }

        // predecessor: node -> (previous node, edge used to reach it)
        let mut predecessor: HashMap<String, (String, Edge)> = HashMap::new();
        let mut visited: HashSet<String> = HashSet::from([from.to_string()]);
        let mut frontier: VecDeque<String> = VecDeque::from([from.to_string()]);
        let mut found = false;

        'bfs: while let Some(current) = frontier.pop_front() {
            let mut edges = self.store.incident_edges(&current).await?;
            edges.sort_by(|a, b| {
                other_endpoint(a, &current)
                    .cmp(other_endpoint(b, &current))
                    .then(a.id.cmp(&b.id))
            });
            for edge in edges {
                let neighbor = other_endpoint(&edge, &current).to_string();
                if !visited.insert(neighbor.clone()) {
                    continue;
                }
                predecessor.insert(neighbor.clone(), (current.clone(), edge));
                if neighbor == to {
                    found = true;
                    break 'bfs;
                }
                frontier.push_back(neighbor);
            }
        }

        if !found {
            return Err(KnowledgeError::NotFound(format!(
                "no path between {from} and {to}"
            )));
        }

        // Walk back from the target
        let mut node_ids = vec![to.to_string()];
        let mut hops_rev = Vec::new();
        let mut cursor = to.to_string();
        while let Some((prev, edge)) = predecessor.get(&cursor) {
            hops_rev.push(ConnectionHop {
                edge_type: edge.edge_type,
                strength: edge.strength,
            });
            node_ids.push(prev.clone());
            cursor = prev.clone();
        }
        node_ids.reverse();
        hops_rev.reverse();

        let mut nodes = Vec::with_capacity(node_ids.len());
        for id in &node_ids {
            nodes.push(NodeSummary::from_node(&self.store.get_node(id).await?));
        }
        let length = hops_rev.len();
        Ok(PathResult {
            nodes,
            hops: hops_rev,
            length,
        })
    }

    /// Rank nodes similar to the given one.
    ///
    /// Candidates share at least one tag; each scores
    /// `common_tags * 2 + direct_edges * 5`, so an existing edge boosts a
    /// tag-sharing candidate but never qualifies one by itself. Ties break
    /// on node id.
    pub async fn find_similar(
        &self,
        node_id: &str,
        limit: usize,
    ) -> KnowledgeResult<Vec<SimilarNode>> {
        let node = self.store.get_node(node_id).await?;

        let mut candidates: HashSet<String> = HashSet::new();
        for tag in &node.tags {
            for other in self.store.nodes_with_tag(tag).await {
                candidates.insert(other);
            }
        }
        candidates.remove(node_id);

        let own_tags: HashSet<&String> = node.tags.iter().collect();
        let mut scored = Vec::with_capacity(candidates.len());
        for candidate_id in candidates {
            let candidate = match self.store.get_node(&candidate_id).await {
                Ok(n) => n,
                // Raced with a delete; skip
                Err(KnowledgeError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            let common_tags = candidate
                .tags
                .iter()
                .filter(|t| own_tags.contains(t))
                .count();
            let direct_edges = self.store.direct_edge_count(node_id, &candidate_id).await;
            let score = (common_tags * 2 + direct_edges * 5) as i64;
            if score == 0 {
                continue;
            }
            scored.push(SimilarNode {
                node: NodeSummary::from_node(&candidate),
                common_tags,
                direct_edges,
                score,
            });
        }

        scored.sort_by(|a, b| b.score.cmp(&a.score).then(a.node.id.cmp(&b.node.id)));
        scored.truncate(limit);
        Ok(scored)
    }

    /// Detect communities over the whole graph.
    ///
    /// Best-effort: an analytics failure degrades to an empty result with a
    /// warning rather than failing the caller. Runs are serialized so two
    /// callers never project the graph concurrently.
    pub async fn detect_clusters(&self, min_size: usize) -> Vec<Cluster> {
        let _gate = self.clustering_gate.lock().await;

        let snapshot = self.store.snapshot().await;
        if snapshot.node_ids.is_empty() {
            return Vec::new();
        }

        let communities = match self
            .analytics
            .project(snapshot.node_ids, snapshot.edges)
            .await
        {
            Ok(handle) => {
                let result = self.analytics.run_community_detection(handle).await;
                // Always drop the projection, even when detection failed
                if let Err(e) = self.analytics.release(handle).await {
                    warn!(error = %e, "Failed to release graph projection");
                }
                match result {
                    Ok(communities) => communities,
                    Err(e) => {
                        warn!(error = %e, "Community detection failed; returning no clusters");
                        return Vec::new();
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Graph projection failed; returning no clusters");
                return Vec::new();
            }
        };

        let mut clusters = Vec::new();
        for community in communities {
            if community.size() < min_size.max(1) {
                continue;
            }
            let mut members = Vec::with_capacity(community.size());
            for id in &community.members {
                if let Ok(node) = self.store.get_node(id).await {
                    members.push(NodeSummary::from_node(&node));
                }
            }
            if members.len() < min_size.max(1) {
                continue;
            }
            members.sort_by(|a, b| a.id.cmp(&b.id));
            clusters.push(Cluster {
                id: 0,
                size: members.len(),
                members,
            });
        }
        clusters.sort_by(|a, b| {
            b.size
                .cmp(&a.size)
                .then_with(|| a.members[0].id.cmp(&b.members[0].id))
        });
        for (i, cluster) in clusters.iter_mut().enumerate() {
            cluster.id = i;
        }
        debug!(clusters = clusters.len(), "Detected communities");
        clusters
    }

    /// Build a renderable subgraph.
    ///
    /// Edges below the strength floor are invisible to the query: they are
    /// not traversed, not returned, and absent from neighbor lists.
    pub async fn query_for_visualization(
        &self,
        query: &VisualizationQuery,
    ) -> KnowledgeResult<VisualizationGraph> {
        let min_strength = query
            .min_strength
            .unwrap_or(self.limits.min_connection_strength);
        let max_nodes = self
            .limits
            .clamp_max_nodes(query.max_nodes.unwrap_or(self.limits.max_nodes));

        let mut truncated = false;
        let included: Vec<String> = match &query.center_node {
            Some(center) => {
                self.store.get_node(center).await?;
                let depth = self
                    .limits
                    .clamp_depth(query.depth.unwrap_or(self.limits.max_depth));
                let mut ids = vec![center.clone()];
                let mut visited: HashSet<String> = HashSet::from([center.clone()]);
                let mut frontier: VecDeque<(String, usize)> =
                    VecDeque::from([(center.clone(), 0)]);
                'expand: while let Some((current, current_depth)) = frontier.pop_front() {
                    if current_depth >= depth {
                        continue;
                    }
                    let mut edges = self.store.incident_edges(&current).await?;
                    edges.sort_by(|a, b| {
                        other_endpoint(a, &current)
                            .cmp(other_endpoint(b, &current))
                            .then(a.id.cmp(&b.id))
                    });
                    for edge in edges {
                        if edge.strength < min_strength {
                            continue;
                        }
                        let neighbor = other_endpoint(&edge, &current).to_string();
                        if !visited.insert(neighbor.clone()) {
                            continue;
                        }
                        if ids.len() >= max_nodes {
                            truncated = true;
                            break 'expand;
                        }
                        ids.push(neighbor.clone());
                        frontier.push_back((neighbor, current_depth + 1));
                    }
                }
                ids
            }
            None => {
                let mut ids = Vec::new();
                for id in self.store.all_node_ids().await {
                    let node = self.store.get_node(&id).await?;
                    if let Some(types) = &query.node_types {
                        if !types.contains(&node.node_type) {
                            continue;
                        }
                    }
                    if ids.len() >= max_nodes {
                        truncated = true;
                        break;
                    }
                    ids.push(id);
                }
                ids
            }
        };

        let included_set: HashSet<&String> = included.iter().collect();
        let mut edges: Vec<Edge> = Vec::new();
        let mut seen_edges: HashSet<String> = HashSet::new();
        let mut neighbor_lists: HashMap<String, Vec<String>> = HashMap::new();
        for id in &included {
            for edge in self.store.incident_edges(id).await? {
                if edge.strength < min_strength {
                    continue;
                }
                let other = other_endpoint(&edge, id).to_string();
                if !included_set.contains(&other) {
                    continue;
                }
                neighbor_lists.entry(id.clone()).or_default().push(other);
                if seen_edges.insert(edge.id.clone()) {
                    edges.push(edge);
                }
            }
        }
        edges.sort_by(|a, b| a.id.cmp(&b.id));

        let mut nodes = Vec::with_capacity(included.len());
        for id in &included {
            let node = self.store.get_node(id).await?;
            let mut connections = neighbor_lists.remove(id).unwrap_or_default();
            connections.sort();
            connections.dedup();
            nodes.push(VisualizationNode {
                id: node.id.clone(),
                title: node.title.clone(),
                node_type: node.node_type,
                tags: node.tags.clone(),
                connections,
            });
        }

        Ok(VisualizationGraph {
            nodes,
            edges,
            truncated,
        })
    }
}

fn other_endpoint<'a>(edge: &'a Edge, node_id: &str) -> &'a str {
    if edge.source_id == node_id {
        &edge.target_id
    } else {
        &edge.source_id
    }
}
