//! In-memory graph store.
//!
//! Owns relationship topology and tag merge counts. The relational
//! projection in `trellis-sqlite` mirrors node core fields; this store is
//! the source of truth for existence, topology, and tags.

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use trellis_core::error::{KnowledgeError, KnowledgeResult};
use trellis_core::traits::WeightedEdge;
use trellis_core::types::{
    normalize_tag_name, Edge, EdgeDraft, Node, NodeDraft, NodeUpdate, Tag,
};
use tracing::debug;
use uuid::Uuid;

/// Walk-up bound for the tag-hierarchy acyclic check
const MAX_TAG_HIERARCHY_DEPTH: usize = 32;

#[derive(Default)]
struct GraphState {
    nodes: HashMap<String, Node>,
    edges: HashMap<String, Edge>,
    /// node id -> incident edge ids, both directions
    incident: HashMap<String, HashSet<String>>,
    /// normalized tag name -> tag
    tags: HashMap<String, Tag>,
    /// normalized tag name -> tagged node ids
    tag_members: HashMap<String, HashSet<String>>,
}

/// Whole-graph snapshot for analytics and visualization
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    pub node_ids: Vec<String>,
    pub edges: Vec<WeightedEdge>,
}

/// Aggregate counts over the stored graph
#[derive(Debug, Clone)]
pub struct GraphStatistics {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub node_types: HashMap<String, usize>,
    pub avg_connections: f64,
}

/// Thread-safe graph store.
///
/// Mutating operations take the write lock for their full duration, so each
/// operation is atomic with respect to concurrent callers. Reads run with
/// unbounded concurrency on the read lock.
#[derive(Clone, Default)]
pub struct GraphStore {
    state: Arc<RwLock<GraphState>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Create a node from a caller-supplied draft, merging its tags.
    pub async fn create_node(&self, draft: NodeDraft) -> KnowledgeResult<Node> {
        draft.validate()?;

        let now = Utc::now();
        let node = Node {
            id: Uuid::new_v4().to_string(),
            title: draft.title,
            content: draft.content,
            node_type: draft.node_type,
            source: draft.source,
            source_id: draft.source_id,
            url: draft.url,
            privacy_level: draft.privacy_level,
            metadata: draft.metadata,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let mut state = self.state.write();
        state.incident.insert(node.id.clone(), HashSet::new());
        state.nodes.insert(node.id.clone(), node.clone());
        let tags = merge_tags_locked(&mut state, &node.id, &draft.tags)?;
        drop(state);

        debug!(node_id = %node.id, tag_count = tags.len(), "Created node");
        self.get_node(&node.id).await
    }

    pub async fn get_node(&self, node_id: &str) -> KnowledgeResult<Node> {
        let state = self.state.read();
        state
            .nodes
            .get(node_id)
            .cloned()
            .ok_or_else(|| KnowledgeError::NotFound(format!("node {node_id}")))
    }

    pub async fn node_exists(&self, node_id: &str) -> bool {
        self.state.read().nodes.contains_key(node_id)
    }

    /// Apply a partial update. When `tags` is set the node's tag set is
    /// replaced: dropped tags are decremented, new ones merged.
    pub async fn update_node(&self, node_id: &str, update: NodeUpdate) -> KnowledgeResult<Node> {
        update.validate()?;

        let mut state = self.state.write();
        if !state.nodes.contains_key(node_id) {
            return Err(KnowledgeError::NotFound(format!("node {node_id}")));
        }

        if let Some(new_tags) = &update.tags {
            let current: Vec<String> = state
                .nodes
                .get(node_id)
                .map(|n| n.tags.clone())
                .unwrap_or_default();
            let wanted: HashSet<String> =
                new_tags.iter().map(|t| normalize_tag_name(t)).collect();

            for stale in current.iter().filter(|t| !wanted.contains(*t)) {
                unlink_tag_locked(&mut state, node_id, stale);
            }
            merge_tags_locked(&mut state, node_id, new_tags)?;
        }

        let node = state
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| KnowledgeError::NotFound(format!("node {node_id}")))?;
        if let Some(title) = update.title {
            node.title = title;
        }
        if let Some(content) = update.content {
            node.content = Some(content);
        }
        if let Some(node_type) = update.node_type {
            node.node_type = node_type;
        }
        if let Some(url) = update.url {
            node.url = Some(url);
        }
        if let Some(privacy_level) = update.privacy_level {
            node.privacy_level = privacy_level;
        }
        if let Some(metadata) = update.metadata {
            node.metadata = metadata;
        }
        node.updated_at = Utc::now();
        Ok(node.clone())
    }

    /// Merge metadata entries into a node without replacing the whole map.
    pub async fn merge_node_metadata(
        &self,
        node_id: &str,
        entries: HashMap<String, serde_json::Value>,
    ) -> KnowledgeResult<Node> {
        let mut state = self.state.write();
        let node = state
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| KnowledgeError::NotFound(format!("node {node_id}")))?;
        node.metadata.extend(entries);
        node.updated_at = Utc::now();
        Ok(node.clone())
    }

    /// Detach-delete: remove the node and every incident edge in one
    /// operation, decrementing usage_count for every tag it carried.
    ///
    /// Returns the removed node and edges so a failed dual-write can be
    /// compensated by [`restore_node`](Self::restore_node).
    pub async fn delete_node(&self, node_id: &str) -> KnowledgeResult<(Node, Vec<Edge>)> {
        let mut state = self.state.write();
        let node = state
            .nodes
            .remove(node_id)
            .ok_or_else(|| KnowledgeError::NotFound(format!("node {node_id}")))?;

        let incident: Vec<String> = state
            .incident
            .remove(node_id)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();

        let mut removed_edges = Vec::with_capacity(incident.len());
        for edge_id in incident {
            if let Some(edge) = state.edges.remove(&edge_id) {
                let other = if edge.source_id == *node_id {
                    edge.target_id.clone()
                } else {
                    edge.source_id.clone()
                };
                if let Some(set) = state.incident.get_mut(&other) {
                    set.remove(&edge_id);
                }
                removed_edges.push(edge);
            }
        }

        for tag_name in &node.tags {
            unlink_tag_locked(&mut state, node_id, tag_name);
        }

        debug!(
            node_id = %node_id,
            edges_removed = removed_edges.len(),
            "Detach-deleted node"
        );
        Ok((node, removed_edges))
    }

    /// Re-insert a previously deleted node with its edges and tag links.
    ///
    /// Compensation hook for the dual-write saga; counterpart of
    /// [`delete_node`](Self::delete_node).
    pub async fn restore_node(&self, node: Node, edges: Vec<Edge>) -> KnowledgeResult<()> {
        let mut state = self.state.write();
        let tags = node.tags.clone();
        let node_id = node.id.clone();

        state.incident.entry(node_id.clone()).or_default();
        let mut stored = node;
        stored.tags = Vec::new();
        state.nodes.insert(node_id.clone(), stored);
        merge_tags_locked(&mut state, &node_id, &tags)?;

        for edge in edges {
            if state.nodes.contains_key(&edge.source_id)
                && state.nodes.contains_key(&edge.target_id)
            {
                link_edge_locked(&mut state, edge);
            }
        }
        Ok(())
    }

    /// Overwrite a node with a prior captured state, resynchronizing its tag
    /// links. Compensation hook for failed update projections.
    pub async fn replace_node(&self, prior: Node) -> KnowledgeResult<()> {
        let mut state = self.state.write();
        if !state.nodes.contains_key(&prior.id) {
            return Err(KnowledgeError::NotFound(format!("node {}", prior.id)));
        }

        let current_tags: Vec<String> = state
            .nodes
            .get(&prior.id)
            .map(|n| n.tags.clone())
            .unwrap_or_default();
        let wanted: HashSet<String> = prior.tags.iter().cloned().collect();
        for stale in current_tags.iter().filter(|t| !wanted.contains(*t)) {
            unlink_tag_locked(&mut state, &prior.id, stale);
        }
        let tags = prior.tags.clone();
        let node_id = prior.id.clone();
        let mut stored = prior;
        stored.tags = state
            .nodes
            .get(&node_id)
            .map(|n| n.tags.clone())
            .unwrap_or_default();
        state.nodes.insert(node_id.clone(), stored);
        merge_tags_locked(&mut state, &node_id, &tags)?;
        Ok(())
    }

    pub async fn all_node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.read().nodes.keys().cloned().collect();
        ids.sort();
        ids
    }

    // ------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------

    /// Create an edge. Both endpoints must exist; strength must be in [0,1].
    pub async fn create_edge(&self, draft: EdgeDraft) -> KnowledgeResult<Edge> {
        draft.validate()?;

        let mut state = self.state.write();
        if !state.nodes.contains_key(&draft.source_id) {
            return Err(KnowledgeError::NotFound(format!(
                "source node {}",
                draft.source_id
            )));
        }
        if !state.nodes.contains_key(&draft.target_id) {
            return Err(KnowledgeError::NotFound(format!(
                "target node {}",
                draft.target_id
            )));
        }

        let edge = Edge {
            id: Uuid::new_v4().to_string(),
            source_id: draft.source_id,
            target_id: draft.target_id,
            edge_type: draft.edge_type,
            strength: draft.strength,
            discovered_by: draft.discovered_by.unwrap_or_else(|| "user".to_string()),
            metadata: draft.metadata,
            created_at: Utc::now(),
        };
        link_edge_locked(&mut state, edge.clone());
        debug!(edge_id = %edge.id, edge_type = edge.edge_type.as_str(), "Created edge");
        Ok(edge)
    }

    pub async fn get_edge(&self, edge_id: &str) -> KnowledgeResult<Edge> {
        let state = self.state.read();
        state
            .edges
            .get(edge_id)
            .cloned()
            .ok_or_else(|| KnowledgeError::NotFound(format!("edge {edge_id}")))
    }

    pub async fn delete_edge(&self, edge_id: &str) -> KnowledgeResult<Edge> {
        let mut state = self.state.write();
        let edge = state
            .edges
            .remove(edge_id)
            .ok_or_else(|| KnowledgeError::NotFound(format!("edge {edge_id}")))?;
        if let Some(set) = state.incident.get_mut(&edge.source_id) {
            set.remove(edge_id);
        }
        if let Some(set) = state.incident.get_mut(&edge.target_id) {
            set.remove(edge_id);
        }
        Ok(edge)
    }

    /// All edges touching a node, regardless of direction
    pub async fn incident_edges(&self, node_id: &str) -> KnowledgeResult<Vec<Edge>> {
        let state = self.state.read();
        let incident = state
            .incident
            .get(node_id)
            .ok_or_else(|| KnowledgeError::NotFound(format!("node {node_id}")))?;
        let mut edges: Vec<Edge> = incident
            .iter()
            .filter_map(|id| state.edges.get(id).cloned())
            .collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(edges)
    }

    /// Number of direct edges between two nodes, either direction
    pub async fn direct_edge_count(&self, a: &str, b: &str) -> usize {
        let state = self.state.read();
        state
            .incident
            .get(a)
            .map(|set| {
                set.iter()
                    .filter_map(|id| state.edges.get(id))
                    .filter(|e| e.source_id == b || e.target_id == b)
                    .count()
            })
            .unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------------

    /// Merge tags onto a node: create absent tags with usage_count 1,
    /// increment existing ones, then link. One atomic operation under the
    /// write lock, so concurrent tagging never loses increments.
    pub async fn merge_tags(
        &self,
        node_id: &str,
        tag_names: &[String],
    ) -> KnowledgeResult<Vec<Tag>> {
        let mut state = self.state.write();
        if !state.nodes.contains_key(node_id) {
            return Err(KnowledgeError::NotFound(format!("node {node_id}")));
        }
        merge_tags_locked(&mut state, node_id, tag_names)
    }

    /// Normalized tag names currently on a node
    pub async fn node_tags(&self, node_id: &str) -> KnowledgeResult<Vec<String>> {
        let state = self.state.read();
        state
            .nodes
            .get(node_id)
            .map(|n| n.tags.clone())
            .ok_or_else(|| KnowledgeError::NotFound(format!("node {node_id}")))
    }

    pub async fn get_tag(&self, name: &str) -> KnowledgeResult<Tag> {
        let normalized = normalize_tag_name(name);
        let state = self.state.read();
        state
            .tags
            .get(&normalized)
            .cloned()
            .ok_or_else(|| KnowledgeError::NotFound(format!("tag {normalized}")))
    }

    /// Set a tag's description and/or color; `None` leaves a field as-is
    pub async fn update_tag(
        &self,
        name: &str,
        description: Option<String>,
        color: Option<String>,
    ) -> KnowledgeResult<Tag> {
        let normalized = normalize_tag_name(name);
        let mut state = self.state.write();
        let tag = state
            .tags
            .get_mut(&normalized)
            .ok_or_else(|| KnowledgeError::NotFound(format!("tag {normalized}")))?;
        if description.is_some() {
            tag.description = description;
        }
        if color.is_some() {
            tag.color = color;
        }
        Ok(tag.clone())
    }

    pub async fn list_tags(&self) -> Vec<Tag> {
        let state = self.state.read();
        let mut tags: Vec<Tag> = state.tags.values().cloned().collect();
        tags.sort_by(|a, b| b.usage_count.cmp(&a.usage_count).then(a.name.cmp(&b.name)));
        tags
    }

    /// Node ids currently carrying a tag
    pub async fn nodes_with_tag(&self, name: &str) -> Vec<String> {
        let normalized = normalize_tag_name(name);
        let state = self.state.read();
        let mut ids: Vec<String> = state
            .tag_members
            .get(&normalized)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Assign or clear a tag's parent, rejecting assignments that would
    /// introduce a cycle. The walk-up is bounded; hierarchies deeper than
    /// the bound are rejected as malformed.
    pub async fn set_tag_parent(
        &self,
        name: &str,
        parent: Option<&str>,
    ) -> KnowledgeResult<Tag> {
        let normalized = normalize_tag_name(name);
        let mut state = self.state.write();
        if !state.tags.contains_key(&normalized) {
            return Err(KnowledgeError::NotFound(format!("tag {normalized}")));
        }

        let parent = match parent {
            None => None,
            Some(p) => {
                let parent_name = normalize_tag_name(p);
                if !state.tags.contains_key(&parent_name) {
                    return Err(KnowledgeError::NotFound(format!("tag {parent_name}")));
                }
                if parent_name == normalized {
                    return Err(KnowledgeError::Validation(
                        "a tag cannot be its own parent".into(),
                    ));
                }
                // Walk up from the proposed parent; reaching `name` means
                // the new parent is a descendant of it.
                let mut cursor = Some(parent_name.clone());
                let mut depth = 0;
                while let Some(current) = cursor {
                    if depth >= MAX_TAG_HIERARCHY_DEPTH {
                        return Err(KnowledgeError::Validation(format!(
                            "tag hierarchy exceeds depth {MAX_TAG_HIERARCHY_DEPTH}"
                        )));
                    }
                    if current == normalized {
                        return Err(KnowledgeError::Validation(format!(
                            "setting parent {parent_name} on {normalized} would create a cycle"
                        )));
                    }
                    cursor = state.tags.get(&current).and_then(|t| t.parent.clone());
                    depth += 1;
                }
                Some(parent_name)
            }
        };

        let tag = state
            .tags
            .get_mut(&normalized)
            .ok_or_else(|| KnowledgeError::NotFound(format!("tag {normalized}")))?;
        tag.parent = parent;
        Ok(tag.clone())
    }

    // ------------------------------------------------------------------
    // Snapshots and statistics
    // ------------------------------------------------------------------

    /// Full node/edge snapshot with strengths as weights, for the analytics
    /// capability and visualization queries.
    pub async fn snapshot(&self) -> GraphSnapshot {
        let state = self.state.read();
        let mut node_ids: Vec<String> = state.nodes.keys().cloned().collect();
        node_ids.sort();
        let mut edges: Vec<WeightedEdge> = state
            .edges
            .values()
            .map(|e| WeightedEdge {
                source: e.source_id.clone(),
                target: e.target_id.clone(),
                weight: e.strength,
            })
            .collect();
        edges.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
        GraphSnapshot { node_ids, edges }
    }

    pub async fn statistics(&self) -> GraphStatistics {
        let state = self.state.read();
        let total_nodes = state.nodes.len();
        let total_edges = state.edges.len();
        let mut node_types: HashMap<String, usize> = HashMap::new();
        for node in state.nodes.values() {
            *node_types
                .entry(node.node_type.as_str().to_string())
                .or_default() += 1;
        }
        let avg_connections = if total_nodes == 0 {
            0.0
        } else {
            (total_edges * 2) as f64 / total_nodes as f64
        };
        GraphStatistics {
            total_nodes,
            total_edges,
            node_types,
            avg_connections,
        }
    }
}

// ----------------------------------------------------------------------
// Lock-held helpers. Every caller already holds the write guard, which is
// what makes merge/unlink atomic with the surrounding operation.
// ----------------------------------------------------------------------

fn merge_tags_locked(
    state: &mut GraphState,
    node_id: &str,
    tag_names: &[String],
) -> KnowledgeResult<Vec<Tag>> {
    let mut merged = Vec::new();
    for raw in tag_names {
        let name = normalize_tag_name(raw);
        if name.is_empty() {
            continue;
        }

        let already_linked = state
            .tag_members
            .get(&name)
            .map(|set| set.contains(node_id))
            .unwrap_or(false);
        if already_linked {
            if let Some(tag) = state.tags.get(&name) {
                merged.push(tag.clone());
            }
            continue;
        }

        let tag = state
            .tags
            .entry(name.clone())
            .and_modify(|t| t.usage_count += 1)
            .or_insert_with(|| Tag::new(&name));
        merged.push(tag.clone());

        state
            .tag_members
            .entry(name.clone())
            .or_default()
            .insert(node_id.to_string());
        if let Some(node) = state.nodes.get_mut(node_id) {
            node.tags.push(name);
            node.tags.sort();
        }
    }
    Ok(merged)
}

fn unlink_tag_locked(state: &mut GraphState, node_id: &str, tag_name: &str) {
    let name = normalize_tag_name(tag_name);
    let was_member = state
        .tag_members
        .get_mut(&name)
        .map(|set| set.remove(node_id))
        .unwrap_or(false);
    if was_member {
        if let Some(tag) = state.tags.get_mut(&name) {
            tag.usage_count = tag.usage_count.saturating_sub(1);
        }
    }
    if let Some(node) = state.nodes.get_mut(node_id) {
        node.tags.retain(|t| t != &name);
    }
}

fn link_edge_locked(state: &mut GraphState, edge: Edge) {
    state
        .incident
        .entry(edge.source_id.clone())
        .or_default()
        .insert(edge.id.clone());
    state
        .incident
        .entry(edge.target_id.clone())
        .or_default()
        .insert(edge.id.clone());
    state.edges.insert(edge.id.clone(), edge);
}
