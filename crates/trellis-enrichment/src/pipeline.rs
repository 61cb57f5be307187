//! Node analysis pipeline.
//!
//! Three independently reportable stages per node: tag generation, entity
//! extraction, and connection discovery. A stage failure is recorded in the
//! report and the remaining stages still run; only a missing node aborts the
//! whole analysis. All writes go through the consistency coordinator, all
//! model calls through the LLM manager (which handles privacy routing and
//! cost records).

use crate::report::{
    AnalysisStage, ExtractedEntities, NodeAnalysisReport, ProposedConnection,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use trellis_core::config::EnrichmentConfig;
use trellis_core::error::{KnowledgeError, KnowledgeResult};
use trellis_core::traits::{CompletionRequest, LlmPurpose, TaskHandle, TaskQueue};
use trellis_core::types::{normalize_tag_name, EdgeDraft, EdgeType, Insight, InsightType, Node};
use trellis_engine::{ConsistencyCoordinator, TaskHandler};
use trellis_graph::TraversalEngine;
use trellis_llm::LlmManager;
use trellis_sqlite::InsightStore;

/// Operation name used when submitting analysis to a task queue
pub const ANALYZE_NODE_OPERATION: &str = "analyze_node";

/// Name recorded as `discovered_by` on proposed edges
const DISCOVERY_ALGORITHM: &str = "tag_similarity";

/// Upper bound on tags kept from one generation pass
const MAX_GENERATED_TAGS: usize = 10;

const TAGGING_SYSTEM_PROMPT: &str = "You are a precise tagging assistant for a personal \
     knowledge base. Respond with tags only, no explanations.";

const ENTITY_SYSTEM_PROMPT: &str = "You extract named entities from text. Respond with a \
     single JSON object and nothing else.";

/// Orchestrates analysis of one node at a time
pub struct EnrichmentPipeline {
    coordinator: ConsistencyCoordinator,
    traversal: Arc<TraversalEngine>,
    llm: Arc<LlmManager>,
    insights: InsightStore,
    config: EnrichmentConfig,
}

impl EnrichmentPipeline {
    pub fn new(
        coordinator: ConsistencyCoordinator,
        traversal: Arc<TraversalEngine>,
        llm: Arc<LlmManager>,
        insights: InsightStore,
        config: EnrichmentConfig,
    ) -> Self {
        Self {
            coordinator,
            traversal,
            llm,
            insights,
            config,
        }
    }

    /// Run all stages against one node.
    ///
    /// Returns `NotFound` for a missing node; every other failure lands in
    /// the report's `stage_errors` instead of the `Err` channel.
    pub async fn analyze_node(&self, node_id: &str) -> KnowledgeResult<NodeAnalysisReport> {
        let node = self.coordinator.get_node(node_id).await?;
        let mut report = NodeAnalysisReport::new(node_id);
        info!(node_id = %node_id, title = %node.title, "Analyzing node");

        // Stage 1: tag generation
        match self.generate_tags(&node).await {
            Ok(tags) => {
                report.generated_tags = tags
                    .into_iter()
                    .filter(|t| !node.tags.contains(t))
                    .collect();
            }
            Err(e) => {
                warn!(node_id = %node_id, error = %e, "Tag generation failed");
                report.record_error(AnalysisStage::TagGeneration, e.to_string());
            }
        }

        // Stage 2: entity extraction
        match self.extract_entities(&node).await {
            Ok(entities) => report.entities = entities,
            Err(e) => {
                warn!(node_id = %node_id, error = %e, "Entity extraction failed");
                report.record_error(AnalysisStage::EntityExtraction, e.to_string());
            }
        }

        // Write tags and entities back before discovery so similarity sees
        // the fresh tag profile
        if !report.generated_tags.is_empty() || !report.entities.is_empty() {
            let mut metadata = std::collections::HashMap::new();
            if !report.entities.is_empty() {
                metadata.insert(
                    "entities".to_string(),
                    serde_json::to_value(&report.entities)?,
                );
            }
            if let Err(e) = self
                .coordinator
                .apply_enrichment(node_id, &report.generated_tags, metadata)
                .await
            {
                warn!(node_id = %node_id, error = %e, "Enrichment write-back failed");
                report.record_error(AnalysisStage::WriteBack, e.to_string());
            }
        }

        // Stage 3: connection discovery over the updated tag profile
        match self.discover_connections(node_id).await {
            Ok(proposed) => {
                report.proposed_connections = proposed;
                if !report.proposed_connections.is_empty() {
                    match self.emit_connection_insight(node_id, &report).await {
                        Ok(insight_id) => report.insight_id = Some(insight_id),
                        Err(e) => {
                            warn!(node_id = %node_id, error = %e, "Insight emission failed");
                            report.record_error(AnalysisStage::ConnectionDiscovery, e.to_string());
                        }
                    }
                }
            }
            Err(e) => {
                warn!(node_id = %node_id, error = %e, "Connection discovery failed");
                report.record_error(AnalysisStage::ConnectionDiscovery, e.to_string());
            }
        }

        info!(
            node_id = %node_id,
            tags = report.generated_tags.len(),
            connections = report.proposed_connections.len(),
            errors = report.stage_errors.len(),
            "Analysis complete"
        );
        Ok(report)
    }

    async fn generate_tags(&self, node: &Node) -> KnowledgeResult<Vec<String>> {
        let snippet = snippet(node.content.as_deref(), self.config.tag_snippet_chars);
        let prompt = format!(
            "Analyze this content and suggest 5-10 concise tags for organizing it in a \
             personal knowledge base.\n\nTitle: {}\n\nContent: {}\n\n\
             Respond with the tags as a comma-separated list.",
            node.title, snippet
        );
        let request = CompletionRequest::new(prompt, "")
            .with_system_prompt(TAGGING_SYSTEM_PROMPT)
            .with_temperature(0.3);

        let response = self
            .llm
            .complete(LlmPurpose::Tagging, &node.tags, request)
            .await?;
        Ok(parse_tag_list(&response.content))
    }

    async fn extract_entities(&self, node: &Node) -> KnowledgeResult<ExtractedEntities> {
        let snippet = snippet(node.content.as_deref(), self.config.entity_snippet_chars);
        let prompt = format!(
            "Extract named entities from this content.\n\nTitle: {}\n\nContent: {}\n\n\
             Respond with a JSON object with keys \"people\", \"companies\", \
             \"technologies\", \"locations\", and \"concepts\", each an array of strings.",
            node.title, snippet
        );
        let request = CompletionRequest::new(prompt, "")
            .with_system_prompt(ENTITY_SYSTEM_PROMPT)
            .with_temperature(0.1);

        let response = self
            .llm
            .complete(LlmPurpose::EntityExtraction, &node.tags, request)
            .await?;
        // Unparseable output degrades to all-empty categories, not an error
        Ok(parse_entities(&response.content))
    }

    async fn discover_connections(
        &self,
        node_id: &str,
    ) -> KnowledgeResult<Vec<ProposedConnection>> {
        let candidates = self
            .traversal
            .find_similar(node_id, self.config.max_proposed_connections * 2)
            .await?;

        let mut proposed = Vec::new();
        for candidate in candidates {
            if proposed.len() >= self.config.max_proposed_connections {
                break;
            }
            if candidate.score < self.config.min_similarity_score {
                continue;
            }
            // Already connected pairs are not re-proposed
            if candidate.direct_edges > 0 {
                continue;
            }

            let strength = (candidate.score as f64 / 10.0).clamp(0.0, 1.0);
            let draft = EdgeDraft::new(node_id, candidate.node.id.clone(), EdgeType::SimilarTo)
                .with_strength(strength)
                .with_discovered_by(DISCOVERY_ALGORITHM);
            match self.coordinator.create_edge(draft).await {
                Ok(edge) => {
                    debug!(
                        edge_id = %edge.id,
                        target = %candidate.node.id,
                        score = candidate.score,
                        "Proposed connection"
                    );
                    proposed.push(ProposedConnection {
                        edge_id: edge.id,
                        target_id: candidate.node.id,
                        score: candidate.score,
                        strength,
                    });
                }
                Err(e) => {
                    warn!(target = %candidate.node.id, error = %e, "Failed to create proposed edge");
                }
            }
        }
        Ok(proposed)
    }

    async fn emit_connection_insight(
        &self,
        node_id: &str,
        report: &NodeAnalysisReport,
    ) -> KnowledgeResult<String> {
        let node = self.coordinator.get_node(node_id).await?;
        let mut related: Vec<String> = vec![node_id.to_string()];
        related.extend(report.proposed_connections.iter().map(|p| p.target_id.clone()));

        let confidence = 0.5 + 0.1 * report.proposed_connections.len() as f64;
        let insight = Insight::new(
            InsightType::Connection,
            format!("Found {} related notes", report.proposed_connections.len()),
            format!(
                "\"{}\" shares tags with {} other node(s); similar_to edges were added.",
                node.title,
                report.proposed_connections.len()
            ),
            confidence,
            related,
        );
        let insight_id = insight.id.clone();
        self.insights.store(&insight).await?;
        Ok(insight_id)
    }
}

/// Submit an analysis task; returns immediately with the task id
pub async fn trigger_analysis(
    queue: &dyn TaskQueue,
    node_id: &str,
) -> KnowledgeResult<TaskHandle> {
    queue
        .submit(
            ANALYZE_NODE_OPERATION,
            serde_json::json!({ "node_id": node_id }),
        )
        .await
}

/// Task-queue handler running the pipeline for submitted node ids
pub struct AnalyzeNodeHandler {
    pipeline: Arc<EnrichmentPipeline>,
}

impl AnalyzeNodeHandler {
    pub fn new(pipeline: Arc<EnrichmentPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl TaskHandler for AnalyzeNodeHandler {
    async fn run(&self, payload: serde_json::Value) -> KnowledgeResult<serde_json::Value> {
        let node_id = payload
            .get("node_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                KnowledgeError::Validation("analyze_node payload missing node_id".into())
            })?;
        let report = self.pipeline.analyze_node(node_id).await?;
        Ok(serde_json::to_value(report)?)
    }
}

/// First `max_chars` characters of the content, if any
fn snippet(content: Option<&str>, max_chars: usize) -> String {
    content
        .map(|c| c.chars().take(max_chars).collect())
        .unwrap_or_default()
}

/// Parse a comma-separated tag list: normalized, deduplicated, empty entries
/// discarded, capped at [`MAX_GENERATED_TAGS`].
fn parse_tag_list(raw: &str) -> Vec<String> {
    let mut tags = Vec::new();
    for piece in raw.split(',') {
        let tag = normalize_tag_name(piece);
        if tag.is_empty() || tag.len() > 50 {
            continue;
        }
        if !tags.contains(&tag) {
            tags.push(tag);
        }
        if tags.len() >= MAX_GENERATED_TAGS {
            break;
        }
    }
    tags
}

/// Parse the entity-extraction response, tolerating code fences and leading
/// prose. Anything unparseable yields all-empty categories.
fn parse_entities(raw: &str) -> ExtractedEntities {
    let start = match raw.find('{') {
        Some(i) => i,
        None => return ExtractedEntities::default(),
    };
    let end = match raw.rfind('}') {
        Some(i) if i >= start => i,
        _ => return ExtractedEntities::default(),
    };
    serde_json::from_str(&raw[start..=end]).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::config::{GraphLimits, LlmConfig, PrivacyConfig, StageRoute};
    use trellis_core::types::{NodeDraft, NodeType};
    use trellis_graph::{GraphStore, LabelPropagation};
    use trellis_llm::MockProvider;
    use trellis_sqlite::{CostLedger, MetadataIndex, SqlitePool};

    struct Fixture {
        pipeline: EnrichmentPipeline,
        coordinator: ConsistencyCoordinator,
        insights: InsightStore,
        ledger: CostLedger,
        local: Arc<MockProvider>,
        remote: Arc<MockProvider>,
    }

    fn fixture() -> Fixture {
        let graph = GraphStore::new();
        let pool = SqlitePool::memory().unwrap();
        let index = MetadataIndex::new(pool.clone());
        let insights = InsightStore::new(pool.clone());
        let ledger = CostLedger::new(pool);
        let coordinator = ConsistencyCoordinator::new(graph.clone(), index);
        let traversal = Arc::new(TraversalEngine::new(
            graph,
            Arc::new(LabelPropagation::new()),
            GraphLimits::default(),
        ));

        let local = Arc::new(MockProvider::new("local", true).with_response("local-tag"));
        let remote = Arc::new(MockProvider::new("remote", false).with_response("{}"));
        let llm_config = LlmConfig {
            default_route: StageRoute::new("remote", "gpt-4"),
            local_route: StageRoute::new("local", "llama2"),
            max_retries: 0,
            ..Default::default()
        };
        let mut manager = LlmManager::new(
            llm_config,
            PrivacyConfig::default(),
            Arc::new(ledger.clone()),
        );
        manager.register(local.clone());
        manager.register(remote.clone());

        let pipeline = EnrichmentPipeline::new(
            coordinator.clone(),
            traversal,
            Arc::new(manager),
            insights.clone(),
            EnrichmentConfig::default(),
        );
        Fixture {
            pipeline,
            coordinator,
            insights,
            ledger,
            local,
            remote,
        }
    }

    async fn make_node(f: &Fixture, title: &str, tags: Vec<String>) -> String {
        f.coordinator
            .create_node(
                NodeDraft::new(title, NodeType::Note)
                    .with_content("Notes about the borrow checker and async Rust.")
                    .with_tags(tags),
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn analysis_applies_tags_and_entities() {
        let f = fixture();
        let node_id = make_node(&f, "Rust learning log", vec![]).await;
        f.remote.push_response("Rust, Memory-Safety, rust, , Async");
        f.remote
            .push_response(r#"{"people": ["Graydon Hoare"], "technologies": ["Rust"]}"#);

        let report = f.pipeline.analyze_node(&node_id).await.unwrap();

        assert_eq!(
            report.generated_tags,
            vec!["rust".to_string(), "memory-safety".to_string(), "async".to_string()]
        );
        assert_eq!(report.entities.people, vec!["Graydon Hoare"]);
        assert!(report.stage_errors.is_empty());

        let node = f.coordinator.get_node(&node_id).await.unwrap();
        assert!(node.tags.contains(&"rust".to_string()));
        assert!(node.metadata.contains_key("entities"));
        // Projection carries the new tags too
        let row = f.coordinator.index().get(&node_id).await.unwrap().unwrap();
        assert!(row.tags.contains(&"rust".to_string()));
    }

    #[tokio::test]
    async fn sensitive_node_never_reaches_remote_provider() {
        let f = fixture();
        let node_id = make_node(&f, "Session notes", vec!["therapy".to_string()]).await;
        f.local.push_response("reflection, health");
        f.local.push_response("{}");

        let report = f.pipeline.analyze_node(&node_id).await.unwrap();

        assert_eq!(f.remote.call_count(), 0);
        assert_eq!(f.local.call_count(), 2);
        assert!(report
            .generated_tags
            .contains(&"reflection".to_string()));

        // Every call was recorded at zero cost
        let stats = f.ledger.usage_stats(None).await.unwrap();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.total_cost, 0.0);
    }

    #[tokio::test]
    async fn failed_tagging_does_not_abort_entity_extraction() {
        let f = fixture();
        let node_id = make_node(&f, "Partial failure", vec![]).await;
        f.remote.fail_next(1); // tagging attempt fails, retries exhausted
        f.remote.push_response(r#"{"concepts": ["resilience"]}"#);

        let report = f.pipeline.analyze_node(&node_id).await.unwrap();

        assert!(report.generated_tags.is_empty());
        assert_eq!(report.stage_errors.len(), 1);
        assert_eq!(report.stage_errors[0].stage, AnalysisStage::TagGeneration);
        assert_eq!(report.entities.concepts, vec!["resilience"]);

        // The failed call still landed in the ledger
        let stats = f.ledger.usage_stats(None).await.unwrap();
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.successful_requests, 1);
    }

    #[tokio::test]
    async fn discovery_proposes_edges_and_emits_insight() {
        let f = fixture();
        let node_id = make_node(
            &f,
            "Async patterns",
            vec!["rust".to_string(), "async".to_string()],
        )
        .await;
        let peer_id = make_node(
            &f,
            "Tokio notes",
            vec!["rust".to_string(), "async".to_string()],
        )
        .await;
        // No new tags, no entities; discovery works off the existing profile
        f.remote.push_response("");
        f.remote.push_response("{}");

        let report = f.pipeline.analyze_node(&node_id).await.unwrap();

        assert_eq!(report.proposed_connections.len(), 1);
        let proposed = &report.proposed_connections[0];
        assert_eq!(proposed.target_id, peer_id);
        assert_eq!(proposed.score, 4); // two common tags

        let edge = f
            .coordinator
            .graph()
            .get_edge(&proposed.edge_id)
            .await
            .unwrap();
        assert_eq!(edge.discovered_by, "tag_similarity");
        assert_eq!(edge.edge_type, EdgeType::SimilarTo);

        let insight_id = report.insight_id.expect("insight should be emitted");
        let pending = f.insights.pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, insight_id);
        assert!(pending[0].related_node_ids.contains(&peer_id));
    }

    #[tokio::test]
    async fn already_connected_pairs_are_not_reproposed() {
        let f = fixture();
        let node_id = make_node(&f, "a", vec!["shared".to_string(), "tags".to_string()]).await;
        let peer_id = make_node(&f, "b", vec!["shared".to_string(), "tags".to_string()]).await;
        f.coordinator
            .create_edge(EdgeDraft::new(
                node_id.clone(),
                peer_id.clone(),
                EdgeType::References,
            ))
            .await
            .unwrap();
        f.remote.push_response("");
        f.remote.push_response("{}");

        let report = f.pipeline.analyze_node(&node_id).await.unwrap();
        assert!(report.proposed_connections.is_empty());
        assert!(report.insight_id.is_none());
    }

    #[tokio::test]
    async fn missing_node_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.pipeline.analyze_node("ghost").await,
            Err(KnowledgeError::NotFound(_))
        ));
    }

    #[test]
    fn tag_list_parsing_normalizes_and_dedupes() {
        let tags = parse_tag_list("Rust, Memory-Safety, rust, , ASYNC,");
        assert_eq!(tags, vec!["rust", "memory-safety", "async"]);
        assert!(parse_tag_list("").is_empty());

        let many = (0..20).map(|i| format!("t{i}")).collect::<Vec<_>>().join(",");
        assert_eq!(parse_tag_list(&many).len(), MAX_GENERATED_TAGS);
    }

    #[test]
    fn entity_parsing_tolerates_fences_and_garbage() {
        let fenced = "```json\n{\"people\": [\"Ada\"]}\n```";
        assert_eq!(parse_entities(fenced).people, vec!["Ada"]);

        let prose = "Here you go: {\"concepts\": [\"graphs\"]} hope that helps";
        assert_eq!(parse_entities(prose).concepts, vec!["graphs"]);

        assert!(parse_entities("no json here").is_empty());
        assert!(parse_entities("{not valid json}").is_empty());
    }
}
