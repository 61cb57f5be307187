//! Analysis output types.

use serde::{Deserialize, Serialize};

/// Entities pulled out of node content, by category.
///
/// A category the model omitted or that failed to parse is simply empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractedEntities {
    pub people: Vec<String>,
    pub companies: Vec<String>,
    pub technologies: Vec<String>,
    pub locations: Vec<String>,
    pub concepts: Vec<String>,
}

impl ExtractedEntities {
    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
            && self.companies.is_empty()
            && self.technologies.is_empty()
            && self.locations.is_empty()
            && self.concepts.is_empty()
    }
}

/// Pipeline stage names as reported in [`StageError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    TagGeneration,
    EntityExtraction,
    ConnectionDiscovery,
    WriteBack,
}

/// A stage failure captured in the report instead of aborting the run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageError {
    pub stage: AnalysisStage,
    pub error: String,
}

/// An edge proposed by connection discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedConnection {
    pub edge_id: String,
    pub target_id: String,
    pub score: i64,
    pub strength: f64,
}

/// Full result of analyzing one node.
///
/// Stages are independently reportable: a failed stage leaves its section
/// empty and adds a [`StageError`], the others still run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeAnalysisReport {
    pub node_id: String,
    pub generated_tags: Vec<String>,
    pub entities: ExtractedEntities,
    pub proposed_connections: Vec<ProposedConnection>,
    /// Id of the emitted "connection" insight, when edges were proposed
    pub insight_id: Option<String>,
    pub stage_errors: Vec<StageError>,
}

impl NodeAnalysisReport {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            generated_tags: Vec::new(),
            entities: ExtractedEntities::default(),
            proposed_connections: Vec::new(),
            insight_id: None,
            stage_errors: Vec::new(),
        }
    }

    pub fn record_error(&mut self, stage: AnalysisStage, error: impl Into<String>) {
        self.stage_errors.push(StageError {
            stage,
            error: error.into(),
        });
    }
}
