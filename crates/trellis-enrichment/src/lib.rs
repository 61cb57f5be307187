//! # Trellis Enrichment
//!
//! LLM-driven node analysis: tag generation, entity extraction, and
//! tag-similarity connection discovery, with privacy-aware routing and
//! per-stage failure reporting. Runs inline via
//! [`EnrichmentPipeline::analyze_node`] or in the background through the
//! task-queue handler.

pub mod pipeline;
pub mod report;

pub use pipeline::{
    trigger_analysis, AnalyzeNodeHandler, EnrichmentPipeline, ANALYZE_NODE_OPERATION,
};
pub use report::{
    AnalysisStage, ExtractedEntities, NodeAnalysisReport, ProposedConnection, StageError,
};
