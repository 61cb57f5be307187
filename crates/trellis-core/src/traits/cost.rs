//! Cost sink: where every model-call record lands.

use crate::error::KnowledgeResult;
use crate::types::CostRecord;
use async_trait::async_trait;

/// Append-only destination for [`CostRecord`]s.
///
/// The LLM manager records through this seam so every call is accounted for
/// regardless of which pipeline stage issued it.
#[async_trait]
pub trait CostSink: Send + Sync {
    async fn record(&self, record: CostRecord) -> KnowledgeResult<()>;
}

/// Sink that drops records; for callers that do not track cost (tests,
/// one-off tools).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCostSink;

#[async_trait]
impl CostSink for NullCostSink {
    async fn record(&self, _record: CostRecord) -> KnowledgeResult<()> {
        Ok(())
    }
}
