//! Background task submission.
//!
//! The scheduler/queue dispatching work is an external collaborator; this
//! core only needs `submit(operation, payload) -> task id` and a way to
//! observe completion. Retry/backoff/cron semantics live behind the seam.

use crate::error::KnowledgeResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identifier returned by `submit`, used to poll for completion
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle(pub String);

impl std::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Observable lifecycle of a submitted task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed { result: serde_json::Value },
    Failed { error: String },
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// Dispatch seam for asynchronous work
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue an operation; returns immediately with a task identifier
    async fn submit(
        &self,
        operation: &str,
        payload: serde_json::Value,
    ) -> KnowledgeResult<TaskHandle>;

    /// Poll the current status of a task
    async fn status(&self, handle: &TaskHandle) -> KnowledgeResult<TaskStatus>;
}
