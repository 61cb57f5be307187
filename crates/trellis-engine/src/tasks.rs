//! In-process background task queue.
//!
//! Implements the [`TaskQueue`] seam with tokio tasks: submission returns
//! immediately, a spawned worker applies the per-attempt timeout and bounded
//! retry budget, and status is polled from a shared map. External
//! scheduler/cron integration stays behind the trait.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use trellis_core::config::TaskConfig;
use trellis_core::error::{KnowledgeError, KnowledgeResult};
use trellis_core::traits::{TaskHandle, TaskQueue, TaskStatus};
use uuid::Uuid;

/// One registered operation
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, payload: serde_json::Value) -> KnowledgeResult<serde_json::Value>;
}

/// Finished statuses retained before the oldest are evicted
const DEFAULT_HISTORY_LIMIT: usize = 1024;

/// Tokio-backed [`TaskQueue`] implementation
#[derive(Clone)]
pub struct InProcessTaskQueue {
    config: TaskConfig,
    history_limit: usize,
    handlers: Arc<RwLock<HashMap<String, Arc<dyn TaskHandler>>>>,
    statuses: Arc<RwLock<HashMap<String, TaskStatus>>>,
    /// Terminal task ids in completion order, capped at `history_limit`
    finished: Arc<RwLock<VecDeque<String>>>,
}

impl InProcessTaskQueue {
    pub fn new(config: TaskConfig) -> Self {
        Self {
            config,
            history_limit: DEFAULT_HISTORY_LIMIT,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            statuses: Arc::new(RwLock::new(HashMap::new())),
            finished: Arc::new(RwLock::new(VecDeque::new())),
        }
    }

    /// Cap on retained terminal statuses; older ones become `NotFound`
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Register the handler for an operation name
    pub fn register(&self, operation: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.write().insert(operation.into(), handler);
    }

    /// Block until the task reaches a terminal state or the deadline passes
    pub async fn wait(&self, handle: &TaskHandle, deadline: Duration) -> KnowledgeResult<TaskStatus> {
        let started = std::time::Instant::now();
        loop {
            let status = self.status(handle).await?;
            if status.is_terminal() {
                return Ok(status);
            }
            if started.elapsed() > deadline {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl TaskQueue for InProcessTaskQueue {
    async fn submit(
        &self,
        operation: &str,
        payload: serde_json::Value,
    ) -> KnowledgeResult<TaskHandle> {
        let handler = self
            .handlers
            .read()
            .get(operation)
            .cloned()
            .ok_or_else(|| {
                KnowledgeError::Validation(format!("unknown task operation: {operation}"))
            })?;

        let task_id = Uuid::new_v4().to_string();
        self.statuses
            .write()
            .insert(task_id.clone(), TaskStatus::Queued);
        debug!(task_id = %task_id, operation, "Submitted task");

        let statuses = self.statuses.clone();
        let finished = self.finished.clone();
        let history_limit = self.history_limit;
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let max_retries = self.config.max_retries;
        let operation = operation.to_string();
        let id = task_id.clone();

        tokio::spawn(async move {
            statuses.write().insert(id.clone(), TaskStatus::Running);

            let mut last_error = String::from("no attempts made");
            for attempt in 0..=max_retries {
                match tokio::time::timeout(timeout, handler.run(payload.clone())).await {
                    Ok(Ok(result)) => {
                        finish(
                            &statuses,
                            &finished,
                            history_limit,
                            id,
                            TaskStatus::Completed { result },
                        );
                        return;
                    }
                    Ok(Err(e)) => {
                        warn!(task_id = %id, operation = %operation, attempt, error = %e, "Task attempt failed");
                        last_error = e.to_string();
                    }
                    Err(_) => {
                        warn!(task_id = %id, operation = %operation, attempt, "Task attempt timed out");
                        last_error = format!("timed out after {}s", timeout.as_secs());
                    }
                }
            }
            finish(
                &statuses,
                &finished,
                history_limit,
                id,
                TaskStatus::Failed { error: last_error },
            );
        });

        Ok(TaskHandle(task_id))
    }

    async fn status(&self, handle: &TaskHandle) -> KnowledgeResult<TaskStatus> {
        self.statuses
            .read()
            .get(&handle.0)
            .cloned()
            .ok_or_else(|| KnowledgeError::NotFound(format!("task {handle}")))
    }
}

/// Record a terminal status and evict the oldest finished entries past the
/// history cap, so a long-lived queue stays bounded.
fn finish(
    statuses: &RwLock<HashMap<String, TaskStatus>>,
    finished: &RwLock<VecDeque<String>>,
    history_limit: usize,
    id: String,
    status: TaskStatus,
) {
    let mut statuses = statuses.write();
    let mut finished = finished.write();
    statuses.insert(id.clone(), status);
    finished.push_back(id);
    while finished.len() > history_limit {
        if let Some(evicted) = finished.pop_front() {
            statuses.remove(&evicted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct EchoHandler;

    #[async_trait]
    impl TaskHandler for EchoHandler {
        async fn run(&self, payload: serde_json::Value) -> KnowledgeResult<serde_json::Value> {
            Ok(payload)
        }
    }

    /// Fails the first `failures` runs, then succeeds
    struct FlakyHandler {
        failures: u32,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl TaskHandler for FlakyHandler {
        async fn run(&self, _payload: serde_json::Value) -> KnowledgeResult<serde_json::Value> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                Err(KnowledgeError::Provider("flaky".into()))
            } else {
                Ok(serde_json::json!({"attempt": attempt}))
            }
        }
    }

    struct SlowHandler;

    #[async_trait]
    impl TaskHandler for SlowHandler {
        async fn run(&self, _payload: serde_json::Value) -> KnowledgeResult<serde_json::Value> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(serde_json::Value::Null)
        }
    }

    fn queue(timeout_secs: u64, max_retries: u32) -> InProcessTaskQueue {
        InProcessTaskQueue::new(TaskConfig {
            timeout_secs,
            max_retries,
        })
    }

    #[tokio::test]
    async fn submitted_task_completes_with_result() {
        let queue = queue(5, 0);
        queue.register("echo", Arc::new(EchoHandler));

        let handle = queue
            .submit("echo", serde_json::json!({"x": 1}))
            .await
            .unwrap();
        let status = queue.wait(&handle, Duration::from_secs(5)).await.unwrap();
        match status {
            TaskStatus::Completed { result } => assert_eq!(result["x"], 1),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_operation_is_rejected_at_submit() {
        let queue = queue(5, 0);
        let err = queue
            .submit("nonexistent", serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, KnowledgeError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_handle_is_not_found() {
        let queue = queue(5, 0);
        assert!(matches!(
            queue.status(&TaskHandle("missing".into())).await,
            Err(KnowledgeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn retries_recover_transient_failures() {
        let queue = queue(5, 2);
        queue.register(
            "flaky",
            Arc::new(FlakyHandler {
                failures: 2,
                attempts: AtomicU32::new(0),
            }),
        );

        let handle = queue.submit("flaky", serde_json::Value::Null).await.unwrap();
        let status = queue.wait(&handle, Duration::from_secs(5)).await.unwrap();
        assert!(matches!(status, TaskStatus::Completed { .. }));
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let queue = queue(5, 1);
        queue.register(
            "flaky",
            Arc::new(FlakyHandler {
                failures: 10,
                attempts: AtomicU32::new(0),
            }),
        );

        let handle = queue.submit("flaky", serde_json::Value::Null).await.unwrap();
        let status = queue.wait(&handle, Duration::from_secs(5)).await.unwrap();
        match status {
            TaskStatus::Failed { error } => assert!(error.contains("flaky")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn finished_statuses_are_evicted_past_the_history_cap() {
        let queue = queue(5, 0).with_history_limit(1);
        queue.register("echo", Arc::new(EchoHandler));

        let first = queue.submit("echo", serde_json::json!(1)).await.unwrap();
        queue.wait(&first, Duration::from_secs(5)).await.unwrap();
        let second = queue.submit("echo", serde_json::json!(2)).await.unwrap();
        queue.wait(&second, Duration::from_secs(5)).await.unwrap();

        // The newest result is retained, the oldest is gone
        assert!(matches!(
            queue.status(&second).await.unwrap(),
            TaskStatus::Completed { .. }
        ));
        assert!(matches!(
            queue.status(&first).await,
            Err(KnowledgeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn timed_out_task_is_marked_failed() {
        let queue = queue(1, 0);
        queue.register("slow", Arc::new(SlowHandler));

        let handle = queue.submit("slow", serde_json::Value::Null).await.unwrap();
        let status = queue.wait(&handle, Duration::from_secs(5)).await.unwrap();
        match status {
            TaskStatus::Failed { error } => assert!(error.contains("timed out")),
            other => panic!("expected timeout failure, got {other:?}"),
        }
    }
}
