//! # Trellis Engine
//!
//! Write-path coordination and background execution:
//! - [`ConsistencyCoordinator`]: dual-store writes with compensation and a
//!   reconciliation pass for repairing divergence
//! - [`InProcessTaskQueue`]: tokio-backed task queue with per-attempt
//!   timeouts and a bounded retry budget

pub mod coordinator;
pub mod tasks;

pub use coordinator::{ConsistencyCoordinator, ReconciliationReport};
pub use tasks::{InProcessTaskQueue, TaskHandler};
