//! Trait seams between the core and its backends.
//!
//! Core defines abstractions; backend crates implement them and higher-level
//! crates inject the implementations. This is what keeps privacy routing and
//! the coordinator testable without a live model provider or database.

pub mod analytics;
pub mod cost;
pub mod llm;
pub mod tasks;

pub use analytics::{Community, GraphAnalytics, ProjectionHandle, WeightedEdge};
pub use cost::CostSink;
pub use llm::{CompletionProvider, CompletionRequest, CompletionResponse, LlmPurpose, TokenUsage};
pub use tasks::{TaskHandle, TaskQueue, TaskStatus};
