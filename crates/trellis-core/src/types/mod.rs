//! Domain types for the knowledge graph.
//!
//! Pure data structures, organized one concern per module. Validation lives
//! with the draft types so every entry point into the stores shares it.

pub mod cost;
pub mod edge;
pub mod insight;
pub mod node;
pub mod tag;

pub use cost::CostRecord;
pub use edge::{Edge, EdgeDraft, EdgeType};
pub use insight::{Insight, InsightType};
pub use node::{Node, NodeDraft, NodeType, NodeUpdate, PrivacyLevel};
pub use tag::{normalize_tag_name, Tag};
