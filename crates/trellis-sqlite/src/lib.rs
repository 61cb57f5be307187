//! # Trellis SQLite
//!
//! Relational backend for the knowledge graph:
//! - [`MetadataIndex`]: projection of node core fields with filtered listing
//!   and FTS5 full-text search
//! - [`CostLedger`]: append-only record of every model call with SQL
//!   aggregations
//! - [`InsightStore`]: persisted AI observations
//!
//! The graph store in `trellis-graph` is the source of truth for topology;
//! rows here are written by the consistency coordinator.

pub mod config;
pub mod connection;
pub mod error;
pub mod insights;
pub mod ledger;
pub mod metadata;
pub mod schema;

pub use config::SqliteConfig;
pub use connection::SqlitePool;
pub use error::{SqliteError, SqliteResult};
pub use insights::InsightStore;
pub use ledger::{CostBreakdown, CostLedger, CostSummary, ModelUsage, UsageStats};
pub use metadata::{MetadataFilter, MetadataIndex, NodeMetadataRow, SearchHit};
