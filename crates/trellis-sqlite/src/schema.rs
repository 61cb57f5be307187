//! Schema management and migrations

use crate::error::{SqliteError, SqliteResult};
use rusqlite::Connection;
use tracing::{debug, info};

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 1;

/// Apply all pending migrations
pub fn apply_migrations(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version = get_current_version(conn)?;
    debug!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking migrations"
    );

    if current_version < SCHEMA_VERSION {
        info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Applying schema migrations"
        );
        apply_migration_v1(conn)?;
    }

    Ok(())
}

fn get_current_version(conn: &Connection) -> SqliteResult<i32> {
    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .unwrap_or(None);
    Ok(version.unwrap_or(0))
}

fn record_migration(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version) VALUES (?)",
        [version],
    )?;
    Ok(())
}

/// Migration v1: metadata projection, cost ledger, insights
fn apply_migration_v1(conn: &Connection) -> SqliteResult<()> {
    debug!("Applying migration v1");

    conn.execute_batch(SCHEMA_V1)
        .map_err(|e| SqliteError::Schema(format!("Failed to apply v1 schema: {}", e)))?;

    record_migration(conn, 1)?;
    info!("Migration v1 applied");
    Ok(())
}

/// Initial schema SQL
const SCHEMA_V1: &str = r#"
-- ============================================================================
-- TABLE: node_metadata
-- ============================================================================
-- Relational projection of graph nodes: core fields only, no content body
-- beyond what full-text search needs. The graph store owns topology.

CREATE TABLE IF NOT EXISTS node_metadata (
    id TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    node_type TEXT NOT NULL,
    source TEXT,
    source_id TEXT,
    url TEXT,
    privacy_level TEXT NOT NULL DEFAULT 'private',
    tags TEXT NOT NULL DEFAULT '[]',  -- JSON array of tag names
    metadata TEXT NOT NULL DEFAULT '{}',  -- JSON object
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_node_metadata_type ON node_metadata(node_type);
CREATE INDEX IF NOT EXISTS idx_node_metadata_source ON node_metadata(source);
CREATE INDEX IF NOT EXISTS idx_node_metadata_privacy ON node_metadata(privacy_level);
CREATE INDEX IF NOT EXISTS idx_node_metadata_updated ON node_metadata(updated_at);

-- ============================================================================
-- TABLE: node_search (FTS5)
-- ============================================================================
-- Full-text index over titles and content snippets, kept in sync by the
-- metadata index operations.

CREATE VIRTUAL TABLE IF NOT EXISTS node_search USING fts5(
    node_id UNINDEXED,
    title,
    content
);

-- ============================================================================
-- TABLE: llm_requests
-- ============================================================================
-- Append-only cost ledger: one row per model call, failures included.

CREATE TABLE IF NOT EXISTS llm_requests (
    request_id TEXT PRIMARY KEY NOT NULL,
    provider TEXT NOT NULL,
    model TEXT NOT NULL,
    purpose TEXT NOT NULL,
    prompt_tokens INTEGER NOT NULL DEFAULT 0,
    completion_tokens INTEGER NOT NULL DEFAULT 0,
    total_tokens INTEGER NOT NULL DEFAULT 0,
    cost REAL NOT NULL DEFAULT 0,
    latency_ms INTEGER NOT NULL DEFAULT 0,
    success INTEGER NOT NULL DEFAULT 1,
    error TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_llm_requests_provider ON llm_requests(provider);
CREATE INDEX IF NOT EXISTS idx_llm_requests_purpose ON llm_requests(purpose);
CREATE INDEX IF NOT EXISTS idx_llm_requests_created ON llm_requests(created_at);

-- ============================================================================
-- TABLE: insights
-- ============================================================================
-- AI-generated observations; acknowledged in place, never mutated otherwise.

CREATE TABLE IF NOT EXISTS insights (
    id TEXT PRIMARY KEY NOT NULL,
    insight_type TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    confidence REAL NOT NULL,
    related_node_ids TEXT NOT NULL DEFAULT '[]',  -- JSON array
    acknowledged INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_insights_type ON insights(insight_type);
CREATE INDEX IF NOT EXISTS idx_insights_acknowledged ON insights(acknowledged);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        apply_migrations(&conn).unwrap();

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
