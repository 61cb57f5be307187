//! Relational projection of graph nodes.
//!
//! The graph store owns topology and tags; this index mirrors node core
//! fields for filtered listing and full-text search. Rows are written by the
//! consistency coordinator, never directly by callers.

use crate::connection::SqlitePool;
use crate::error::{SqliteError, SqliteResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use trellis_core::error::{KnowledgeError, KnowledgeResult};
use trellis_core::types::{Node, NodeType, PrivacyLevel};

/// A projected node row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetadataRow {
    pub id: String,
    pub title: String,
    pub node_type: NodeType,
    pub source: Option<String>,
    pub source_id: Option<String>,
    pub url: Option<String>,
    pub privacy_level: PrivacyLevel,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filter for metadata listing; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    pub node_type: Option<NodeType>,
    pub source: Option<String>,
    pub privacy_level: Option<PrivacyLevel>,
    /// Restrict to these ids, e.g. from a tag lookup against the graph store
    pub ids: Option<Vec<String>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// A full-text search hit, best match first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub node_id: String,
    pub title: String,
}

/// SQLite-backed metadata index
#[derive(Clone)]
pub struct MetadataIndex {
    pool: SqlitePool,
}

impl MetadataIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Project a node into the index, replacing any existing row and its
    /// search entry.
    pub async fn upsert(&self, node: &Node) -> KnowledgeResult<()> {
        let pool = self.pool.clone();
        let node = node.clone();

        tokio::task::spawn_blocking(move || {
            pool.with_connection_mut(|conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    r#"
                    INSERT INTO node_metadata
                        (id, title, node_type, source, source_id, url, privacy_level,
                         tags, metadata, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                    ON CONFLICT(id) DO UPDATE SET
                        title = excluded.title,
                        node_type = excluded.node_type,
                        source = excluded.source,
                        source_id = excluded.source_id,
                        url = excluded.url,
                        privacy_level = excluded.privacy_level,
                        tags = excluded.tags,
                        metadata = excluded.metadata,
                        updated_at = excluded.updated_at
                    "#,
                    params![
                        node.id,
                        node.title,
                        node.node_type.as_str(),
                        node.source,
                        node.source_id,
                        node.url,
                        node.privacy_level.as_str(),
                        serde_json::to_string(&node.tags)?,
                        serde_json::to_string(&node.metadata)?,
                        node.created_at.to_rfc3339(),
                        node.updated_at.to_rfc3339(),
                    ],
                )?;

                tx.execute("DELETE FROM node_search WHERE node_id = ?1", [&node.id])?;
                tx.execute(
                    "INSERT INTO node_search (node_id, title, content) VALUES (?1, ?2, ?3)",
                    params![node.id, node.title, node.content.as_deref().unwrap_or("")],
                )?;

                tx.commit()?;
                Ok(())
            })
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
        .map_err(Into::into)
    }

    /// Remove a node's row and search entry. Idempotent: removing an absent
    /// row succeeds, which keeps delete compensation simple.
    pub async fn remove(&self, node_id: &str) -> KnowledgeResult<()> {
        let pool = self.pool.clone();
        let node_id = node_id.to_string();

        tokio::task::spawn_blocking(move || {
            pool.with_connection_mut(|conn| {
                let tx = conn.transaction()?;
                let deleted = tx.execute("DELETE FROM node_metadata WHERE id = ?1", [&node_id])?;
                tx.execute("DELETE FROM node_search WHERE node_id = ?1", [&node_id])?;
                tx.commit()?;
                debug!(node_id = %node_id, deleted, "Removed metadata row");
                Ok(())
            })
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
        .map_err(Into::into)
    }

    pub async fn exists(&self, node_id: &str) -> KnowledgeResult<bool> {
        let pool = self.pool.clone();
        let node_id = node_id.to_string();

        tokio::task::spawn_blocking(move || {
            pool.with_connection(|conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM node_metadata WHERE id = ?1",
                    [&node_id],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
        .map_err(Into::into)
    }

    pub async fn get(&self, node_id: &str) -> KnowledgeResult<Option<NodeMetadataRow>> {
        let pool = self.pool.clone();
        let node_id = node_id.to_string();

        tokio::task::spawn_blocking(move || {
            pool.with_connection(|conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, title, node_type, source, source_id, url, privacy_level,
                           tags, metadata, created_at, updated_at
                    FROM node_metadata
                    WHERE id = ?1
                    "#,
                )?;
                let row = stmt.query_row([&node_id], row_to_metadata).optional()?;
                Ok(row)
            })
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
        .map_err(Into::into)
    }

    /// List projected rows, newest first
    pub async fn list(&self, filter: &MetadataFilter) -> KnowledgeResult<Vec<NodeMetadataRow>> {
        let pool = self.pool.clone();
        let filter = filter.clone();

        tokio::task::spawn_blocking(move || {
            pool.with_connection(|conn| {
                let mut sql = String::from(
                    "SELECT id, title, node_type, source, source_id, url, privacy_level, \
                     tags, metadata, created_at, updated_at FROM node_metadata WHERE 1=1",
                );
                let mut args: Vec<String> = Vec::new();
                if let Some(node_type) = filter.node_type {
                    args.push(node_type.as_str().to_string());
                    sql.push_str(&format!(" AND node_type = ?{}", args.len()));
                }
                if let Some(source) = &filter.source {
                    args.push(source.clone());
                    sql.push_str(&format!(" AND source = ?{}", args.len()));
                }
                if let Some(privacy) = filter.privacy_level {
                    args.push(privacy.as_str().to_string());
                    sql.push_str(&format!(" AND privacy_level = ?{}", args.len()));
                }
                if let Some(ids) = &filter.ids {
                    if ids.is_empty() {
                        return Ok(Vec::new());
                    }
                    let placeholders: Vec<String> = ids
                        .iter()
                        .map(|id| {
                            args.push(id.clone());
                            format!("?{}", args.len())
                        })
                        .collect();
                    sql.push_str(&format!(" AND id IN ({})", placeholders.join(", ")));
                }
                sql.push_str(" ORDER BY created_at DESC, id");
                if let Some(limit) = filter.limit {
                    sql.push_str(&format!(" LIMIT {}", limit));
                    if let Some(offset) = filter.offset {
                        sql.push_str(&format!(" OFFSET {}", offset));
                    }
                }

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(args.iter()), row_to_metadata)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
        .map_err(Into::into)
    }

    /// Full-text search over titles and content, best match first.
    ///
    /// Terms are quoted before matching so caller input never hits the FTS
    /// query parser raw.
    pub async fn search(&self, query: &str, limit: usize) -> KnowledgeResult<Vec<SearchHit>> {
        let match_expr = fts_escape(query);
        if match_expr.is_empty() {
            return Ok(Vec::new());
        }
        let pool = self.pool.clone();

        tokio::task::spawn_blocking(move || {
            pool.with_connection(|conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT s.node_id, m.title
                    FROM node_search s
                    JOIN node_metadata m ON m.id = s.node_id
                    WHERE node_search MATCH ?1
                    ORDER BY rank
                    LIMIT ?2
                    "#,
                )?;
                let hits = stmt
                    .query_map(params![match_expr, limit as i64], |row| {
                        Ok(SearchHit {
                            node_id: row.get(0)?,
                            title: row.get(1)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(hits)
            })
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
        .map_err(Into::into)
    }

    /// All projected node ids, for reconciliation against the graph store
    pub async fn all_ids(&self) -> KnowledgeResult<Vec<String>> {
        let pool = self.pool.clone();

        tokio::task::spawn_blocking(move || {
            pool.with_connection(|conn| {
                let mut stmt = conn.prepare("SELECT id FROM node_metadata ORDER BY id")?;
                let ids = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(ids)
            })
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
        .map_err(Into::into)
    }

    /// Row counts grouped by node type
    pub async fn count_by_type(&self) -> KnowledgeResult<HashMap<String, usize>> {
        let pool = self.pool.clone();

        tokio::task::spawn_blocking(move || {
            pool.with_connection(|conn| {
                let mut stmt = conn
                    .prepare("SELECT node_type, COUNT(*) FROM node_metadata GROUP BY node_type")?;
                let counts = stmt
                    .query_map([], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
                    })?
                    .collect::<Result<HashMap<_, _>, _>>()?;
                Ok(counts)
            })
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
        .map_err(Into::into)
    }
}

/// Quote each whitespace-separated term so FTS operators in caller input are
/// matched literally.
fn fts_escape(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

fn row_to_metadata(row: &rusqlite::Row<'_>) -> rusqlite::Result<NodeMetadataRow> {
    let node_type: String = row.get(2)?;
    let privacy: String = row.get(6)?;
    let tags_json: String = row.get(7)?;
    let metadata_json: String = row.get(8)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(NodeMetadataRow {
        id: row.get(0)?,
        title: row.get(1)?,
        node_type: NodeType::parse(&node_type).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                Box::new(SqliteError::Serialization(e.to_string())),
            )
        })?,
        source: row.get(3)?,
        source_id: row.get(4)?,
        url: row.get(5)?,
        privacy_level: PrivacyLevel::parse(&privacy).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                Box::new(SqliteError::Serialization(e.to_string())),
            )
        })?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        created_at: parse_timestamp(&created_at, 9)?,
        updated_at: parse_timestamp(&updated_at, 10)?,
    })
}

fn parse_timestamp(raw: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::types::NodeDraft;

    fn sample_node(title: &str, node_type: NodeType) -> Node {
        let draft = NodeDraft::new(title, node_type).with_content("some content about rust");
        let now = Utc::now();
        Node {
            id: uuid::Uuid::new_v4().to_string(),
            title: draft.title,
            content: draft.content,
            node_type: draft.node_type,
            source: Some("test".into()),
            source_id: None,
            url: None,
            privacy_level: PrivacyLevel::Private,
            metadata: HashMap::new(),
            tags: vec!["rust".into()],
            created_at: now,
            updated_at: now,
        }
    }

    fn index() -> MetadataIndex {
        MetadataIndex::new(SqlitePool::memory().unwrap())
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let index = index();
        let node = sample_node("Ownership notes", NodeType::Note);
        index.upsert(&node).await.unwrap();

        let row = index.get(&node.id).await.unwrap().unwrap();
        assert_eq!(row.title, "Ownership notes");
        assert_eq!(row.node_type, NodeType::Note);
        assert_eq!(row.tags, vec!["rust".to_string()]);
    }

    #[tokio::test]
    async fn upsert_is_idempotent_per_id() {
        let index = index();
        let mut node = sample_node("v1", NodeType::Note);
        index.upsert(&node).await.unwrap();
        node.title = "v2".into();
        index.upsert(&node).await.unwrap();

        let row = index.get(&node.id).await.unwrap().unwrap();
        assert_eq!(row.title, "v2");
        assert_eq!(index.all_ids().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let index = index();
        let node = sample_node("gone", NodeType::Note);
        index.upsert(&node).await.unwrap();

        index.remove(&node.id).await.unwrap();
        assert!(index.get(&node.id).await.unwrap().is_none());
        // Second removal is a no-op, not an error
        index.remove(&node.id).await.unwrap();
    }

    #[tokio::test]
    async fn list_filters_by_type() {
        let index = index();
        index.upsert(&sample_node("a note", NodeType::Note)).await.unwrap();
        index
            .upsert(&sample_node("a person", NodeType::Person))
            .await
            .unwrap();

        let filter = MetadataFilter {
            node_type: Some(NodeType::Person),
            ..Default::default()
        };
        let rows = index.list(&filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "a person");
    }

    #[tokio::test]
    async fn list_restricts_to_id_set() {
        let index = index();
        let keep = sample_node("keep", NodeType::Note);
        index.upsert(&keep).await.unwrap();
        index.upsert(&sample_node("drop", NodeType::Note)).await.unwrap();

        let filter = MetadataFilter {
            ids: Some(vec![keep.id.clone()]),
            ..Default::default()
        };
        let rows = index.list(&filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, keep.id);

        // Empty id set matches nothing rather than everything
        let filter = MetadataFilter {
            ids: Some(vec![]),
            ..Default::default()
        };
        assert!(index.list(&filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exists_tracks_upsert_and_remove() {
        let index = index();
        let node = sample_node("here", NodeType::Note);
        assert!(!index.exists(&node.id).await.unwrap());
        index.upsert(&node).await.unwrap();
        assert!(index.exists(&node.id).await.unwrap());
        index.remove(&node.id).await.unwrap();
        assert!(!index.exists(&node.id).await.unwrap());
    }

    #[tokio::test]
    async fn search_finds_content_matches() {
        let index = index();
        let node = sample_node("Borrow checker", NodeType::Note);
        index.upsert(&node).await.unwrap();
        index
            .upsert(&sample_node("Unrelated", NodeType::Note))
            .await
            .unwrap();

        let hits = index.search("borrow", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node_id, node.id);
    }

    #[tokio::test]
    async fn search_tolerates_fts_operators() {
        let index = index();
        index.upsert(&sample_node("plain", NodeType::Note)).await.unwrap();
        // Raw operators would be a syntax error without escaping
        assert!(index.search("NEAR( \"x", 10).await.is_ok());
        assert!(index.search("", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn count_by_type_groups_rows() {
        let index = index();
        index.upsert(&sample_node("n1", NodeType::Note)).await.unwrap();
        index.upsert(&sample_node("n2", NodeType::Note)).await.unwrap();
        index.upsert(&sample_node("p1", NodeType::Person)).await.unwrap();

        let counts = index.count_by_type().await.unwrap();
        assert_eq!(counts.get("note"), Some(&2));
        assert_eq!(counts.get("person"), Some(&1));
    }
}
