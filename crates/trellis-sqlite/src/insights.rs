//! Persistence for AI-generated insights.

use crate::connection::SqlitePool;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use trellis_core::error::{KnowledgeError, KnowledgeResult};
use trellis_core::types::{Insight, InsightType};

/// SQLite-backed insight store
#[derive(Clone)]
pub struct InsightStore {
    pool: SqlitePool,
}

impl InsightStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn store(&self, insight: &Insight) -> KnowledgeResult<()> {
        let pool = self.pool.clone();
        let insight = insight.clone();
        tokio::task::spawn_blocking(move || {
            pool.with_connection(|conn| {
                conn.execute(
                    r#"
                    INSERT INTO insights
                        (id, insight_type, title, description, confidence,
                         related_node_ids, acknowledged, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                    params![
                        insight.id,
                        insight.insight_type.as_str(),
                        insight.title,
                        insight.description,
                        insight.confidence,
                        serde_json::to_string(&insight.related_node_ids)?,
                        insight.acknowledged,
                        insight.created_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
        .map_err(Into::into)
    }

    pub async fn get(&self, id: &str) -> KnowledgeResult<Option<Insight>> {
        let pool = self.pool.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            pool.with_connection(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, insight_type, title, description, confidence, \
                     related_node_ids, acknowledged, created_at \
                     FROM insights WHERE id = ?1",
                )?;
                let insight = stmt.query_row([&id], row_to_insight).optional()?;
                Ok(insight)
            })
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
        .map_err(Into::into)
    }

    /// Unacknowledged insights, newest first
    pub async fn pending(&self, limit: usize) -> KnowledgeResult<Vec<Insight>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            pool.with_connection(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, insight_type, title, description, confidence, \
                     related_node_ids, acknowledged, created_at \
                     FROM insights WHERE acknowledged = 0 \
                     ORDER BY created_at DESC, id LIMIT ?1",
                )?;
                let insights = stmt
                    .query_map([limit as i64], row_to_insight)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(insights)
            })
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
        .map_err(Into::into)
    }

    /// Mark an insight acknowledged; `NotFound` for unknown ids
    pub async fn acknowledge(&self, id: &str) -> KnowledgeResult<()> {
        let pool = self.pool.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            pool.with_connection(|conn| {
                let updated = conn.execute(
                    "UPDATE insights SET acknowledged = 1 WHERE id = ?1",
                    [&id],
                )?;
                if updated == 0 {
                    return Err(crate::error::SqliteError::NotFound(format!("insight {id}")));
                }
                Ok(())
            })
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
        .map_err(Into::into)
    }

    /// Remove an insight; `NotFound` for unknown ids
    pub async fn delete(&self, id: &str) -> KnowledgeResult<()> {
        let pool = self.pool.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            pool.with_connection(|conn| {
                let removed = conn.execute("DELETE FROM insights WHERE id = ?1", [&id])?;
                if removed == 0 {
                    return Err(crate::error::SqliteError::NotFound(format!("insight {id}")));
                }
                Ok(())
            })
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
        .map_err(Into::into)
    }
}

fn row_to_insight(row: &rusqlite::Row<'_>) -> rusqlite::Result<Insight> {
    let type_str: String = row.get(1)?;
    let related_json: String = row.get(5)?;
    let created_at: String = row.get(7)?;

    let insight_type: InsightType =
        serde_json::from_value(serde_json::Value::String(type_str)).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Insight {
        id: row.get(0)?,
        insight_type,
        title: row.get(2)?,
        description: row.get(3)?,
        confidence: row.get(4)?,
        related_node_ids: serde_json::from_str(&related_json).unwrap_or_default(),
        acknowledged: row.get(6)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    7,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InsightStore {
        InsightStore::new(SqlitePool::memory().unwrap())
    }

    #[tokio::test]
    async fn store_and_fetch_insight() {
        let store = store();
        let insight = Insight::new(
            InsightType::Connection,
            "Possible link",
            "These notes discuss the same project",
            0.8,
            vec!["n1".into(), "n2".into()],
        );
        store.store(&insight).await.unwrap();

        let fetched = store.get(&insight.id).await.unwrap().unwrap();
        assert_eq!(fetched.insight_type, InsightType::Connection);
        assert_eq!(fetched.related_node_ids, vec!["n1", "n2"]);
        assert!(!fetched.acknowledged);
    }

    #[tokio::test]
    async fn acknowledge_removes_from_pending() {
        let store = store();
        let insight = Insight::new(InsightType::Gap, "gap", "d", 0.5, vec![]);
        store.store(&insight).await.unwrap();
        assert_eq!(store.pending(10).await.unwrap().len(), 1);

        store.acknowledge(&insight.id).await.unwrap();
        assert!(store.pending(10).await.unwrap().is_empty());
        assert!(store.get(&insight.id).await.unwrap().unwrap().acknowledged);
    }

    #[tokio::test]
    async fn acknowledging_unknown_insight_fails() {
        let store = store();
        assert!(matches!(
            store.acknowledge("missing").await,
            Err(KnowledgeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let store = store();
        let insight = Insight::new(InsightType::Pattern, "p", "d", 0.5, vec![]);
        store.store(&insight).await.unwrap();

        store.delete(&insight.id).await.unwrap();
        assert!(store.get(&insight.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete(&insight.id).await,
            Err(KnowledgeError::NotFound(_))
        ));
    }
}
