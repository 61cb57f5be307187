//! Append-only cost ledger over the `llm_requests` table.
//!
//! Implements [`CostSink`] so the LLM manager can record through the trait
//! seam; aggregation queries run directly against SQL. All window bounds are
//! optional; an unset bound is unbounded on that side.

use crate::connection::SqlitePool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use tracing::debug;
use trellis_core::error::{KnowledgeError, KnowledgeResult};
use trellis_core::traits::CostSink;
use trellis_core::types::CostRecord;

/// Spend and volume for one grouping key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Provider name, or "provider/model" for per-model breakdowns
    pub key: String,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub request_count: u64,
}

/// Spend over a window, with per-provider and per-model breakdowns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostSummary {
    /// Requested window bounds; `None` means unbounded on that side
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub request_count: u64,
    pub by_provider: Vec<CostBreakdown>,
    /// Keyed "provider/model"
    pub by_model: Vec<CostBreakdown>,
}

/// Per-model usage for one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelUsage {
    pub model: String,
    pub request_count: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub avg_latency_ms: f64,
}

/// Aggregate usage over a window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// 0.0 when no requests fall in the window
    pub success_rate: f64,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub avg_latency_ms: f64,
}

/// SQLite-backed cost ledger
#[derive(Clone)]
pub struct CostLedger {
    pool: SqlitePool,
}

// RFC3339 UTC timestamps compare correctly as strings, so window bounds are
// plain text comparisons against created_at.
fn window_clause(
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    args: &mut Vec<String>,
) -> String {
    let mut clause = String::from("1=1");
    if let Some(since) = since {
        args.push(since.to_rfc3339());
        clause.push_str(&format!(" AND created_at >= ?{}", args.len()));
    }
    if let Some(until) = until {
        args.push(until.to_rfc3339());
        clause.push_str(&format!(" AND created_at <= ?{}", args.len()));
    }
    clause
}

impl CostLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Total spend within the window
    pub async fn total_cost(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> KnowledgeResult<f64> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            pool.with_connection(|conn| {
                let mut args = Vec::new();
                let clause = window_clause(since, until, &mut args);
                let total: f64 = conn.query_row(
                    &format!("SELECT COALESCE(SUM(cost), 0) FROM llm_requests WHERE {clause}"),
                    rusqlite::params_from_iter(args.iter()),
                    |row| row.get(0),
                )?;
                Ok(total)
            })
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
        .map_err(Into::into)
    }

    /// Spend summary with per-provider and per-model breakdowns
    pub async fn cost_summary(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> KnowledgeResult<CostSummary> {
        let by_provider = self.breakdown("provider", since, until).await?;
        let by_model = self
            .breakdown("provider || '/' || model", since, until)
            .await?;
        let total_cost = by_provider.iter().map(|b| b.total_cost).sum();
        let total_tokens = by_provider.iter().map(|b| b.total_tokens).sum();
        let request_count = by_provider.iter().map(|b| b.request_count).sum();
        Ok(CostSummary {
            period_start: since,
            period_end: until,
            total_cost,
            total_tokens,
            request_count,
            by_provider,
            by_model,
        })
    }

    async fn breakdown(
        &self,
        key_expr: &'static str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> KnowledgeResult<Vec<CostBreakdown>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            pool.with_connection(|conn| {
                let mut args = Vec::new();
                let clause = window_clause(since, until, &mut args);
                let sql = format!(
                    "SELECT {key_expr} AS key, SUM(cost), SUM(total_tokens), COUNT(*) \
                     FROM llm_requests WHERE {clause} \
                     GROUP BY key ORDER BY SUM(cost) DESC, key"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(args.iter()), |row| {
                        Ok(CostBreakdown {
                            key: row.get(0)?,
                            total_cost: row.get(1)?,
                            total_tokens: row.get::<_, i64>(2)? as u64,
                            request_count: row.get::<_, i64>(3)? as u64,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
        .map_err(Into::into)
    }

    /// Per-model usage for one provider, largest spend first
    pub async fn provider_costs(
        &self,
        provider: &str,
        since: Option<DateTime<Utc>>,
    ) -> KnowledgeResult<Vec<ModelUsage>> {
        let pool = self.pool.clone();
        let provider = provider.to_string();
        tokio::task::spawn_blocking(move || {
            pool.with_connection(|conn| {
                let mut args = vec![provider];
                let clause = window_clause(since, None, &mut args);
                let sql = format!(
                    "SELECT model, COUNT(*), SUM(total_tokens), SUM(cost), AVG(latency_ms) \
                     FROM llm_requests WHERE provider = ?1 AND {clause} \
                     GROUP BY model ORDER BY SUM(cost) DESC, model"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(args.iter()), |row| {
                        Ok(ModelUsage {
                            model: row.get(0)?,
                            request_count: row.get::<_, i64>(1)? as u64,
                            total_tokens: row.get::<_, i64>(2)? as u64,
                            total_cost: row.get(3)?,
                            avg_latency_ms: row.get(4)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
        .map_err(Into::into)
    }

    /// Usage statistics over the window. An empty window yields all zeros
    /// rather than a division error.
    pub async fn usage_stats(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> KnowledgeResult<UsageStats> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            pool.with_connection(|conn| {
                let mut args = Vec::new();
                let clause = window_clause(since, None, &mut args);
                conn.query_row(
                    &format!(
                        "SELECT COUNT(*), \
                                COALESCE(SUM(success), 0), \
                                COALESCE(SUM(cost), 0), \
                                COALESCE(SUM(total_tokens), 0), \
                                COALESCE(AVG(latency_ms), 0) \
                         FROM llm_requests WHERE {clause}"
                    ),
                    rusqlite::params_from_iter(args.iter()),
                    |row| {
                        let total = row.get::<_, i64>(0)? as u64;
                        let successful = row.get::<_, i64>(1)? as u64;
                        let success_rate = if total == 0 {
                            0.0
                        } else {
                            successful as f64 / total as f64
                        };
                        Ok(UsageStats {
                            total_requests: total,
                            successful_requests: successful,
                            failed_requests: total - successful,
                            success_rate,
                            total_cost: row.get(2)?,
                            total_tokens: row.get::<_, i64>(3)? as u64,
                            avg_latency_ms: row.get(4)?,
                        })
                    },
                )
                .map_err(Into::into)
            })
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
        .map_err(Into::into)
    }

    /// Most recent records, newest first
    pub async fn recent(&self, limit: usize) -> KnowledgeResult<Vec<CostRecord>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            pool.with_connection(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT request_id, provider, model, purpose, prompt_tokens, \
                            completion_tokens, total_tokens, cost, latency_ms, success, \
                            error, created_at \
                     FROM llm_requests ORDER BY created_at DESC, request_id LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map([limit as i64], row_to_record)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
        .map_err(Into::into)
    }
}

#[async_trait]
impl CostSink for CostLedger {
    async fn record(&self, record: CostRecord) -> KnowledgeResult<()> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            pool.with_connection(|conn| {
                conn.execute(
                    r#"
                    INSERT INTO llm_requests
                        (request_id, provider, model, purpose, prompt_tokens,
                         completion_tokens, total_tokens, cost, latency_ms, success,
                         error, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                    "#,
                    params![
                        record.request_id,
                        record.provider,
                        record.model,
                        record.purpose,
                        record.prompt_tokens as i64,
                        record.completion_tokens as i64,
                        record.total_tokens as i64,
                        record.cost,
                        record.latency_ms as i64,
                        record.success,
                        record.error,
                        record.created_at.to_rfc3339(),
                    ],
                )?;
                debug!(
                    provider = %record.provider,
                    model = %record.model,
                    purpose = %record.purpose,
                    cost = record.cost,
                    success = record.success,
                    "Recorded model call"
                );
                Ok(())
            })
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
        .map_err(Into::into)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<CostRecord> {
    let created_at: String = row.get(11)?;
    Ok(CostRecord {
        request_id: row.get(0)?,
        provider: row.get(1)?,
        model: row.get(2)?,
        purpose: row.get(3)?,
        prompt_tokens: row.get::<_, i64>(4)? as u64,
        completion_tokens: row.get::<_, i64>(5)? as u64,
        total_tokens: row.get::<_, i64>(6)? as u64,
        cost: row.get(7)?,
        latency_ms: row.get::<_, i64>(8)? as u64,
        success: row.get(9)?,
        error: row.get(10)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    11,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ledger() -> CostLedger {
        CostLedger::new(SqlitePool::memory().unwrap())
    }

    fn success_record(provider: &str, model: &str, cost: f64, tokens: u64) -> CostRecord {
        CostRecord {
            request_id: Uuid::new_v4().to_string(),
            provider: provider.into(),
            model: model.into(),
            purpose: "tagging".into(),
            prompt_tokens: tokens / 2,
            completion_tokens: tokens - tokens / 2,
            total_tokens: tokens,
            cost,
            latency_ms: 150,
            success: true,
            error: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn empty_ledger_has_zero_stats() {
        let ledger = ledger();
        let stats = ledger.usage_stats(None).await.unwrap();
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(ledger.total_cost(None, None).await.unwrap(), 0.0);

        let summary = ledger.cost_summary(None, None).await.unwrap();
        assert_eq!(summary.request_count, 0);
        assert!(summary.by_provider.is_empty());
    }

    #[tokio::test]
    async fn summary_groups_by_provider_and_model() {
        let ledger = ledger();
        ledger
            .record(success_record("openai", "gpt-4", 0.03, 1000))
            .await
            .unwrap();
        ledger
            .record(success_record("openai", "gpt-3.5-turbo", 0.002, 500))
            .await
            .unwrap();
        ledger
            .record(success_record("ollama", "llama2", 0.0, 800))
            .await
            .unwrap();

        let summary = ledger.cost_summary(None, None).await.unwrap();
        assert_eq!(summary.request_count, 3);
        assert_eq!(summary.total_tokens, 2300);
        assert!((summary.total_cost - 0.032).abs() < 1e-9);
        assert!(summary.period_start.is_none());
        assert!(summary.period_end.is_none());

        assert_eq!(summary.by_provider.len(), 2);
        assert_eq!(summary.by_provider[0].key, "openai");
        assert_eq!(summary.by_provider[0].request_count, 2);

        assert_eq!(summary.by_model.len(), 3);
        assert_eq!(summary.by_model[0].key, "openai/gpt-4");

        // A bounded window is echoed back on the summary
        let start = Utc::now() - chrono::Duration::hours(1);
        let end = Utc::now() + chrono::Duration::hours(1);
        let windowed = ledger.cost_summary(Some(start), Some(end)).await.unwrap();
        assert_eq!(windowed.period_start, Some(start));
        assert_eq!(windowed.period_end, Some(end));
        assert_eq!(windowed.request_count, 3);
    }

    #[tokio::test]
    async fn provider_costs_break_down_per_model() {
        let ledger = ledger();
        ledger
            .record(success_record("openai", "gpt-4", 0.03, 1000))
            .await
            .unwrap();
        ledger
            .record(success_record("openai", "gpt-4", 0.06, 2000))
            .await
            .unwrap();
        ledger
            .record(success_record("ollama", "llama2", 0.0, 500))
            .await
            .unwrap();

        let usage = ledger.provider_costs("openai", None).await.unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].model, "gpt-4");
        assert_eq!(usage[0].request_count, 2);
        assert_eq!(usage[0].total_tokens, 3000);
        assert!((usage[0].total_cost - 0.09).abs() < 1e-9);
    }

    #[tokio::test]
    async fn window_bounds_filter_records() {
        let ledger = ledger();
        let mut old = success_record("ollama", "llama2", 0.0, 100);
        old.created_at = Utc::now() - chrono::Duration::days(2);
        ledger.record(old).await.unwrap();
        ledger
            .record(success_record("ollama", "llama2", 0.0, 200))
            .await
            .unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(1);
        let stats = ledger.usage_stats(Some(cutoff)).await.unwrap();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.total_tokens, 200);

        let all = ledger.usage_stats(None).await.unwrap();
        assert_eq!(all.total_requests, 2);
    }

    #[tokio::test]
    async fn failures_count_against_success_rate() {
        let ledger = ledger();
        ledger
            .record(success_record("ollama", "llama2", 0.0, 100))
            .await
            .unwrap();
        ledger
            .record(CostRecord::failure("ollama", "llama2", "tagging", 90, "timeout"))
            .await
            .unwrap();

        let stats = ledger.usage_stats(None).await.unwrap();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.failed_requests, 1);
        assert!((stats.success_rate - 0.5).abs() < f64::EPSILON);
        // Failed call contributes no cost or tokens
        assert_eq!(stats.total_tokens, 100);
    }

    #[tokio::test]
    async fn recent_returns_newest_first() {
        let ledger = ledger();
        let mut old = success_record("ollama", "llama2", 0.0, 10);
        old.created_at = Utc::now() - chrono::Duration::hours(1);
        ledger.record(old).await.unwrap();
        let fresh = success_record("ollama", "llama2", 0.0, 20);
        let fresh_id = fresh.request_id.clone();
        ledger.record(fresh).await.unwrap();

        let recent = ledger.recent(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].request_id, fresh_id);
    }
}
