//! Insight types: AI-generated observations about the graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of an AI-generated insight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    Connection,
    Pattern,
    Contradiction,
    Gap,
    Trend,
    Recommendation,
    Summary,
}

impl InsightType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Pattern => "pattern",
            Self::Contradiction => "contradiction",
            Self::Gap => "gap",
            Self::Trend => "trend",
            Self::Recommendation => "recommendation",
            Self::Summary => "summary",
        }
    }
}

/// An observation produced by the analysis layer. Acknowledged or deleted by
/// the caller; never mutated otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    pub insight_type: InsightType,
    pub title: String,
    pub description: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    #[serde(default)]
    pub related_node_ids: Vec<String>,
    pub acknowledged: bool,
    pub created_at: DateTime<Utc>,
}

impl Insight {
    pub fn new(
        insight_type: InsightType,
        title: impl Into<String>,
        description: impl Into<String>,
        confidence: f64,
        related_node_ids: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            insight_type,
            title: title.into(),
            description: description.into(),
            confidence: confidence.clamp(0.0, 1.0),
            related_node_ids,
            acknowledged: false,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped() {
        let insight = Insight::new(InsightType::Trend, "t", "d", 1.7, vec![]);
        assert_eq!(insight.confidence, 1.0);
        assert!(!insight.acknowledged);
    }
}
