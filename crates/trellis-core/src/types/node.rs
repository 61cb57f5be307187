//! Node types: the entities of the knowledge graph.

use crate::error::{KnowledgeError, KnowledgeResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maximum title length accepted on create/update
pub const MAX_TITLE_LEN: usize = 500;

/// Kind of entity a node represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Note,
    Document,
    Person,
    Concept,
    Project,
    Company,
    Vendor,
    Technology,
    Location,
    Event,
    Task,
    Topic,
    Book,
    Article,
    Bookmark,
    Email,
    RssItem,
}

impl NodeType {
    /// Stable wire name, matching the serde representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Document => "document",
            Self::Person => "person",
            Self::Concept => "concept",
            Self::Project => "project",
            Self::Company => "company",
            Self::Vendor => "vendor",
            Self::Technology => "technology",
            Self::Location => "location",
            Self::Event => "event",
            Self::Task => "task",
            Self::Topic => "topic",
            Self::Book => "book",
            Self::Article => "article",
            Self::Bookmark => "bookmark",
            Self::Email => "email",
            Self::RssItem => "rss_item",
        }
    }

    /// Parse a wire name back into a node type
    pub fn parse(s: &str) -> KnowledgeResult<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| KnowledgeError::Validation(format!("unknown node type: {s}")))
    }
}

/// Privacy level controlling storage and provider routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyLevel {
    Public,
    #[default]
    Private,
    /// Routed to local providers only
    Sensitive,
    /// Encrypted at rest (mechanics out of scope here)
    Encrypted,
}

impl PrivacyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Sensitive => "sensitive",
            Self::Encrypted => "encrypted",
        }
    }

    pub fn parse(s: &str) -> KnowledgeResult<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| KnowledgeError::Validation(format!("unknown privacy level: {s}")))
    }
}

/// A node in the knowledge graph.
///
/// `content` is owned by the graph store; the relational index carries only
/// the projected core fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub title: String,
    pub content: Option<String>,
    pub node_type: NodeType,
    pub source: Option<String>,
    pub source_id: Option<String>,
    pub url: Option<String>,
    pub privacy_level: PrivacyLevel,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied draft for node creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDraft {
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    pub node_type: NodeType,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub privacy_level: PrivacyLevel,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NodeDraft {
    /// Minimal draft for the common case
    pub fn new(title: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            title: title.into(),
            content: None,
            node_type,
            source: None,
            source_id: None,
            url: None,
            privacy_level: PrivacyLevel::default(),
            metadata: HashMap::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Validate the create contract: title 1..=500 chars
    pub fn validate(&self) -> KnowledgeResult<()> {
        if self.title.trim().is_empty() {
            return Err(KnowledgeError::Validation("title must not be empty".into()));
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(KnowledgeError::Validation(format!(
                "title exceeds {MAX_TITLE_LEN} characters"
            )));
        }
        Ok(())
    }
}

/// Partial update; unset fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub node_type: Option<NodeType>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub privacy_level: Option<PrivacyLevel>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl NodeUpdate {
    pub fn validate(&self) -> KnowledgeResult<()> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(KnowledgeError::Validation("title must not be empty".into()));
            }
            if title.chars().count() > MAX_TITLE_LEN {
                return Err(KnowledgeError::Validation(format!(
                    "title exceeds {MAX_TITLE_LEN} characters"
                )));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.node_type.is_none()
            && self.url.is_none()
            && self.privacy_level.is_none()
            && self.metadata.is_none()
            && self.tags.is_none()
    }
}
