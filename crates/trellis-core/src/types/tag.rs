//! Tag types: named labels with maintained usage counts and an optional
//! parent for hierarchy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalize a tag name for case-insensitive uniqueness: trim whitespace and
/// lowercase. Applied at every store boundary so "Rust" and "rust" merge.
pub fn normalize_tag_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A tag attachable to nodes.
///
/// Invariant: `usage_count` equals the number of currently existing nodes
/// carrying the tag, at every observation point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    /// Unique, case-normalized name
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    /// Parent tag name; the hierarchy must remain acyclic
    #[serde(default)]
    pub parent: Option<String>,
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
}

impl Tag {
    /// Fresh tag with a single use, as produced by a first merge
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: normalize_tag_name(name.as_ref()),
            description: None,
            color: None,
            parent: None,
            usage_count: 1,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_lowercases_and_trims() {
        assert_eq!(normalize_tag_name("  Rust Lang "), "rust lang");
        assert_eq!(normalize_tag_name("THERAPY"), "therapy");
    }

    #[test]
    fn new_tag_starts_at_one_use() {
        let tag = Tag::new("Project-X");
        assert_eq!(tag.name, "project-x");
        assert_eq!(tag.usage_count, 1);
        assert!(tag.parent.is_none());
    }
}
