//! Tag model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Color assigned to tags created without one
pub const DEFAULT_TAG_COLOR: &str = "#6b7280";

/// A unique identifier for a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagId(Uuid);

impl TagId {
    /// Create a new unique tag ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for TagId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TagId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A label for organizing prompts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Unique identifier
    pub id: TagId,
    /// Tag name (case-sensitive, unique)
    pub name: String,
    /// Display color
    pub color: String,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

impl Tag {
    /// Create a new tag with the given name
    ///
    /// The name is trimmed; the case is preserved.
    #[must_use]
    pub fn new(name: impl Into<String>, color: Option<String>) -> Self {
        Self {
            id: TagId::new(),
            name: name.into().trim().to_string(),
            color: color.unwrap_or_else(|| DEFAULT_TAG_COLOR.to_string()),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// A caller's reference to a tag, by identity and/or by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRequest {
    /// Candidate identity, trusted only if it exists in the store
    pub id: Option<TagId>,
    /// Display name, used when the identity is absent or unknown
    pub name: String,
    /// Color for a newly created tag
    pub color: Option<String>,
}

impl TagRequest {
    /// Request a tag by name only
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            color: None,
        }
    }
}

impl From<&Tag> for TagRequest {
    fn from(tag: &Tag) -> Self {
        Self {
            id: Some(tag.id),
            name: tag.name.clone(),
            color: Some(tag.color.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_new_preserves_case() {
        let tag = Tag::new("  Rust ", None);
        assert_eq!(tag.name, "Rust");
        assert_eq!(tag.color, DEFAULT_TAG_COLOR);
    }

    #[test]
    fn test_tag_id_unique() {
        let id1 = TagId::new();
        let id2 = TagId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_tag_request_from_tag_keeps_identity() {
        let tag = Tag::new("work", Some("#ff0000".to_string()));
        let request = TagRequest::from(&tag);
        assert_eq!(request.id, Some(tag.id));
        assert_eq!(request.color.as_deref(), Some("#ff0000"));
    }
}
