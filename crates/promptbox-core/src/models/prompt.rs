//! Prompt model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::Tag;

/// A unique identifier for a prompt, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PromptId(Uuid);

impl PromptId {
    /// Create a new unique prompt ID using UUID v7
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

impl Default for PromptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PromptId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A prompt in the local library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Unique identifier
    pub id: PromptId,
    /// Short display title
    pub title: String,
    /// Prompt body
    pub content: String,
    /// Resolved tags, sorted by name
    pub tags: Vec<Tag>,
    /// Favorite flag
    pub is_favorite: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last content/tag/favorite change (Unix ms)
    pub updated_at: i64,
    /// Last time the prompt was used (Unix ms)
    pub last_used_at: Option<i64>,
}

impl Prompt {
    /// Create a new prompt with the given title and content
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: PromptId::new(),
            title: title.into(),
            content: content.into(),
            tags: Vec::new(),
            is_favorite: false,
            created_at: now,
            updated_at: now,
            last_used_at: None,
        }
    }

    /// Tag names in display order
    #[must_use]
    pub fn tag_names(&self) -> Vec<String> {
        self.tags.iter().map(|tag| tag.name.clone()).collect()
    }

    /// Get first line of the content, truncated to `max_len` characters
    #[must_use]
    pub fn content_preview(&self, max_len: usize) -> String {
        self.content
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(max_len)
            .collect()
    }
}

/// Next `updated_at` value for a local mutation.
///
/// Always strictly greater than `previous` so that a local edit wins against
/// the snapshot it was made from, even within the same millisecond.
#[must_use]
pub fn next_updated_at(previous: i64) -> i64 {
    chrono::Utc::now()
        .timestamp_millis()
        .max(previous.saturating_add(1))
}
