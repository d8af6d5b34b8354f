//! Sync-facing record and result models

use serde::{Deserialize, Serialize};

use super::{Prompt, PromptId};

/// One prompt as seen by reconciliation, with tags flattened to names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub id: PromptId,
    pub title: String,
    pub content: String,
    /// Tag display names; order is not significant
    pub tags: Vec<String>,
    pub is_favorite: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_used_at: Option<i64>,
}

impl SyncRecord {
    /// Ordering key for conflict direction: `updated_at`, then last use
    /// (falling back to creation time when the prompt was never used).
    #[must_use]
    pub fn freshness(&self) -> (i64, i64) {
        (
            self.updated_at,
            self.last_used_at.unwrap_or(self.created_at),
        )
    }
}

impl From<&Prompt> for SyncRecord {
    fn from(prompt: &Prompt) -> Self {
        Self {
            id: prompt.id,
            title: prompt.title.clone(),
            content: prompt.content.clone(),
            tags: prompt.tag_names(),
            is_favorite: prompt.is_favorite,
            created_at: prompt.created_at,
            updated_at: prompt.updated_at,
            last_used_at: prompt.last_used_at,
        }
    }
}

/// A record read from the remote table, with the remote row identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRecord {
    /// The remote store's own identifier, required to update the row
    pub row_id: String,
    pub record: SyncRecord,
}

/// Tally of one reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    pub message: String,
    pub local_created: u32,
    pub local_updated: u32,
    pub remote_created: u32,
    pub remote_updated: u32,
    /// Records whose create/update was rejected in this run
    pub failed: u32,
    /// Number of distinct prompt ids classified in this run
    pub total_processed: u32,
}

impl SyncResult {
    /// A run that stopped before any action was applied
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Number of records changed on either side
    #[must_use]
    pub const fn changed(&self) -> u32 {
        self.local_created + self.local_updated + self.remote_created + self.remote_updated
    }
}
