//! Remote tabular store access.
//!
//! [`RemoteTable`] is the contract the reconciliation engine consumes;
//! [`BitableClient`] implements it against a Bitable-style HTTP API.

mod client;
mod config;
mod retry;
pub mod wire;

pub use client::BitableClient;
pub use config::{parse_table_url, Credentials, RemoteConfig, TableLocation, DEFAULT_API_BASE};
pub use retry::{with_retry, RetryPolicy};

use thiserror::Error;

use crate::models::{PromptId, RemoteRecord, SyncRecord};

/// API codes meaning the tenant access token is invalid or expired
pub(crate) const TOKEN_EXPIRED_CODES: [i64; 2] = [99_991_663, 99_991_664];

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Remote HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Remote API error {code}: {msg}")]
    Api { code: i64, msg: String },
    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
}

impl RemoteError {
    /// Whether repeating the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(error) => !error.is_decode() && !error.is_builder(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Api { code, .. } => TOKEN_EXPIRED_CODES.contains(code),
            Self::InvalidConfiguration(_) | Self::InvalidPayload(_) => false,
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Outcome of one record within a batch call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Applied(PromptId),
    Failed { id: PromptId, reason: String },
}

impl RecordOutcome {
    pub const fn id(&self) -> PromptId {
        match self {
            Self::Applied(id) | Self::Failed { id, .. } => *id,
        }
    }

    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Operations the reconciliation engine needs from the remote store.
///
/// Batch calls report one outcome per input record; a single bad record must
/// not fail its whole batch.
#[allow(async_fn_in_trait)]
pub trait RemoteTable {
    /// Complete snapshot of the remote table, across all pages
    async fn list_all(&self) -> RemoteResult<Vec<RemoteRecord>>;

    /// Create one remote row per record
    async fn batch_create(&self, records: &[SyncRecord]) -> Vec<RecordOutcome>;

    /// Overwrite remote rows, each addressed by its row id
    async fn batch_update(&self, records: &[(String, SyncRecord)]) -> Vec<RecordOutcome>;
}
