//! Bidirectional reconciliation between the local store and a remote table.
//!
//! A run takes a snapshot of both sides, classifies every prompt id with
//! [`reconcile`], then applies the resulting actions: remote writes in
//! batches, local writes through a [`LocalApplier`] fed over a channel.
//! Runs are idempotent; recovering from a failed run means running again.

mod apply;
mod engine;
mod plan;

pub use apply::{LocalApplier, MaterializeReport, MaterializeRequest};
pub use engine::{SyncEngine, ALREADY_RUNNING, DEFAULT_BATCH_SIZE};
pub use plan::{reconcile, SyncAction, SyncPlan};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::db::UpsertOutcome;
use crate::error::Result;
use crate::models::{PromptId, SyncRecord, SyncResult};
use crate::remote::{BitableClient, Credentials, RemoteConfig};

/// Local side of a sync run
#[allow(async_fn_in_trait)]
pub trait LocalStore {
    /// Every local prompt
    async fn list_all(&self) -> Result<Vec<SyncRecord>>;

    async fn get_by_id(&self, id: &PromptId) -> Result<Option<SyncRecord>>;

    /// Write a remote-origin record, resolving its tag names to local tags.
    ///
    /// Returns [`UpsertOutcome::Stale`] without writing when the stored copy
    /// has a newer `updated_at`.
    async fn upsert_from_remote(&self, record: &SyncRecord) -> Result<UpsertOutcome>;

    /// Run-level mutual exclusion shared by every engine using this store
    fn sync_guard(&self) -> &SyncGuard;
}

/// Allows one sync run at a time
#[derive(Debug, Clone, Default)]
pub struct SyncGuard {
    lock: Arc<Mutex<()>>,
}

impl SyncGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the guard if no run holds it; released on drop
    pub fn try_acquire(&self) -> Option<OwnedMutexGuard<()>> {
        Arc::clone(&self.lock).try_lock_owned().ok()
    }

    pub fn is_running(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

/// Cooperative cancellation, honored between batches
#[derive(Debug, Clone, Default)]
pub struct SyncCancel(Arc<AtomicBool>);

impl SyncCancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Notifications for whoever displays local data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// These prompts were written from remote data
    LocalChanged(Vec<PromptId>),
    Completed(SyncResult),
}

/// Sync `store` with the table at `table_url` using default settings.
///
/// Configuration problems are reported in the result like any other failure.
pub async fn run_sync<S: LocalStore>(
    credentials: Credentials,
    table_url: &str,
    store: &S,
) -> SyncResult {
    let client = match RemoteConfig::new(credentials, table_url).and_then(BitableClient::new) {
        Ok(client) => client,
        Err(error) => {
            tracing::warn!("Sync not started: {error}");
            return SyncResult::failure(error.to_string());
        }
    };

    SyncEngine::new(client).run(store, &SyncCancel::new()).await
}
