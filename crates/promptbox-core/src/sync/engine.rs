//! Reconciliation run: snapshot, classify, apply, tally.

use std::future::Future;

use tokio::sync::{broadcast, mpsc};

use super::apply::{LocalApplier, MaterializeReport, MaterializeRequest};
use super::plan::{reconcile, SyncAction, SyncPlan};
use super::{LocalStore, SyncCancel, SyncEvent};
use crate::models::{PromptId, SyncRecord, SyncResult};
use crate::remote::{RecordOutcome, RemoteTable};

/// Records per remote batch call
pub const DEFAULT_BATCH_SIZE: usize = 100;
const MATERIALIZE_QUEUE: usize = 64;
const EVENT_CAPACITY: usize = 16;

pub const ALREADY_RUNNING: &str = "A sync is already in progress";

/// Result of pushing one stream of remote writes
#[derive(Debug, Default)]
struct PushReport {
    applied: u32,
    failures: Vec<(PromptId, String)>,
}

pub struct SyncEngine<R> {
    remote: R,
    batch_size: usize,
    events: Option<broadcast::Sender<SyncEvent>>,
}

impl<R: RemoteTable> SyncEngine<R> {
    pub const fn new(remote: R) -> Self {
        Self {
            remote,
            batch_size: DEFAULT_BATCH_SIZE,
            events: None,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Receive [`SyncEvent`]s from future runs
    pub fn subscribe(&mut self) -> broadcast::Receiver<SyncEvent> {
        self.events
            .get_or_insert_with(|| broadcast::channel(EVENT_CAPACITY).0)
            .subscribe()
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    /// Reconcile `store` with the remote table once.
    ///
    /// Never fails: every error ends up in the returned [`SyncResult`]. A run
    /// started while another holds the store's guard returns immediately.
    pub async fn run<S: LocalStore>(&self, store: &S, cancel: &SyncCancel) -> SyncResult {
        let Some(_running) = store.sync_guard().try_acquire() else {
            tracing::warn!("Refusing to start a second concurrent sync");
            return SyncResult::failure(ALREADY_RUNNING);
        };

        tracing::info!(batch_size = self.batch_size, "Starting sync");
        let result = self.run_locked(store, cancel).await;
        if result.success {
            tracing::info!(
                local_created = result.local_created,
                local_updated = result.local_updated,
                remote_created = result.remote_created,
                remote_updated = result.remote_updated,
                total = result.total_processed,
                "Sync finished"
            );
        } else {
            tracing::warn!(failed = result.failed, "Sync finished with errors: {}", result.message);
        }

        self.emit(SyncEvent::Completed(result.clone()));
        result
    }

    async fn run_locked<S: LocalStore>(&self, store: &S, cancel: &SyncCancel) -> SyncResult {
        let local = match store.list_all().await {
            Ok(records) => records,
            Err(error) => return SyncResult::failure(format!("Failed to read local prompts: {error}")),
        };
        if cancel.is_cancelled() {
            return SyncResult::failure("Sync cancelled");
        }

        let remote = match self.remote.list_all().await {
            Ok(rows) => rows,
            Err(error) => {
                return SyncResult::failure(format!("Failed to list remote records: {error}"))
            }
        };

        let plan = reconcile(&local, &remote);
        tracing::debug!(
            local = local.len(),
            remote = remote.len(),
            actions = plan.len(),
            "Reconciled snapshots"
        );
        let total_processed = count(plan.len());
        let work = Work::from(plan);

        let (sender, receiver) = mpsc::channel(MATERIALIZE_QUEUE);
        let applier = LocalApplier::new(store, cancel.clone());

        let (created, updated, materialized, ()) = tokio::join!(
            self.push("batch_create", work.creates.as_slice(), cancel, |batch| {
                self.remote.batch_create(batch)
            }),
            self.push("batch_update", work.updates.as_slice(), cancel, |batch| {
                self.remote.batch_update(batch)
            }),
            applier.drain(receiver),
            feed(sender, work.materialize, cancel),
        );

        if !materialized.changed.is_empty() {
            self.emit(SyncEvent::LocalChanged(materialized.changed.clone()));
        }

        tally(total_processed, &created, &updated, &materialized, cancel)
    }

    /// Send `items` to the remote in batches, stopping early on cancellation.
    async fn push<'a, T, F, Fut>(
        &self,
        operation: &str,
        items: &'a [T],
        cancel: &SyncCancel,
        call: F,
    ) -> PushReport
    where
        F: Fn(&'a [T]) -> Fut,
        Fut: Future<Output = Vec<RecordOutcome>>,
    {
        let mut report = PushReport::default();

        for (index, batch) in items.chunks(self.batch_size).enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(operation, "Sync cancelled; skipping remaining batches");
                break;
            }

            tracing::debug!(operation, batch = index, size = batch.len(), "Sending batch");
            for outcome in call(batch).await {
                match outcome {
                    RecordOutcome::Applied(_) => report.applied += 1,
                    RecordOutcome::Failed { id, reason } => {
                        tracing::warn!(operation, %id, "Remote write failed: {reason}");
                        report.failures.push((id, reason));
                    }
                }
            }
        }

        report
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(events) = &self.events {
            // No subscribers is fine
            let _ = events.send(event);
        }
    }
}

/// A plan split into the three streams the engine runs concurrently
struct Work {
    creates: Vec<SyncRecord>,
    updates: Vec<(String, SyncRecord)>,
    materialize: Vec<MaterializeRequest>,
}

impl From<SyncPlan> for Work {
    fn from(plan: SyncPlan) -> Self {
        let mut work = Self {
            creates: Vec::new(),
            updates: Vec::new(),
            materialize: Vec::new(),
        };
        for action in plan.actions {
            match action {
                SyncAction::CreateRemote(record) => work.creates.push(record),
                SyncAction::UpdateRemote { row_id, record } => work.updates.push((row_id, record)),
                SyncAction::CreateLocal(record) => {
                    work.materialize.push(MaterializeRequest::Create(record));
                }
                SyncAction::UpdateLocal(record) => {
                    work.materialize.push(MaterializeRequest::Update(record));
                }
                SyncAction::NoOp(_) => {}
            }
        }
        work
    }
}

async fn feed(
    sender: mpsc::Sender<MaterializeRequest>,
    requests: Vec<MaterializeRequest>,
    cancel: &SyncCancel,
) {
    for request in requests {
        if cancel.is_cancelled() || sender.send(request).await.is_err() {
            break;
        }
    }
}

fn tally(
    total_processed: u32,
    created: &PushReport,
    updated: &PushReport,
    materialized: &MaterializeReport,
    cancel: &SyncCancel,
) -> SyncResult {
    let failures: Vec<&(PromptId, String)> = created
        .failures
        .iter()
        .chain(&updated.failures)
        .chain(&materialized.failures)
        .collect();

    let mut result = SyncResult {
        success: true,
        message: String::new(),
        local_created: materialized.created,
        local_updated: materialized.updated,
        remote_created: created.applied,
        remote_updated: updated.applied,
        failed: count(failures.len()),
        total_processed,
    };
    let changed = result.changed();

    if cancel.is_cancelled() {
        result.success = false;
        result.message = format!("Sync cancelled after {changed} changes");
    } else if let Some((id, reason)) = failures.first() {
        result.success = false;
        result.message = format!(
            "{} of {} changes failed (first: {id}: {reason})",
            result.failed,
            changed + result.failed
        );
    } else if changed == 0 {
        result.message = "Everything is up to date".to_string();
    } else {
        result.message = format!("Synced {changed} changes");
    }

    result
}

fn count(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
