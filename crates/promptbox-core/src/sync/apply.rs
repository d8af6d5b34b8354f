//! Listener that materializes remote-origin records into the local store.

use tokio::sync::mpsc;

use super::{LocalStore, SyncCancel};
use crate::db::UpsertOutcome;
use crate::models::{PromptId, SyncRecord};

/// A remote-origin record to write locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterializeRequest {
    Create(SyncRecord),
    Update(SyncRecord),
}

impl MaterializeRequest {
    pub const fn record(&self) -> &SyncRecord {
        match self {
            Self::Create(record) | Self::Update(record) => record,
        }
    }
}

/// What the applier did with the requests it received
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    pub created: u32,
    pub updated: u32,
    /// Requests skipped because the local copy became fresher
    pub stale: u32,
    /// Prompts whose local row changed
    pub changed: Vec<PromptId>,
    pub failures: Vec<(PromptId, String)>,
}

pub struct LocalApplier<'a, S> {
    store: &'a S,
    cancel: SyncCancel,
}

impl<'a, S: LocalStore> LocalApplier<'a, S> {
    pub const fn new(store: &'a S, cancel: SyncCancel) -> Self {
        Self { store, cancel }
    }

    /// Apply requests until the sender closes or the run is cancelled.
    pub async fn drain(self, mut requests: mpsc::Receiver<MaterializeRequest>) -> MaterializeReport {
        let mut report = MaterializeReport::default();

        while let Some(request) = requests.recv().await {
            if self.cancel.is_cancelled() {
                tracing::info!("Sync cancelled; stopping local materialization");
                break;
            }
            self.apply(request, &mut report).await;
        }

        report
    }

    async fn apply(&self, request: MaterializeRequest, report: &mut MaterializeReport) {
        let record = request.record();

        match self.store.upsert_from_remote(record).await {
            Ok(UpsertOutcome::Inserted) => {
                report.created += 1;
                report.changed.push(record.id);
            }
            Ok(UpsertOutcome::Updated) => {
                report.updated += 1;
                report.changed.push(record.id);
            }
            Ok(UpsertOutcome::Stale) => {
                tracing::warn!(id = %record.id, "Skipped stale remote copy");
                report.stale += 1;
            }
            Err(error) => {
                tracing::warn!(id = %record.id, "Failed to materialize prompt: {error}");
                report.failures.push((record.id, error.to_string()));
            }
        }
    }
}
