//! Pure classification of local and remote snapshots into sync actions.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{PromptId, RemoteRecord, SyncRecord};

/// What to do with one prompt id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Only the local store has it
    CreateRemote(SyncRecord),
    /// Both have it and the local copy is fresher
    UpdateRemote { row_id: String, record: SyncRecord },
    /// Only the remote table has it
    CreateLocal(SyncRecord),
    /// Both have it and the remote copy is fresher
    UpdateLocal(SyncRecord),
    /// Already consistent
    NoOp(PromptId),
}

impl SyncAction {
    pub const fn id(&self) -> PromptId {
        match self {
            Self::CreateRemote(record)
            | Self::CreateLocal(record)
            | Self::UpdateLocal(record)
            | Self::UpdateRemote { record, .. } => record.id,
            Self::NoOp(id) => *id,
        }
    }
}

/// Actions for every id in the union of both snapshots, ordered by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub actions: Vec<SyncAction>,
}

impl SyncPlan {
    /// Number of distinct ids classified
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// True when no action changes either side
    pub fn is_settled(&self) -> bool {
        self.actions
            .iter()
            .all(|action| matches!(action, SyncAction::NoOp(_)))
    }

    pub fn count(&self, predicate: impl Fn(&SyncAction) -> bool) -> usize {
        self.actions.iter().filter(|action| predicate(action)).count()
    }
}

/// Classify every prompt id present on either side.
///
/// When both sides hold an id, the side with the greater
/// [`SyncRecord::freshness`] wins; equal freshness is a no-op. Remote rows
/// that share an id collapse to the freshest one.
pub fn reconcile(local: &[SyncRecord], remote: &[RemoteRecord]) -> SyncPlan {
    let local_by_id: BTreeMap<PromptId, &SyncRecord> =
        local.iter().map(|record| (record.id, record)).collect();

    let mut remote_by_id: BTreeMap<PromptId, &RemoteRecord> = BTreeMap::new();
    for row in remote {
        match remote_by_id.get(&row.record.id) {
            Some(kept) if kept.record.freshness() >= row.record.freshness() => {
                tracing::warn!(
                    id = %row.record.id,
                    ignored_row = %row.row_id,
                    kept_row = %kept.row_id,
                    "Duplicate remote rows for one prompt"
                );
            }
            Some(kept) => {
                tracing::warn!(
                    id = %row.record.id,
                    ignored_row = %kept.row_id,
                    kept_row = %row.row_id,
                    "Duplicate remote rows for one prompt"
                );
                remote_by_id.insert(row.record.id, row);
            }
            None => {
                remote_by_id.insert(row.record.id, row);
            }
        }
    }

    let ids: BTreeSet<PromptId> = local_by_id
        .keys()
        .chain(remote_by_id.keys())
        .copied()
        .collect();

    let actions = ids
        .into_iter()
        .map(|id| match (local_by_id.get(&id), remote_by_id.get(&id)) {
            (Some(local), None) => SyncAction::CreateRemote((*local).clone()),
            (None, Some(remote)) => SyncAction::CreateLocal(remote.record.clone()),
            (Some(local), Some(remote)) => {
                match local.freshness().cmp(&remote.record.freshness()) {
                    Ordering::Greater => SyncAction::UpdateRemote {
                        row_id: remote.row_id.clone(),
                        record: (*local).clone(),
                    },
                    Ordering::Less => SyncAction::UpdateLocal(remote.record.clone()),
                    Ordering::Equal => SyncAction::NoOp(id),
                }
            }
            (None, None) => SyncAction::NoOp(id),
        })
        .collect();

    SyncPlan { actions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(updated_at: i64) -> SyncRecord {
        SyncRecord {
            id: PromptId::new(),
            title: "title".to_string(),
            content: "content".to_string(),
            tags: vec!["t".to_string()],
            is_favorite: false,
            created_at: 1,
            updated_at,
            last_used_at: None,
        }
    }

    fn row(row_id: &str, record: &SyncRecord) -> RemoteRecord {
        RemoteRecord {
            row_id: row_id.to_string(),
            record: record.clone(),
        }
    }

    #[test]
    fn conflict_direction_follows_updated_at() {
        let base = record(100);

        let mut newer = base.clone();
        newer.updated_at = 200;

        let plan = reconcile(&[newer.clone()], &[row("r1", &base)]);
        assert_eq!(
            plan.actions,
            vec![SyncAction::UpdateRemote {
                row_id: "r1".to_string(),
                record: newer.clone(),
            }]
        );

        let plan = reconcile(&[base.clone()], &[row("r1", &newer)]);
        assert_eq!(plan.actions, vec![SyncAction::UpdateLocal(newer)]);

        let plan = reconcile(&[base.clone()], &[row("r1", &base)]);
        assert_eq!(plan.actions, vec![SyncAction::NoOp(base.id)]);
    }

    #[test]
    fn equal_updated_at_is_broken_by_last_use() {
        let base = record(100);
        let mut used = base.clone();
        used.last_used_at = Some(500);

        let plan = reconcile(&[used.clone()], &[row("r1", &base)]);
        assert!(matches!(plan.actions[0], SyncAction::UpdateRemote { .. }));

        let plan = reconcile(&[base], &[row("r1", &used)]);
        assert_eq!(plan.actions, vec![SyncAction::UpdateLocal(used)]);
    }

    #[test]
    fn one_sided_records_become_creates() {
        let only_local = record(10);
        let only_remote = record(20);

        let plan = reconcile(&[only_local.clone()], &[row("r2", &only_remote)]);

        assert_eq!(plan.len(), 2);
        assert!(plan
            .actions
            .contains(&SyncAction::CreateRemote(only_local)));
        assert!(plan
            .actions
            .contains(&SyncAction::CreateLocal(only_remote)));
    }

    #[test]
    fn identical_snapshots_are_settled() {
        let records: Vec<SyncRecord> = (0..5).map(record).collect();
        let rows: Vec<RemoteRecord> = records
            .iter()
            .enumerate()
            .map(|(index, record)| row(&format!("r{index}"), record))
            .collect();

        let plan = reconcile(&records, &rows);

        assert_eq!(plan.len(), 5);
        assert!(plan.is_settled());
    }

    #[test]
    fn empty_snapshots_give_empty_plan() {
        let plan = reconcile(&[], &[]);
        assert!(plan.is_empty());
        assert!(plan.is_settled());
    }

    #[test]
    fn actions_are_ordered_by_id() {
        let records: Vec<SyncRecord> = (0..10).map(record).collect();
        let mut rows: Vec<RemoteRecord> = records[5..]
            .iter()
            .map(|record| row("r", record))
            .collect();
        rows.reverse();

        let plan = reconcile(&records[..5], &rows);
        let ids: Vec<PromptId> = plan.actions.iter().map(SyncAction::id).collect();
        let mut sorted = ids.clone();
        sorted.sort();

        assert_eq!(ids, sorted);
    }

    #[test]
    fn duplicate_remote_rows_keep_freshest() {
        let stale = record(100);
        let mut fresh = stale.clone();
        fresh.updated_at = 300;
        fresh.title = "fresh".to_string();

        let mut local = stale.clone();
        local.updated_at = 200;

        let plan = reconcile(&[local], &[row("old", &stale), row("new", &fresh)]);
        assert_eq!(plan.actions, vec![SyncAction::UpdateLocal(fresh.clone())]);

        let plan = reconcile(&[], &[row("new", &fresh), row("old", &stale)]);
        assert_eq!(plan.actions, vec![SyncAction::CreateLocal(fresh)]);
    }

    #[test]
    fn count_by_kind() {
        let plan = reconcile(&[record(1), record(2)], &[]);
        assert_eq!(
            plan.count(|action| matches!(action, SyncAction::CreateRemote(_))),
            2
        );
        assert!(!plan.is_settled());
    }
}
