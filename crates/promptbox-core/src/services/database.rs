//! Shared database service wrapper used by the CLI and the sync engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{Database, LibSqlPromptRepository, PromptRepository, UpsertOutcome};
use crate::models::{next_updated_at, Prompt, PromptId, SyncRecord, Tag, TagRequest};
use crate::sync::{LocalStore, SyncGuard};
use crate::tags::resolve_tags;
use crate::{Error, Result};

/// Field changes for [`DatabaseService::update_prompt`]; `None` keeps the value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    /// Replaces the whole tag list
    pub tags: Option<Vec<TagRequest>>,
    pub is_favorite: Option<bool>,
}

impl PromptChanges {
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.tags.is_none()
            && self.is_favorite.is_none()
    }
}

/// Thread-safe service for DB and repository operations.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
    sync_guard: SyncGuard,
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
            sync_guard: SyncGuard::new(),
        })
    }

    /// Open an in-memory database service (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
            sync_guard: SyncGuard::new(),
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Create a prompt, resolving its tags to local identities.
    pub async fn create_prompt(
        &self,
        title: &str,
        content: &str,
        tags: &[TagRequest],
        is_favorite: bool,
    ) -> Result<Prompt> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::InvalidInput("Prompt title cannot be empty".to_string()));
        }

        let db = self.db.lock().await;
        let repo = LibSqlPromptRepository::new(db.connection());

        let mut prompt = Prompt::new(title, content);
        prompt.is_favorite = is_favorite;
        prompt.tags = sorted(resolve_tags(&repo, tags).await);
        repo.create(&prompt).await?;

        tracing::debug!(id = %prompt.id, tags = prompt.tags.len(), "Created prompt");
        Ok(prompt)
    }

    /// Apply `changes` to a prompt and bump its `updated_at`.
    pub async fn update_prompt(&self, id: &PromptId, changes: PromptChanges) -> Result<Prompt> {
        if let Some(title) = &changes.title {
            if title.trim().is_empty() {
                return Err(Error::InvalidInput("Prompt title cannot be empty".to_string()));
            }
        }

        let db = self.db.lock().await;
        let repo = LibSqlPromptRepository::new(db.connection());

        let mut prompt = repo
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if changes.is_empty() {
            return Ok(prompt);
        }

        if let Some(title) = changes.title {
            prompt.title = title.trim().to_string();
        }
        if let Some(content) = changes.content {
            prompt.content = content;
        }
        if let Some(is_favorite) = changes.is_favorite {
            prompt.is_favorite = is_favorite;
        }
        if let Some(tags) = changes.tags {
            prompt.tags = sorted(resolve_tags(&repo, &tags).await);
        }
        prompt.updated_at = next_updated_at(prompt.updated_at);

        repo.update(&prompt).await?;
        Ok(prompt)
    }

    /// Fetch a prompt by id.
    pub async fn get_prompt(&self, id: &PromptId) -> Result<Option<Prompt>> {
        let db = self.db.lock().await;
        let repo = LibSqlPromptRepository::new(db.connection());
        repo.get(id).await
    }

    /// List prompts, favorites first, optionally only those carrying `tag`.
    pub async fn list_prompts(&self, tag: Option<&str>) -> Result<Vec<Prompt>> {
        let db = self.db.lock().await;
        let repo = LibSqlPromptRepository::new(db.connection());
        repo.list(tag).await
    }

    /// List tags and counts.
    pub async fn list_tags(&self) -> Result<Vec<(Tag, usize)>> {
        let db = self.db.lock().await;
        let repo = LibSqlPromptRepository::new(db.connection());
        repo.list_tags().await
    }

    /// Record that a prompt was used now.
    pub async fn mark_used(&self, id: &PromptId) -> Result<Prompt> {
        let db = self.db.lock().await;
        let repo = LibSqlPromptRepository::new(db.connection());

        let mut prompt = repo
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        // Strictly after the previous use and the creation time, so a use always counts as fresher
        let floor = prompt
            .last_used_at
            .unwrap_or(prompt.created_at)
            .max(prompt.created_at);
        let used_at = chrono::Utc::now()
            .timestamp_millis()
            .max(floor.saturating_add(1));
        repo.touch_last_used(id, used_at).await?;
        prompt.last_used_at = Some(used_at);
        Ok(prompt)
    }
}

fn sorted(mut tags: Vec<Tag>) -> Vec<Tag> {
    tags.sort_by(|left, right| left.name.cmp(&right.name));
    tags
}

impl LocalStore for DatabaseService {
    async fn list_all(&self) -> Result<Vec<SyncRecord>> {
        Ok(self
            .list_prompts(None)
            .await?
            .iter()
            .map(SyncRecord::from)
            .collect())
    }

    async fn get_by_id(&self, id: &PromptId) -> Result<Option<SyncRecord>> {
        Ok(self.get_prompt(id).await?.as_ref().map(SyncRecord::from))
    }

    async fn upsert_from_remote(&self, record: &SyncRecord) -> Result<UpsertOutcome> {
        let requests: Vec<TagRequest> = record
            .tags
            .iter()
            .map(|name| TagRequest::named(name.as_str()))
            .collect();

        let db = self.db.lock().await;
        let repo = LibSqlPromptRepository::new(db.connection());

        // Checked under the lock so no tags are created for a copy that loses
        if let Some(current) = repo.get(&record.id).await? {
            if SyncRecord::from(&current).freshness() > record.freshness() {
                return Ok(UpsertOutcome::Stale);
            }
        }

        let tags = resolve_tags(&repo, &requests).await;
        let outcome = repo.upsert_synced(record, &tags).await?;

        tracing::debug!(id = %record.id, ?outcome, "Materialized remote prompt");
        Ok(outcome)
    }

    fn sync_guard(&self) -> &SyncGuard {
        &self.sync_guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tags(names: &[&str]) -> Vec<TagRequest> {
        names.iter().map(|name| TagRequest::named(*name)).collect()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn in_memory_create_and_list_roundtrip() {
        let service = DatabaseService::open_in_memory().await.unwrap();

        let created = service
            .create_prompt("  Greeting ", "hello core", &tags(&["b", "a", "b"]), false)
            .await
            .unwrap();
        let prompts = service.list_prompts(None).await.unwrap();

        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0], created);
        assert_eq!(prompts[0].title, "Greeting");
        assert_eq!(prompts[0].tag_names(), vec!["a", "b"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_rejects_blank_title() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        let error = service.create_prompt("  ", "x", &[], false).await.unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_bumps_updated_at_and_replaces_tags() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        let prompt = service
            .create_prompt("t", "c", &tags(&["old"]), false)
            .await
            .unwrap();

        let updated = service
            .update_prompt(
                &prompt.id,
                PromptChanges {
                    content: Some("new content".to_string()),
                    tags: Some(tags(&["new"])),
                    is_favorite: Some(true),
                    ..PromptChanges::default()
                },
            )
            .await
            .unwrap();

        assert!(updated.updated_at > prompt.updated_at);
        assert_eq!(updated.created_at, prompt.created_at);
        assert!(updated.is_favorite);
        assert_eq!(updated.tag_names(), vec!["new"]);

        let stored = service.get_prompt(&prompt.id).await.unwrap().unwrap();
        assert_eq!(stored, updated);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_missing_prompt_is_not_found() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        let error = service
            .update_prompt(&PromptId::new(), PromptChanges::default())
            .await
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mark_used_does_not_bump_updated_at() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        let prompt = service.create_prompt("t", "c", &[], false).await.unwrap();

        let used = service.mark_used(&prompt.id).await.unwrap();
        let again = service.mark_used(&prompt.id).await.unwrap();

        assert!(used.last_used_at > Some(prompt.created_at));
        assert!(again.last_used_at > used.last_used_at);
        let stored = service.get_prompt(&prompt.id).await.unwrap().unwrap();
        assert_eq!(stored.updated_at, prompt.updated_at);
        assert_eq!(stored.last_used_at, again.last_used_at);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upsert_from_remote_reuses_existing_tags() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        let local = service
            .create_prompt("local", "x", &tags(&["shared"]), false)
            .await
            .unwrap();

        let mut record = SyncRecord::from(&Prompt::new("remote", "y"));
        record.tags = vec!["shared".to_string(), "fresh".to_string()];
        let outcome = service.upsert_from_remote(&record).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        let stored = service.get_prompt(&record.id).await.unwrap().unwrap();
        let shared = stored.tags.iter().find(|tag| tag.name == "shared").unwrap();
        assert_eq!(shared.id, local.tags[0].id);
        assert_eq!(service.list_tags().await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upsert_from_remote_skips_older_copy() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        let prompt = service.create_prompt("t", "c", &[], false).await.unwrap();

        let mut older = SyncRecord::from(&prompt);
        older.updated_at -= 1;
        older.content = "stale".to_string();

        let outcome = service.upsert_from_remote(&older).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Stale);
        let stored = service.get_by_id(&prompt.id).await.unwrap().unwrap();
        assert_eq!(stored.content, "c");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_writers_share_one_new_tag() {
        let service = DatabaseService::open_in_memory().await.unwrap();

        let mut handles = Vec::new();
        for index in 0..8 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                let mut record = SyncRecord::from(&Prompt::new(format!("p{index}"), "x"));
                record.tags = vec!["urgent".to_string()];
                service.upsert_from_remote(&record).await.unwrap();
                service
                    .create_prompt(&format!("local {index}"), "x", &tags(&["urgent"]), false)
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let tags = service.list_tags().await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].0.name, "urgent");
        assert_eq!(tags[0].1, 16);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn separate_handles_on_one_file_agree_on_new_tags() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("promptbox.db");
        let first = DatabaseService::open_path(&db_path).await.unwrap();
        let second = DatabaseService::open_path(&db_path).await.unwrap();

        let mut handles = Vec::new();
        for index in 0..8 {
            let service = if index % 2 == 0 {
                first.clone()
            } else {
                second.clone()
            };
            handles.push(tokio::spawn(async move {
                let mut record = SyncRecord::from(&Prompt::new(format!("p{index}"), "x"));
                record.tags = vec![format!("pair-{}", index / 2), "shared".to_string()];
                service.upsert_from_remote(&record).await.unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), UpsertOutcome::Inserted);
        }

        let counts: Vec<(String, usize)> = first
            .list_tags()
            .await
            .unwrap()
            .into_iter()
            .map(|(tag, count)| (tag.name, count))
            .collect();
        assert_eq!(
            counts,
            vec![
                ("pair-0".to_string(), 2),
                ("pair-1".to_string(), 2),
                ("pair-2".to_string(), 2),
                ("pair-3".to_string(), 2),
                ("shared".to_string(), 8),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_path_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("promptbox.db");

        let service = DatabaseService::open_path(&db_path).await.unwrap();
        service.create_prompt("t", "c", &[], false).await.unwrap();
        drop(service);

        let reopened = DatabaseService::open_path(&db_path).await.unwrap();
        assert_eq!(reopened.db_path(), Some(db_path.as_path()));
        assert_eq!(reopened.list_prompts(None).await.unwrap().len(), 1);
    }
}
