//! Tag identity resolution.
//!
//! Tags are typed by users as free-form names, while prompts reference them by
//! identity. [`resolve_tags`] turns a list of [`TagRequest`]s into tags that
//! exist in the store, creating missing ones exactly once. The store's unique
//! constraint on `tags.name` decides races between concurrent creators: the
//! loser sees [`Error::Duplicate`] and adopts the winner's row.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::models::{Tag, TagId, TagRequest};

/// Storage operations needed to resolve tags
#[allow(async_fn_in_trait)]
pub trait TagStore {
    /// Look up a tag by identity
    async fn find_tag(&self, id: &TagId) -> Result<Option<Tag>>;

    /// Look up a tag by its exact name
    async fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// Insert a new tag
    ///
    /// Must fail with [`Error::Duplicate`] when the name is already taken.
    async fn insert_tag(&self, tag: &Tag) -> Result<()>;
}

/// Resolve requested tags to persisted tags.
///
/// The output holds at most one entry per id and per name, so it may be
/// shorter than the input. A request that cannot be resolved is logged and
/// dropped; it never aborts resolution of the others.
pub async fn resolve_tags<S: TagStore>(store: &S, requested: &[TagRequest]) -> Vec<Tag> {
    let mut resolved: Vec<Tag> = Vec::with_capacity(requested.len());
    let mut seen_ids = HashSet::new();
    let mut seen_names = HashSet::new();

    for request in requested {
        let name = request.name.trim();
        if request.id.is_none() && name.is_empty() {
            continue;
        }
        // Skip a second reference to a name already handled in this call
        if request.id.is_none() && seen_names.contains(name) {
            continue;
        }

        match resolve_one(store, request).await {
            Ok(Some(tag)) => {
                if seen_ids.insert(tag.id) && seen_names.insert(tag.name.clone()) {
                    resolved.push(tag);
                }
            }
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(tag = %request.name, "Dropping tag that failed to resolve: {error}");
            }
        }
    }

    resolved
}

async fn resolve_one<S: TagStore>(store: &S, request: &TagRequest) -> Result<Option<Tag>> {
    if let Some(id) = &request.id {
        if let Some(existing) = store.find_tag(id).await? {
            return Ok(Some(existing));
        }
    }

    let name = request.name.trim();
    if name.is_empty() {
        return Ok(None);
    }

    if let Some(existing) = store.find_tag_by_name(name).await? {
        return Ok(Some(existing));
    }

    let candidate = Tag::new(name, request.color.clone());
    match store.insert_tag(&candidate).await {
        Ok(()) => {
            tracing::debug!(tag = %candidate.name, id = %candidate.id, "Created tag");
            Ok(Some(candidate))
        }
        Err(Error::Duplicate(_)) => {
            // Lost a create race; the winner's row is authoritative
            let winner = store.find_tag_by_name(name).await?;
            if winner.is_none() {
                return Err(Error::Database(format!(
                    "tag '{name}' reported as duplicate but could not be re-read"
                )));
            }
            tracing::debug!(tag = %name, "Adopted concurrently created tag");
            Ok(winner)
        }
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory store that can simulate a concurrent writer winning a race
    #[derive(Default)]
    struct MemoryTagStore {
        tags: Mutex<Vec<Tag>>,
        /// Tag inserted by "another writer" right before our insert lands
        racing_winner: Mutex<Option<Tag>>,
        fail_inserts: AtomicBool,
        /// Inserts refused because the name was already taken
        duplicate_inserts: AtomicUsize,
    }

    impl MemoryTagStore {
        fn with_tags(tags: Vec<Tag>) -> Self {
            Self {
                tags: Mutex::new(tags),
                ..Self::default()
            }
        }

        fn count_named(&self, name: &str) -> usize {
            self.tags
                .lock()
                .unwrap()
                .iter()
                .filter(|tag| tag.name == name)
                .count()
        }
    }

    impl TagStore for MemoryTagStore {
        async fn find_tag(&self, id: &TagId) -> Result<Option<Tag>> {
            Ok(self.tags.lock().unwrap().iter().find(|t| t.id == *id).cloned())
        }

        async fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
            let found = self
                .tags
                .lock()
                .unwrap()
                .iter()
                .find(|t| t.name == name)
                .cloned();
            // Let another resolver run between this lookup and the insert
            tokio::task::yield_now().await;
            Ok(found)
        }

        async fn insert_tag(&self, tag: &Tag) -> Result<()> {
            if self.fail_inserts.load(Ordering::SeqCst) {
                return Err(Error::Database("disk full".to_string()));
            }
            let mut tags = self.tags.lock().unwrap();
            if let Some(winner) = self.racing_winner.lock().unwrap().take() {
                tags.push(winner);
            }
            if tags.iter().any(|t| t.name == tag.name) {
                self.duplicate_inserts.fetch_add(1, Ordering::SeqCst);
                return Err(Error::Duplicate(tag.name.clone()));
            }
            tags.push(tag.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn existing_identity_wins_over_callers_name_and_color() {
        let stored = Tag::new("work", Some("#111111".to_string()));
        let store = MemoryTagStore::with_tags(vec![stored.clone()]);

        let request = TagRequest {
            id: Some(stored.id),
            name: "renamed".to_string(),
            color: Some("#ffffff".to_string()),
        };
        let resolved = resolve_tags(&store, &[request]).await;

        assert_eq!(resolved, vec![stored]);
    }

    #[tokio::test]
    async fn unknown_identity_falls_back_to_name() {
        let stored = Tag::new("work", None);
        let store = MemoryTagStore::with_tags(vec![stored.clone()]);

        let request = TagRequest {
            id: Some(TagId::new()),
            name: "work".to_string(),
            color: None,
        };
        let resolved = resolve_tags(&store, &[request]).await;

        assert_eq!(resolved, vec![stored]);
    }

    #[tokio::test]
    async fn missing_tag_is_created_with_callers_color() {
        let store = MemoryTagStore::default();
        let request = TagRequest {
            id: None,
            name: " ideas ".to_string(),
            color: Some("#00ff00".to_string()),
        };

        let resolved = resolve_tags(&store, &[request]).await;

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].name, "ideas");
        assert_eq!(resolved[0].color, "#00ff00");
        assert_eq!(store.count_named("ideas"), 1);
    }

    #[tokio::test]
    async fn lost_create_race_adopts_winner_identity() {
        let winner = Tag::new("draft", None);
        let store = MemoryTagStore::default();
        *store.racing_winner.lock().unwrap() = Some(winner.clone());

        let resolved = resolve_tags(&store, &[TagRequest::named("draft")]).await;

        assert_eq!(resolved, vec![winner]);
        assert_eq!(store.count_named("draft"), 1);
    }

    #[tokio::test]
    async fn duplicate_requests_collapse_to_one_tag() {
        let existing = Tag::new("a", None);
        let store = MemoryTagStore::with_tags(vec![existing.clone()]);

        let requests = vec![
            TagRequest::named("a"),
            TagRequest::from(&existing),
            TagRequest::named("b"),
            TagRequest::named("b"),
            TagRequest::named("   "),
        ];
        let resolved = resolve_tags(&store, &requests).await;

        let names: Vec<_> = resolved.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(store.count_named("b"), 1);
    }

    #[tokio::test]
    async fn failed_insert_drops_only_that_tag() {
        let existing = Tag::new("kept", None);
        let store = MemoryTagStore::with_tags(vec![existing.clone()]);
        store.fail_inserts.store(true, Ordering::SeqCst);

        let resolved = resolve_tags(
            &store,
            &[TagRequest::named("new-one"), TagRequest::named("kept")],
        )
        .await;

        assert_eq!(resolved, vec![existing]);
    }

    #[tokio::test]
    async fn concurrent_resolvers_agree_on_identity() {
        let store = MemoryTagStore::default();
        let left = [TagRequest::named("shared")];
        let right = [TagRequest::named("shared")];

        let (first, second) = tokio::join!(resolve_tags(&store, &left), resolve_tags(&store, &right));

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(store.count_named("shared"), 1);
        // Both lookups missed, so exactly one insert lost the race and re-read
        assert_eq!(store.duplicate_inserts.load(Ordering::SeqCst), 1);
    }
}
