//! Prompt repository implementation

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::models::{Prompt, PromptId, SyncRecord, Tag, TagId};
use crate::tags::TagStore;
use libsql::params::Params;
use libsql::{Connection, Row, Value};

const PROMPT_COLUMNS: &str =
    "p.id, p.title, p.content, p.is_favorite, p.created_at, p.updated_at, p.last_used_at";

/// Result of writing a remote-origin record into the local store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The prompt did not exist locally and was created
    Inserted,
    /// The local prompt was overwritten
    Updated,
    /// The local prompt is fresher than the incoming copy; nothing was written
    Stale,
}

/// Trait for prompt storage operations (async)
#[allow(async_fn_in_trait)]
pub trait PromptRepository {
    /// Insert a new prompt and link its (already resolved) tags
    async fn create(&self, prompt: &Prompt) -> Result<()>;

    /// Get a prompt by ID
    async fn get(&self, id: &PromptId) -> Result<Option<Prompt>>;

    /// List prompts, favorites first then most recently updated.
    /// When `tag` is set, only prompts carrying that exact tag name.
    async fn list(&self, tag: Option<&str>) -> Result<Vec<Prompt>>;

    /// Overwrite a prompt's fields and tag links
    async fn update(&self, prompt: &Prompt) -> Result<()>;

    /// Record a use of the prompt without touching `updated_at`
    async fn touch_last_used(&self, id: &PromptId, used_at: i64) -> Result<()>;

    /// Write a remote-origin record with its resolved tags, atomically
    async fn upsert_synced(&self, record: &SyncRecord, tags: &[Tag]) -> Result<UpsertOutcome>;

    /// All tags with the number of prompts carrying each, by name
    async fn list_tags(&self) -> Result<Vec<(Tag, usize)>>;
}

/// libSQL implementation of `PromptRepository`
pub struct LibSqlPromptRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlPromptRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Run `BEGIN`, then `body`, then `COMMIT`, rolling back if anything fails
    async fn transaction<T>(&self, body: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        self.conn.execute("BEGIN IMMEDIATE", ()).await?;

        match body.await {
            Ok(value) => {
                if let Err(e) = self.conn.execute("COMMIT", ()).await {
                    self.conn.execute("ROLLBACK", ()).await.ok();
                    return Err(e.into());
                }
                Ok(value)
            }
            Err(error) => {
                self.conn.execute("ROLLBACK", ()).await.ok();
                Err(error)
            }
        }
    }

    async fn insert_row(&self, prompt: &SyncRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO prompts (id, title, content, is_favorite, created_at, updated_at, last_used_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    prompt.id.as_str(),
                    prompt.title.as_str(),
                    prompt.content.as_str(),
                    i32::from(prompt.is_favorite),
                    prompt.created_at,
                    prompt.updated_at,
                    optional_integer(prompt.last_used_at),
                ],
            )
            .await?;
        Ok(())
    }

    async fn update_row(&self, prompt: &SyncRecord) -> Result<u64> {
        let rows = self
            .conn
            .execute(
                "UPDATE prompts
                 SET title = ?, content = ?, is_favorite = ?, updated_at = ?, last_used_at = ?
                 WHERE id = ?",
                libsql::params![
                    prompt.title.as_str(),
                    prompt.content.as_str(),
                    i32::from(prompt.is_favorite),
                    prompt.updated_at,
                    optional_integer(prompt.last_used_at),
                    prompt.id.as_str(),
                ],
            )
            .await?;
        Ok(rows)
    }

    /// Replace all tag links of a prompt
    async fn replace_tag_links(&self, prompt_id: &PromptId, tags: &[Tag]) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM prompt_tags WHERE prompt_id = ?",
                [prompt_id.as_str()],
            )
            .await?;

        for tag in tags {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO prompt_tags (prompt_id, tag_id) VALUES (?, ?)",
                    [prompt_id.as_str(), tag.id.as_str()],
                )
                .await?;
        }

        Ok(())
    }

    /// Stored `(updated_at, last use or creation)`, the same key as `SyncRecord::freshness`
    async fn stored_freshness(&self, id: &PromptId) -> Result<Option<(i64, i64)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT updated_at, COALESCE(last_used_at, created_at) FROM prompts WHERE id = ?",
                [id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some((row.get::<i64>(0)?, row.get::<i64>(1)?))),
            None => Ok(None),
        }
    }

    async fn query_tags(&self, sql: &str, params: Vec<Value>) -> Result<Vec<(String, Tag)>> {
        let mut rows = self.conn.query(sql, Params::Positional(params)).await?;
        let mut links = Vec::new();
        while let Some(row) = rows.next().await? {
            let prompt_id: String = row.get(0)?;
            links.push((prompt_id, parse_tag(&row, 1)?));
        }
        Ok(links)
    }

    async fn query_prompts(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Prompt>> {
        let mut rows = self.conn.query(sql, Params::Positional(params)).await?;
        let mut prompts = Vec::new();
        while let Some(row) = rows.next().await? {
            prompts.push(parse_prompt(&row)?);
        }
        Ok(prompts)
    }

    async fn find_tag_where(&self, column: &str, value: String) -> Result<Option<Tag>> {
        let sql = format!("SELECT id, name, color, created_at FROM tags WHERE {column} = ?");
        let mut rows = self.conn.query(&sql, [value]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(parse_tag(&row, 0)?)),
            None => Ok(None),
        }
    }
}

impl PromptRepository for LibSqlPromptRepository<'_> {
    async fn create(&self, prompt: &Prompt) -> Result<()> {
        let record = SyncRecord::from(prompt);
        self.transaction(async {
            self.insert_row(&record).await?;
            self.replace_tag_links(&prompt.id, &prompt.tags).await
        })
        .await
    }

    async fn get(&self, id: &PromptId) -> Result<Option<Prompt>> {
        let sql = format!("SELECT {PROMPT_COLUMNS} FROM prompts p WHERE p.id = ?");
        let Some(mut prompt) = self
            .query_prompts(&sql, vec![Value::from(id.as_str())])
            .await?
            .pop()
        else {
            return Ok(None);
        };

        let links = self
            .query_tags(
                "SELECT pt.prompt_id, t.id, t.name, t.color, t.created_at
                 FROM prompt_tags pt JOIN tags t ON t.id = pt.tag_id
                 WHERE pt.prompt_id = ?
                 ORDER BY t.name",
                vec![Value::from(id.as_str())],
            )
            .await?;
        prompt.tags = links.into_iter().map(|(_, tag)| tag).collect();

        Ok(Some(prompt))
    }

    async fn list(&self, tag: Option<&str>) -> Result<Vec<Prompt>> {
        let (filter, params) = tag.map_or_else(
            || (String::new(), Vec::new()),
            |name| {
                (
                    "WHERE p.id IN (
                        SELECT pt.prompt_id FROM prompt_tags pt
                        JOIN tags t ON t.id = pt.tag_id
                        WHERE t.name = ?
                    )"
                    .to_string(),
                    vec![Value::from(name.to_string())],
                )
            },
        );
        let sql = format!(
            "SELECT {PROMPT_COLUMNS} FROM prompts p {filter}
             ORDER BY p.is_favorite DESC, p.updated_at DESC"
        );
        let mut prompts = self.query_prompts(&sql, params).await?;

        let links = self
            .query_tags(
                "SELECT pt.prompt_id, t.id, t.name, t.color, t.created_at
                 FROM prompt_tags pt JOIN tags t ON t.id = pt.tag_id
                 ORDER BY t.name",
                Vec::new(),
            )
            .await?;

        let mut by_prompt: HashMap<String, Vec<Tag>> = HashMap::new();
        for (prompt_id, tag) in links {
            by_prompt.entry(prompt_id).or_default().push(tag);
        }
        for prompt in &mut prompts {
            prompt.tags = by_prompt.remove(&prompt.id.as_str()).unwrap_or_default();
        }

        Ok(prompts)
    }

    async fn update(&self, prompt: &Prompt) -> Result<()> {
        let record = SyncRecord::from(prompt);
        self.transaction(async {
            if self.update_row(&record).await? == 0 {
                return Err(Error::NotFound(prompt.id.to_string()));
            }
            self.replace_tag_links(&prompt.id, &prompt.tags).await
        })
        .await
    }

    async fn touch_last_used(&self, id: &PromptId, used_at: i64) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE prompts SET last_used_at = ? WHERE id = ?",
                libsql::params![used_at, id.as_str()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn upsert_synced(&self, record: &SyncRecord, tags: &[Tag]) -> Result<UpsertOutcome> {
        self.transaction(async {
            let outcome = match self.stored_freshness(&record.id).await? {
                None => {
                    self.insert_row(record).await?;
                    UpsertOutcome::Inserted
                }
                Some(stored) if record.freshness() < stored => return Ok(UpsertOutcome::Stale),
                Some(_) => {
                    self.update_row(record).await?;
                    UpsertOutcome::Updated
                }
            };
            self.replace_tag_links(&record.id, tags).await?;
            Ok(outcome)
        })
        .await
    }

    async fn list_tags(&self) -> Result<Vec<(Tag, usize)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT t.id, t.name, t.color, t.created_at, COUNT(pt.prompt_id)
                 FROM tags t
                 LEFT JOIN prompt_tags pt ON pt.tag_id = t.id
                 GROUP BY t.id
                 ORDER BY t.name ASC",
                (),
            )
            .await?;

        let mut tags = Vec::new();
        while let Some(row) = rows.next().await? {
            let tag = parse_tag(&row, 0)?;
            let count = usize::try_from(row.get::<i64>(4)?).unwrap_or_default();
            tags.push((tag, count));
        }
        Ok(tags)
    }
}

impl TagStore for LibSqlPromptRepository<'_> {
    async fn find_tag(&self, id: &TagId) -> Result<Option<Tag>> {
        self.find_tag_where("id", id.as_str()).await
    }

    async fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        self.find_tag_where("name", name.to_string()).await
    }

    async fn insert_tag(&self, tag: &Tag) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO tags (id, name, color, created_at) VALUES (?, ?, ?, ?)",
                libsql::params![
                    tag.id.as_str(),
                    tag.name.as_str(),
                    tag.color.as_str(),
                    tag.created_at,
                ],
            )
            .await
            .map_err(|error| Error::from_insert(error, &tag.name))?;
        Ok(())
    }
}

fn optional_integer(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

/// Parse a prompt (without tags) from a row selected with `PROMPT_COLUMNS`
fn parse_prompt(row: &Row) -> Result<Prompt> {
    let id: String = row.get(0)?;
    let last_used_at = match row.get_value(6)? {
        Value::Integer(value) => Some(value),
        _ => None,
    };

    Ok(Prompt {
        id: id
            .parse()
            .map_err(|_| Error::Database(format!("invalid prompt id '{id}'")))?,
        title: row.get(1)?,
        content: row.get(2)?,
        tags: Vec::new(),
        is_favorite: row.get::<i32>(3)? != 0,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        last_used_at,
    })
}

/// Parse a tag from four consecutive columns starting at `offset`
fn parse_tag(row: &Row, offset: i32) -> Result<Tag> {
    let id: String = row.get(offset)?;
    Ok(Tag {
        id: id
            .parse()
            .map_err(|_| Error::Database(format!("invalid tag id '{id}'")))?,
        name: row.get(offset + 1)?,
        color: row.get(offset + 2)?,
        created_at: row.get(offset + 3)?,
    })
}
