//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Schema steps in order; each entry is applied once, inside its own transaction
const MIGRATIONS: &[(i32, &[&str])] = &[
    (
        1,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            "CREATE TABLE IF NOT EXISTS prompts (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                is_favorite INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                last_used_at INTEGER
            )",
            "CREATE INDEX IF NOT EXISTS idx_prompts_updated ON prompts(updated_at DESC)",
            // Case-sensitive uniqueness; the constraint arbitrates concurrent creates
            "CREATE TABLE IF NOT EXISTS tags (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                color TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS prompt_tags (
                prompt_id TEXT NOT NULL REFERENCES prompts(id) ON DELETE CASCADE,
                tag_id TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (prompt_id, tag_id)
            )",
            "CREATE INDEX IF NOT EXISTS idx_prompt_tags_tag ON prompt_tags(tag_id)",
        ],
    ),
    (
        2,
        &["CREATE INDEX IF NOT EXISTS idx_prompts_favorite ON prompts(is_favorite DESC, updated_at DESC)"],
    ),
];

/// Latest version in [`MIGRATIONS`]
const CURRENT_VERSION: i32 = 2;

/// Bring the schema up to [`CURRENT_VERSION`]
pub async fn run(conn: &Connection) -> Result<()> {
    let version = schema_version(conn).await?;
    if version >= CURRENT_VERSION {
        return Ok(());
    }

    for (target, statements) in MIGRATIONS.iter().filter(|(target, _)| *target > version) {
        apply_step(conn, *target, statements).await?;
    }

    Ok(())
}

/// Highest applied version, or 0 for a fresh file
async fn schema_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            (),
        )
        .await?;
    let has_table = match rows.next().await? {
        Some(row) => row.get::<i64>(0)? > 0,
        None => false,
    };
    if !has_table {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;
    match rows.next().await? {
        Some(row) => Ok(row.get(0)?),
        None => Ok(0),
    }
}

async fn apply_step(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    let applied = async {
        for statement in statements {
            conn.execute(statement, ()).await?;
        }
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            libsql::params![version],
        )
        .await?;
        conn.execute("COMMIT", ()).await?;
        Ok::<_, libsql::Error>(())
    }
    .await;

    if let Err(error) = applied {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(error.into());
    }

    tracing::info!(version, "Applied schema migration");
    Ok(())
}
