use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use promptbox_core::remote::{BitableClient, Credentials, RemoteConfig};
use promptbox_core::services::DatabaseService;
use promptbox_core::{Prompt, PromptId, TagRequest};
use serde::Serialize;

use crate::cli::RemoteArgs;
use crate::error::CliError;

pub const APP_ID_ENV: &str = "PROMPTBOX_APP_ID";
pub const APP_SECRET_ENV: &str = "PROMPTBOX_APP_SECRET";
pub const TABLE_URL_ENV: &str = "PROMPTBOX_TABLE_URL";
const DB_PATH_ENV: &str = "PROMPTBOX_DB_PATH";

#[derive(Debug, Serialize)]
pub struct PromptListItem {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub content: String,
    pub tags: Vec<String>,
    pub is_favorite: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_used_at: Option<i64>,
    pub relative_time: String,
}

pub async fn open_database(path: &Path) -> Result<DatabaseService, CliError> {
    Ok(DatabaseService::open_path(path.to_path_buf()).await?)
}

pub async fn resolve_prompt(query: &str, db: &DatabaseService) -> Result<Prompt, CliError> {
    let query = normalize_prompt_identifier(query)?;
    if let Ok(prompt_id) = query.parse::<PromptId>() {
        if let Some(prompt) = db.get_prompt(&prompt_id).await? {
            return Ok(prompt);
        }
    }

    let mut matching = db
        .list_prompts(None)
        .await?
        .into_iter()
        .filter(|prompt| prompt.id.to_string().starts_with(&query))
        .collect::<Vec<_>>();

    match matching.len() {
        0 => Err(CliError::PromptNotFound(query)),
        1 => Ok(matching.remove(0)),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|prompt| short_id(&prompt.id))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousPromptId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &PromptId) -> String {
    id.to_string().chars().take(13).collect()
}

pub fn format_prompt_lines(prompts: &[Prompt]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    prompts
        .iter()
        .map(|prompt| {
            let marker = if prompt.is_favorite { "*" } else { " " };
            let title = truncate(&prompt.title, 32);
            let relative_time = format_relative_time(prompt.updated_at, now_ms);
            let tags = render_tags(prompt);

            if tags.is_empty() {
                format!("{marker} {}  {title:<32}  {relative_time}", short_id(&prompt.id))
            } else {
                format!(
                    "{marker} {}  {title:<32}  {relative_time:<10}  {tags}",
                    short_id(&prompt.id)
                )
            }
        })
        .collect()
}

pub fn prompt_to_list_item(prompt: &Prompt) -> PromptListItem {
    let now_ms = Utc::now().timestamp_millis();

    PromptListItem {
        id: prompt.id.to_string(),
        title: prompt.title.clone(),
        preview: prompt_preview(prompt, 80),
        content: prompt.content.clone(),
        tags: prompt.tag_names(),
        is_favorite: prompt.is_favorite,
        created_at: prompt.created_at,
        updated_at: prompt.updated_at,
        last_used_at: prompt.last_used_at,
        relative_time: format_relative_time(prompt.updated_at, now_ms),
    }
}

pub fn prompt_preview(prompt: &Prompt, max_chars: usize) -> String {
    let first_line = prompt.content_preview(usize::MAX);
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate(&collapsed, max_chars)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = text.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn render_tags(prompt: &Prompt) -> String {
    prompt
        .tag_names()
        .into_iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// Split `--tag` values on commas into tag requests
pub fn tag_requests(values: &[String]) -> Vec<TagRequest> {
    values
        .iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(TagRequest::named)
        .collect()
}

pub fn resolve_prompt_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input_with_initial("")? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_prompt_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyPromptId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_prompt_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            // EDITOR may carry arguments, e.g. "code --wait"
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let status = Command::new(program).args(parts).arg(file_path).status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_prompt_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("promptbox-{}-{now}.md", std::process::id()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("promptbox").join("promptbox.db"))
        .ok_or_else(|| {
            CliError::Config(format!(
                "could not resolve a data directory; pass --db-path or set {DB_PATH_ENV}"
            ))
        })
}

/// A flag value wins over the environment; blank values count as missing
pub fn pick_setting(flag: Option<String>, env_value: Option<String>) -> Option<String> {
    flag.into_iter()
        .chain(env_value)
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn required_setting(
    flag_value: Option<String>,
    setting: &'static str,
    flag: &'static str,
    env_name: &'static str,
) -> Result<String, CliError> {
    pick_setting(flag_value, env::var(env_name).ok()).ok_or(CliError::MissingSetting {
        setting,
        flag,
        env: env_name,
    })
}

pub fn remote_config(args: RemoteArgs) -> Result<RemoteConfig, CliError> {
    let app_id = required_setting(args.app_id, "app id", "app-id", APP_ID_ENV)?;
    let app_secret = required_setting(args.app_secret, "app secret", "app-secret", APP_SECRET_ENV)?;
    let table_url = required_setting(args.table_url, "table URL", "table-url", TABLE_URL_ENV)?;

    let mut config = RemoteConfig::new(Credentials::new(app_id, app_secret), &table_url)?;
    if let Some(secs) = args.timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    match args.api_base {
        Some(api_base) => Ok(config.with_api_base(api_base)?),
        None => Ok(config),
    }
}

pub fn remote_client(args: RemoteArgs) -> Result<BitableClient, CliError> {
    Ok(BitableClient::new(remote_config(args)?)?)
}
