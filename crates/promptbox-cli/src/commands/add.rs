use std::path::Path;

use crate::commands::common::{open_database, resolve_prompt_content, tag_requests};
use crate::error::CliError;

pub async fn run_add(
    title: &str,
    content_parts: &[String],
    tags: &[String],
    favorite: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let content = resolve_prompt_content(content_parts)?;

    let db = open_database(db_path).await?;
    let prompt = db
        .create_prompt(title, &content, &tag_requests(tags), favorite)
        .await?;

    println!("{}", prompt.id);
    Ok(())
}
