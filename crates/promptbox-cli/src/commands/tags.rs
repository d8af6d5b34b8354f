use std::path::Path;

use serde::Serialize;

use crate::commands::common::open_database;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct TagItem {
    pub id: String,
    pub name: String,
    pub color: String,
    pub prompts: usize,
}

pub async fn run_tags(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let tags = db
        .list_tags()
        .await?
        .into_iter()
        .map(|(tag, prompts)| TagItem {
            id: tag.id.to_string(),
            name: tag.name,
            color: tag.color,
            prompts,
        })
        .collect::<Vec<_>>();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&tags)?);
        return Ok(());
    }

    if tags.is_empty() {
        println!("No tags yet.");
    }
    for tag in &tags {
        println!("#{:<24} {:>4}  {}", tag.name, tag.prompts, tag.color);
    }
    Ok(())
}
