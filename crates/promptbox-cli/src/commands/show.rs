use std::path::Path;

use promptbox_core::Prompt;

use crate::commands::common::{
    format_timestamp, open_database, prompt_to_list_item, render_tags, resolve_prompt,
};
use crate::error::CliError;

pub async fn run_show(id: &str, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let prompt = resolve_prompt(id, &db).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&prompt_to_list_item(&prompt))?);
    } else {
        for line in render_prompt(&prompt) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn render_prompt(prompt: &Prompt) -> Vec<String> {
    let mut lines = vec![
        format!("id:        {}", prompt.id),
        format!("title:     {}", prompt.title),
        format!("favorite:  {}", if prompt.is_favorite { "yes" } else { "no" }),
        format!("tags:      {}", render_tags(prompt)),
        format!("created:   {}", format_timestamp(prompt.created_at)),
        format!("updated:   {}", format_timestamp(prompt.updated_at)),
    ];
    if let Some(last_used) = prompt.last_used_at {
        lines.push(format!("last used: {}", format_timestamp(last_used)));
    }
    lines.push(String::new());
    lines.push(prompt.content.clone());
    lines
}
