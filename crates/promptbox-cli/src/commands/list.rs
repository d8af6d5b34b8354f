use std::path::Path;

use crate::commands::common::{
    format_prompt_lines, open_database, prompt_to_list_item, PromptListItem,
};
use crate::error::CliError;

pub async fn run_list(
    limit: usize,
    tag: Option<&str>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let mut prompts = db.list_prompts(tag).await?;
    prompts.truncate(limit);

    if as_json {
        let json_items = prompts
            .iter()
            .map(prompt_to_list_item)
            .collect::<Vec<PromptListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if prompts.is_empty() {
        println!("No prompts yet.");
    } else {
        for line in format_prompt_lines(&prompts) {
            println!("{line}");
        }
    }

    Ok(())
}
