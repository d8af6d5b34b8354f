use std::path::Path;

use promptbox_core::services::PromptChanges;

use crate::commands::common::{
    capture_editor_input_with_initial, open_database, resolve_prompt, tag_requests,
};
use crate::error::CliError;

/// Field edits given on the command line
#[derive(Debug, Default)]
pub struct EditArgs {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Vec<String>,
    pub clear_tags: bool,
    pub favorite: Option<bool>,
}

impl EditArgs {
    pub fn into_changes(self) -> PromptChanges {
        let tags = if self.clear_tags {
            Some(Vec::new())
        } else if self.tags.is_empty() {
            None
        } else {
            Some(tag_requests(&self.tags))
        };

        PromptChanges {
            title: self.title,
            content: self.content,
            tags,
            is_favorite: self.favorite,
        }
    }
}

pub async fn run_edit(id: &str, args: EditArgs, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let prompt = resolve_prompt(id, &db).await?;

    let mut changes = args.into_changes();
    if changes.is_empty() {
        let Some(edited_content) = capture_editor_input_with_initial(&prompt.content)? else {
            return Err(CliError::EmptyContent);
        };
        if edited_content == prompt.content {
            println!("{}", prompt.id);
            return Ok(());
        }
        changes.content = Some(edited_content);
    }

    let updated = db.update_prompt(&prompt.id, changes).await?;
    println!("{}", updated.id);
    Ok(())
}
