use std::path::Path;

use crate::commands::common::{open_database, resolve_prompt};
use crate::error::CliError;

pub async fn run_use(id: &str, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let prompt = resolve_prompt(id, &db).await?;
    db.mark_used(&prompt.id).await?;

    println!("{}", prompt.content);
    Ok(())
}
