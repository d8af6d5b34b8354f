use std::path::Path;

use promptbox_core::remote::wire::missing_fields;
use promptbox_core::remote::RemoteTable;
use promptbox_core::sync::{SyncCancel, SyncEngine};
use promptbox_core::SyncResult;

use crate::cli::RemoteArgs;
use crate::commands::common::{open_database, remote_client};
use crate::error::CliError;

pub async fn run_sync(
    remote: RemoteArgs,
    batch_size: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let client = remote_client(remote)?;
    let db = open_database(db_path).await?;
    let engine = SyncEngine::new(client).with_batch_size(batch_size);

    let cancel = SyncCancel::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling after the current batch...");
            on_interrupt.cancel();
        }
    });

    let result = engine.run(&db, &cancel).await;
    interrupt.abort();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for line in format_sync_result(&result) {
            println!("{line}");
        }
    }

    if result.success {
        Ok(())
    } else {
        Err(CliError::SyncFailed(result.message))
    }
}

pub async fn run_check(remote: RemoteArgs) -> Result<(), CliError> {
    let client = remote_client(remote)?;
    let columns = client.list_fields().await?;
    let rows = client.list_all().await?;

    let table = &client.config().table;
    println!(
        "Connected to table {} in app {}: {} prompt rows",
        table.table_id,
        table.app_token,
        rows.len()
    );

    let missing = missing_fields(&columns);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CliError::Config(format_missing_columns(&missing)))
    }
}

pub fn format_missing_columns(missing: &[&str]) -> String {
    format!(
        "remote table is missing required columns: {}",
        missing.join(", ")
    )
}

pub fn format_sync_result(result: &SyncResult) -> Vec<String> {
    vec![
        result.message.clone(),
        format!(
            "local:  {} created, {} updated",
            result.local_created, result.local_updated
        ),
        format!(
            "remote: {} created, {} updated",
            result.remote_created, result.remote_updated
        ),
        format!(
            "{} prompts checked, {} failed",
            result.total_processed, result.failed
        ),
    ]
}
