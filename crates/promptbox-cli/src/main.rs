//! promptbox CLI - keep a prompt library in sync with a Bitable table
//!
//! Local commands work offline against the libSQL store; `sync` reconciles it
//! with the remote table.

mod cli;
mod commands;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::common::resolve_db_path;
use crate::commands::edit::{run_edit, EditArgs};
use crate::commands::list::run_list;
use crate::commands::show::run_show;
use crate::commands::sync::{run_check, run_sync};
use crate::commands::tags::run_tags;
use crate::commands::use_prompt::run_use;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "promptbox=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path)?;

    match cli.command {
        Commands::Add {
            title,
            content,
            tags,
            favorite,
        } => run_add(&title, &content, &tags, favorite, &db_path).await?,
        Commands::List { limit, tag, json } => {
            run_list(limit, tag.as_deref(), json, &db_path).await?;
        }
        Commands::Show { id, json } => run_show(&id, json, &db_path).await?,
        Commands::Edit {
            id,
            title,
            content,
            tags,
            clear_tags,
            favorite,
            unfavorite,
        } => {
            let favorite = match (favorite, unfavorite) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let args = EditArgs {
                title,
                content,
                tags,
                clear_tags,
                favorite,
            };
            run_edit(&id, args, &db_path).await?;
        }
        Commands::Use { id } => run_use(&id, &db_path).await?,
        Commands::Tags { json } => run_tags(json, &db_path).await?,
        Commands::Sync {
            remote,
            batch_size,
            json,
        } => run_sync(remote, batch_size, json, &db_path).await?,
        Commands::Check { remote } => run_check(remote).await?,
    }

    Ok(())
}
