use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use promptbox_core::sync::DEFAULT_BATCH_SIZE;

#[derive(Parser)]
#[command(name = "promptbox")]
#[command(about = "Keep a prompt library locally and in sync with a Bitable table")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Save a new prompt
    #[command(alias = "new")]
    Add {
        /// Prompt title
        title: String,
        /// Prompt text (stdin or $EDITOR when omitted)
        content: Vec<String>,
        /// Tag to attach; repeat or separate with commas
        #[arg(short, long = "tag", value_name = "NAME")]
        tags: Vec<String>,
        /// Mark the prompt as a favorite
        #[arg(long)]
        favorite: bool,
    },
    /// List prompts, favorites first
    List {
        /// Number of prompts to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Only prompts carrying this tag
        #[arg(long)]
        tag: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one prompt in full
    Show {
        /// Prompt ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a prompt; opens $EDITOR on the content when no field is given
    Edit {
        /// Prompt ID or unique ID prefix
        id: String,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New content
        #[arg(long)]
        content: Option<String>,
        /// Replace the tags; repeat or separate with commas
        #[arg(short, long = "tag", value_name = "NAME")]
        tags: Vec<String>,
        /// Remove every tag
        #[arg(long, conflicts_with = "tags")]
        clear_tags: bool,
        /// Mark as favorite
        #[arg(long, conflicts_with = "unfavorite")]
        favorite: bool,
        /// Remove the favorite mark
        #[arg(long)]
        unfavorite: bool,
    },
    /// Print a prompt's content and record the use
    Use {
        /// Prompt ID or unique ID prefix
        id: String,
    },
    /// List tags with usage counts
    Tags {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reconcile the local library with the remote table
    Sync {
        #[command(flatten)]
        remote: RemoteArgs,
        /// Records per remote batch call
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// Output the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Test the remote table connection
    Check {
        #[command(flatten)]
        remote: RemoteArgs,
    },
}

/// Remote table settings; each falls back to its environment variable
#[derive(Args, Debug, Clone, Default)]
pub struct RemoteArgs {
    /// App ID [env: PROMPTBOX_APP_ID]
    #[arg(long, value_name = "ID")]
    pub app_id: Option<String>,
    /// App secret [env: PROMPTBOX_APP_SECRET]
    #[arg(long, value_name = "SECRET")]
    pub app_secret: Option<String>,
    /// Table share URL [env: PROMPTBOX_TABLE_URL]
    #[arg(long, value_name = "URL")]
    pub table_url: Option<String>,
    /// Open API base URL override
    #[arg(long, value_name = "URL", hide = true)]
    pub api_base: Option<String>,
    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,
}
