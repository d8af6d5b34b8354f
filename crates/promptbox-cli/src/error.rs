use std::io;

use promptbox_core::remote::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] promptbox_core::Error),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No prompt content provided")]
    EmptyContent,
    #[error("Prompt ID cannot be empty")]
    EmptyPromptId,
    #[error("Prompt not found for id/prefix: {0}")]
    PromptNotFound(String),
    #[error("{0}")]
    AmbiguousPromptId(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Missing {setting}. Pass --{flag} or set {env}.")]
    MissingSetting {
        setting: &'static str,
        flag: &'static str,
        env: &'static str,
    },
    #[error("Sync failed: {0}")]
    SyncFailed(String),
}
