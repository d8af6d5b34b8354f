//! Database layer for promptbox

mod connection;
mod migrations;
mod repository;

pub use connection::Database;
pub use repository::{LibSqlPromptRepository, PromptRepository, UpsertOutcome};
