//! Application services shared by every client.

mod database;

pub use database::{DatabaseService, PromptChanges};
