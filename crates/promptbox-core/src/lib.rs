//! promptbox-core - Core library for promptbox
//!
//! This crate contains the prompt and tag models, the local libSQL store, tag
//! identity resolution, the remote table client, and the reconciliation engine
//! that keeps the two stores consistent.

pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod sync;
pub mod tags;
mod util;

pub use error::{Error, Result};
pub use models::{Prompt, PromptId, SyncResult, Tag, TagId, TagRequest};
