pub mod add;
pub mod common;
pub mod edit;
pub mod list;
pub mod show;
pub mod sync;
pub mod tags;
pub mod use_prompt;
