//! Data models for promptbox

mod prompt;
mod sync_record;
mod tag;

pub use prompt::{next_updated_at, Prompt, PromptId};
pub use sync_record::{RemoteRecord, SyncRecord, SyncResult};
pub use tag::{Tag, TagId, TagRequest, DEFAULT_TAG_COLOR};
