//! Field encoding of a prompt row in the remote table.
//!
//! The remote table has no notion of tag identity: tags travel as a JSON
//! array of names in a text field. Dates are Unix milliseconds.

use serde_json::{Map, Value};

use crate::models::{PromptId, RemoteRecord, SyncRecord};

pub const FIELD_ID: &str = "id";
pub const FIELD_TITLE: &str = "title";
pub const FIELD_CONTENT: &str = "content";
pub const FIELD_TAGS: &str = "tags";
pub const FIELD_FAVORITE: &str = "isFavorite";
pub const FIELD_CREATED_AT: &str = "createdAt";
pub const FIELD_UPDATED_AT: &str = "updatedAt";
pub const FIELD_LAST_USED: &str = "lastUsed";

/// Columns [`encode_fields`] writes and [`decode_item`] reads
pub const REQUIRED_FIELDS: [&str; 8] = [
    FIELD_ID,
    FIELD_TITLE,
    FIELD_CONTENT,
    FIELD_TAGS,
    FIELD_FAVORITE,
    FIELD_CREATED_AT,
    FIELD_UPDATED_AT,
    FIELD_LAST_USED,
];

/// Single-select option labels configured on the `isFavorite` column
pub const FAVORITE_YES: &str = "是";
pub const FAVORITE_NO: &str = "否";

const UNTITLED: &str = "Untitled";

/// Encode a tag list as the JSON array string stored in the `tags` field
pub fn encode_tags(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

/// Decode the `tags` field; malformed values decode to no tags
pub fn decode_tags(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(tags) => tags
            .into_iter()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect(),
        Err(error) => {
            tracing::warn!(raw = %raw, "Ignoring malformed remote tags field: {error}");
            Vec::new()
        }
    }
}

/// Build the `fields` object for a create or update call.
///
/// On update, an absent `last_used_at` is sent as `null` so a stale remote
/// value is cleared; on create the field is simply omitted.
pub fn encode_fields(record: &SyncRecord, clear_missing: bool) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert(FIELD_ID.to_string(), Value::String(record.id.to_string()));
    fields.insert(FIELD_TITLE.to_string(), Value::String(record.title.clone()));
    fields.insert(
        FIELD_CONTENT.to_string(),
        Value::String(record.content.clone()),
    );
    fields.insert(
        FIELD_TAGS.to_string(),
        Value::String(encode_tags(&record.tags)),
    );
    let favorite = if record.is_favorite {
        FAVORITE_YES
    } else {
        FAVORITE_NO
    };
    fields.insert(
        FIELD_FAVORITE.to_string(),
        Value::String(favorite.to_string()),
    );
    fields.insert(FIELD_CREATED_AT.to_string(), Value::from(record.created_at));
    fields.insert(FIELD_UPDATED_AT.to_string(), Value::from(record.updated_at));
    match record.last_used_at {
        Some(last_used) => {
            fields.insert(FIELD_LAST_USED.to_string(), Value::from(last_used));
        }
        None if clear_missing => {
            fields.insert(FIELD_LAST_USED.to_string(), Value::Null);
        }
        None => {}
    }
    fields
}

/// Decode one item of a records listing (`{"record_id": .., "fields": {..}}`).
///
/// Rows without a usable `id` cannot be matched to a prompt and are rejected.
/// Other missing fields fall back to defaults; a missing `updatedAt` decodes
/// as 0 so that the local copy wins and repairs the row.
pub fn decode_item(item: &Value) -> Result<RemoteRecord, String> {
    let row_id = item
        .get("record_id")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing record_id".to_string())?
        .to_string();

    let fields = item
        .get("fields")
        .and_then(Value::as_object)
        .ok_or_else(|| format!("row {row_id} has no fields object"))?;

    let raw_id = text_field(fields, FIELD_ID)
        .ok_or_else(|| format!("row {row_id} has no id field"))?;
    let id: PromptId = raw_id
        .trim()
        .parse()
        .map_err(|_| format!("row {row_id} has invalid id '{raw_id}'"))?;

    let updated_at = timestamp_field(fields, FIELD_UPDATED_AT).unwrap_or(0);
    let created_at = timestamp_field(fields, FIELD_CREATED_AT).unwrap_or(updated_at);

    Ok(RemoteRecord {
        row_id,
        record: SyncRecord {
            id,
            title: text_field(fields, FIELD_TITLE).unwrap_or_else(|| UNTITLED.to_string()),
            content: text_field(fields, FIELD_CONTENT).unwrap_or_default(),
            tags: text_field(fields, FIELD_TAGS)
                .map(|raw| decode_tags(&raw))
                .unwrap_or_default(),
            is_favorite: text_field(fields, FIELD_FAVORITE)
                .is_some_and(|value| value == FAVORITE_YES),
            created_at,
            updated_at,
            last_used_at: timestamp_field(fields, FIELD_LAST_USED),
        },
    })
}

/// Text cells come back either as a plain string or as rich-text segments
fn text_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(value) => Some(value.clone()),
        Value::Array(segments) => Some(
            segments
                .iter()
                .filter_map(|segment| segment.get("text").and_then(Value::as_str))
                .collect(),
        ),
        _ => None,
    }
}

fn timestamp_field(fields: &Map<String, Value>, key: &str) -> Option<i64> {
    match fields.get(key)? {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().and_then(millis_from_float)),
        Value::String(value) => value.trim().parse().ok(),
        _ => None,
    }
}

/// Whole milliseconds from a float cell; `None` outside the exactly representable range
fn millis_from_float(value: f64) -> Option<i64> {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    let rounded = value.round();
    if !rounded.is_finite() || rounded.abs() > MAX_EXACT {
        return None;
    }
    // In range and integral after the checks above
    #[allow(clippy::cast_possible_truncation)]
    Some(rounded as i64)
}

/// Required columns absent from `present`, in [`REQUIRED_FIELDS`] order
pub fn missing_fields<S: AsRef<str>>(present: &[S]) -> Vec<&'static str> {
    REQUIRED_FIELDS
        .into_iter()
        .filter(|required| !present.iter().any(|name| name.as_ref() == *required))
        .collect()
}
