//! Bitquery envelopes.
//!
//! Callers may pass either the canonical `{"v": 3, "q": {...}}` envelope or
//! just its inner `q` object; [`expand`] normalizes both to the envelope.

use crate::error::ApiError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

pub const QUERY_VERSION: u64 = 3;

/// Wraps a bare query in the versioned envelope. Input that already carries
/// a `q` key is returned as is.
pub fn expand(query: Value) -> Result<Value, ApiError> {
    match query {
        Value::Object(map) if map.contains_key("q") => Ok(Value::Object(map)),
        Value::Object(map) => Ok(json!({ "v": QUERY_VERSION, "q": Value::Object(map) })),
        other => Err(ApiError::InvalidQuery(format!(
            "expected a json object, got {other}"
        ))),
    }
}

/// Expanded query encoded for use as a URL path segment.
pub fn encode_path(query: Value) -> Result<String, ApiError> {
    let expanded = expand(query)?;
    Ok(STANDARD.encode(expanded.to_string()))
}

/// Mutable access to the `q` object of an expanded envelope.
pub(crate) fn inner_mut(envelope: &mut Value) -> Result<&mut Map<String, Value>, ApiError> {
    envelope
        .get_mut("q")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| ApiError::InvalidQuery("`q` must be a json object".to_string()))
}

/// Adds `predicate` to `q.find`, creating the filter when absent. A predicate
/// on a field the filter already constrains is merged into an `$and`.
pub(crate) fn add_filter(
    envelope: &mut Value,
    field: &str,
    predicate: Value,
) -> Result<(), ApiError> {
    let q = inner_mut(envelope)?;
    let find = q
        .entry("find")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(filter) = find.as_object_mut() else {
        return Err(ApiError::InvalidQuery(
            "`q.find` must be a json object".to_string(),
        ));
    };
    match filter.remove(field) {
        None => {
            filter.insert(field.to_string(), predicate);
        }
        Some(existing) => {
            let clauses = filter
                .entry("$and")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(clauses) = clauses {
                clauses.push(json!({ field: existing }));
                clauses.push(json!({ field: predicate }));
            } else {
                return Err(ApiError::InvalidQuery(
                    "`$and` must be a json array".to_string(),
                ));
            }
        }
    }
    Ok(())
}

pub(crate) fn set_option(envelope: &mut Value, key: &str, value: Value) -> Result<(), ApiError> {
    inner_mut(envelope)?.insert(key.to_string(), value);
    Ok(())
}
