//! Document serialization boundary.
//!
//! Store payloads are loosely-typed JSON maps; entities cross this boundary
//! through `encode`/`decode`, which validate shape and fail with
//! `MalformedDocument` instead of propagating nulls or defaults silently.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::shared::error::ChatError;

/// Raw document payload as stored in a collection.
pub type Document = serde_json::Map<String, Value>;

/// Serialize an entity into a store document.
pub fn encode<T: Serialize>(entity: &T) -> Result<Document, ChatError> {
    match serde_json::to_value(entity) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ChatError::MalformedDocument(format!(
            "expected an object document, got {}",
            value_kind(&other)
        ))),
        Err(e) => Err(ChatError::MalformedDocument(e.to_string())),
    }
}

/// Deserialize a store document into an entity, identifying the document
/// in the error message on shape mismatch.
pub fn decode<T: DeserializeOwned>(id: &str, doc: &Document) -> Result<T, ChatError> {
    serde_json::from_value(Value::Object(doc.clone()))
        .map_err(|e| ChatError::MalformedDocument(format!("document {}: {}", id, e)))
}

/// Encode a timestamp the way entity fields serialize it, so stored values
/// and field operators agree on the representation.
pub fn timestamp_value(t: DateTime<Utc>) -> Value {
    serde_json::to_value(t).unwrap_or(Value::Null)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
