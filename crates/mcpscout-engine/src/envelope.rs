//! Schema-tagged JSON envelope for every persisted checkpoint value

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use mcpscout_utils::error::StateError;

pub const CHECKPOINT_SCHEMA: &str = "mcpscout.checkpoint.v1";

/// Wrap `value` as `{ "schema": CHECKPOINT_SCHEMA, "data": value }`
///
/// # Errors
///
/// Returns [`StateError::CorruptCheckpoint`] if `value` cannot be serialized.
pub fn encode<T: Serialize>(marker: &str, value: &T) -> Result<String, StateError> {
    let data = serde_json::to_value(value).map_err(|e| corrupt(marker, e))?;
    serde_json::to_string(&json!({ "schema": CHECKPOINT_SCHEMA, "data": data }))
        .map_err(|e| corrupt(marker, e))
}

/// Unwrap an envelope written by [`encode`]
///
/// # Errors
///
/// - [`StateError::SchemaMismatch`] when the schema tag differs
/// - [`StateError::CorruptCheckpoint`] when the text is not an envelope or
///   the payload does not deserialize as `T`
pub fn decode<T: DeserializeOwned>(marker: &str, raw: &[u8]) -> Result<T, StateError> {
    let mut envelope: Value = serde_json::from_slice(raw).map_err(|e| corrupt(marker, e))?;

    let schema = envelope
        .get("schema")
        .and_then(Value::as_str)
        .ok_or_else(|| corrupt(marker, "missing schema tag"))?;
    if schema != CHECKPOINT_SCHEMA {
        return Err(StateError::SchemaMismatch {
            marker: marker.to_string(),
            expected: CHECKPOINT_SCHEMA.to_string(),
            found: schema.to_string(),
        });
    }

    let data = envelope
        .get_mut("data")
        .map(Value::take)
        .ok_or_else(|| corrupt(marker, "missing data"))?;
    serde_json::from_value(data).map_err(|e| corrupt(marker, e))
}

fn corrupt(marker: &str, reason: impl std::fmt::Display) -> StateError {
    StateError::CorruptCheckpoint {
        marker: marker.to_string(),
        reason: reason.to_string(),
    }
}
