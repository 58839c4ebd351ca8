//! Value encoding between typed payloads and cache text.
//!
//! Plain strings are stored as-is; every other JSON value is stored as
//! compact JSON text. On the way back, text that parses as JSON is decoded,
//! and anything else is handed back as a raw string.

use gigbridge_core::CacheError;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

pub struct CacheCodec;

impl CacheCodec {
    pub fn encode(value: &Value) -> String {
        match value {
            Value::String(raw) => raw.clone(),
            other => other.to_string(),
        }
    }

    pub fn decode(text: &str) -> Value {
        serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
    }

    pub fn encode_typed<T: Serialize>(value: &T) -> Result<String, CacheError> {
        let json = serde_json::to_value(value).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        Ok(Self::encode(&json))
    }

    pub fn decode_typed<T: DeserializeOwned>(text: &str) -> Result<T, CacheError> {
        // A raw string that happens to look like JSON (e.g. "42") decodes
        // into a number; fall back to the literal string before giving up.
        match serde_json::from_value(Self::decode(text)) {
            Ok(value) => Ok(value),
            Err(first) => serde_json::from_value(Value::String(text.to_string())).map_err(|_| {
                CacheError::Serialization {
                    reason: first.to_string(),
                }
            }),
        }
    }
}
