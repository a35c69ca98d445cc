//! Request body decoding for the auth endpoints.
//!
//! Browsers post either JSON (from the form script) or a plain
//! `application/x-www-form-urlencoded` body (no script). The body is tried as
//! JSON first, then as a URL-encoded form, regardless of `Content-Type`.

use serde_json::Value;
use std::collections::HashMap;

/// Flat string fields extracted from a request body.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Fields(HashMap<String, String>);

impl Fields {
    /// Field value, or empty when absent.
    pub fn text(&self, key: &str) -> String {
        self.0.get(key).cloned().unwrap_or_default()
    }

    /// Field value, `None` when absent.
    pub fn optional(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The body is neither JSON nor a URL-encoded form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnparseableBody;

/// Decode a request body into fields.
///
/// A JSON body that is not an object yields no fields. Strings are taken
/// as-is, numbers and booleans are stringified, everything else is dropped.
pub fn parse_fields(body: &[u8]) -> Result<Fields, UnparseableBody> {
    let text = std::str::from_utf8(body).map_err(|_| UnparseableBody)?;

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(Fields(
            map.into_iter()
                .filter_map(|(k, v)| scalar_to_string(v).map(|v| (k, v)))
                .collect(),
        )),
        Ok(_) => Ok(Fields::default()),
        Err(_) => serde_urlencoded::from_str::<Vec<(String, String)>>(text)
            .map(|pairs| Fields(pairs.into_iter().collect()))
            .map_err(|_| UnparseableBody),
    }
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
