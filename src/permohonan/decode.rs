// Response shape decoding at the API boundary
//
// Canonical list shape: {"success": true, "data": {"data": [...], "meta": {...}}}
// Also accepted: a bare array, {"data": [...]}, {"permohonan": [...]}.
// Anything else is an error.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::types::{PageMeta, Permohonan, PermohonanPage};
use crate::error::{ClientError, Result};

/// Decode a list response in any of the accepted shapes
pub fn decode_list(body: &Value) -> Result<PermohonanPage> {
    let (items, meta) = locate_list(body).ok_or_else(|| {
        ClientError::Decode(format!("unrecognized list response: {}", describe(body)))
    })?;

    let items: Vec<Permohonan> = serde_json::from_value(items.clone())?;
    let meta = match meta {
        Some(meta) => Some(serde_json::from_value::<PageMeta>(meta.clone())?),
        None => None,
    };

    Ok(PermohonanPage { items, meta })
}

/// Decode a single-record response: `{data: {...}}` (with or without `success`) or a bare object
pub fn decode_record<T: DeserializeOwned>(body: &Value) -> Result<T> {
    let record = match body.get("data") {
        Some(inner @ Value::Object(_)) => inner,
        Some(_) => {
            return Err(ClientError::Decode(format!(
                "unrecognized record response: {}",
                describe(body)
            )))
        }
        None if body.is_object() => body,
        None => {
            return Err(ClientError::Decode(format!(
                "unrecognized record response: {}",
                describe(body)
            )))
        }
    };
    Ok(serde_json::from_value(record.clone())?)
}

/// Envelope of verify/reject replies
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ActionReply {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

fn locate_list(body: &Value) -> Option<(&Value, Option<&Value>)> {
    if body.is_array() {
        return Some((body, None));
    }

    if let Some(data) = body.get("data") {
        if data.is_array() {
            return Some((data, None));
        }
        if let Some(inner) = data.get("data").filter(|v| v.is_array()) {
            return Some((inner, data.get("meta").filter(|m| !m.is_null())));
        }
        return None;
    }

    body.get("permohonan")
        .filter(|v| v.is_array())
        .map(|list| (list, None))
}

/// Short description of a JSON value for error messages
fn describe(body: &Value) -> String {
    match body {
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("object with keys [{}]", keys.join(", "))
        }
        Value::Array(_) => "array".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Null => "null".to_string(),
    }
}
