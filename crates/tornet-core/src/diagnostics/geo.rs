//! IP attribution data
//!
//! Turns a geolocation provider's JSON answer into a flat field map and
//! rejects answers that are structurally valid JSON but report a lookup
//! failure.

use serde::Serialize;
use std::collections::BTreeMap;

/// Attribution for one address, as reported by a single provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpInfo {
    /// Name of the provider that answered
    pub provider: String,
    /// Flattened scalar fields; nested objects use dotted keys
    pub fields: BTreeMap<String, String>,
}

impl IpInfo {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

/// Parse a provider body into a field map
///
/// `None` when the body is not a JSON object or carries a failure marker
/// (`"status": "fail"`, `"success": false`, or any non-null `"error"`).
pub fn parse_provider_body(body: &str) -> Option<BTreeMap<String, String>> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;

    if object.get("status").and_then(|v| v.as_str()) == Some("fail") {
        return None;
    }
    if object.get("success").and_then(|v| v.as_bool()) == Some(false) {
        return None;
    }
    if object.get("error").is_some_and(|v| !v.is_null() && v.as_bool() != Some(false)) {
        return None;
    }

    let mut fields = BTreeMap::new();
    flatten_into(&mut fields, None, object);
    Some(fields)
}

fn flatten_into(
    out: &mut BTreeMap<String, String>,
    prefix: Option<&str>,
    object: &serde_json::Map<String, serde_json::Value>,
) {
    for (key, value) in object {
        let key = match prefix {
            Some(prefix) => format!("{}.{}", prefix, key),
            None => key.clone(),
        };
        match value {
            serde_json::Value::String(s) => {
                out.insert(key, s.clone());
            }
            serde_json::Value::Number(n) => {
                out.insert(key, n.to_string());
            }
            serde_json::Value::Bool(b) => {
                out.insert(key, b.to_string());
            }
            serde_json::Value::Object(inner) => flatten_into(out, Some(&key), inner),
            serde_json::Value::Null | serde_json::Value::Array(_) => {}
        }
    }
}
