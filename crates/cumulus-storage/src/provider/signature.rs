//! Request signing for the Cloudinary upload API.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Parameters that are sent but never signed.
const UNSIGNED_PARAMS: [&str; 4] = ["file", "api_key", "resource_type", "cloud_name"];

/// Render an option value as a form parameter. `null` yields `None`.
pub(crate) fn param_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(param_value)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

/// `k=v&k2=v2` over the signable, non-empty parameters, in key order.
pub(crate) fn string_to_sign(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(key, value)| !value.is_empty() && !UNSIGNED_PARAMS.contains(&key.as_str()))
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}

/// SHA-256 hex signature of the parameters with the API secret appended.
pub(crate) fn sign_params(params: &BTreeMap<String, String>, api_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(string_to_sign(params).as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}
