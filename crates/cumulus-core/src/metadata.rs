//! Metadata and option maps exchanged with storage backends.

use serde_json::{Map, Value};

/// File metadata as stored by the attachment layer (`size`, `mime_type`, ...).
pub type Metadata = Map<String, Value>;

/// Provider option name to value, e.g. `{"crop": "fit", "width": 150}`.
pub type ProviderOptions = Map<String, Value>;

pub const SIZE_KEY: &str = "size";
pub const MIME_TYPE_KEY: &str = "mime_type";
pub const WIDTH_KEY: &str = "width";
pub const HEIGHT_KEY: &str = "height";

/// Metadata key that may carry per-upload provider options. Consumed by the
/// upload, never written back.
pub const OPTIONS_KEY: &str = "cloudinary";

/// Metadata key holding the raw provider payload when retention is enabled.
pub const PAYLOAD_KEY: &str = "cloudinary_payload";

/// Build an option map from a JSON value. Non-object values yield an empty map.
pub fn options_from(value: Value) -> ProviderOptions {
    match value {
        Value::Object(map) => map,
        _ => ProviderOptions::new(),
    }
}
