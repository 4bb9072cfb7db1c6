//! Provider response to standard metadata.

use crate::provider::UploadResponse;
use cumulus_core::metadata::{HEIGHT_KEY, MIME_TYPE_KEY, PAYLOAD_KEY, SIZE_KEY, WIDTH_KEY};
use cumulus_core::{mime_type_for_format, AdapterConfig, Metadata, ResourceType};
use serde_json::Value;

/// Map an upload response onto the standard metadata keys.
///
/// Dimensions are only kept for image and video resources. The resource type
/// the provider reports wins over the configured one, which matters for
/// `auto` uploads. Absent values are left out rather than written as null.
pub(crate) fn normalize(config: &AdapterConfig, response: &UploadResponse) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(SIZE_KEY.to_string(), Value::from(response.bytes));

    if let Some(mime) = response.format.as_deref().and_then(mime_type_for_format) {
        metadata.insert(MIME_TYPE_KEY.to_string(), Value::from(mime));
    }

    let resource_type = response
        .resource_type
        .as_deref()
        .and_then(|rt| rt.parse::<ResourceType>().ok())
        .unwrap_or_else(|| config.resource_type());

    if resource_type.has_dimensions() {
        if let Some(width) = response.width {
            metadata.insert(WIDTH_KEY.to_string(), Value::from(width));
        }
        if let Some(height) = response.height {
            metadata.insert(HEIGHT_KEY.to_string(), Value::from(height));
        }
    }

    if config.store_provider_payload() {
        if let Ok(payload) = serde_json::to_value(response) {
            metadata.insert(PAYLOAD_KEY.to_string(), payload);
        }
    }

    metadata
}

/// Merge `normalized` into `metadata`: normalized keys overwrite, others survive.
pub(crate) fn merge_metadata(metadata: &mut Metadata, normalized: Metadata) {
    for (key, value) in normalized {
        metadata.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: Value) -> UploadResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn image_response_merges_exactly() {
        let config = AdapterConfig::new(ResourceType::Image);
        let mut metadata = cumulus_core::metadata::options_from(json!({
            "size": 1, "width": 1, "height": 1
        }));

        let normalized = normalize(
            &config,
            &response(json!({"public_id": "foo", "bytes": 12345, "width": 100, "height": 67})),
        );
        merge_metadata(&mut metadata, normalized);

        assert_eq!(
            Value::Object(metadata),
            json!({"size": 12345, "width": 100, "height": 67})
        );
    }

    #[test]
    fn mime_type_from_format() {
        let config = AdapterConfig::new(ResourceType::Image);
        let metadata = normalize(
            &config,
            &response(json!({"public_id": "foo", "format": "jpg", "bytes": 10})),
        );
        assert_eq!(metadata[MIME_TYPE_KEY], json!("image/jpeg"));
        assert!(!metadata.contains_key(WIDTH_KEY));
    }

    #[test]
    fn unknown_format_has_no_mime_type() {
        let config = AdapterConfig::new(ResourceType::Image);
        let metadata = normalize(
            &config,
            &response(json!({"public_id": "foo", "format": "xyz", "bytes": 10})),
        );
        assert!(!metadata.contains_key(MIME_TYPE_KEY));
    }

    #[test]
    fn raw_resources_have_no_dimensions() {
        let config = AdapterConfig::new(ResourceType::Raw);
        let metadata = normalize(
            &config,
            &response(json!({"public_id": "doc.pdf", "bytes": 10, "width": 5, "height": 5})),
        );
        assert!(!metadata.contains_key(WIDTH_KEY));
        assert!(!metadata.contains_key(HEIGHT_KEY));
    }

    #[test]
    fn auto_uses_reported_resource_type() {
        let config = AdapterConfig::new(ResourceType::Auto);
        let metadata = normalize(
            &config,
            &response(json!({
                "public_id": "clip", "format": "mp4", "bytes": 10,
                "width": 640, "height": 480, "resource_type": "video"
            })),
        );
        assert_eq!(metadata[WIDTH_KEY], json!(640));
        assert_eq!(metadata[MIME_TYPE_KEY], json!("video/mp4"));
    }

    #[test]
    fn payload_is_kept_when_enabled() {
        let config = AdapterConfig::new(ResourceType::Image).with_provider_payload(true);
        let metadata = normalize(
            &config,
            &response(json!({"public_id": "foo", "bytes": 10, "etag": "abc"})),
        );
        assert_eq!(metadata[PAYLOAD_KEY]["etag"], json!("abc"));
        assert_eq!(metadata[PAYLOAD_KEY]["public_id"], json!("foo"));
    }

    #[test]
    fn unrelated_keys_survive_merge() {
        let mut metadata = cumulus_core::metadata::options_from(json!({"filename": "a.jpg", "size": 1}));
        merge_metadata(&mut metadata, cumulus_core::metadata::options_from(json!({"size": 2})));
        assert_eq!(Value::Object(metadata), json!({"filename": "a.jpg", "size": 2}));
    }
}
