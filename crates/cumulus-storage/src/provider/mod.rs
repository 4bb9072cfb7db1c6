//! Remote media provider abstraction
//!
//! [`MediaProvider`] is the narrow slice of the Cloudinary upload and admin
//! APIs the storage adapter consumes. [`CloudinaryClient`] implements it over
//! HTTP; tests substitute an in-memory provider.

pub mod cloudinary;
pub(crate) mod signature;

use async_trait::async_trait;
use bytes::Bytes;
use cumulus_core::{ProviderOptions, ResourceType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

pub use cloudinary::CloudinaryClient;

/// Chunk size used for large uploads when neither the caller nor the adapter sets one.
pub const DEFAULT_CHUNK_SIZE: u64 = 20_000_000;

/// Provider operation errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cloudinary API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Failed to read upload source: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Body of a single-request upload.
#[derive(Debug, Clone)]
pub enum UploadPayload {
    /// File content sent in the request.
    Bytes { data: Bytes, filename: String },
    /// A URL the provider fetches itself.
    Url(String),
}

/// Response of the upload endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub public_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub delivery_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_url: Option<String>,
    /// Remaining response fields, kept opaque.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A stored resource as reported by the admin API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub public_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub delivery_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResourceList {
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Response of the destroy endpoint: `"ok"` or `"not found"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DestroyResponse {
    pub result: String,
}

/// Response of the bulk delete endpoints: public id to deletion status.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeleteResponse {
    #[serde(default)]
    pub deleted: BTreeMap<String, String>,
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Remote media service operations used by the storage adapter.
///
/// Upload, rename and destroy take the merged provider options, which carry
/// `public_id`, `resource_type` and `type` alongside any provider parameters.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    async fn upload(
        &self,
        payload: UploadPayload,
        options: &ProviderOptions,
    ) -> ProviderResult<UploadResponse>;

    /// Chunked upload: the reader is sent in order, `chunk_size` bytes per request.
    async fn upload_large(
        &self,
        reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
        size: Option<u64>,
        chunk_size: u64,
        options: &ProviderOptions,
    ) -> ProviderResult<UploadResponse>;

    async fn rename(
        &self,
        from_public_id: &str,
        to_public_id: &str,
        options: &ProviderOptions,
    ) -> ProviderResult<Resource>;

    async fn destroy(
        &self,
        public_id: &str,
        options: &ProviderOptions,
    ) -> ProviderResult<DestroyResponse>;

    async fn resources_by_ids(
        &self,
        public_ids: &[String],
        resource_type: ResourceType,
        delivery_type: &str,
    ) -> ProviderResult<ResourceList>;

    async fn delete_resources(
        &self,
        public_ids: &[String],
        resource_type: ResourceType,
        delivery_type: &str,
    ) -> ProviderResult<DeleteResponse>;

    async fn delete_resources_by_prefix(
        &self,
        prefix: &str,
        resource_type: ResourceType,
        delivery_type: &str,
        options: &ProviderOptions,
    ) -> ProviderResult<DeleteResponse>;

    async fn delete_all_resources(
        &self,
        resource_type: ResourceType,
        delivery_type: &str,
        options: &ProviderOptions,
    ) -> ProviderResult<DeleteResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn upload_response_keeps_unknown_fields() {
        let response: UploadResponse = serde_json::from_value(json!({
            "public_id": "foo",
            "format": "jpg",
            "bytes": 12345,
            "width": 100,
            "height": 67,
            "type": "upload",
            "etag": "abc",
            "tags": []
        }))
        .unwrap();

        assert_eq!(response.public_id, "foo");
        assert_eq!(response.format.as_deref(), Some("jpg"));
        assert_eq!(response.delivery_type.as_deref(), Some("upload"));
        assert_eq!(response.extra.get("etag"), Some(&json!("abc")));

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["etag"], json!("abc"));
        assert_eq!(value["type"], json!("upload"));
    }

    #[test]
    fn raw_upload_response_has_no_format() {
        let response: UploadResponse = serde_json::from_value(json!({
            "public_id": "report.pdf",
            "bytes": 10,
            "resource_type": "raw"
        }))
        .unwrap();

        assert_eq!(response.format, None);
        assert_eq!(response.width, None);
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("format").is_none());
    }
}
