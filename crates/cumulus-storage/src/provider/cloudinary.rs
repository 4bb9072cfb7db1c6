//! Cloudinary REST client
//!
//! Upload API calls (`upload`, `rename`, `destroy`) are signed form posts to
//! `{api_base}/v1_1/{cloud}/{resource_type}/{action}`. Admin API calls
//! (resource lookup and bulk deletion) use HTTP basic auth against
//! `{api_base}/v1_1/{cloud}/resources/{resource_type}/{type}`.
//!
//! Signatures use SHA-256, so the account must be configured for SHA-256
//! request signatures.

use super::signature::{param_value, sign_params};
use super::{
    DeleteResponse, DestroyResponse, MediaProvider, ProviderError, ProviderResult, Resource,
    ResourceList, UploadPayload, UploadResponse,
};
use async_trait::async_trait;
use bytes::Bytes;
use cumulus_core::{CloudinaryConfig, ProviderCredentials, ProviderOptions, ResourceType};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ApiErrorMessage {
    message: String,
}

/// HTTP client for the Cloudinary upload and admin APIs.
#[derive(Clone, Debug)]
pub struct CloudinaryClient {
    http: Client,
    credentials: ProviderCredentials,
    api_base_url: String,
}

impl CloudinaryClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `credentials` - Cloud name, API key and API secret
    /// * `api_base_url` - API root, e.g. "https://api.cloudinary.com"
    /// * `timeout` - Per-request timeout
    pub fn new(
        credentials: ProviderCredentials,
        api_base_url: impl Into<String>,
        timeout: Duration,
    ) -> ProviderResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            credentials,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &CloudinaryConfig) -> ProviderResult<Self> {
        Self::new(
            config.credentials.clone(),
            config.api_base_url.clone(),
            Duration::from_secs(config.http_timeout_secs),
        )
    }

    pub fn cloud_name(&self) -> &str {
        &self.credentials.cloud_name
    }

    fn upload_endpoint(&self, resource_type: &str, action: &str) -> String {
        format!(
            "{}/v1_1/{}/{}/{}",
            self.api_base_url, self.credentials.cloud_name, resource_type, action
        )
    }

    fn admin_endpoint(&self, resource_type: ResourceType, delivery_type: &str) -> String {
        format!(
            "{}/v1_1/{}/resources/{}/{}",
            self.api_base_url, self.credentials.cloud_name, resource_type, delivery_type
        )
    }

    /// Split `resource_type` out of the options and sign the rest.
    ///
    /// Returns the resource type for the endpoint path and the form parameters,
    /// including `timestamp`, `api_key` and `signature`.
    fn signed_params(&self, options: &ProviderOptions) -> (String, BTreeMap<String, String>) {
        let mut params: BTreeMap<String, String> = options
            .iter()
            .filter_map(|(key, value)| param_value(value).map(|v| (key.clone(), v)))
            .collect();

        let resource_type = params
            .remove("resource_type")
            .unwrap_or_else(|| ResourceType::Image.to_string());

        params.insert(
            "timestamp".to_string(),
            chrono::Utc::now().timestamp().to_string(),
        );
        let signature = sign_params(&params, &self.credentials.api_secret);
        params.insert("signature".to_string(), signature);
        params.insert("signature_algorithm".to_string(), "sha256".to_string());
        params.insert("api_key".to_string(), self.credentials.api_key.clone());

        (resource_type, params)
    }

    fn form(params: &BTreeMap<String, String>) -> Form {
        params
            .iter()
            .fold(Form::new(), |form, (key, value)| {
                form.text(key.clone(), value.clone())
            })
    }

    fn admin_request(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(
            &self.credentials.api_key,
            Some(&self.credentials.api_secret),
        )
    }

    /// Turn a response into `T`, or into `ProviderError::Api` with the
    /// provider's error message for non-success statuses.
    async fn parse_response<T: DeserializeOwned>(response: Response) -> ProviderResult<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or_else(|_| {
                    if body.is_empty() {
                        "Unknown error".to_string()
                    } else {
                        body.clone()
                    }
                });
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    async fn post_signed<T: DeserializeOwned>(
        &self,
        action: &str,
        options: &ProviderOptions,
    ) -> ProviderResult<T> {
        let (resource_type, params) = self.signed_params(options);
        let response = self
            .http
            .post(self.upload_endpoint(&resource_type, action))
            .multipart(Self::form(&params))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    fn option_query(options: &ProviderOptions) -> Vec<(String, String)> {
        options
            .iter()
            .filter_map(|(key, value)| param_value(value).map(|v| (key.clone(), v)))
            .collect()
    }

    async fn delete_with_query(
        &self,
        resource_type: ResourceType,
        delivery_type: &str,
        query: Vec<(String, String)>,
    ) -> ProviderResult<DeleteResponse> {
        let request = self
            .http
            .delete(self.admin_endpoint(resource_type, delivery_type))
            .query(&query);
        let response = self.admin_request(request).send().await?;

        Self::parse_response(response).await
    }
}

/// Read up to `chunk_size` bytes; shorter only at end of input.
async fn read_chunk(
    reader: &mut Pin<Box<dyn AsyncRead + Send + Unpin>>,
    chunk_size: u64,
) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(chunk_size.min(8 * 1024 * 1024) as usize);
    reader.take(chunk_size).read_to_end(&mut buffer).await?;
    Ok(buffer)
}

#[async_trait]
impl MediaProvider for CloudinaryClient {
    async fn upload(
        &self,
        payload: UploadPayload,
        options: &ProviderOptions,
    ) -> ProviderResult<UploadResponse> {
        let start = Instant::now();
        let (resource_type, params) = self.signed_params(options);

        let form = Self::form(&params);
        let form = match payload {
            UploadPayload::Bytes { data, filename } => {
                form.part("file", Part::stream(data).file_name(filename))
            }
            UploadPayload::Url(url) => form.text("file", url),
        };

        let response = self
            .http
            .post(self.upload_endpoint(&resource_type, "upload"))
            .multipart(form)
            .send()
            .await?;

        let result: UploadResponse = Self::parse_response(response).await?;

        tracing::debug!(
            public_id = %result.public_id,
            resource_type = %resource_type,
            size_bytes = result.bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Cloudinary upload request completed"
        );

        Ok(result)
    }

    async fn upload_large(
        &self,
        mut reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
        size: Option<u64>,
        chunk_size: u64,
        options: &ProviderOptions,
    ) -> ProviderResult<UploadResponse> {
        let chunk_size = chunk_size.max(1);
        let (resource_type, params) = self.signed_params(options);
        let endpoint = self.upload_endpoint(&resource_type, "upload");
        let upload_id = uuid::Uuid::new_v4().simple().to_string();
        let filename = options
            .get("public_id")
            .and_then(|v| v.as_str())
            .and_then(|id| id.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .unwrap_or("file")
            .to_string();

        let mut current = read_chunk(&mut reader, chunk_size).await?;
        if current.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "chunked upload needs at least one byte".to_string(),
            ));
        }

        let mut offset: u64 = 0;
        let mut chunk_index: u32 = 0;

        loop {
            let next = if current.len() as u64 == chunk_size {
                read_chunk(&mut reader, chunk_size).await?
            } else {
                Vec::new()
            };
            let is_last = next.is_empty();
            let len = current.len() as u64;
            let end = offset + len - 1;
            let total = if is_last {
                (offset + len).to_string()
            } else {
                size.map(|s| s.to_string()).unwrap_or_else(|| "-1".to_string())
            };

            let form = Self::form(&params).part(
                "file",
                Part::stream(Bytes::from(current)).file_name(filename.clone()),
            );

            let response = self
                .http
                .post(&endpoint)
                .header("X-Unique-Upload-Id", upload_id.as_str())
                .header("Content-Range", format!("bytes {}-{}/{}", offset, end, total))
                .multipart(form)
                .send()
                .await
                .map_err(|e| {
                    tracing::error!(
                        error = %e,
                        upload_id = %upload_id,
                        chunk = chunk_index,
                        "Cloudinary chunk upload failed"
                    );
                    ProviderError::from(e)
                })?;

            if is_last {
                return Self::parse_response(response).await;
            }

            // Intermediate chunks only need to succeed.
            Self::parse_response::<serde_json::Value>(response).await?;

            offset += len;
            chunk_index += 1;
            current = next;
        }
    }

    async fn rename(
        &self,
        from_public_id: &str,
        to_public_id: &str,
        options: &ProviderOptions,
    ) -> ProviderResult<Resource> {
        let mut options = options.clone();
        options.insert("from_public_id".to_string(), from_public_id.into());
        options.insert("to_public_id".to_string(), to_public_id.into());
        self.post_signed("rename", &options).await
    }

    async fn destroy(
        &self,
        public_id: &str,
        options: &ProviderOptions,
    ) -> ProviderResult<DestroyResponse> {
        let mut options = options.clone();
        options.insert("public_id".to_string(), public_id.into());
        self.post_signed("destroy", &options).await
    }

    async fn resources_by_ids(
        &self,
        public_ids: &[String],
        resource_type: ResourceType,
        delivery_type: &str,
    ) -> ProviderResult<ResourceList> {
        let query: Vec<(&str, &str)> = public_ids
            .iter()
            .map(|id| ("public_ids[]", id.as_str()))
            .collect();
        let request = self
            .http
            .get(self.admin_endpoint(resource_type, delivery_type))
            .query(&query);
        let response = self.admin_request(request).send().await?;

        Self::parse_response(response).await
    }

    async fn delete_resources(
        &self,
        public_ids: &[String],
        resource_type: ResourceType,
        delivery_type: &str,
    ) -> ProviderResult<DeleteResponse> {
        let query = public_ids
            .iter()
            .map(|id| ("public_ids[]".to_string(), id.clone()))
            .collect();
        self.delete_with_query(resource_type, delivery_type, query)
            .await
    }

    async fn delete_resources_by_prefix(
        &self,
        prefix: &str,
        resource_type: ResourceType,
        delivery_type: &str,
        options: &ProviderOptions,
    ) -> ProviderResult<DeleteResponse> {
        let mut query = Self::option_query(options);
        query.push(("prefix".to_string(), prefix.to_string()));
        self.delete_with_query(resource_type, delivery_type, query)
            .await
    }

    async fn delete_all_resources(
        &self,
        resource_type: ResourceType,
        delivery_type: &str,
        options: &ProviderOptions,
    ) -> ProviderResult<DeleteResponse> {
        let mut query = Self::option_query(options);
        query.push(("all".to_string(), "true".to_string()));
        self.delete_with_query(resource_type, delivery_type, query)
            .await
    }
}
