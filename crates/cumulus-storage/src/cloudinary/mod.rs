//! Cloudinary storage backend
//!
//! Translates the attachment layer's ids and metadata into Cloudinary
//! resources. Uploads are routed to one of three strategies (provider-side
//! fetch of a remote URL, chunked upload, single request); the provider's
//! answer decides the final id and the standard metadata.

mod dispatch;
mod normalize;

use crate::fetch::HttpFetcher;
use crate::file::{Confirm, Identifier, UploadOutcome, UploadSource, UploadedFile};
use crate::keys;
use crate::provider::{
    CloudinaryClient, DeleteResponse, MediaProvider, UploadPayload, UploadResponse,
    DEFAULT_CHUNK_SIZE,
};
use crate::traits::{ByteStream, Storage, StorageError, StorageResult};
use crate::url_builder::UrlBuilder;
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use cumulus_core::metadata::{options_from, OPTIONS_KEY, PAYLOAD_KEY};
use cumulus_core::{AdapterConfig, CloudinaryConfig, Metadata, ProviderOptions};
use dispatch::{merge_options, select_strategy, take_chunk_size, UploadStrategy};
use futures::TryStreamExt;
use normalize::{merge_metadata, normalize};
use serde_json::{json, Value};
use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Storage backed by a Cloudinary account.
#[derive(Clone)]
pub struct CloudinaryStorage {
    config: AdapterConfig,
    provider: Arc<dyn MediaProvider>,
    urls: UrlBuilder,
    fetcher: HttpFetcher,
}

impl CloudinaryStorage {
    /// Create a new CloudinaryStorage instance
    ///
    /// # Arguments
    /// * `config` - Adapter settings (prefix, resource type, thresholds, defaults)
    /// * `provider` - Upload and admin API client
    /// * `urls` - Delivery URL builder for the same account
    /// * `fetcher` - HTTP client used to download delivered files
    pub fn new(
        config: AdapterConfig,
        provider: Arc<dyn MediaProvider>,
        urls: UrlBuilder,
        fetcher: HttpFetcher,
    ) -> Self {
        Self {
            config,
            provider,
            urls,
            fetcher,
        }
    }

    /// Build the backend with a [`CloudinaryClient`] for `config`'s account.
    pub fn from_config(config: &CloudinaryConfig) -> StorageResult<Self> {
        let provider = CloudinaryClient::from_config(config)?;
        let fetcher = HttpFetcher::new(Duration::from_secs(config.http_timeout_secs))?;

        tracing::info!(
            cloud_name = %config.credentials.cloud_name,
            resource_type = %config.adapter.resource_type(),
            delivery_type = %config.adapter.delivery_type(),
            prefix = ?config.adapter.prefix_path(),
            "Cloudinary storage initialized"
        );

        Ok(Self::new(
            config.adapter.clone(),
            Arc::new(provider),
            UrlBuilder::from_config(config),
            fetcher,
        ))
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Cloudinary public id of `id`.
    pub fn public_id(&self, id: &str) -> String {
        keys::public_id(&self.config, id)
    }

    /// Prefixed storage path of `id`.
    pub fn path(&self, id: &str) -> String {
        keys::path(&self.config, id)
    }

    /// `resource_type` and `type` for calls addressing existing resources.
    fn resource_options(&self) -> ProviderOptions {
        options_from(json!({
            "resource_type": self.config.resource_type().as_str(),
            "type": self.config.delivery_type(),
        }))
    }

    /// Options for an upload of `public_id`, lowest precedence first:
    /// computed defaults, adapter defaults, metadata options, call options.
    fn upload_options(
        &self,
        public_id: &str,
        metadata_options: &ProviderOptions,
        call_options: &ProviderOptions,
    ) -> (ProviderOptions, u64) {
        let mut computed = self.resource_options();
        computed.insert("public_id".to_string(), Value::from(public_id));

        let mut merged = merge_options([
            &computed,
            self.config.upload_options(),
            metadata_options,
            call_options,
        ]);
        let chunk_size = take_chunk_size(&mut merged)
            .or(self.config.chunk_size())
            .unwrap_or(DEFAULT_CHUNK_SIZE);

        (merged, chunk_size)
    }

    async fn send(
        &self,
        strategy: UploadStrategy,
        filename: String,
        chunk_size: u64,
        options: &ProviderOptions,
    ) -> StorageResult<UploadResponse> {
        let response = match strategy {
            UploadStrategy::Remote(url) => {
                self.provider
                    .upload(UploadPayload::Url(url), options)
                    .await?
            }
            UploadStrategy::Large { reader, size } => {
                self.provider
                    .upload_large(reader, size, chunk_size, options)
                    .await?
            }
            UploadStrategy::Simple(data) => {
                self.provider
                    .upload(UploadPayload::Bytes { data, filename }, options)
                    .await?
            }
        };

        Ok(response)
    }

    async fn bulk_delete<F, Fut>(&self, mut request: F) -> StorageResult<usize>
    where
        F: FnMut(ProviderOptions) -> Fut,
        Fut: std::future::Future<Output = crate::provider::ProviderResult<DeleteResponse>>,
    {
        let mut deleted = 0;
        let mut options = ProviderOptions::new();

        loop {
            let response = request(options.clone()).await?;
            deleted += response.deleted.len();

            match response.next_cursor {
                Some(cursor) if response.partial => {
                    options.insert("next_cursor".to_string(), Value::from(cursor));
                }
                _ => break,
            }
        }

        Ok(deleted)
    }
}

#[async_trait]
impl Storage for CloudinaryStorage {
    async fn upload(
        &self,
        source: UploadSource,
        id: Identifier,
        mut metadata: Metadata,
        options: ProviderOptions,
    ) -> StorageResult<UploadOutcome> {
        let start = Instant::now();
        let public_id = self.public_id(id.as_str());
        let metadata_options = metadata
            .remove(OPTIONS_KEY)
            .map(options_from)
            .unwrap_or_default();
        // A payload carried over from an earlier upload describes another resource.
        metadata.remove(PAYLOAD_KEY);
        let (options, chunk_size) = self.upload_options(&public_id, &metadata_options, &options);

        let filename = Path::new(id.as_str())
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("file")
            .to_string();

        let strategy = select_strategy(source, self.config.large_threshold(), &self.fetcher)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, public_id = %public_id, "Failed to prepare upload source");
                e
            })?;

        tracing::debug!(public_id = %public_id, strategy = ?strategy, "Selected upload strategy");

        let response = self
            .send(strategy, filename, chunk_size, &options)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, public_id = %public_id, "Cloudinary upload failed");
                e
            })?;

        let stored_id = keys::uploaded_id(&self.config, &response);
        let id = id.reconcile(stored_id);
        merge_metadata(&mut metadata, normalize(&self.config, &response));

        tracing::info!(
            public_id = %response.public_id,
            id = %id,
            resource_type = %self.config.resource_type(),
            size_bytes = response.bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Cloudinary upload successful"
        );

        Ok(UploadOutcome {
            id,
            metadata,
            response: Some(response),
        })
    }

    async fn download(&self, id: &str) -> StorageResult<Bytes> {
        let url = self.url(id, &ProviderOptions::new());
        let start = Instant::now();

        let data = self.fetcher.fetch(&url).await.map_err(|e| {
            tracing::error!(error = %e, id = %id, "Cloudinary download failed");
            StorageError::Fetch(e)
        })?;

        tracing::info!(
            id = %id,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Cloudinary download successful"
        );

        Ok(data)
    }

    async fn open(&self, id: &str) -> StorageResult<ByteStream> {
        let url = self.url(id, &ProviderOptions::new());

        let (stream, _) = self.fetcher.fetch_stream(&url).await.map_err(|e| {
            tracing::error!(error = %e, id = %id, "Cloudinary open failed");
            StorageError::Fetch(e)
        })?;

        Ok(Box::pin(stream.map_err(StorageError::Fetch)))
    }

    async fn read(&self, id: &str) -> StorageResult<Vec<u8>> {
        let mut options = self.resource_options();
        if self.config.delivery_type() != "upload" {
            options.insert("sign_url".to_string(), Value::Bool(true));
        }
        let url = self.url(id, &options);

        let data = self.fetcher.fetch(&url).await.map_err(|e| {
            tracing::error!(error = %e, id = %id, "Cloudinary read failed");
            StorageError::Fetch(e)
        })?;

        Ok(data.to_vec())
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        let public_id = self.public_id(id);
        let list = self
            .provider
            .resources_by_ids(
                std::slice::from_ref(&public_id),
                self.config.resource_type(),
                self.config.delivery_type(),
            )
            .await
            .map_err(|e| {
                tracing::error!(error = %e, public_id = %public_id, "Cloudinary lookup failed");
                StorageError::Provider(e)
            })?;

        Ok(!list.resources.is_empty())
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        let public_id = self.public_id(id);
        let start = Instant::now();

        let response = self
            .provider
            .destroy(&public_id, &self.resource_options())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, public_id = %public_id, "Cloudinary delete failed");
                StorageError::Provider(e)
            })?;

        tracing::info!(
            public_id = %public_id,
            result = %response.result,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Cloudinary delete completed"
        );

        Ok(())
    }

    async fn multi_delete(&self, ids: &[String]) -> StorageResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let public_ids: Vec<String> = ids.iter().map(|id| self.public_id(id)).collect();
        let response = self
            .provider
            .delete_resources(
                &public_ids,
                self.config.resource_type(),
                self.config.delivery_type(),
            )
            .await
            .map_err(|e| {
                tracing::error!(error = %e, count = public_ids.len(), "Cloudinary bulk delete failed");
                StorageError::Provider(e)
            })?;

        tracing::info!(
            requested = public_ids.len(),
            deleted = response.deleted.len(),
            "Cloudinary bulk delete completed"
        );

        Ok(())
    }

    fn url(&self, id: &str, options: &ProviderOptions) -> String {
        self.urls.build(
            &self.path(id),
            self.config.resource_type(),
            self.config.delivery_type(),
            options,
        )
    }

    fn movable(&self, source: &UploadedFile, _id: &str) -> bool {
        source
            .storage()
            .as_any()
            .downcast_ref::<CloudinaryStorage>()
            .is_some()
    }

    async fn move_file(&self, source: &UploadedFile, id: &str) -> StorageResult<()> {
        let Some(origin) = source.storage().as_any().downcast_ref::<CloudinaryStorage>() else {
            return Err(StorageError::UnsupportedMove(format!(
                "cannot move a {} file into Cloudinary storage",
                source.storage().backend_type()
            )));
        };

        let from = origin.public_id(source.id());
        let to = self.public_id(id);

        self.provider
            .rename(&from, &to, &self.resource_options())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, from = %from, to = %to, "Cloudinary rename failed");
                StorageError::Provider(e)
            })?;

        tracing::info!(from = %from, to = %to, "Cloudinary move successful");

        Ok(())
    }

    async fn clear(&self, confirm: Option<Confirm>, options: &ProviderOptions) -> StorageResult<()> {
        if confirm.is_none() {
            return Err(StorageError::ConfirmationRequired);
        }

        let resource_type = self.config.resource_type();
        let delivery_type = self.config.delivery_type();
        let provider = &self.provider;

        // The admin API matches a plain string prefix, so `store` alone would
        // also take `storefront/...`.
        let deleted = match self.config.prefix_path().map(|p| format!("{}/", p)) {
            Some(prefix) => {
                self.bulk_delete(|cursor| {
                    let options = merge_options([options, &cursor]);
                    let prefix = prefix.clone();
                    async move {
                        provider
                            .delete_resources_by_prefix(&prefix, resource_type, delivery_type, &options)
                            .await
                    }
                })
                .await
            }
            None => {
                self.bulk_delete(|cursor| {
                    let options = merge_options([options, &cursor]);
                    async move {
                        provider
                            .delete_all_resources(resource_type, delivery_type, &options)
                            .await
                    }
                })
                .await
            }
        }
        .map_err(|e| {
            tracing::error!(error = %e, "Cloudinary clear failed");
            e
        })?;

        tracing::info!(
            resource_type = %resource_type,
            delivery_type = %delivery_type,
            prefix = ?self.config.prefix_path(),
            deleted,
            "Cloudinary storage cleared"
        );

        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Cloudinary
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
