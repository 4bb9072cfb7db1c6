//! In-memory provider for tests.
//!
//! [`MemoryProvider`] keeps uploaded resources in a map and records every call,
//! so tests can assert on what a storage backend asked the provider to do.

use crate::provider::{
    DeleteResponse, DestroyResponse, MediaProvider, ProviderError, ProviderResult, Resource,
    ResourceList, UploadPayload, UploadResponse,
};
use async_trait::async_trait;
use cumulus_core::{ProviderOptions, ResourceType};
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncRead, AsyncReadExt};

/// A recorded provider call.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    UploadBytes {
        filename: String,
        size: u64,
        options: ProviderOptions,
    },
    UploadUrl {
        url: String,
        options: ProviderOptions,
    },
    UploadLarge {
        size: Option<u64>,
        chunk_size: u64,
        received: u64,
        options: ProviderOptions,
    },
    Rename {
        from: String,
        to: String,
        options: ProviderOptions,
    },
    Destroy {
        public_id: String,
        options: ProviderOptions,
    },
    ResourcesByIds {
        public_ids: Vec<String>,
        resource_type: ResourceType,
        delivery_type: String,
    },
    DeleteResources {
        public_ids: Vec<String>,
        resource_type: ResourceType,
        delivery_type: String,
    },
    DeleteByPrefix {
        prefix: String,
        resource_type: ResourceType,
        delivery_type: String,
        options: ProviderOptions,
    },
    DeleteAll {
        resource_type: ResourceType,
        delivery_type: String,
        options: ProviderOptions,
    },
}

impl ProviderCall {
    /// Options passed to an upload call.
    pub fn upload_options(&self) -> Option<&ProviderOptions> {
        match self {
            ProviderCall::UploadBytes { options, .. }
            | ProviderCall::UploadUrl { options, .. }
            | ProviderCall::UploadLarge { options, .. } => Some(options),
            _ => None,
        }
    }

    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            ProviderCall::Destroy { .. }
                | ProviderCall::DeleteResources { .. }
                | ProviderCall::DeleteByPrefix { .. }
                | ProviderCall::DeleteAll { .. }
        )
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn option_str<'a>(options: &'a ProviderOptions, key: &str) -> Option<&'a str> {
    options.get(key).and_then(|v| v.as_str())
}

/// Provider double holding resources in memory.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    resources: Mutex<BTreeMap<String, UploadResponse>>,
    calls: Mutex<Vec<ProviderCall>>,
    format: Option<String>,
    dimensions: Option<(u32, u32)>,
    remote_size: u64,
    fail_uploads: bool,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `format` for every upload, like the provider does after
    /// detecting the file type.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.dimensions = Some((width, height));
        self
    }

    /// Size reported for files uploaded by URL.
    pub fn with_remote_size(mut self, size: u64) -> Self {
        self.remote_size = size;
        self
    }

    /// Make every upload fail with an API error.
    pub fn failing(mut self) -> Self {
        self.fail_uploads = true;
        self
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        lock(&self.calls).clone()
    }

    pub fn contains(&self, public_id: &str) -> bool {
        lock(&self.resources).contains_key(public_id)
    }

    pub fn public_ids(&self) -> Vec<String> {
        lock(&self.resources).keys().cloned().collect()
    }

    fn record(&self, call: ProviderCall) {
        lock(&self.calls).push(call);
    }

    fn store(&self, size: u64, options: &ProviderOptions) -> ProviderResult<UploadResponse> {
        if self.fail_uploads {
            return Err(ProviderError::Api {
                status: 500,
                message: "upload rejected".to_string(),
            });
        }

        let public_id = option_str(options, "public_id")
            .map(String::from)
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        let resource_type = option_str(options, "resource_type").unwrap_or("image");
        let format = if resource_type == "raw" {
            None
        } else {
            self.format.clone()
        };

        let response = UploadResponse {
            public_id: public_id.clone(),
            format,
            bytes: size,
            width: self.dimensions.map(|(w, _)| w),
            height: self.dimensions.map(|(_, h)| h),
            resource_type: Some(resource_type.to_string()),
            delivery_type: Some(option_str(options, "type").unwrap_or("upload").to_string()),
            version: Some(1),
            ..UploadResponse::default()
        };

        lock(&self.resources).insert(public_id, response.clone());
        Ok(response)
    }

    fn remove_where(&self, keep: impl Fn(&str) -> bool) -> DeleteResponse {
        let mut resources = lock(&self.resources);
        let removed: Vec<String> = resources
            .keys()
            .filter(|id| !keep(id))
            .cloned()
            .collect();
        let mut response = DeleteResponse::default();
        for id in removed {
            resources.remove(&id);
            response.deleted.insert(id, "deleted".to_string());
        }
        response
    }
}

#[async_trait]
impl MediaProvider for MemoryProvider {
    async fn upload(
        &self,
        payload: UploadPayload,
        options: &ProviderOptions,
    ) -> ProviderResult<UploadResponse> {
        let size = match payload {
            UploadPayload::Bytes { data, filename } => {
                let size = data.len() as u64;
                self.record(ProviderCall::UploadBytes {
                    filename,
                    size,
                    options: options.clone(),
                });
                size
            }
            UploadPayload::Url(url) => {
                self.record(ProviderCall::UploadUrl {
                    url,
                    options: options.clone(),
                });
                self.remote_size
            }
        };

        self.store(size, options)
    }

    async fn upload_large(
        &self,
        mut reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
        size: Option<u64>,
        chunk_size: u64,
        options: &ProviderOptions,
    ) -> ProviderResult<UploadResponse> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        let received = data.len() as u64;

        self.record(ProviderCall::UploadLarge {
            size,
            chunk_size,
            received,
            options: options.clone(),
        });

        self.store(received, options)
    }

    async fn rename(
        &self,
        from_public_id: &str,
        to_public_id: &str,
        options: &ProviderOptions,
    ) -> ProviderResult<Resource> {
        self.record(ProviderCall::Rename {
            from: from_public_id.to_string(),
            to: to_public_id.to_string(),
            options: options.clone(),
        });

        let mut resources = lock(&self.resources);
        let mut stored = resources.remove(from_public_id).ok_or(ProviderError::Api {
            status: 404,
            message: format!("Resource not found - {}", from_public_id),
        })?;
        stored.public_id = to_public_id.to_string();
        let resource = Resource {
            public_id: stored.public_id.clone(),
            format: stored.format.clone(),
            resource_type: stored.resource_type.clone(),
            delivery_type: stored.delivery_type.clone(),
            bytes: Some(stored.bytes),
            ..Resource::default()
        };
        resources.insert(to_public_id.to_string(), stored);

        Ok(resource)
    }

    async fn destroy(
        &self,
        public_id: &str,
        options: &ProviderOptions,
    ) -> ProviderResult<DestroyResponse> {
        self.record(ProviderCall::Destroy {
            public_id: public_id.to_string(),
            options: options.clone(),
        });

        let result = match lock(&self.resources).remove(public_id) {
            Some(_) => "ok",
            None => "not found",
        };

        Ok(DestroyResponse {
            result: result.to_string(),
        })
    }

    async fn resources_by_ids(
        &self,
        public_ids: &[String],
        resource_type: ResourceType,
        delivery_type: &str,
    ) -> ProviderResult<ResourceList> {
        self.record(ProviderCall::ResourcesByIds {
            public_ids: public_ids.to_vec(),
            resource_type,
            delivery_type: delivery_type.to_string(),
        });

        let resources = lock(&self.resources);
        let found = public_ids
            .iter()
            .filter_map(|id| resources.get(id))
            .map(|stored| Resource {
                public_id: stored.public_id.clone(),
                format: stored.format.clone(),
                resource_type: stored.resource_type.clone(),
                delivery_type: stored.delivery_type.clone(),
                bytes: Some(stored.bytes),
                ..Resource::default()
            })
            .collect();

        Ok(ResourceList {
            resources: found,
            next_cursor: None,
        })
    }

    async fn delete_resources(
        &self,
        public_ids: &[String],
        resource_type: ResourceType,
        delivery_type: &str,
    ) -> ProviderResult<DeleteResponse> {
        self.record(ProviderCall::DeleteResources {
            public_ids: public_ids.to_vec(),
            resource_type,
            delivery_type: delivery_type.to_string(),
        });

        Ok(self.remove_where(|id| !public_ids.iter().any(|p| p == id)))
    }

    async fn delete_resources_by_prefix(
        &self,
        prefix: &str,
        resource_type: ResourceType,
        delivery_type: &str,
        options: &ProviderOptions,
    ) -> ProviderResult<DeleteResponse> {
        self.record(ProviderCall::DeleteByPrefix {
            prefix: prefix.to_string(),
            resource_type,
            delivery_type: delivery_type.to_string(),
            options: options.clone(),
        });

        Ok(self.remove_where(|id| !id.starts_with(prefix)))
    }

    async fn delete_all_resources(
        &self,
        resource_type: ResourceType,
        delivery_type: &str,
        options: &ProviderOptions,
    ) -> ProviderResult<DeleteResponse> {
        self.record(ProviderCall::DeleteAll {
            resource_type,
            delivery_type: delivery_type.to_string(),
            options: options.clone(),
        });

        Ok(self.remove_where(|_| false))
    }
}
