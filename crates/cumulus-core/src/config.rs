//! Configuration module
//!
//! This module provides the adapter settings used by the Cloudinary backend and
//! the environment-driven configuration used to select and build a backend.

use std::env;
use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::metadata::ProviderOptions;
use crate::storage_types::{ResourceType, StorageBackend};

// Common constants
const DEFAULT_DELIVERY_TYPE: &str = "upload";
const API_BASE_URL: &str = "https://api.cloudinary.com";
const DELIVERY_BASE_URL: &str = "https://res.cloudinary.com";
const HTTP_TIMEOUT_SECS: u64 = 60;

/// Account credentials for the Cloudinary APIs.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl Debug for ProviderCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ProviderCredentials")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

impl ProviderCredentials {
    pub fn new(
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Parse a `cloudinary://{api_key}:{api_secret}@{cloud_name}` URL.
    pub fn from_url(value: &str) -> Result<Self, anyhow::Error> {
        let parsed = url::Url::parse(value)
            .map_err(|e| anyhow::anyhow!("CLOUDINARY_URL is not a valid URL: {}", e))?;

        if parsed.scheme() != "cloudinary" {
            return Err(anyhow::anyhow!(
                "CLOUDINARY_URL must use the cloudinary:// scheme"
            ));
        }

        let cloud_name = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| anyhow::anyhow!("CLOUDINARY_URL is missing the cloud name"))?;
        let api_key = parsed.username();
        let api_secret = parsed
            .password()
            .ok_or_else(|| anyhow::anyhow!("CLOUDINARY_URL is missing the API secret"))?;

        if api_key.is_empty() {
            return Err(anyhow::anyhow!("CLOUDINARY_URL is missing the API key"));
        }

        Ok(Self::new(cloud_name, api_key, api_secret))
    }
}

/// Immutable settings of a Cloudinary storage adapter.
///
/// Built once with [`AdapterConfig::new`] and the `with_*` methods, then owned
/// by the adapter for its whole lifetime.
#[derive(Clone, Debug, PartialEq)]
pub struct AdapterConfig {
    prefix: Option<Vec<String>>,
    resource_type: ResourceType,
    delivery_type: Option<String>,
    large_threshold: Option<u64>,
    chunk_size: Option<u64>,
    upload_options: ProviderOptions,
    store_provider_payload: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::new(ResourceType::default())
    }
}

impl AdapterConfig {
    pub fn new(resource_type: ResourceType) -> Self {
        Self {
            prefix: None,
            resource_type,
            delivery_type: None,
            large_threshold: None,
            chunk_size: None,
            upload_options: ProviderOptions::new(),
            store_provider_payload: false,
        }
    }

    /// Set the identifier prefix. `"a/b"` becomes the segments `["a", "b"]`;
    /// empty segments are dropped and an all-empty prefix means no prefix.
    pub fn with_prefix(mut self, prefix: impl AsRef<str>) -> Self {
        let segments: Vec<String> = prefix
            .as_ref()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        self.prefix = if segments.is_empty() {
            None
        } else {
            Some(segments)
        };
        self
    }

    pub fn with_delivery_type(mut self, delivery_type: impl Into<String>) -> Self {
        self.delivery_type = Some(delivery_type.into());
        self
    }

    /// Uploads of at least `bytes` bytes use the chunked upload endpoint.
    pub fn with_large_threshold(mut self, bytes: u64) -> Self {
        self.large_threshold = Some(bytes);
        self
    }

    pub fn with_chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_size = Some(bytes);
        self
    }

    pub fn with_upload_options(mut self, options: ProviderOptions) -> Self {
        self.upload_options = options;
        self
    }

    pub fn with_provider_payload(mut self, store: bool) -> Self {
        self.store_provider_payload = store;
        self
    }

    pub fn prefix(&self) -> Option<&[String]> {
        self.prefix.as_deref()
    }

    /// Prefix segments joined with `/`.
    pub fn prefix_path(&self) -> Option<String> {
        self.prefix.as_ref().map(|segments| segments.join("/"))
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// Delivery type addressed by every call. Unless set explicitly, a `type`
    /// upload default doubles as the delivery type, then `upload`.
    pub fn delivery_type(&self) -> &str {
        self.delivery_type
            .as_deref()
            .or_else(|| self.upload_options.get("type").and_then(|v| v.as_str()))
            .unwrap_or(DEFAULT_DELIVERY_TYPE)
    }

    pub fn large_threshold(&self) -> Option<u64> {
        self.large_threshold
    }

    pub fn chunk_size(&self) -> Option<u64> {
        self.chunk_size
    }

    pub fn upload_options(&self) -> &ProviderOptions {
        &self.upload_options
    }

    pub fn store_provider_payload(&self) -> bool {
        self.store_provider_payload
    }
}

/// Cloudinary account, endpoints and adapter settings.
#[derive(Clone, Debug)]
pub struct CloudinaryConfig {
    pub credentials: ProviderCredentials,
    pub adapter: AdapterConfig,
    pub api_base_url: String,
    pub delivery_base_url: String,
    pub secure: bool,
    pub http_timeout_secs: u64,
}

impl CloudinaryConfig {
    pub fn new(credentials: ProviderCredentials, adapter: AdapterConfig) -> Self {
        Self {
            credentials,
            adapter,
            api_base_url: API_BASE_URL.to_string(),
            delivery_base_url: DELIVERY_BASE_URL.to_string(),
            secure: true,
            http_timeout_secs: HTTP_TIMEOUT_SECS,
        }
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_delivery_base_url(mut self, url: impl Into<String>) -> Self {
        self.delivery_base_url = url.into();
        self
    }

    fn from_env() -> Result<Option<Self>, anyhow::Error> {
        let credentials = match env::var("CLOUDINARY_URL").ok().filter(|s| !s.is_empty()) {
            Some(url) => Some(ProviderCredentials::from_url(&url)?),
            None => match (
                env::var("CLOUDINARY_CLOUD_NAME").ok(),
                env::var("CLOUDINARY_API_KEY").ok(),
                env::var("CLOUDINARY_API_SECRET").ok(),
            ) {
                (Some(cloud_name), Some(api_key), Some(api_secret)) => {
                    Some(ProviderCredentials::new(cloud_name, api_key, api_secret))
                }
                _ => None,
            },
        };

        let Some(credentials) = credentials else {
            return Ok(None);
        };

        let resource_type = match env::var("CLOUDINARY_RESOURCE_TYPE") {
            Ok(s) => s.parse()?,
            Err(_) => ResourceType::Image,
        };

        let upload_options: ProviderOptions = match env::var("CLOUDINARY_UPLOAD_OPTIONS") {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                anyhow::anyhow!("CLOUDINARY_UPLOAD_OPTIONS must be a JSON object: {}", e)
            })?,
            Err(_) => ProviderOptions::new(),
        };

        let mut adapter = AdapterConfig::new(resource_type)
            .with_upload_options(upload_options)
            .with_provider_payload(
                env::var("CLOUDINARY_STORE_PAYLOAD")
                    .unwrap_or_else(|_| "false".to_string())
                    .to_lowercase()
                    .parse()
                    .unwrap_or(false),
            );

        if let Ok(delivery_type) = env::var("CLOUDINARY_DELIVERY_TYPE") {
            adapter = adapter.with_delivery_type(delivery_type);
        }
        // Unset means uploads are never chunked.
        if let Ok(raw) = env::var("CLOUDINARY_LARGE_THRESHOLD_MB") {
            adapter = adapter.with_large_threshold(megabytes(&raw, "CLOUDINARY_LARGE_THRESHOLD_MB")?);
        }
        if let Ok(prefix) = env::var("CLOUDINARY_PREFIX") {
            adapter = adapter.with_prefix(prefix);
        }
        if let Ok(raw) = env::var("CLOUDINARY_CHUNK_SIZE_MB") {
            adapter = adapter.with_chunk_size(megabytes(&raw, "CLOUDINARY_CHUNK_SIZE_MB")?);
        }

        Ok(Some(CloudinaryConfig {
            credentials,
            adapter,
            api_base_url: env::var("CLOUDINARY_API_BASE_URL")
                .unwrap_or_else(|_| API_BASE_URL.to_string()),
            delivery_base_url: env::var("CLOUDINARY_DELIVERY_BASE_URL")
                .unwrap_or_else(|_| DELIVERY_BASE_URL.to_string()),
            secure: env::var("CLOUDINARY_SECURE")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                .parse()
                .unwrap_or(true),
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| HTTP_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(HTTP_TIMEOUT_SECS),
        }))
    }
}

/// Parse a whole number of megabytes into bytes.
fn megabytes(raw: &str, name: &str) -> Result<u64, anyhow::Error> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .and_then(|mb| mb.checked_mul(1024 * 1024))
        .ok_or_else(|| anyhow::anyhow!("{} must be a number of megabytes, got {:?}", name, raw))
}

/// Backend selection and per-backend settings.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub storage_backend: StorageBackend,
    pub cloudinary: Option<CloudinaryConfig>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let storage_backend = match env::var("STORAGE_BACKEND") {
            Ok(s) => s.parse()?,
            Err(_) => StorageBackend::Cloudinary,
        };

        let config = StorageConfig {
            storage_backend,
            cloudinary: CloudinaryConfig::from_env()?,
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
            local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.storage_backend {
            StorageBackend::Cloudinary => {
                let Some(cloudinary) = &self.cloudinary else {
                    return Err(anyhow::anyhow!(
                        "CLOUDINARY_URL or CLOUDINARY_CLOUD_NAME, CLOUDINARY_API_KEY and \
                         CLOUDINARY_API_SECRET must be set when using the Cloudinary backend"
                    ));
                };
                if cloudinary.credentials.cloud_name.is_empty() {
                    return Err(anyhow::anyhow!("Cloudinary cloud name must not be empty"));
                }
                if cloudinary.adapter.chunk_size() == Some(0) {
                    return Err(anyhow::anyhow!("Cloudinary chunk size must be positive"));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.storage_backend
    }

    pub fn cloudinary(&self) -> Option<&CloudinaryConfig> {
        self.cloudinary.as_ref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.local_storage_base_url.as_deref()
    }
}
