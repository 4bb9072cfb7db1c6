use crate::CloudinaryStorage;
#[cfg(feature = "storage-local")]
use crate::LocalStorage;
use crate::{Storage, StorageBackend, StorageError, StorageResult};
use cumulus_core::StorageConfig;
use std::sync::Arc;

/// Create a storage backend based on configuration
pub async fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    match config.storage_backend() {
        StorageBackend::Cloudinary => {
            let cloudinary = config.cloudinary().ok_or_else(|| {
                StorageError::ConfigError(
                    "CLOUDINARY_URL or CLOUDINARY_CLOUD_NAME/API_KEY/API_SECRET not configured"
                        .to_string(),
                )
            })?;

            let storage = CloudinaryStorage::from_config(cloudinary)?;
            Ok(Arc::new(storage))
        }

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config
                .local_storage_path()
                .map(String::from)
                .ok_or_else(|| {
                    StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
                })?;
            let base_url = config
                .local_storage_base_url()
                .map(String::from)
                .ok_or_else(|| {
                    StorageError::ConfigError("LOCAL_STORAGE_BASE_URL not configured".to_string())
                })?;

            let storage = LocalStorage::new(base_path, base_url).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cumulus_core::{AdapterConfig, CloudinaryConfig, ProviderCredentials, ResourceType};

    fn config(backend: StorageBackend) -> StorageConfig {
        StorageConfig {
            storage_backend: backend,
            cloudinary: None,
            local_storage_path: None,
            local_storage_base_url: None,
        }
    }

    #[tokio::test]
    async fn cloudinary_requires_credentials() {
        let result = create_storage(&config(StorageBackend::Cloudinary)).await;
        assert!(matches!(result, Err(StorageError::ConfigError(_))));
    }

    #[tokio::test]
    async fn builds_cloudinary_backend() {
        let mut config = config(StorageBackend::Cloudinary);
        config.cloudinary = Some(CloudinaryConfig::new(
            ProviderCredentials::new("demo", "1234", "secret"),
            AdapterConfig::new(ResourceType::Image).with_prefix("store"),
        ));

        let storage = create_storage(&config).await.unwrap();
        assert_eq!(storage.backend_type(), StorageBackend::Cloudinary);
        assert_eq!(
            storage.url("foo.jpg", &Default::default()),
            "https://res.cloudinary.com/demo/image/upload/v1/store/foo.jpg"
        );
    }

    #[cfg(feature = "storage-local")]
    #[tokio::test]
    async fn builds_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(StorageBackend::Local);
        config.local_storage_path = Some(dir.path().display().to_string());
        config.local_storage_base_url = Some("http://localhost:3000/files".to_string());

        let storage = create_storage(&config).await.unwrap();
        assert_eq!(storage.backend_type(), StorageBackend::Local);
    }

    #[cfg(feature = "storage-local")]
    #[tokio::test]
    async fn local_requires_path() {
        let result = create_storage(&config(StorageBackend::Local)).await;
        assert!(matches!(result, Err(StorageError::ConfigError(_))));
    }
}
