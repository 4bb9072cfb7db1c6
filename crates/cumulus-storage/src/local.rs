use crate::fetch::HttpFetcher;
use crate::file::{Confirm, Identifier, UploadOutcome, UploadSource, UploadedFile};
use crate::keys::join_path;
use crate::traits::{ByteStream, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use cumulus_core::metadata::{MIME_TYPE_KEY, SIZE_KEY};
use cumulus_core::{mime_type_for_format, Metadata, ProviderOptions};
use futures::StreamExt;
use serde_json::Value;
use std::any::Any;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem storage implementation
#[derive(Clone, Debug)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
    prefix: Option<Vec<String>>,
    fetcher: HttpFetcher,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for file storage (e.g., "/var/lib/cumulus/files")
    /// * `base_url` - Base URL for serving files (e.g., "http://localhost:3000/files")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        let fetcher = HttpFetcher::new(Duration::from_secs(60))?;

        Ok(LocalStorage {
            base_path,
            base_url,
            prefix: None,
            fetcher,
        })
    }

    /// Store files under `prefix` (`/`-separated) inside the base directory.
    pub fn with_prefix(mut self, prefix: impl AsRef<str>) -> Self {
        let segments: Vec<String> = prefix
            .as_ref()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        self.prefix = (!segments.is_empty()).then_some(segments);
        self
    }

    fn key(&self, id: &str) -> String {
        join_path(self.prefix.as_deref(), id)
    }

    /// Convert an id to a filesystem path with security validation
    ///
    /// This function validates that the id doesn't contain path traversal
    /// sequences that could escape the base storage directory.
    fn id_to_path(&self, id: &str) -> StorageResult<PathBuf> {
        if id.contains("..") || id.starts_with('/') {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }

        let path = self.base_path.join(self.key(id));

        let base_canonical = self.base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        if let Ok(canonical) = path.canonicalize() {
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write `source` to `path`, returning the number of bytes written.
    async fn write_source(&self, source: UploadSource, path: &Path) -> StorageResult<u64> {
        let mut file = fs::File::create(path).await?;

        let written = match source {
            UploadSource::Bytes(data) => {
                file.write_all(&data).await?;
                data.len() as u64
            }
            UploadSource::Reader { mut reader, .. } => tokio::io::copy(&mut reader, &mut file).await?,
            UploadSource::Url(url) => {
                let data = self.fetcher.fetch(&url).await?;
                file.write_all(&data).await?;
                data.len() as u64
            }
            UploadSource::Uploaded(uploaded) => {
                let data = uploaded.download().await?;
                file.write_all(&data).await?;
                data.len() as u64
            }
        };

        file.sync_all().await?;
        Ok(written)
    }

    async fn remove_dir_contents(dir: &Path) -> StorageResult<usize> {
        let mut removed = 0;
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                fs::remove_dir_all(entry.path()).await?;
            } else {
                fs::remove_file(entry.path()).await?;
            }
            removed += 1;
        }
        Ok(removed)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(
        &self,
        source: UploadSource,
        id: Identifier,
        mut metadata: Metadata,
        _options: ProviderOptions,
    ) -> StorageResult<UploadOutcome> {
        let path = self.id_to_path(id.as_str())?;
        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let size = match self.write_source(source, &path).await {
            Ok(size) => size,
            Err(e) => {
                tracing::error!(error = %e, path = %path.display(), "Local storage write failed");
                let _ = fs::remove_file(&path).await;
                return Err(e);
            }
        };

        metadata.insert(SIZE_KEY.to_string(), Value::from(size));
        if let Some(mime) = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(mime_type_for_format)
        {
            metadata.insert(MIME_TYPE_KEY.to_string(), Value::from(mime));
        }

        tracing::info!(
            path = %path.display(),
            id = %id.as_str(),
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(UploadOutcome {
            id: id.as_str().to_string(),
            metadata,
            response: None,
        })
    }

    async fn download(&self, id: &str) -> StorageResult<Bytes> {
        let path = self.id_to_path(id)?;
        let start = std::time::Instant::now();

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(id.to_string()));
        }

        let data = fs::read(&path).await?;

        tracing::info!(
            path = %path.display(),
            id = %id,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage download successful"
        );

        Ok(Bytes::from(data))
    }

    async fn open(&self, id: &str) -> StorageResult<ByteStream> {
        let path = self.id_to_path(id)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(id.to_string()));
        }

        let file = fs::File::open(&path).await?;
        let stream = tokio_util::io::ReaderStream::new(file).map(|chunk| chunk.map_err(StorageError::from));

        Ok(Box::pin(stream))
    }

    async fn read(&self, id: &str) -> StorageResult<Vec<u8>> {
        Ok(self.download(id).await?.to_vec())
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        let path = self.id_to_path(id)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        let path = self.id_to_path(id)?;
        let start = std::time::Instant::now();

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(&path).await?;

        tracing::info!(
            path = %path.display(),
            id = %id,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }

    async fn multi_delete(&self, ids: &[String]) -> StorageResult<()> {
        for id in ids {
            self.delete(id).await?;
        }
        Ok(())
    }

    fn url(&self, id: &str, _options: &ProviderOptions) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), self.key(id))
    }

    fn movable(&self, source: &UploadedFile, _id: &str) -> bool {
        source
            .storage()
            .as_any()
            .downcast_ref::<LocalStorage>()
            .is_some()
    }

    async fn move_file(&self, source: &UploadedFile, id: &str) -> StorageResult<()> {
        let Some(origin) = source.storage().as_any().downcast_ref::<LocalStorage>() else {
            return Err(StorageError::UnsupportedMove(format!(
                "cannot move a {} file into local storage",
                source.storage().backend_type()
            )));
        };

        let from = origin.id_to_path(source.id())?;
        let to = self.id_to_path(id)?;

        if !fs::try_exists(&from).await.unwrap_or(false) {
            return Err(StorageError::NotFound(source.id().to_string()));
        }

        self.ensure_parent_dir(&to).await?;
        fs::rename(&from, &to).await?;

        tracing::info!(
            from = %from.display(),
            to = %to.display(),
            "Local storage move successful"
        );

        Ok(())
    }

    async fn clear(&self, confirm: Option<Confirm>, _options: &ProviderOptions) -> StorageResult<()> {
        if confirm.is_none() {
            return Err(StorageError::ConfirmationRequired);
        }

        let root = match &self.prefix {
            Some(segments) => self.base_path.join(segments.join("/")),
            None => self.base_path.clone(),
        };

        if !fs::try_exists(&root).await.unwrap_or(false) {
            return Ok(());
        }

        let removed = Self::remove_dir_contents(&root).await?;

        tracing::info!(
            path = %root.display(),
            removed,
            "Local storage cleared"
        );

        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
