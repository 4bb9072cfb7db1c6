//! Files, upload sources and identifiers handed to storage backends.

use crate::provider::UploadResponse;
use crate::traits::{Storage, StorageResult};
use bytes::Bytes;
use cumulus_core::{Metadata, ProviderOptions};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncRead;

/// Explicit token required by [`Storage::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirm;

/// Logical identifier of a file, as owned by the attachment layer.
///
/// A frozen identifier is never rewritten by a backend: the outcome of an
/// upload carries it back unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    value: String,
    frozen: bool,
}

impl Identifier {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            frozen: false,
        }
    }

    pub fn frozen(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            frozen: true,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// The identifier to report after the backend settled on `stored`.
    pub fn reconcile(self, stored: String) -> String {
        if self.frozen {
            self.value
        } else {
            stored
        }
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Identifier::new(value)
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Identifier::new(value)
    }
}

/// A file stored by some backend.
#[derive(Clone)]
pub struct UploadedFile {
    id: String,
    storage: Arc<dyn Storage>,
    size: Option<u64>,
}

impl Debug for UploadedFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("UploadedFile")
            .field("id", &self.id)
            .field("storage", &self.storage.backend_type())
            .field("size", &self.size)
            .finish()
    }
}

impl UploadedFile {
    pub fn new(id: impl Into<String>, storage: Arc<dyn Storage>) -> Self {
        Self {
            id: id.into(),
            storage,
            size: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// URL of the file as its owning storage delivers it.
    pub fn url(&self) -> String {
        self.storage.url(&self.id, &ProviderOptions::new())
    }

    pub async fn download(&self) -> StorageResult<Bytes> {
        self.storage.download(&self.id).await
    }
}

/// Where the bytes of an upload come from.
pub enum UploadSource {
    /// Bytes already in memory.
    Bytes(Bytes),
    /// A local reader; `size` is the declared length, if known.
    Reader {
        reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
        size: Option<u64>,
    },
    /// A URL string.
    Url(String),
    /// A file held by a storage backend (this one or another).
    Uploaded(UploadedFile),
}

impl Debug for UploadSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            UploadSource::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            UploadSource::Reader { size, .. } => {
                f.debug_struct("Reader").field("size", size).finish_non_exhaustive()
            }
            UploadSource::Url(url) => f.debug_tuple("Url").field(url).finish(),
            UploadSource::Uploaded(file) => f.debug_tuple("Uploaded").field(file).finish(),
        }
    }
}

impl UploadSource {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        UploadSource::Bytes(bytes.into())
    }

    pub fn reader(reader: impl AsyncRead + Send + Unpin + 'static, size: Option<u64>) -> Self {
        UploadSource::Reader {
            reader: Box::pin(reader),
            size,
        }
    }

    /// Open a local file as a reader source with its size known.
    pub async fn from_path(path: impl AsRef<Path>) -> StorageResult<Self> {
        let file = tokio::fs::File::open(path.as_ref()).await?;
        let size = file.metadata().await?.len();
        Ok(UploadSource::reader(file, Some(size)))
    }
}

/// Result of [`Storage::upload`].
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Identifier the file is stored under (the input one when frozen).
    pub id: String,
    /// Caller metadata merged with the normalized upload metadata.
    pub metadata: Metadata,
    /// Raw provider response, for backends that talk to a provider.
    pub response: Option<UploadResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutable_identifier_takes_stored_value() {
        let id = Identifier::new("foo.mp4");
        assert!(!id.is_frozen());
        assert_eq!(id.reconcile("foo.jpg".to_string()), "foo.jpg");
    }

    #[test]
    fn frozen_identifier_is_kept() {
        let id = Identifier::frozen("foo.mp4");
        assert!(id.is_frozen());
        assert_eq!(id.reconcile("foo.jpg".to_string()), "foo.mp4");
    }

    #[test]
    fn identifier_conversions_are_mutable() {
        assert!(!Identifier::from("a.png").is_frozen());
        assert_eq!(Identifier::from("a.png".to_string()).as_str(), "a.png");
    }

    #[tokio::test]
    async fn from_path_knows_the_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        tokio::fs::write(&path, b"0123456789").await.unwrap();

        match UploadSource::from_path(&path).await.unwrap() {
            UploadSource::Reader { size, .. } => assert_eq!(size, Some(10)),
            other => panic!("unexpected source: {:?}", other),
        }
    }
}
