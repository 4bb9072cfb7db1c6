//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement,
//! together with the error type shared by every backend.

use crate::fetch::FetchError;
use crate::file::{Confirm, Identifier, UploadOutcome, UploadSource, UploadedFile};
use crate::provider::ProviderError;
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use cumulus_core::{Metadata, ProviderOptions};
use futures::Stream;
use std::any::Any;
use std::pin::Pin;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Confirmation required: pass `Some(Confirm)` to clear the storage")]
    ConfirmationRequired,

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Unsupported move: {0}")]
    UnsupportedMove(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Stream of file content chunks returned by [`Storage::open`].
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Storage abstraction trait
///
/// The capability contract every backend offers to the attachment layer.
/// Identifiers are the attachment layer's logical ids (e.g. `"avatars/foo.jpg"`);
/// each backend translates them into its own keys.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `source` under `id`.
    ///
    /// The backend may rewrite the identifier (unless it is frozen) and fills
    /// in standard metadata; both are returned in the [`UploadOutcome`]. The
    /// caller copies them back into its own record.
    async fn upload(
        &self,
        source: UploadSource,
        id: Identifier,
        metadata: Metadata,
        options: ProviderOptions,
    ) -> StorageResult<UploadOutcome>;

    /// Download the whole file.
    async fn download(&self, id: &str) -> StorageResult<Bytes>;

    /// Open the file as a stream of chunks.
    async fn open(&self, id: &str) -> StorageResult<ByteStream>;

    /// Read the file, honouring access-controlled delivery where the backend has it.
    async fn read(&self, id: &str) -> StorageResult<Vec<u8>>;

    /// Check if a file exists
    async fn exists(&self, id: &str) -> StorageResult<bool>;

    /// Delete a file
    async fn delete(&self, id: &str) -> StorageResult<()>;

    /// Delete several files in one backend request where possible
    async fn multi_delete(&self, ids: &[String]) -> StorageResult<()>;

    /// Build the retrieval URL for a file. Never performs network calls.
    fn url(&self, id: &str, options: &ProviderOptions) -> String;

    /// Whether `source` can be moved into this storage without copying bytes.
    fn movable(&self, source: &UploadedFile, id: &str) -> bool;

    /// Move `source` to `id` inside this storage.
    async fn move_file(&self, source: &UploadedFile, id: &str) -> StorageResult<()>;

    /// Delete everything this storage holds. Refuses to run without `Some(Confirm)`.
    async fn clear(&self, confirm: Option<Confirm>, options: &ProviderOptions)
        -> StorageResult<()>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;

    /// Concrete backend access, used to recognise same-backend moves.
    fn as_any(&self) -> &dyn Any;
}
