//! Cumulus Storage Library
//!
//! This crate provides the storage abstraction used by the attachment layer
//! and its implementations: a Cloudinary backend and a local filesystem backend.
//!
//! # Identifiers
//!
//! Identifiers are logical ids such as `avatars/foo.jpg`. Backends join them
//! onto their configured prefix. The Cloudinary backend derives the public id
//! from that path by dropping the extension (except for `raw` resources) and
//! reports the id the provider actually stored after each upload.
//!
//! Ids must not contain `..` or a leading `/` for the local backend. Key
//! generation is centralized in the `keys` module.

pub mod cloudinary;
pub mod factory;
pub mod fetch;
pub mod file;
pub(crate) mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod provider;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod traits;
pub mod url_builder;

// Re-export commonly used types
pub use cloudinary::CloudinaryStorage;
pub use cumulus_core::StorageBackend;
pub use factory::create_storage;
pub use fetch::{FetchError, HttpFetcher};
pub use file::{Confirm, Identifier, UploadOutcome, UploadSource, UploadedFile};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use provider::{CloudinaryClient, MediaProvider, ProviderError, UploadResponse};
pub use traits::{ByteStream, Storage, StorageError, StorageResult};
pub use url_builder::UrlBuilder;
