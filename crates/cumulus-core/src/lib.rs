//! Cumulus Core Library
//!
//! This crate provides the configuration, resource types, metadata aliases and
//! MIME lookup shared by the Cumulus storage backends and the CLI.

pub mod config;
pub mod metadata;
pub mod mime;
pub mod storage_types;

// Re-export commonly used types
pub use config::{AdapterConfig, CloudinaryConfig, ProviderCredentials, StorageConfig};
pub use metadata::{Metadata, ProviderOptions};
pub use mime::mime_type_for_format;
pub use storage_types::{ResourceType, StorageBackend};
