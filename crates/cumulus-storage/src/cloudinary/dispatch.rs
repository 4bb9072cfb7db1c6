//! Upload strategy selection and option merging.

use crate::fetch::HttpFetcher;
use crate::file::UploadSource;
use crate::traits::StorageResult;
use bytes::Bytes;
use cumulus_core::ProviderOptions;
use serde_json::Value;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt};

pub(crate) type BoxedReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// How an upload reaches the provider.
pub(crate) enum UploadStrategy {
    /// The provider fetches the URL itself.
    Remote(String),
    /// Chunked upload of a local stream.
    Large { reader: BoxedReader, size: Option<u64> },
    /// Single request carrying the whole body.
    Simple(Bytes),
}

impl Debug for UploadStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            UploadStrategy::Remote(url) => f.debug_tuple("Remote").field(url).finish(),
            UploadStrategy::Large { size, .. } => {
                f.debug_struct("Large").field("size", size).finish_non_exhaustive()
            }
            UploadStrategy::Simple(data) => f.debug_tuple("Simple").field(&data.len()).finish(),
        }
    }
}

/// A local byte source ready to be sent.
pub(crate) enum Materialized {
    Bytes(Bytes),
    Reader { reader: BoxedReader, size: Option<u64> },
}

impl Materialized {
    fn size(&self) -> Option<u64> {
        match self {
            Materialized::Bytes(data) => Some(data.len() as u64),
            Materialized::Reader { size, .. } => *size,
        }
    }
}

/// URLs the provider can fetch on its own.
pub(crate) fn is_remote_url(url: &str) -> bool {
    ["http:", "https:", "ftp:"]
        .iter()
        .any(|scheme| url.starts_with(scheme))
}

/// Classify `source` and pick its upload strategy.
///
/// Remote URLs (plain or behind an uploaded file) are handed to the provider.
/// Everything else is turned into local bytes first: uploaded files are
/// downloaded through their owning storage and other URLs are fetched.
pub(crate) async fn select_strategy(
    source: UploadSource,
    large_threshold: Option<u64>,
    fetcher: &HttpFetcher,
) -> StorageResult<UploadStrategy> {
    let materialized = match source {
        UploadSource::Bytes(data) => Materialized::Bytes(data),
        UploadSource::Reader { reader, size } => Materialized::Reader { reader, size },
        UploadSource::Url(url) => {
            if is_remote_url(&url) {
                return Ok(UploadStrategy::Remote(url));
            }
            Materialized::Bytes(fetcher.fetch(&url).await?)
        }
        UploadSource::Uploaded(file) => {
            let url = file.url();
            if is_remote_url(&url) {
                return Ok(UploadStrategy::Remote(url));
            }
            Materialized::Bytes(file.download().await?)
        }
    };

    local_strategy(materialized, large_threshold).await
}

/// Large when the size is known and reaches the threshold, simple otherwise.
pub(crate) async fn local_strategy(
    materialized: Materialized,
    large_threshold: Option<u64>,
) -> StorageResult<UploadStrategy> {
    let is_large = match (materialized.size(), large_threshold) {
        (Some(size), Some(threshold)) => size >= threshold,
        _ => false,
    };

    let strategy = match (materialized, is_large) {
        (Materialized::Bytes(data), true) => {
            let size = Some(data.len() as u64);
            UploadStrategy::Large {
                reader: Box::pin(std::io::Cursor::new(data)),
                size,
            }
        }
        (Materialized::Reader { reader, size }, true) => UploadStrategy::Large { reader, size },
        (Materialized::Bytes(data), false) => UploadStrategy::Simple(data),
        (Materialized::Reader { mut reader, size }, false) => {
            let mut buffer = Vec::with_capacity(size.unwrap_or(0).min(64 * 1024 * 1024) as usize);
            reader.read_to_end(&mut buffer).await?;
            UploadStrategy::Simple(Bytes::from(buffer))
        }
    };

    Ok(strategy)
}

/// Merge option layers, later layers winning key by key.
pub(crate) fn merge_options<'a>(
    layers: impl IntoIterator<Item = &'a ProviderOptions>,
) -> ProviderOptions {
    let mut merged = ProviderOptions::new();
    for layer in layers {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Remove `chunk_size` from the options; it configures the transfer and is
/// never sent as an upload parameter.
pub(crate) fn take_chunk_size(options: &mut ProviderOptions) -> Option<u64> {
    let size = match options.remove("chunk_size")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    size.filter(|&size| size > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cumulus_core::metadata::options_from;
    use serde_json::json;

    fn reader(data: &'static [u8]) -> BoxedReader {
        Box::pin(std::io::Cursor::new(data))
    }

    #[test]
    fn remote_schemes() {
        assert!(is_remote_url("http://example.com/a.jpg"));
        assert!(is_remote_url("https://example.com/a.jpg"));
        assert!(is_remote_url("ftp://example.com/a.jpg"));
        assert!(!is_remote_url("/media/a.jpg"));
        assert!(!is_remote_url("data:image/png;base64,AAAA"));
        assert!(!is_remote_url("s3://bucket/a.jpg"));
    }

    #[tokio::test]
    async fn remote_url_is_not_fetched() {
        let fetcher = HttpFetcher::new(std::time::Duration::from_secs(1)).unwrap();
        let strategy = select_strategy(
            UploadSource::Url("https://example.com/a.jpg".to_string()),
            Some(1),
            &fetcher,
        )
        .await
        .unwrap();

        assert!(matches!(strategy, UploadStrategy::Remote(url) if url == "https://example.com/a.jpg"));
    }

    #[tokio::test]
    async fn unsupported_url_fails_to_materialize() {
        let fetcher = HttpFetcher::new(std::time::Duration::from_secs(1)).unwrap();
        let result = select_strategy(
            UploadSource::Url("s3://bucket/a.jpg".to_string()),
            None,
            &fetcher,
        )
        .await;

        assert!(matches!(result, Err(crate::StorageError::Fetch(_))));
    }

    #[tokio::test]
    async fn size_at_threshold_is_large() {
        let strategy = local_strategy(Materialized::Bytes(Bytes::from_static(b"0123")), Some(4))
            .await
            .unwrap();
        assert!(matches!(strategy, UploadStrategy::Large { size: Some(4), .. }));
    }

    #[tokio::test]
    async fn size_below_threshold_is_simple() {
        let strategy = local_strategy(Materialized::Bytes(Bytes::from_static(b"012")), Some(4))
            .await
            .unwrap();
        assert!(matches!(strategy, UploadStrategy::Simple(data) if data.len() == 3));
    }

    #[tokio::test]
    async fn unknown_size_or_no_threshold_is_simple() {
        let strategy = local_strategy(
            Materialized::Reader {
                reader: reader(b"0123456789"),
                size: None,
            },
            Some(4),
        )
        .await
        .unwrap();
        assert!(matches!(strategy, UploadStrategy::Simple(data) if &data[..] == b"0123456789"));

        let strategy = local_strategy(
            Materialized::Reader {
                reader: reader(b"0123456789"),
                size: Some(10),
            },
            None,
        )
        .await
        .unwrap();
        assert!(matches!(strategy, UploadStrategy::Simple(_)));
    }

    #[test]
    fn later_layers_win() {
        let computed = options_from(json!({"public_id": "foo", "resource_type": "image", "type": "upload"}));
        let defaults = options_from(json!({"type": "private", "tags": "a"}));
        let per_call = options_from(json!({"tags": "b"}));

        let merged = merge_options([&computed, &defaults, &per_call]);
        assert_eq!(merged["public_id"], json!("foo"));
        assert_eq!(merged["type"], json!("private"));
        assert_eq!(merged["tags"], json!("b"));
    }

    #[test]
    fn chunk_size_is_extracted() {
        let mut options = options_from(json!({"chunk_size": 6_000_000, "tags": "a"}));
        assert_eq!(take_chunk_size(&mut options), Some(6_000_000));
        assert!(!options.contains_key("chunk_size"));

        let mut options = options_from(json!({"chunk_size": "5000000"}));
        assert_eq!(take_chunk_size(&mut options), Some(5_000_000));

        let mut options = options_from(json!({"chunk_size": 0}));
        assert_eq!(take_chunk_size(&mut options), None);
        assert!(options.is_empty());
    }
}
