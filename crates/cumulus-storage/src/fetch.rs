//! HTTP fetching of remote files
//!
//! Used to materialize bytes from URLs when the provider cannot fetch them
//! itself, and to download delivered files.

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// URL fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} fetching {url}")]
    Status { url: String, status: u16 },
}

/// Result type for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;

/// Plain HTTP(S) downloader.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> FetchResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn get(&self, url: &str) -> FetchResult<reqwest::Response> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            let scheme = url.split_once(':').map(|(s, _)| s).unwrap_or(url);
            return Err(FetchError::UnsupportedScheme(scheme.to_string()));
        }

        let response = self.client.get(url).send().await.map_err(|e| {
            tracing::error!(error = %e, url = %url, "Failed to fetch URL");
            FetchError::Http(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(url = %url, status = status.as_u16(), "Fetch returned error status");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }

    /// Download the whole body.
    pub async fn fetch(&self, url: &str) -> FetchResult<Bytes> {
        let response = self.get(url).await?;
        let bytes = response.bytes().await?;

        tracing::debug!(url = %url, size_bytes = bytes.len(), "Fetched URL");

        Ok(bytes)
    }

    /// Stream the body, along with its declared length when the server sends one.
    pub async fn fetch_stream(
        &self,
        url: &str,
    ) -> FetchResult<(impl Stream<Item = FetchResult<Bytes>> + Send + 'static, Option<u64>)> {
        let response = self.get(url).await?;
        let length = response.content_length();
        let stream = response.bytes_stream().map_err(FetchError::Http);

        Ok((stream, length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn fetch_returns_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/files/a.jpg")
            .with_status(200)
            .with_body("jpeg-bytes")
            .create_async()
            .await;

        let bytes = fetcher()
            .fetch(&format!("{}/files/a.jpg", server.url()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(&bytes[..], b"jpeg-bytes");
    }

    #[tokio::test]
    async fn fetch_reports_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let err = fetcher()
            .fetch(&format!("{}/missing", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn fetch_rejects_unsupported_scheme() {
        let err = fetcher().fetch("file:///etc/passwd").await.unwrap_err();
        match err {
            FetchError::UnsupportedScheme(scheme) => assert_eq!(scheme, "file"),
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(matches!(
            fetcher().fetch("not a url").await,
            Err(FetchError::UnsupportedScheme(_))
        ));
    }

    #[tokio::test]
    async fn fetch_stream_yields_all_bytes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/big")
            .with_status(200)
            .with_body(vec![7u8; 4096])
            .create_async()
            .await;

        let (stream, length) = fetcher()
            .fetch_stream(&format!("{}/big", server.url()))
            .await
            .unwrap();
        let chunks: Vec<Bytes> = stream.map(|c| c.unwrap()).collect().await;

        assert_eq!(length, Some(4096));
        assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), 4096);
    }
}
