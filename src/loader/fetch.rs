//! Storage fetchers
//!
//! The storage service is an external collaborator: it is asked for the raw
//! bytes behind a locator and answers with the bytes or a failure carrying an
//! HTTP-like status code.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Why a fetch did not produce bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// The service answered with a non-success status
    Status(u16),
    /// The service could not be reached
    Connect(String),
}

/// Source of encoded take bytes
#[async_trait]
pub trait TrackFetcher: Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<Bytes, FetchFailure>;
}

/// Fetches `{api_url}/storage/{locator}` over HTTP
#[cfg(feature = "http")]
pub struct HttpFetcher {
    client: reqwest::Client,
    api_url: String,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchFailure> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchFailure::Connect(e.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }

    pub fn from_config(config: &crate::config::StorageConfig) -> Result<Self, FetchFailure> {
        Self::new(config.api_url.clone(), config.request_timeout())
    }

    /// Full URL for a storage locator
    pub fn url_for(&self, locator: &str) -> String {
        format!(
            "{}/storage/{}",
            self.api_url.trim_end_matches('/'),
            locator.trim_start_matches('/')
        )
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl TrackFetcher for HttpFetcher {
    async fn fetch(&self, locator: &str) -> Result<Bytes, FetchFailure> {
        let url = self.url_for(locator);
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchFailure::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::Status(status.as_u16()));
        }

        response
            .bytes()
            .await
            .map_err(|e| FetchFailure::Connect(e.to_string()))
    }
}

/// Reads locators as paths below a local directory
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl TrackFetcher for FileFetcher {
    async fn fetch(&self, locator: &str) -> Result<Bytes, FetchFailure> {
        let path = self.root.join(locator.trim_start_matches('/'));
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FetchFailure::Status(404)),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Err(FetchFailure::Status(403))
            }
            Err(e) => Err(FetchFailure::Connect(format!("{}: {}", path.display(), e))),
        }
    }
}

/// In-memory store with optional simulated latency
///
/// Unknown locators answer 404.
#[derive(Default)]
pub struct MemoryFetcher {
    entries: DashMap<String, Result<Bytes, FetchFailure>>,
    latency: DashMap<String, Duration>,
    default_latency: Duration,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_latency(mut self, latency: Duration) -> Self {
        self.default_latency = latency;
        self
    }

    pub fn insert(&self, locator: impl Into<String>, data: Bytes) {
        self.entries.insert(locator.into(), Ok(data));
    }

    /// Make `locator` fail with `failure`
    pub fn fail(&self, locator: impl Into<String>, failure: FetchFailure) {
        self.entries.insert(locator.into(), Err(failure));
    }

    pub fn set_latency(&self, locator: impl Into<String>, latency: Duration) {
        self.latency.insert(locator.into(), latency);
    }
}

#[async_trait]
impl TrackFetcher for MemoryFetcher {
    async fn fetch(&self, locator: &str) -> Result<Bytes, FetchFailure> {
        let latency = self
            .latency
            .get(locator)
            .map(|l| *l.value())
            .unwrap_or(self.default_latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let entry = self.entries.get(locator).map(|e| e.value().clone());
        entry.unwrap_or(Err(FetchFailure::Status(404)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_fetcher() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert("a.wav", Bytes::from_static(b"abc"));
        fetcher.fail("b.wav", FetchFailure::Status(500));

        assert_eq!(fetcher.fetch("a.wav").await.unwrap(), Bytes::from_static(b"abc"));
        assert_eq!(fetcher.fetch("b.wav").await, Err(FetchFailure::Status(500)));
        assert_eq!(fetcher.fetch("c.wav").await, Err(FetchFailure::Status(404)));
    }

    #[tokio::test]
    async fn test_file_fetcher_missing_is_404() {
        let fetcher = FileFetcher::new(std::env::temp_dir());
        let result = fetcher.fetch("multitake-no-such-take.wav").await;
        assert_eq!(result, Err(FetchFailure::Status(404)));
    }

    #[cfg(feature = "http")]
    #[test]
    fn test_storage_url() {
        let fetcher =
            HttpFetcher::new("http://localhost:8000/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            fetcher.url_for("/tracks/1.wav"),
            "http://localhost:8000/api/storage/tracks/1.wav"
        );
    }
}
