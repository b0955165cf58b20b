//! Feed sources.
//!
//! A [`FeedSource`] is the network access point of a converter: it returns
//! the raw bytes of the provider's feed, or a [`SourceError`] telling a
//! missing resource apart from a failed connection.

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::{Client, Proxy, StatusCode};
use tracing::debug;

use crate::config::ConverterConfig;
use crate::error::{FxError, FxResult, SourceError, SourceResult};

/// Trait for anything that can deliver a feed document.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Where the feed is fetched from.
    fn locator(&self) -> &str;

    /// Fetch the complete feed document.
    async fn fetch(&self) -> SourceResult<Vec<u8>>;
}

/// Fetches a feed over HTTP(S), optionally through a proxy.
pub struct HttpFeedSource {
    url: String,
    client: Client,
}

impl HttpFeedSource {
    /// Build a source for `url` using the timeout, proxy and user agent of `config`.
    pub fn new(url: impl Into<String>, config: &ConverterConfig) -> FxResult<Self> {
        let mut builder = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone());

        if let Some(proxy) = &config.proxy {
            let proxy = Proxy::all(proxy.as_str())
                .map_err(|e| FxError::Config(format!("invalid proxy {proxy:?}: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| FxError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

fn classify(url: &str, err: reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout(url.to_string())
    } else {
        SourceError::Connection(format!("{url}: {err}"))
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    fn locator(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> SourceResult<Vec<u8>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| classify(&self.url, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(SourceError::NotFound(self.url.clone()));
        }
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let body = response.bytes().await.map_err(|e| classify(&self.url, e))?;
        debug!(url = %self.url, bytes = body.len(), "Fetched feed");
        Ok(body.to_vec())
    }
}

/// Reads a feed from the local filesystem.
pub struct FileFeedSource {
    path: PathBuf,
    locator: String,
}

impl FileFeedSource {
    /// Source for `path`; a `file://` prefix is accepted and stripped.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let path = match path.to_str().and_then(|p| p.strip_prefix("file://")) {
            Some(stripped) => PathBuf::from(stripped),
            None => path,
        };

        Self {
            locator: path.display().to_string(),
            path,
        }
    }
}

#[async_trait]
impl FeedSource for FileFeedSource {
    fn locator(&self) -> &str {
        &self.locator
    }

    async fn fetch(&self) -> SourceResult<Vec<u8>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SourceError::NotFound(self.locator.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Build the source for a feed locator: `file://` paths read from disk,
/// anything else goes over HTTP.
pub fn source_for(locator: &str, config: &ConverterConfig) -> FxResult<Box<dyn FeedSource>> {
    if locator.starts_with("file://") {
        return Ok(Box::new(FileFeedSource::new(locator)));
    }
    if locator.starts_with("http://") || locator.starts_with("https://") {
        return Ok(Box::new(HttpFeedSource::new(locator, config)?));
    }
    Err(FxError::Config(format!("unsupported feed locator {locator:?}")))
}

/// Scripted feed source for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockFeedSource {
    locator: String,
    response: parking_lot::Mutex<MockResponse>,
    delay: parking_lot::Mutex<Option<std::time::Duration>>,
    fetches: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone)]
enum MockResponse {
    Body(Vec<u8>),
    NotFound,
    Unreachable,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockFeedSource {
    /// Create a source that answers with `body`.
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            locator: "mock://feed".to_string(),
            response: parking_lot::Mutex::new(MockResponse::Body(body.into())),
            delay: parking_lot::Mutex::new(None),
            fetches: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Create a source whose resource does not exist.
    pub fn not_found() -> Self {
        let source = Self::new(Vec::new());
        source.set_not_found();
        source
    }

    /// Answer subsequent fetches with `body`.
    pub fn set_body(&self, body: impl Into<Vec<u8>>) {
        *self.response.lock() = MockResponse::Body(body.into());
    }

    /// Fail subsequent fetches with `NotFound`.
    pub fn set_not_found(&self) {
        *self.response.lock() = MockResponse::NotFound;
    }

    /// Fail subsequent fetches with a connection error.
    pub fn set_unreachable(&self) {
        *self.response.lock() = MockResponse::Unreachable;
    }

    /// Sleep this long before answering.
    pub fn set_delay(&self, delay: std::time::Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Number of fetches served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl FeedSource for MockFeedSource {
    fn locator(&self) -> &str {
        &self.locator
    }

    async fn fetch(&self) -> SourceResult<Vec<u8>> {
        self.fetches
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let response = self.response.lock().clone();
        match response {
            MockResponse::Body(body) => Ok(body),
            MockResponse::NotFound => Err(SourceError::NotFound(self.locator.clone())),
            MockResponse::Unreachable => {
                Err(SourceError::Connection(format!("{}: unreachable", self.locator)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_file_source_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"<feed/>").unwrap();

        let source = FileFeedSource::new(file.path());
        assert_eq!(source.fetch().await.unwrap(), b"<feed/>");
    }

    #[tokio::test]
    async fn test_file_source_missing_is_not_found() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = FileFeedSource::new(format!("file://{}/missing.xml", dir.path().display()));

        assert!(source.locator().ends_with("missing.xml"));
        assert!(!source.locator().starts_with("file://"));
        assert!(matches!(
            source.fetch().await,
            Err(SourceError::NotFound(_))
        ));
    }

    #[test]
    fn test_source_for_locators() {
        let config = ConverterConfig::default();

        assert!(source_for("file:///tmp/feed.xml", &config).is_ok());
        assert!(source_for("https://example.com/feed.xml", &config).is_ok());
        assert!(matches!(
            source_for("ftp://example.com/feed.xml", &config),
            Err(FxError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_proxy_is_config_error() {
        let config = ConverterConfig {
            proxy: Some("http://[invalid".to_string()),
            ..Default::default()
        };

        assert!(matches!(
            HttpFeedSource::new("https://example.com", &config),
            Err(FxError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_source_script() {
        let source = MockFeedSource::new("body");
        assert_eq!(source.fetch().await.unwrap(), b"body");

        source.set_not_found();
        assert!(matches!(source.fetch().await, Err(SourceError::NotFound(_))));

        source.set_unreachable();
        assert!(matches!(source.fetch().await, Err(SourceError::Connection(_))));
        assert_eq!(source.fetch_count(), 3);
    }
}
