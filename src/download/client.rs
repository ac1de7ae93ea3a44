//! HTTP client wrapper for probing and fetching files.
//!
//! This module provides the `HttpClient` struct which owns three reqwest
//! clients sharing one connection policy: a probe client for metadata and
//! page requests, a client with redirect-following disabled for the
//! indirection negotiation, and a fetch client with a browser User-Agent and
//! a long timeout for the byte transfer itself.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_DISPOSITION, LOCATION};
use reqwest::{Client, ClientBuilder, redirect};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};
use url::Url;
use uuid::Uuid;

use super::constants::{
    CONNECT_TIMEOUT_SECS, DOWNLOAD_TIMEOUT_SECS, PARTIAL_SUFFIX, PROBE_TIMEOUT_SECS,
    PROGRESS_STEP_PERCENT,
};
use super::error::DownloadError;
use crate::user_agent::{self, BROWSER_USER_AGENT};

/// Byte-count snapshot reported while a fetch is in flight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchProgress {
    /// Bytes received so far.
    pub bytes: u64,
    /// Expected total from Content-Length, when the server sent one.
    pub total: Option<u64>,
}

impl FetchProgress {
    /// Completion in percent, when the total is known.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(0) | None => None,
            Some(total) => Some((self.bytes as f64 * 100.0 / total as f64).min(100.0)),
        }
    }
}

/// Receives coarse progress events from running fetches.
pub trait ProgressObserver: Send + Sync {
    /// Called at most once per [`PROGRESS_STEP_PERCENT`] of progress, and once on completion.
    fn on_progress(&self, url: &str, progress: FetchProgress);
}

/// Decides which progress updates are worth reporting.
#[derive(Debug, Default)]
pub struct ProgressThrottle {
    last_percent: f64,
}

impl ProgressThrottle {
    /// Creates a throttle that has reported nothing yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `progress` moved far enough since the last report.
    pub fn should_report(&mut self, progress: FetchProgress) -> bool {
        let Some(percent) = progress.percent() else {
            return false;
        };
        if percent - self.last_percent >= PROGRESS_STEP_PERCENT {
            self.last_percent = percent;
            true
        } else {
            false
        }
    }
}

/// Response headers of interest from a metadata (HEAD) probe.
#[derive(Debug, Clone, Default)]
pub struct ProbeMetadata {
    /// Raw Content-Disposition header, if any.
    pub content_disposition: Option<String>,
}

/// Outcome of a GET issued with redirect-following disabled.
#[derive(Debug, Clone)]
pub struct RedirectProbe {
    /// HTTP status code.
    pub status: u16,
    /// `Location` header, absolutized against the request URL.
    pub location: Option<String>,
}

impl RedirectProbe {
    /// True for the redirect statuses the indirection protocol follows.
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 302 | 303)
    }

    /// True for 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Result of a completed fetch.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    /// Final output path.
    pub path: PathBuf,
    /// Bytes written.
    pub bytes: u64,
}

/// HTTP client for the probe, negotiation and fetch steps.
///
/// Created once per service and cloned into every task; the inner reqwest
/// clients share their connection pools across clones.
#[derive(Debug, Clone)]
pub struct HttpClient {
    probe: Client,
    no_redirect: Client,
    fetch: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with default timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeouts(PROBE_TIMEOUT_SECS, DOWNLOAD_TIMEOUT_SECS)
    }

    /// Creates a client with explicit probe and download timeouts (seconds).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_timeouts(probe_timeout_secs: u64, download_timeout_secs: u64) -> Self {
        Self::try_with_timeouts(probe_timeout_secs, download_timeout_secs)
            .expect("failed to build HTTP client with static configuration")
    }

    /// Fallible variant of [`with_timeouts`](Self::with_timeouts).
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error if TLS or proxy setup fails.
    pub fn try_with_timeouts(
        probe_timeout_secs: u64,
        download_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let probe_ua = user_agent::default_probe_user_agent();
        Ok(Self {
            probe: base_builder(probe_timeout_secs, &probe_ua).build()?,
            no_redirect: base_builder(probe_timeout_secs, &probe_ua)
                .redirect(redirect::Policy::none())
                .build()?,
            fetch: base_builder(download_timeout_secs, BROWSER_USER_AGENT).build()?,
        })
    }

    /// Issues a HEAD request and returns the headers needed to name the file.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on transport failure or non-success status.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn probe_metadata(&self, url: &str) -> Result<ProbeMetadata, DownloadError> {
        let response = self
            .probe
            .head(url)
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        if !response.status().is_success() {
            return Err(DownloadError::http_status(url, response.status().as_u16()));
        }

        let headers = response.headers();
        Ok(ProbeMetadata {
            content_disposition: headers
                .get(CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        })
    }

    /// Issues a GET without following redirects. The body is never read.
    ///
    /// Any status is returned as-is; only transport failures are errors.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on invalid URL or transport failure.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_without_redirect(&self, url: &str) -> Result<RedirectProbe, DownloadError> {
        let base = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        let response = self
            .no_redirect
            .get(base.clone())
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| base.join(v).ok())
            .map(String::from);

        Ok(RedirectProbe {
            status: response.status().as_u16(),
            location,
        })
    }

    /// Fetches a page body as text.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on transport failure or non-success status.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_text(&self, url: &str) -> Result<String, DownloadError> {
        let response = self
            .probe
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        if !response.status().is_success() {
            return Err(DownloadError::http_status(url, response.status().as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| DownloadError::network(url, e))
    }

    /// Downloads `url` to `destination`, which must already have passed the path guard.
    ///
    /// Bytes are streamed into a hidden `.part` sibling and renamed over the
    /// destination only once the body is complete and non-empty, so a failed
    /// fetch never leaves a half-written file under the final name.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::InvalidUrl`] if `url` does not parse
    /// - [`DownloadError::Network`] / [`DownloadError::Timeout`] on transport failure
    /// - [`DownloadError::HttpStatus`] on non-success status
    /// - [`DownloadError::EmptyBody`] if the server sent zero bytes
    /// - [`DownloadError::Io`] if the file cannot be written
    #[instrument(
        skip(self, destination, observer),
        fields(url = %url, path = %destination.display())
    )]
    pub async fn fetch_to_file(
        &self,
        url: &str,
        destination: &Path,
        observer: Option<&dyn ProgressObserver>,
    ) -> Result<FetchedFile, DownloadError> {
        debug!("starting fetch");
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = self
            .fetch
            .get(parsed)
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        if !response.status().is_success() {
            return Err(DownloadError::http_status(url, response.status().as_u16()));
        }

        let total = response.content_length();
        let partial_path = partial_path_for(destination);
        let file = File::create(&partial_path)
            .await
            .map_err(|e| DownloadError::io(partial_path.clone(), e))?;

        let streamed = stream_to_file(file, response, url, &partial_path, total, observer).await;
        let bytes = match streamed {
            Ok(0) => {
                let _ = tokio::fs::remove_file(&partial_path).await;
                return Err(DownloadError::empty_body(url));
            }
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %partial_path.display(), "cleaning up partial file after error");
                let _ = tokio::fs::remove_file(&partial_path).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&partial_path, destination).await {
            let _ = tokio::fs::remove_file(&partial_path).await;
            return Err(DownloadError::io(destination, e));
        }

        info!(path = %destination.display(), bytes, "download complete");
        Ok(FetchedFile {
            path: destination.to_path_buf(),
            bytes,
        })
    }
}

fn base_builder(timeout_secs: u64, user_agent: &str) -> ClientBuilder {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(timeout_secs))
        .gzip(true)
        .user_agent(user_agent.to_string())
}

/// Hidden sibling of `destination`, unique per fetch so concurrent fetches of
/// the same name never share a partial file.
fn partial_path_for(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let nonce = Uuid::new_v4().simple();
    destination.with_file_name(format!(".{name}.{nonce}{PARTIAL_SUFFIX}"))
}

/// Streams response body to file, returning bytes written.
async fn stream_to_file(
    file: File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
    total: Option<u64>,
    observer: Option<&dyn ProgressObserver>,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut throttle = ProgressThrottle::new();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

        bytes_written += chunk.len() as u64;

        let progress = FetchProgress {
            bytes: bytes_written,
            total,
        };
        if throttle.should_report(progress) {
            if let Some(percent) = progress.percent() {
                info!(url, percent = format!("{percent:.2}"), "download progress");
            }
            if let Some(observer) = observer {
                observer.on_progress(url, progress);
            }
        }
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

    if let Some(observer) = observer {
        observer.on_progress(
            url,
            FetchProgress {
                bytes: bytes_written,
                total: total.or(Some(bytes_written)),
            },
        );
    }

    Ok(bytes_written)
}

/// Shares one observer between the engine and its tasks.
pub type SharedProgressObserver = Arc<dyn ProgressObserver>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, ResponseTemplate};

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<FetchProgress>>,
    }

    impl ProgressObserver for RecordingObserver {
        fn on_progress(&self, _url: &str, progress: FetchProgress) {
            self.events.lock().unwrap().push(progress);
        }
    }

    #[test]
    fn test_progress_percent_requires_known_total() {
        let unknown = FetchProgress {
            bytes: 10,
            total: None,
        };
        assert_eq!(unknown.percent(), None);
        let half = FetchProgress {
            bytes: 50,
            total: Some(100),
        };
        assert_eq!(half.percent(), Some(50.0));
    }

    #[test]
    fn test_progress_throttle_reports_on_five_point_steps() {
        let mut throttle = ProgressThrottle::new();
        let at = |bytes| FetchProgress {
            bytes,
            total: Some(1000),
        };
        assert!(!throttle.should_report(at(10)));
        assert!(throttle.should_report(at(50)));
        assert!(!throttle.should_report(at(80)));
        assert!(throttle.should_report(at(100)));
        assert!(throttle.should_report(at(1000)));
        assert!(!throttle.should_report(at(1000)));
    }

    #[test]
    fn test_redirect_probe_classification() {
        let redirect = RedirectProbe {
            status: 303,
            location: None,
        };
        assert!(redirect.is_redirect());
        assert!(!redirect.is_success());
        let moved = RedirectProbe {
            status: 301,
            location: None,
        };
        assert!(!moved.is_redirect());
    }

    #[test]
    fn test_partial_path_is_unique_hidden_sibling() {
        let first = partial_path_for(Path::new("/cache/song.mp3"));
        let second = partial_path_for(Path::new("/cache/song.mp3"));
        assert_ne!(first, second);

        assert_eq!(first.parent(), Some(Path::new("/cache")));
        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".song.mp3."), "got: {name}");
        assert!(name.ends_with(PARTIAL_SUFFIX), "got: {name}");
    }

    #[tokio::test]
    async fn test_fetch_to_file_writes_body_and_reports_completion() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();
        let body = vec![7u8; 4096];

        Mock::given(method("GET"))
            .and(path("/song.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new();
        let observer = RecordingObserver::default();
        let destination = temp_dir.path().join("song.mp3");
        let url = format!("{}/song.mp3", mock_server.uri());

        let fetched = client
            .fetch_to_file(&url, &destination, Some(&observer))
            .await
            .unwrap();

        assert_eq!(fetched.bytes, 4096);
        assert_eq!(std::fs::read(&destination).unwrap(), body);
        assert!(!temp_dir.path().join(".song.mp3.part").exists());
        let events = observer.events.lock().unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.bytes, 4096);
        assert_eq!(last.percent(), Some(100.0));
    }

    #[tokio::test]
    async fn test_fetch_to_file_sends_browser_user_agent() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/song.ogg"))
            .and(header("user-agent", BROWSER_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ogg".to_vec()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = HttpClient::new();
        let url = format!("{}/song.ogg", mock_server.uri());
        let result = client
            .fetch_to_file(&url, &temp_dir.path().join("song.ogg"), None)
            .await;
        assert!(result.is_ok(), "Expected Ok, got: {result:?}");
    }

    #[tokio::test]
    async fn test_fetch_to_file_empty_body_leaves_nothing_behind() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/empty.mp3"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new();
        let destination = temp_dir.path().join("empty.mp3");
        let url = format!("{}/empty.mp3", mock_server.uri());
        let result = client.fetch_to_file(&url, &destination, None).await;

        assert!(matches!(result, Err(DownloadError::EmptyBody { .. })));
        assert!(!destination.exists());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_to_file_http_error_leaves_existing_file_untouched() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("song.mp3");
        std::fs::write(&destination, b"previous").unwrap();

        Mock::given(method("GET"))
            .and(path("/song.mp3"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new();
        let url = format!("{}/song.mp3", mock_server.uri());
        let result = client.fetch_to_file(&url, &destination, None).await;

        match result {
            Err(DownloadError::HttpStatus { status, .. }) => assert_eq!(status, 500),
            other => panic!("Expected HttpStatus error, got: {other:?}"),
        }
        assert_eq!(std::fs::read(&destination).unwrap(), b"previous");
    }

    #[tokio::test]
    async fn test_probe_metadata_reads_content_disposition() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("HEAD"))
            .and(path("/download"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Disposition", r#"attachment; filename="mix.mp3""#),
            )
            .mount(&mock_server)
            .await;

        let client = HttpClient::new();
        let url = format!("{}/download", mock_server.uri());
        let metadata = client.probe_metadata(&url).await.unwrap();
        assert_eq!(
            metadata.content_disposition.as_deref(),
            Some(r#"attachment; filename="mix.mp3""#)
        );
    }

    #[tokio::test]
    async fn test_get_without_redirect_returns_absolute_location() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/uc"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/download?id=abc"))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new();
        let url = format!("{}/uc?id=abc", mock_server.uri());
        let probe = client.get_without_redirect(&url).await.unwrap();

        assert!(probe.is_redirect());
        assert_eq!(
            probe.location,
            Some(format!("{}/download?id=abc", mock_server.uri()))
        );
    }

    #[tokio::test]
    async fn test_invalid_url_is_reported() {
        let client = HttpClient::new();
        let result = client.get_without_redirect("not-a-valid-url").await;
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }

    #[test]
    fn test_fetch_invalid_url_writes_nothing() {
        let client = HttpClient::new();
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("song.mp3");

        let result =
            tokio_test::block_on(client.fetch_to_file("not-a-valid-url", &destination, None));

        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
        assert!(std::fs::read_dir(temp_dir.path()).unwrap().next().is_none());
    }
}
