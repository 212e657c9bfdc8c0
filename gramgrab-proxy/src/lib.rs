//! Streaming download proxy
//!
//! Relays a remote video to the caller as an attachment, chunk by chunk,
//! so browsers can save cross-origin media under a chosen filename and
//! observe byte progress. The `mpd` module picks the best stream out of a
//! DASH manifest before a download starts.

pub mod error;
pub mod mpd;
pub mod progress;

use std::fmt::{self, Write};
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use gramgrab_core::config::ProxyConfig;

pub use error::ProxyError;
pub use mpd::{best_stream, best_url, parse_manifest, try_parse_manifest, ManifestError, StreamDescriptor};
pub use progress::{DownloadProgress, ProgressStream};

/// Sent when the upstream does not name a content type.
pub const FALLBACK_CONTENT_TYPE: &str = "video/mp4";

/// Everything outside RFC 5987 `attr-char`.
const RFC5987_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Upstream body as delivered by the HTTP client.
pub type ByteStream = BoxStream<'static, Result<Bytes, reqwest::Error>>;

/// Query parameters of one proxy invocation.
#[derive(Debug, Clone, Default)]
pub struct DownloadRequest {
    pub url: Option<String>,
    pub filename: Option<String>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, filename: Option<String>) -> Self {
        Self {
            url: Some(url.into()),
            filename,
        }
    }
}

/// A successful relay: response headers plus the pass-through body.
pub struct ProxiedDownload {
    filename: String,
    content_disposition: HeaderValue,
    content_type: HeaderValue,
    content_length: Option<u64>,
    body: ByteStream,
}

impl ProxiedDownload {
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    #[must_use]
    pub const fn content_disposition(&self) -> &HeaderValue {
        &self.content_disposition
    }

    #[must_use]
    pub const fn content_type(&self) -> &HeaderValue {
        &self.content_type
    }

    #[must_use]
    pub const fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    #[must_use]
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_DISPOSITION, self.content_disposition.clone());
        headers.insert(header::CONTENT_TYPE, self.content_type.clone());
        if let Some(len) = self.content_length {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
        }
        headers
    }

    /// Take the body, dropping the header metadata.
    #[must_use]
    pub fn into_body(self) -> ByteStream {
        self.body
    }
}

impl fmt::Debug for ProxiedDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxiedDownload")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl IntoResponse for ProxiedDownload {
    fn into_response(self) -> Response {
        let headers = self.headers();
        (StatusCode::OK, headers, Body::from_stream(self.body)).into_response()
    }
}

/// Stateless per-request relay. Cloning shares the connection pool.
#[derive(Clone)]
pub struct DownloadProxy {
    client: reqwest::Client,
    default_filename: String,
    allow_insecure_upstream: bool,
}

impl DownloadProxy {
    pub fn new(config: &ProxyConfig) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .read_timeout(Duration::from_secs(config.read_timeout_seconds))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| ProxyError::Client(e.to_string()))?;

        Ok(Self {
            client,
            default_filename: config.default_filename.clone(),
            allow_insecure_upstream: config.allow_insecure_upstream,
        })
    }

    /// Fetch `request.url` and hand back its body as an attachment stream.
    ///
    /// Validation happens before any network traffic. The body is not read
    /// here; dropping the returned stream releases the upstream connection.
    pub async fn proxy_download(&self, request: DownloadRequest) -> Result<ProxiedDownload, ProxyError> {
        let (url, filename) = self.validate(request)?;
        let host = url.host_str().unwrap_or_default().to_string();

        tracing::info!(%host, %filename, "Proxying download");

        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "*/*")
            // Uncompressed, so Content-Length matches the bytes relayed.
            .header(header::ACCEPT_ENCODING, "identity")
            .send()
            .await
            .map_err(|e| ProxyError::UpstreamFetch(format!("Failed to fetch video: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or_else(|| status.as_str());
            return Err(ProxyError::UpstreamFetch(format!("Failed to fetch video: {reason}")));
        }
        if matches!(status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT) {
            return Err(ProxyError::EmptyStream);
        }

        let content_type = content_type_or_default(response.headers());
        let content_length = content_length(response.headers());

        let mut monitor = RelayMonitor::new(host, content_length);
        let body = ProgressStream::new(
            response.bytes_stream().boxed(),
            content_length,
            move |progress| monitor.record(progress),
        )
        .inspect_err(|e| tracing::warn!(error = %e, "Upstream body failed mid-transfer"))
        .boxed();

        Ok(ProxiedDownload {
            content_disposition: content_disposition(&filename),
            filename,
            content_type,
            content_length,
            body,
        })
    }

    fn validate(&self, request: DownloadRequest) -> Result<(Url, String), ProxyError> {
        let raw = request
            .url
            .filter(|u| !u.is_empty())
            .ok_or(ProxyError::MissingUrl)?;

        let scheme_ok = raw.starts_with("https://")
            || (self.allow_insecure_upstream && raw.starts_with("http://"));
        if !scheme_ok {
            return Err(ProxyError::InvalidUrl(raw));
        }
        let url = Url::parse(&raw).map_err(|e| ProxyError::InvalidUrl(format!("{raw}: {e}")))?;

        let filename = request
            .filename
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| self.default_filename.clone());

        Ok((url, filename))
    }
}

// ------------------------------------------------------------------
// Header helpers
// ------------------------------------------------------------------

/// Upstream `Content-Type`, or [`FALLBACK_CONTENT_TYPE`].
#[must_use]
pub fn content_type_or_default(upstream: &HeaderMap) -> HeaderValue {
    upstream
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(FALLBACK_CONTENT_TYPE))
}

fn content_length(upstream: &HeaderMap) -> Option<u64> {
    upstream
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Make a filename safe inside a quoted header parameter.
///
/// Quotes, backslashes, control characters and non-ASCII characters are
/// replaced with `_`; everything else is kept verbatim.
#[must_use]
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_control() || !c.is_ascii() => '_',
            c => c,
        })
        .collect()
}

/// `attachment; filename="..."`, plus an RFC 5987 `filename*` parameter
/// carrying the original name when it is not plain ASCII.
#[must_use]
pub fn content_disposition(filename: &str) -> HeaderValue {
    let mut value = format!("attachment; filename=\"{}\"", sanitize_filename(filename));
    if !filename.is_ascii() {
        let printable: String = filename.chars().filter(|c| !c.is_control()).collect();
        let _ = write!(
            value,
            "; filename*=UTF-8''{}",
            utf8_percent_encode(&printable, RFC5987_ENCODE)
        );
    }
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

// ------------------------------------------------------------------
// Relay bookkeeping
// ------------------------------------------------------------------

/// Logs how a relay ended once its body stream is dropped, whether it ran
/// to completion, failed, or the client disconnected.
struct RelayMonitor {
    host: String,
    progress: DownloadProgress,
    span: tracing::Span,
}

impl RelayMonitor {
    fn new(host: String, total_bytes: Option<u64>) -> Self {
        Self {
            host,
            progress: DownloadProgress::new(total_bytes),
            span: tracing::Span::current(),
        }
    }

    fn record(&mut self, progress: DownloadProgress) {
        self.progress = progress;
        tracing::trace!(
            parent: &self.span,
            bytes = progress.bytes_transferred,
            total = ?progress.total_bytes,
            "Relayed chunk"
        );
    }
}

impl Drop for RelayMonitor {
    fn drop(&mut self) {
        let _entered = self.span.enter();
        let bytes = self.progress.bytes_transferred;
        match self.progress.total_bytes {
            Some(total) if bytes < total => {
                tracing::warn!(host = %self.host, bytes, total, "Relay ended before the body was complete");
            }
            total => {
                tracing::info!(host = %self.host, bytes, total = ?total, "Relay finished");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy(allow_insecure_upstream: bool) -> DownloadProxy {
        DownloadProxy::new(&ProxyConfig {
            allow_insecure_upstream,
            ..ProxyConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_validate_defaults_filename() {
        let (url, filename) = proxy(false)
            .validate(DownloadRequest::new("https://cdn.example.com/v.mp4", None))
            .unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/v.mp4");
        assert_eq!(filename, "instagram-video.mp4");

        let (_, filename) = proxy(false)
            .validate(DownloadRequest::new("https://cdn.example.com/v.mp4", Some("  ".into())))
            .unwrap();
        assert_eq!(filename, "instagram-video.mp4");
    }

    #[test]
    fn test_validate_rejects_missing_and_insecure() {
        let p = proxy(false);
        assert!(matches!(p.validate(DownloadRequest::default()), Err(ProxyError::MissingUrl)));
        assert!(matches!(
            p.validate(DownloadRequest::new("", None)),
            Err(ProxyError::MissingUrl)
        ));
        assert!(matches!(
            p.validate(DownloadRequest::new("http://example.com/v.mp4", None)),
            Err(ProxyError::InvalidUrl(_))
        ));
        assert!(matches!(
            p.validate(DownloadRequest::new("HTTPS://example.com/v.mp4", None)),
            Err(ProxyError::InvalidUrl(_))
        ));
        assert!(matches!(
            p.validate(DownloadRequest::new("https://", None)),
            Err(ProxyError::InvalidUrl(_))
        ));
        assert!(matches!(
            p.validate(DownloadRequest::new("ftp://example.com/v.mp4", None)),
            Err(ProxyError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_insecure_upstream_opt_in() {
        assert!(proxy(true)
            .validate(DownloadRequest::new("http://127.0.0.1:8000/v.mp4", None))
            .is_ok());
    }

    #[test]
    fn test_content_disposition_plain_name_is_verbatim() {
        assert_eq!(
            content_disposition("instagram-alice-12345678.mp4"),
            "attachment; filename=\"instagram-alice-12345678.mp4\""
        );
    }

    #[test]
    fn test_content_disposition_blocks_header_injection() {
        let value = content_disposition("a\".mp4\r\nSet-Cookie: x=1");
        assert_eq!(value, "attachment; filename=\"a_.mp4__Set-Cookie: x=1\"");
    }

    #[test]
    fn test_content_disposition_non_ascii() {
        let value = content_disposition("clip é.mp4");
        assert_eq!(
            value,
            "attachment; filename=\"clip _.mp4\"; filename*=UTF-8''clip%20%C3%A9.mp4"
        );
    }

    #[test]
    fn test_content_type_fallback() {
        let mut upstream = HeaderMap::new();
        assert_eq!(content_type_or_default(&upstream), "video/mp4");
        upstream.insert(header::CONTENT_TYPE, HeaderValue::from_static("video/webm"));
        assert_eq!(content_type_or_default(&upstream), "video/webm");
    }

    #[test]
    fn test_content_length_parsing() {
        let mut upstream = HeaderMap::new();
        assert_eq!(content_length(&upstream), None);
        upstream.insert(header::CONTENT_LENGTH, HeaderValue::from_static("1048576"));
        assert_eq!(content_length(&upstream), Some(1_048_576));
        upstream.insert(header::CONTENT_LENGTH, HeaderValue::from_static("lots"));
        assert_eq!(content_length(&upstream), None);
    }
}
