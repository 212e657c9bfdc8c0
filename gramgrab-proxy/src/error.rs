use thiserror::Error;

/// Failures of a single proxy invocation.
///
/// All of them happen before the first body byte is sent. Once streaming
/// has started, an upstream failure only ends the body early.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("url is required")]
    MissingUrl,

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    #[error("{0}")]
    UpstreamFetch(String),

    #[error("Video stream is not available")]
    EmptyStream,

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl ProxyError {
    /// Whether the caller sent a bad request, as opposed to the upstream failing.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::MissingUrl | Self::InvalidUrl(_))
    }
}
