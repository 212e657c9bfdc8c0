//! Content resolution
//!
//! Turns a post shortcode into the direct video URL and, when the post is
//! eligible, the DASH manifest listing every quality variant.

mod error;
mod instagram;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::{ResolveError, MAX_RESPONSE_SIZE};
pub use instagram::HttpPostResolver;

/// The parts of a resolved post the downloader cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostInfo {
    pub video_url: Option<String>,
    pub username: Option<String>,
    pub dash_manifest: Option<String>,
    pub is_dash_eligible: bool,
}

impl PostInfo {
    /// The DASH manifest, only when the post is flagged eligible and the
    /// manifest is non-empty.
    #[must_use]
    pub fn eligible_manifest(&self) -> Option<&str> {
        if !self.is_dash_eligible {
            return None;
        }
        self.dash_manifest.as_deref().filter(|m| !m.trim().is_empty())
    }
}

/// Source of post metadata.
#[async_trait]
pub trait PostResolver: Send + Sync {
    async fn resolve(&self, shortcode: &str) -> Result<PostInfo, ResolveError>;
}

#[async_trait]
impl<T: PostResolver + ?Sized> PostResolver for std::sync::Arc<T> {
    async fn resolve(&self, shortcode: &str) -> Result<PostInfo, ResolveError> {
        (**self).resolve(shortcode).await
    }
}
