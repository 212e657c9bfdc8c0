//! HTTP client for the post lookup API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use super::error::{json_with_limit, ResolveError};
use super::{PostInfo, PostResolver};
use crate::config::{ResolverConfig, DEFAULT_USER_AGENT};

#[derive(Deserialize)]
struct PostEnvelope {
    data: PostData,
}

#[derive(Deserialize)]
struct PostData {
    xdt_shortcode_media: Option<ShortcodeMedia>,
}

#[derive(Deserialize)]
struct ShortcodeMedia {
    video_url: Option<String>,
    owner: Option<Owner>,
    dash_info: Option<DashInfo>,
}

#[derive(Deserialize)]
struct Owner {
    username: Option<String>,
}

#[derive(Deserialize)]
struct DashInfo {
    #[serde(default)]
    is_dash_eligible: bool,
    video_dash_manifest: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

impl From<ShortcodeMedia> for PostInfo {
    fn from(media: ShortcodeMedia) -> Self {
        let (is_dash_eligible, dash_manifest) = media
            .dash_info
            .map_or((false, None), |d| (d.is_dash_eligible, d.video_dash_manifest));

        Self {
            video_url: media.video_url.filter(|u| !u.is_empty()),
            username: media.owner.and_then(|o| o.username),
            dash_manifest,
            is_dash_eligible,
        }
    }
}

/// Resolves posts through `GET {api_base_url}/{shortcode}`.
pub struct HttpPostResolver {
    client: Client,
    api_base_url: Url,
}

impl HttpPostResolver {
    pub fn new(config: &ResolverConfig) -> Result<Self, ResolveError> {
        if config.api_base_url.is_empty() {
            return Err(ResolveError::InvalidConfig(
                "resolver.api_base_url is not configured".to_string(),
            ));
        }
        let api_base_url = Url::parse(&config.api_base_url)
            .map_err(|e| ResolveError::InvalidConfig(format!("resolver.api_base_url: {e}")))?;

        let client = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ResolveError::InvalidConfig(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base_url,
        })
    }

    fn post_url(&self, shortcode: &str) -> Result<Url, ResolveError> {
        let mut url = self.api_base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ResolveError::InvalidConfig(format!(
                    "resolver.api_base_url cannot be a base: {}",
                    self.api_base_url
                ))
            })?
            .pop_if_empty()
            .push(shortcode);
        Ok(url)
    }
}

#[async_trait]
impl PostResolver for HttpPostResolver {
    async fn resolve(&self, shortcode: &str) -> Result<PostInfo, ResolveError> {
        let url = self.post_url(shortcode)?;
        tracing::debug!(%shortcode, %url, "Resolving post");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        match status {
            StatusCode::OK => {
                let envelope: PostEnvelope = json_with_limit(response).await?;
                let media = envelope.data.xdt_shortcode_media.ok_or(ResolveError::NoMedia)?;
                Ok(media.into())
            }
            StatusCode::BAD_REQUEST
            | StatusCode::NOT_FOUND
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR => {
                let error_key = json_with_limit::<ErrorBody>(response)
                    .await
                    .ok()
                    .and_then(|body| body.error)
                    .unwrap_or_else(|| "unknown".to_string());
                tracing::warn!(%shortcode, %status, error = %error_key, "Post lookup rejected");

                Err(ResolveError::Rejected {
                    status,
                    message_key: format!("serverErrors.{error_key}"),
                    cacheable: matches!(status, StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND),
                })
            }
            _ => Err(ResolveError::Http {
                status,
                url: url.to_string(),
            }),
        }
    }
}
