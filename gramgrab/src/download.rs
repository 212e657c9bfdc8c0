//! `gramgrab download`: post URL to file on disk.
//!
//! Shortcode, then cached or freshly resolved post, then the best stream
//! of its DASH manifest (or the plain video URL), then a streamed transfer
//! with a progress bar.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures::{StreamExt, TryStreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use gramgrab_api::http::ErrorResponse;
use gramgrab_core::{
    shortcode, CachedPost, Config, Error, HttpPostResolver, PostCache, PostResolver, ResolveError,
};
use gramgrab_proxy::{mpd, ByteStream, DownloadProgress, DownloadProxy, DownloadRequest, ProgressStream};

/// A post reduced to what the transfer needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVideo {
    pub video_url: String,
    pub username: Option<String>,
}

pub struct Grabber<R> {
    resolver: R,
    cache: PostCache,
    proxy: DownloadProxy,
    via: Option<Url>,
    client: reqwest::Client,
}

impl<R: PostResolver> Grabber<R> {
    pub fn new(resolver: R, config: &Config, via: Option<Url>) -> Result<Self> {
        let proxy = DownloadProxy::new(&config.proxy).context("Failed to build download proxy")?;
        let client = reqwest::Client::builder()
            .user_agent(config.proxy.user_agent.as_str())
            .connect_timeout(Duration::from_secs(config.proxy.connect_timeout_seconds))
            .read_timeout(Duration::from_secs(config.proxy.read_timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            resolver,
            cache: PostCache::from_config(&config.cache),
            proxy,
            via,
            client,
        })
    }

    /// Look a post up, consulting the cache first.
    ///
    /// Definitive rejections are cached too, so resubmitting a bad link
    /// does not hit the content API again until the entry expires.
    pub async fn resolve(&self, post_url: &str) -> gramgrab_core::Result<ResolvedVideo> {
        let shortcode = shortcode::parse_post_url(post_url)?;

        let cached = if let Some(hit) = self.cache.get(&shortcode) {
            debug!(%shortcode, "Post cache hit");
            hit
        } else {
            let resolved = self.resolver.resolve(&shortcode).await;
            match resolved {
                Ok(post) => {
                    let entry = CachedPost::from_post(&post);
                    self.cache.insert(shortcode.clone(), entry.clone());
                    entry
                }
                Err(ResolveError::Rejected {
                    message_key,
                    cacheable: true,
                    ..
                }) => {
                    self.cache.insert(shortcode, CachedPost::invalid(message_key.clone()));
                    return Err(Error::PostRejected { message_key });
                }
                Err(e) => return Err(e.into()),
            }
        };

        if let Some(invalid) = cached.invalid {
            return Err(Error::PostRejected {
                message_key: invalid.message_key,
            });
        }

        let video_url = select_video_url(cached.video_url.as_deref(), cached.dash_manifest.as_deref())
            .ok_or(Error::Resolve(ResolveError::NoMedia))?;

        Ok(ResolvedVideo {
            video_url,
            username: cached.username,
        })
    }

    /// Resolve `post_url` and save its video under `output_dir`.
    pub async fn download(&self, post_url: &str, output_dir: &Path) -> Result<PathBuf> {
        let video = self.resolve(post_url).await?;
        let filename = suggested_filename(video.username.as_deref(), chrono::Utc::now().timestamp_millis());
        let path = output_dir.join(&filename);

        info!(url = %video.video_url, file = %path.display(), "Downloading video");

        let (body, total) = match &self.via {
            Some(via) => self.fetch_via(via, &video.video_url, &filename).await?,
            None => {
                let download = self
                    .proxy
                    .proxy_download(DownloadRequest::new(video.video_url, Some(filename)))
                    .await?;
                let total = download.content_length();
                (download.into_body(), total)
            }
        };

        let written = write_stream_to_file(body, total, &path).await?;
        info!(bytes = written, file = %path.display(), "Download complete");
        Ok(path)
    }

    /// Pull the video through a remote `/download-proxy` endpoint.
    async fn fetch_via(&self, via: &Url, video_url: &str, filename: &str) -> Result<(ByteStream, Option<u64>)> {
        let mut endpoint = via.clone();
        endpoint
            .query_pairs_mut()
            .append_pair("url", video_url)
            .append_pair("filename", filename);

        let response = self
            .client
            .get(endpoint)
            .send()
            .await
            .with_context(|| format!("Failed to reach proxy {via}"))?;

        let status = response.status();
        if !status.is_success() {
            match response.json::<ErrorResponse>().await {
                Ok(body) => bail!("Proxy returned {status}: {} ({})", body.message, body.error),
                Err(_) => bail!("Proxy returned {status}"),
            }
        }

        let total = response.content_length();
        Ok((response.bytes_stream().boxed(), total))
    }
}

/// Best DASH stream when a manifest is present, otherwise the plain URL.
pub fn select_video_url(video_url: Option<&str>, dash_manifest: Option<&str>) -> Option<String> {
    if let Some(manifest) = dash_manifest {
        if let Some(best) = mpd::best_stream(manifest) {
            debug!(quality = %best.quality, bandwidth = best.bandwidth, "Selected DASH stream");
            return Some(best.url);
        }
        warn!("DASH manifest had no usable stream, falling back to video_url");
    }
    video_url.filter(|u| !u.is_empty()).map(str::to_string)
}

/// `instagram-<username>-<8 digits>.mp4`, or `gramgrab-<8 digits>.mp4` when
/// the owner is unknown. The digits are the tail of a millisecond timestamp.
pub fn suggested_filename(username: Option<&str>, timestamp_millis: i64) -> String {
    let suffix = timestamp_millis.rem_euclid(100_000_000);
    let username: Option<String> = username.filter(|u| !u.is_empty()).map(|u| {
        u.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' { c } else { '_' })
            .collect()
    });

    match username {
        Some(user) => format!("instagram-{user}-{suffix:08}.mp4"),
        None => format!("gramgrab-{suffix:08}.mp4"),
    }
}

fn progress_bar(total: Option<u64>) -> ProgressBar {
    match total {
        Some(len) => {
            let pb = ProgressBar::new(len);
            pb.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}",
                )
                .map_or_else(|_| ProgressStyle::default_bar(), |s| s.progress_chars("#>-")),
            );
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {bytes} ({bytes_per_sec}) {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb
        }
    }
}

/// Write `body` to `path`, driving a progress bar. A partial file is
/// removed when the transfer fails.
pub async fn write_stream_to_file(body: ByteStream, total: Option<u64>, path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let bar = progress_bar(total);
    let bar_handle = bar.clone();
    let mut stream = ProgressStream::new(body, total, move |progress: DownloadProgress| {
        bar_handle.set_position(progress.bytes_transferred);
        if let Some(pct) = progress.percent() {
            bar_handle.set_message(format!("{pct}%"));
        }
    });

    let result = async {
        while let Some(chunk) = stream.try_next().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        anyhow::Ok(stream.progress().bytes_transferred)
    }
    .await;

    match result {
        Ok(written) => {
            bar.finish_with_message("done");
            Ok(written)
        }
        Err(e) => {
            bar.abandon_with_message("failed");
            drop(file);
            if let Err(remove_err) = tokio::fs::remove_file(path).await {
                warn!("Failed to remove partial file {}: {}", path.display(), remove_err);
            }
            Err(e.context(format!("Download to {} failed", path.display())))
        }
    }
}

pub async fn run(config: &Config, urls: &[String], output_dir: &Path, via: Option<Url>) -> Result<()> {
    let resolver = HttpPostResolver::new(&config.resolver)
        .context("The content API is not configured (set resolver.api_base_url)")?;
    let grabber = Grabber::new(resolver, config, via)?;

    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let mut failures = 0usize;
    for url in urls {
        match grabber.download(url, output_dir).await {
            Ok(path) => println!("Saved {}", path.display()),
            Err(e) => {
                failures += 1;
                eprintln!("{url}: {e:#}");
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} download(s) failed", urls.len());
    }
    Ok(())
}
