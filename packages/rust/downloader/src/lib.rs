//! Media acquisition via `yt-dlp`, with an HTML scrape fallback for
//! image-text posts.
//!
//! Dispatch is by [`Platform`]: video platforms always download media;
//! image-text platforms probe first and only download when the post
//! carries a video.

pub mod image_text;
pub mod process;
pub mod video;

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, instrument, warn};
use vidkb_shared::{DownloadConfig, DownloadPayload, Downloader, Item, Platform, Result, VidkbError};

use crate::process::run_with_timeout;
use crate::video::{YtDlpInfo, download_args, media_payload, output_path, parse_info, probe_args};

/// [`Downloader`] backed by the `yt-dlp` executable.
pub struct YtDlpDownloader {
    config: DownloadConfig,
    download_dir: PathBuf,
    http: reqwest::blocking::Client,
}

impl YtDlpDownloader {
    pub fn new(config: DownloadConfig, download_dir: impl Into<PathBuf>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.metadata_timeout_secs))
            .build()
            .map_err(|e| VidkbError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            download_dir: download_dir.into(),
            http,
        })
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    fn probe(&self, url: &str) -> Result<YtDlpInfo> {
        let output = run_with_timeout(
            &self.config.ytdlp_path,
            &probe_args(url),
            Duration::from_secs(self.config.metadata_timeout_secs),
        )?;
        parse_info(&output.stdout)
    }

    /// Download the media for `item`, reusing an existing file unless forced.
    fn download_media(&self, item: &Item, force: bool) -> Result<DownloadPayload> {
        let target = output_path(&self.download_dir, item);
        let fallback_title = target
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| item.id.to_string());

        if target.is_file() && !force {
            info!(path = %target.display(), "media file already present, reusing");
            let info = self.probe(&item.url).unwrap_or_else(|e| {
                warn!(error = %e, "metadata probe failed for reused file");
                YtDlpInfo::default()
            });
            return Ok(media_payload(&info, target, &fallback_title));
        }

        std::fs::create_dir_all(&self.download_dir)
            .map_err(|e| VidkbError::io(&self.download_dir, e))?;

        let stem = target.with_extension("");
        let template = format!("{}.%(ext)s", stem.display());
        let args = download_args(item.platform.site(), &template, &item.url);

        info!(url = %item.url, platform = %item.platform, "downloading media");
        let output = run_with_timeout(
            &self.config.ytdlp_path,
            &args,
            Duration::from_secs(self.config.timeout_secs),
        )?;
        let info = parse_info(&output.stdout)?;

        let media_path = info
            .final_path()
            .filter(|p| p.is_file())
            .or_else(|| target.is_file().then(|| target.clone()))
            .ok_or_else(|| {
                VidkbError::Download(format!(
                    "yt-dlp finished but no media file was found at {}",
                    target.display()
                ))
            })?;

        info!(path = %media_path.display(), "download complete");
        Ok(media_payload(&info, media_path, &fallback_title))
    }

    /// Image-text post: probe, then video or text. Falls back to a page scrape.
    fn download_post(&self, item: &Item, force: bool) -> Result<DownloadPayload> {
        match self.probe(&item.url) {
            Ok(info) if info.has_video() => {
                info!("post carries a video");
                self.download_media(item, force)
            }
            Ok(info) => {
                info!("post is image-text only");
                Ok(image_text::post_payload(&info))
            }
            Err(probe_err) => {
                warn!(error = %probe_err, "metadata probe failed, trying direct download");
                match self.download_media(item, force) {
                    Ok(payload) => Ok(payload),
                    Err(download_err) => {
                        warn!(error = %download_err, "direct download failed, scraping page");
                        image_text::scrape_post(&self.http, &item.url).map_err(|scrape_err| {
                            VidkbError::Download(format!(
                                "all acquisition methods failed (probe: {probe_err}; \
                                 download: {download_err}; scrape: {scrape_err})"
                            ))
                        })
                    }
                }
            }
        }
    }
}

impl Downloader for YtDlpDownloader {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    #[instrument(skip_all, fields(id = %item.id, platform = %item.platform))]
    fn download(&mut self, item: &Item, force: bool) -> Result<DownloadPayload> {
        let valid = url::Url::parse(&item.url)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !valid {
            return Err(VidkbError::Download(format!("invalid URL: {:?}", item.url)));
        }

        match item.platform {
            Platform::ImageText(_) => self.download_post(item, force),
            Platform::Video(_) => self.download_media(item, force),
        }
    }
}
