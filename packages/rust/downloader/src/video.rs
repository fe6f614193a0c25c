//! yt-dlp argument building and metadata parsing.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use vidkb_shared::{DownloadPayload, Item, Result, Site, VidkbError};

const MAX_TITLE_CHARS: usize = 100;

static UNSAFE_TITLE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("valid regex"));

/// Subset of the yt-dlp info JSON that we read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct YtDlpInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub formats: Vec<serde_json::Value>,
    #[serde(default)]
    pub thumbnails: Vec<Thumbnail>,
    #[serde(default)]
    pub requested_downloads: Vec<RequestedDownload>,
    /// Set on older yt-dlp releases instead of `requested_downloads`.
    #[serde(default, rename = "_filename")]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thumbnail {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestedDownload {
    #[serde(default)]
    pub filepath: Option<String>,
}

impl YtDlpInfo {
    /// Does the probed post carry a playable stream?
    pub fn has_video(&self) -> bool {
        !self.formats.is_empty() || self.duration.is_some_and(|d| d > 0.0)
    }

    /// Final media path as reported by yt-dlp, after post-processing.
    pub fn final_path(&self) -> Option<PathBuf> {
        self.requested_downloads
            .iter()
            .find_map(|d| d.filepath.as_deref())
            .or(self.filename.as_deref())
            .map(PathBuf::from)
    }

    pub fn image_urls(&self) -> Vec<String> {
        self.thumbnails.iter().filter_map(|t| t.url.clone()).collect()
    }
}

/// Parse the single JSON document printed by `--dump-single-json`.
pub fn parse_info(stdout: &[u8]) -> Result<YtDlpInfo> {
    let text = String::from_utf8_lossy(stdout);
    // Warnings occasionally precede the JSON on stdout; take the last JSON line.
    let json = text
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with('{'))
        .ok_or_else(|| VidkbError::Download("yt-dlp printed no metadata".into()))?;
    serde_json::from_str(json)
        .map_err(|e| VidkbError::Download(format!("unreadable yt-dlp metadata: {e}")))
}

/// Replace filesystem-hostile characters, trim, and cap the length.
pub fn sanitize_title(raw: &str) -> String {
    let cleaned = UNSAFE_TITLE_CHARS.replace_all(raw.trim(), "_");
    cleaned.chars().take(MAX_TITLE_CHARS).collect::<String>().trim().to_string()
}

/// Container extension for a site's downloads.
pub fn extension_for(site: Site) -> &'static str {
    match site {
        Site::Xiaohongshu => "mp4",
        _ => "m4a",
    }
}

/// `<dir>/<SiteName>_<id>.<ext>`
pub fn output_path(dir: &Path, item: &Item) -> PathBuf {
    let site = item.platform.site();
    dir.join(format!(
        "{}_{}.{}",
        site.display_name(),
        item.id,
        extension_for(site)
    ))
}

/// yt-dlp arguments for a full download. `template` is the `-o` output template.
pub fn download_args(site: Site, template: &str, url: &str) -> Vec<String> {
    let mut args: Vec<String> = match site {
        Site::Xiaohongshu => vec!["-f", "best", "--merge-output-format", "mp4"],
        Site::Bilibili => vec![
            "-f",
            "bestaudio",
            "-x",
            "--audio-format",
            "m4a",
            "--audio-quality",
            "0",
        ],
        _ => vec![
            "-f",
            "bestaudio",
            "-x",
            "--audio-format",
            "m4a",
            "--no-playlist",
        ],
    }
    .into_iter()
    .map(String::from)
    .collect();

    args.extend(
        ["--no-simulate", "--dump-single-json", "-o", template, url]
            .into_iter()
            .map(String::from),
    );
    args
}

/// yt-dlp arguments for a metadata-only probe.
pub fn probe_args(url: &str) -> Vec<String> {
    ["--dump-single-json", "--skip-download", "--no-playlist", url]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Assemble a payload for a downloaded media file.
pub fn media_payload(info: &YtDlpInfo, media_path: PathBuf, fallback_title: &str) -> DownloadPayload {
    let title = info
        .title
        .as_deref()
        .map(sanitize_title)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| fallback_title.to_string());

    DownloadPayload {
        title,
        media_path: Some(media_path),
        duration_secs: info.duration,
        uploader: info.uploader.clone(),
        description: info.description.clone().filter(|d| !d.trim().is_empty()),
        images: Vec::new(),
    }
}
