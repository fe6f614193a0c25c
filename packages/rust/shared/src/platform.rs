//! Content platforms and URL → platform resolution.

use serde::{Deserialize, Serialize};
use url::Url;

/// A known content site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Site {
    #[serde(rename = "youtube")]
    YouTube,
    Bilibili,
    Douyin,
    #[serde(rename = "tiktok")]
    TikTok,
    Instagram,
    Xiaohongshu,
    Other,
}

impl Site {
    /// Display name, also used as the archive `Platform` value and file prefix.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::YouTube => "YouTube",
            Self::Bilibili => "Bilibili",
            Self::Douyin => "Douyin",
            Self::TikTok => "TikTok",
            Self::Instagram => "Instagram",
            Self::Xiaohongshu => "Xiaohongshu",
            Self::Other => "Unknown",
        }
    }
}

/// What kind of content a URL points at, tagged with its site.
///
/// Video platforms always yield a media file. Image-text platforms may yield
/// a media file (video notes) or only post text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "site", rename_all = "snake_case")]
pub enum Platform {
    Video(Site),
    ImageText(Site),
}

impl Platform {
    pub fn site(&self) -> Site {
        match self {
            Self::Video(site) | Self::ImageText(site) => *site,
        }
    }

    pub fn is_image_text(&self) -> bool {
        matches!(self, Self::ImageText(_))
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.site().display_name())
    }
}

/// Host suffix → platform table, checked in order.
const HOSTS: &[(&str, Platform)] = &[
    ("youtube.com", Platform::Video(Site::YouTube)),
    ("youtu.be", Platform::Video(Site::YouTube)),
    ("bilibili.com", Platform::Video(Site::Bilibili)),
    ("b23.tv", Platform::Video(Site::Bilibili)),
    ("douyin.com", Platform::Video(Site::Douyin)),
    ("tiktok.com", Platform::Video(Site::TikTok)),
    ("instagram.com", Platform::Video(Site::Instagram)),
    ("xiaohongshu.com", Platform::ImageText(Site::Xiaohongshu)),
    ("xhslink.com", Platform::ImageText(Site::Xiaohongshu)),
];

/// Resolve the platform for a raw URL string.
///
/// Unparseable URLs and unknown hosts resolve to `Video(Other)`; whether the
/// URL is actually downloadable is the download stage's call.
pub fn resolve_platform(raw: &str) -> Platform {
    let Ok(url) = Url::parse(raw.trim()) else {
        return Platform::Video(Site::Other);
    };
    let Some(host) = url.host_str() else {
        return Platform::Video(Site::Other);
    };
    let host = host.to_ascii_lowercase();

    HOSTS
        .iter()
        .find(|(suffix, _)| host == *suffix || host.ends_with(&format!(".{suffix}")))
        .map(|(_, platform)| *platform)
        .unwrap_or(Platform::Video(Site::Other))
}
