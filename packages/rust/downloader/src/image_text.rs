//! Image-text posts: probe results and the HTML scrape fallback.

use scraper::{Html, Selector};
use tracing::{debug, instrument};
use vidkb_shared::{DownloadPayload, Result, VidkbError};

use crate::video::{YtDlpInfo, sanitize_title};

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)";

/// Default title for a post that has neither title nor description.
const UNTITLED_POST: &str = "Untitled post";

/// Build a text-only payload from probed metadata.
pub fn post_payload(info: &YtDlpInfo) -> DownloadPayload {
    let description = info
        .description
        .clone()
        .filter(|d| !d.trim().is_empty())
        .or_else(|| info.title.clone());
    build_post(
        info.title.as_deref(),
        description,
        info.uploader.clone(),
        info.image_urls(),
    )
}

fn build_post(
    title: Option<&str>,
    description: Option<String>,
    uploader: Option<String>,
    images: Vec<String>,
) -> DownloadPayload {
    let title = title
        .map(sanitize_title)
        .filter(|t| !t.is_empty())
        .or_else(|| {
            description
                .as_deref()
                .map(|d| sanitize_title(&d.chars().take(50).collect::<String>()))
                .filter(|t| !t.is_empty())
        })
        .unwrap_or_else(|| UNTITLED_POST.to_string());

    DownloadPayload {
        title,
        media_path: None,
        duration_secs: None,
        uploader,
        description,
        images,
    }
}

/// Fields pulled from a post's HTML `<meta>` tags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapedPost {
    pub title: Option<String>,
    pub description: Option<String>,
    pub images: Vec<String>,
}

impl ScrapedPost {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none()
    }

    pub fn into_payload(self) -> DownloadPayload {
        build_post(self.title.as_deref(), self.description, None, self.images)
    }
}

fn meta_content(doc: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    doc.select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|c| !c.is_empty())
        .map(String::from)
}

/// Extract Open Graph and description metadata from an HTML page.
pub fn parse_post_html(html: &str) -> ScrapedPost {
    let doc = Html::parse_document(html);

    let title = meta_content(&doc, r#"meta[property="og:title"]"#).or_else(|| {
        let selector = Selector::parse("title").ok()?;
        doc.select(&selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    });
    let description = meta_content(&doc, r#"meta[property="og:description"]"#)
        .or_else(|| meta_content(&doc, r#"meta[name="description"]"#));

    let images = Selector::parse(r#"meta[property="og:image"]"#)
        .map(|selector| {
            doc.select(&selector)
                .filter_map(|el| el.value().attr("content"))
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect()
        })
        .unwrap_or_default();

    ScrapedPost {
        title,
        description,
        images,
    }
}

/// Fetch a post page and scrape its metadata.
#[instrument(skip_all, fields(url = %url))]
pub fn scrape_post(client: &reqwest::blocking::Client, url: &str) -> Result<DownloadPayload> {
    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
        .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml")
        .send()
        .map_err(|e| VidkbError::Download(format!("fetching post page: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(VidkbError::Download(format!("post page returned HTTP {status}")));
    }

    let html = response
        .text()
        .map_err(|e| VidkbError::Download(format!("reading post page: {e}")))?;
    let scraped = parse_post_html(&html);
    if scraped.is_empty() {
        return Err(VidkbError::Download(
            "post page has no title or description metadata".into(),
        ));
    }

    debug!(title = ?scraped.title, images = scraped.images.len(), "scraped post metadata");
    Ok(scraped.into_payload())
}
