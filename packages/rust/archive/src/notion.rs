//! Notion database sink.
//!
//! Pages are created in a database whose schema has the properties `Name`
//! (title), `URL`, `Transcript`, `Summary`, `KeyPoints` (rich text),
//! `Platform`, `Category`, `Sentiment` (select), `Tags` (multi-select) and
//! `CreatedTime` (date).

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde_json::{Value, json};
use tracing::{info, instrument};
use vidkb_shared::{
    ArchiveEntry, ArchivePayload, ArchiveSink, NotionCredentials, Result, SinkKind, VidkbError,
};

pub const NOTION_API_BASE: &str = "https://api.notion.com";
const NOTION_VERSION: &str = "2022-06-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_TITLE: usize = 100;
const MAX_RICH_TEXT: usize = 2000;
const MAX_KEY_POINTS_TEXT: usize = 1000;
const MAX_KEY_POINTS: usize = 5;
const MAX_TAGS: usize = 10;
const MAX_TAG: usize = 50;
const MAX_CATEGORY: usize = 50;
const MAX_SENTIMENT: usize = 20;

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn rich_text(content: &str, max_chars: usize) -> Value {
    json!({ "rich_text": [{ "text": { "content": clip(content, max_chars) } }] })
}

/// Select options may not contain commas.
fn select(name: &str, max_chars: usize) -> Value {
    json!({ "select": { "name": clip(&name.replace(',', " "), max_chars) } })
}

/// Map an archive entry onto database page properties.
pub fn build_properties(entry: &ArchiveEntry) -> Value {
    let key_points = entry
        .key_points
        .iter()
        .take(MAX_KEY_POINTS)
        .map(|p| format!("- {p}"))
        .collect::<Vec<_>>()
        .join("\n");

    let tags: Vec<Value> = entry
        .tags
        .iter()
        .map(|t| t.replace(',', " ").trim().to_string())
        .filter(|t| !t.is_empty())
        .take(MAX_TAGS)
        .map(|t| json!({ "name": clip(&t, MAX_TAG) }))
        .collect();

    json!({
        "Name": { "title": [{ "text": { "content": clip(&entry.title, MAX_TITLE) } }] },
        "URL": rich_text(&entry.url, MAX_RICH_TEXT),
        "Platform": select(&entry.platform, MAX_CATEGORY),
        "Transcript": rich_text(&entry.transcript, MAX_RICH_TEXT),
        "Summary": rich_text(&entry.summary, MAX_RICH_TEXT),
        "Tags": { "multi_select": tags },
        "KeyPoints": rich_text(&key_points, MAX_KEY_POINTS_TEXT),
        "Category": select(&entry.category, MAX_CATEGORY),
        "Sentiment": select(&entry.sentiment, MAX_SENTIMENT),
        "CreatedTime": { "date": { "start": entry.created_time.to_rfc3339() } },
    })
}

/// Map a Notion API error response to an archive error.
fn api_error(action: &str, response: Response) -> VidkbError {
    let status = response.status();
    let body = response.text().unwrap_or_default();
    let detail = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| body.chars().take(300).collect());

    let reason = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "authentication",
        StatusCode::BAD_REQUEST => "schema mismatch",
        StatusCode::NOT_FOUND => "database not found or not shared with the integration",
        _ => "request failed",
    };
    VidkbError::Archive(format!("Notion {action}: {reason} (HTTP {status}): {detail}"))
}

/// [`ArchiveSink`] writing one page per item to a Notion database.
pub struct NotionSink {
    client: Client,
    api_base: String,
    token: String,
    database_id: String,
}

impl NotionSink {
    /// Build a sink and verify the database is reachable with these credentials.
    pub fn connect(credentials: NotionCredentials, api_base: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VidkbError::Archive(format!("failed to build HTTP client: {e}")))?;
        let sink = Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: credentials.token,
            database_id: credentials.database_id,
        };
        sink.verify()?;
        Ok(sink)
    }

    pub fn database_id(&self) -> &str {
        &self.database_id
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::blocking::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.api_base))
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
    }

    fn send(&self, action: &str, builder: reqwest::blocking::RequestBuilder) -> Result<Value> {
        let response = builder
            .send()
            .map_err(|e| VidkbError::Archive(format!("Notion {action}: {e}")))?;
        if !response.status().is_success() {
            return Err(api_error(action, response));
        }
        response
            .json()
            .map_err(|e| VidkbError::Archive(format!("Notion {action}: unreadable response: {e}")))
    }

    fn verify(&self) -> Result<()> {
        let path = format!("/v1/databases/{}", self.database_id);
        self.send("database check", self.request(reqwest::Method::GET, &path))?;
        info!(database = %self.database_id, "Notion database reachable");
        Ok(())
    }

    /// Page id of an existing page with this URL, if any.
    pub fn find_existing(&self, url: &str) -> Result<Option<String>> {
        let path = format!("/v1/databases/{}/query", self.database_id);
        let body = json!({
            "filter": { "property": "URL", "rich_text": { "equals": url } },
            "page_size": 1,
        });
        let value = self.send(
            "duplicate query",
            self.request(reqwest::Method::POST, &path).json(&body),
        )?;
        Ok(value
            .get("results")
            .and_then(Value::as_array)
            .and_then(|r| r.first())
            .and_then(|p| p.get("id"))
            .and_then(Value::as_str)
            .map(String::from))
    }

    fn create_page(&self, entry: &ArchiveEntry) -> Result<String> {
        let body = json!({
            "parent": { "database_id": self.database_id },
            "properties": build_properties(entry),
        });
        let value = self.send(
            "page create",
            self.request(reqwest::Method::POST, "/v1/pages").json(&body),
        )?;
        value
            .get("id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| VidkbError::Archive("Notion page create: response has no id".into()))
    }
}

impl ArchiveSink for NotionSink {
    fn name(&self) -> &str {
        "notion"
    }

    #[instrument(skip_all, fields(database = %self.database_id))]
    fn archive(&mut self, entry: &ArchiveEntry) -> Result<ArchivePayload> {
        if let Some(existing) = self.find_existing(&entry.url)? {
            info!(page = %existing, url = %entry.url, "page already exists, not creating another");
            return Ok(ArchivePayload {
                sink: SinkKind::Notion,
                record_id: Some(existing),
                location: self.database_id.clone(),
                duplicate: true,
            });
        }

        let page_id = self.create_page(entry)?;
        info!(page = %page_id, "Notion page created");
        Ok(ArchivePayload {
            sink: SinkKind::Notion,
            record_id: Some(page_id),
            location: self.database_id.clone(),
            duplicate: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DB: &str = "0123456789abcdef0123456789abcdef";

    fn creds() -> NotionCredentials {
        NotionCredentials {
            token: "secret_test".into(),
            database_id: DB.into(),
        }
    }

    fn entry() -> ArchiveEntry {
        ArchiveEntry {
            title: "t".repeat(150),
            url: "https://youtu.be/abc".into(),
            platform: "YouTube".into(),
            transcript: "字".repeat(2500),
            summary: "summary".into(),
            tags: (0..15).map(|i| format!("tag{i}")).collect(),
            key_points: (0..8).map(|i| format!("point {i}")).collect(),
            category: "Tech, Rust".into(),
            sentiment: "positive".into(),
            created_time: Utc::now(),
        }
    }

    async fn mount_database(server: &MockServer, status: u16) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/databases/{DB}")))
            .and(header("Notion-Version", NOTION_VERSION))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_json(json!({"object": "database", "id": DB, "message": "nope"})),
            )
            .mount(server)
            .await;
    }

    async fn mount_query(server: &MockServer, results: Value) {
        Mock::given(method("POST"))
            .and(path(format!("/v1/databases/{DB}/query")))
            .and(body_partial_json(json!({
                "filter": {"property": "URL", "rich_text": {"equals": "https://youtu.be/abc"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": results})))
            .mount(server)
            .await;
    }

    #[test]
    fn properties_respect_limits() {
        let props = build_properties(&entry());
        let title = props["Name"]["title"][0]["text"]["content"].as_str().unwrap();
        assert_eq!(title.chars().count(), 100);

        let transcript = props["Transcript"]["rich_text"][0]["text"]["content"]
            .as_str()
            .unwrap();
        assert_eq!(transcript.chars().count(), 2000);

        assert_eq!(props["Tags"]["multi_select"].as_array().unwrap().len(), 10);

        let points = props["KeyPoints"]["rich_text"][0]["text"]["content"]
            .as_str()
            .unwrap();
        assert_eq!(points.lines().count(), 5);
        assert!(points.starts_with("- point 0"));

        assert_eq!(props["Category"]["select"]["name"], "Tech  Rust");
        assert_eq!(props["Sentiment"]["select"]["name"], "positive");
        assert!(props["CreatedTime"]["date"]["start"].is_string());
    }

    #[tokio::test]
    async fn creates_page_when_new() {
        let server = MockServer::start().await;
        mount_database(&server, 200).await;
        mount_query(&server, json!([])).await;
        Mock::given(method("POST"))
            .and(path("/v1/pages"))
            .and(body_partial_json(json!({"parent": {"database_id": DB}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "page-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let payload = tokio::task::spawn_blocking(move || {
            let mut sink = NotionSink::connect(creds(), &uri)?;
            sink.archive(&entry())
        })
        .await
        .unwrap()
        .expect("archive");
        assert_eq!(payload.sink, SinkKind::Notion);
        assert_eq!(payload.record_id.as_deref(), Some("page-1"));
        assert!(!payload.duplicate);
    }

    #[tokio::test]
    async fn duplicate_url_is_not_recreated() {
        let server = MockServer::start().await;
        mount_database(&server, 200).await;
        mount_query(&server, json!([{"id": "existing-page"}])).await;
        Mock::given(method("POST"))
            .and(path("/v1/pages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "new"})))
            .expect(0)
            .mount(&server)
            .await;

        let uri = server.uri();
        let payload = tokio::task::spawn_blocking(move || {
            let mut sink = NotionSink::connect(creds(), &uri)?;
            sink.archive(&entry())
        })
        .await
        .unwrap()
        .unwrap();
        assert!(payload.duplicate);
        assert_eq!(payload.record_id.as_deref(), Some("existing-page"));
    }

    #[tokio::test]
    async fn unauthorized_connect_fails() {
        let server = MockServer::start().await;
        mount_database(&server, 401).await;

        let uri = server.uri();
        let err = tokio::task::spawn_blocking(move || NotionSink::connect(creds(), &uri).err())
            .await
            .unwrap()
            .expect("connect should fail");
        assert!(matches!(err, VidkbError::Archive(_)));
        assert!(err.to_string().contains("authentication"));
    }

    #[tokio::test]
    async fn bad_request_is_schema_mismatch() {
        let server = MockServer::start().await;
        mount_database(&server, 200).await;
        mount_query(&server, json!([])).await;
        Mock::given(method("POST"))
            .and(path("/v1/pages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "object": "error",
                "message": "Tags is not a property that exists."
            })))
            .mount(&server)
            .await;

        let uri = server.uri();
        let err = tokio::task::spawn_blocking(move || {
            let mut sink = NotionSink::connect(creds(), &uri)?;
            sink.archive(&entry())
        })
        .await
        .unwrap()
        .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("schema mismatch"), "got: {text}");
        assert!(text.contains("Tags is not a property"));
    }
}
