//! Speech-to-text against an OpenAI-compatible Whisper server
//! (faster-whisper-server, speaches, and similar).
//!
//! The server is expected at `{server_url}/v1/audio/transcriptions`. Model
//! residency is managed through `{server_url}/api/ps/{model}` when the server
//! supports it.

use std::path::Path;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, multipart};
use serde::Deserialize;
use tracing::{debug, info, instrument};
use vidkb_shared::{
    Item, ModelBackend, ModelHandle, Result, TranscribeConfig, TranscriptPayload,
    TranscriptSegment, TranscriptSource, Transcriber, VidkbError,
};

/// Self-hosted servers ignore the token but the API shape expects one.
const PLACEHOLDER_TOKEN: &str = "no-auth";

/// Model management timeout; loading a model can take a while on first use.
const MODEL_TIMEOUT: Duration = Duration::from_secs(300);

/// Validate and normalise a server base URL.
fn base_url(server_url: &str) -> Result<String> {
    let trimmed = server_url.trim().trim_end_matches('/');
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(VidkbError::config(format!(
            "invalid whisper server URL {trimmed:?}: must start with http:// or https://"
        )));
    }
    Ok(trimmed.to_string())
}

fn http_error(context: &str, e: reqwest::Error) -> VidkbError {
    VidkbError::Transcription(format!("{context}: {e}"))
}

// ---------------------------------------------------------------------------
// Model backend
// ---------------------------------------------------------------------------

/// Loads and unloads a model on the Whisper server.
#[derive(Debug)]
pub struct WhisperServerModel {
    base: String,
    model: String,
    client: Client,
}

impl WhisperServerModel {
    fn ps_url(&self) -> String {
        format!("{}/api/ps/{}", self.base, self.model)
    }
}

impl ModelBackend for WhisperServerModel {
    fn describe(&self) -> String {
        format!("whisper:{}", self.model)
    }

    fn load(&mut self) -> Result<()> {
        let response = self
            .client
            .post(self.ps_url())
            .timeout(MODEL_TIMEOUT)
            .send()
            .map_err(|e| http_error("whisper server unreachable", e))?;
        accept_model_status(response.status(), "load")
    }

    fn unload(&mut self) -> Result<()> {
        let response = self
            .client
            .delete(self.ps_url())
            .timeout(MODEL_TIMEOUT)
            .send()
            .map_err(|e| http_error("whisper server unreachable", e))?;
        accept_model_status(response.status(), "unload")
    }
}

/// 404 means the server manages models on its own; treat as success.
/// 409 is returned when the model is already in the requested state.
fn accept_model_status(status: StatusCode, action: &str) -> Result<()> {
    if status.is_success() || status == StatusCode::NOT_FOUND || status == StatusCode::CONFLICT {
        debug!(%status, action, "model management call accepted");
        Ok(())
    } else {
        Err(VidkbError::Transcription(format!(
            "model {action} failed with HTTP {status}"
        )))
    }
}

// ---------------------------------------------------------------------------
// Transcriber
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    segments: Vec<RawSegment>,
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    start: f64,
    end: f64,
    text: String,
}

/// [`Transcriber`] that uploads media to a Whisper server.
pub struct WhisperServerTranscriber {
    config: TranscribeConfig,
    base: String,
    client: Client,
    model: ModelHandle<WhisperServerModel>,
}

impl WhisperServerTranscriber {
    pub fn new(config: TranscribeConfig) -> Result<Self> {
        let base = base_url(&config.server_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VidkbError::config(format!("failed to build HTTP client: {e}")))?;
        let model = ModelHandle::new(WhisperServerModel {
            base: base.clone(),
            model: config.model.clone(),
            client: client.clone(),
        });
        Ok(Self {
            config,
            base,
            client,
            model,
        })
    }

    pub fn model_loaded(&self) -> bool {
        self.model.is_loaded()
    }
}

impl Transcriber for WhisperServerTranscriber {
    fn name(&self) -> &str {
        "whisper-server"
    }

    #[instrument(skip_all, fields(id = %item.id, media = %media_path.display()))]
    fn transcribe(&mut self, item: &Item, media_path: &Path) -> Result<TranscriptPayload> {
        if !media_path.is_file() {
            return Err(VidkbError::Transcription(format!(
                "media file missing: {}",
                media_path.display()
            )));
        }
        self.model.acquire()?;

        let mut form = multipart::Form::new()
            .text("model", self.config.model.clone())
            .text("response_format", "verbose_json")
            .file("file", media_path)
            .map_err(|e| VidkbError::Transcription(format!("cannot read media: {e}")))?;
        if let Some(lang) = self.config.language_hint() {
            form = form.text("language", lang.to_string());
        }

        info!(model = %self.config.model, "transcribing");
        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base))
            .bearer_auth(PLACEHOLDER_TOKEN)
            .multipart(form)
            .send()
            .map_err(|e| http_error("transcription request failed", e))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| http_error("reading transcription response", e))?;
        if !status.is_success() {
            return Err(VidkbError::Transcription(format!(
                "server returned HTTP {status}: {}",
                body.chars().take(500).collect::<String>()
            )));
        }

        let parsed: VerboseTranscription = serde_json::from_str(&body)
            .map_err(|e| VidkbError::Transcription(format!("unparseable server response: {e}")))?;

        let payload = TranscriptPayload {
            text: parsed.text.trim().to_string(),
            language: parsed.language,
            duration_secs: parsed.duration,
            segments: parsed
                .segments
                .into_iter()
                .map(|s| TranscriptSegment {
                    start: s.start,
                    end: s.end,
                    text: s.text.trim().to_string(),
                })
                .collect(),
            source: TranscriptSource::Speech,
        };
        info!(
            chars = payload.text.chars().count(),
            segments = payload.segments.len(),
            language = ?payload.language,
            "transcription complete"
        );
        Ok(payload)
    }

    fn release(&mut self) -> Result<()> {
        self.model.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &str) -> TranscribeConfig {
        TranscribeConfig {
            server_url: server.to_string(),
            timeout_secs: 10,
            ..Default::default()
        }
    }

    fn media_file() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("vidkb-tx-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("YouTube_0123456789abcdef.m4a");
        std::fs::write(&path, b"not really audio").unwrap();
        path
    }

    async fn mount_model_endpoints(server: &MockServer, status: u16) {
        Mock::given(method("POST"))
            .and(path("/api/ps/Systran/faster-whisper-small"))
            .respond_with(ResponseTemplate::new(status))
            .mount(server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/ps/Systran/faster-whisper-small"))
            .respond_with(ResponseTemplate::new(status))
            .mount(server)
            .await;
    }

    #[test]
    fn rejects_bad_base_url() {
        assert!(base_url("localhost:8000").is_err());
        assert_eq!(base_url("http://host:8000/").unwrap(), "http://host:8000");
    }

    #[test]
    fn missing_media_is_transcription_error() {
        let mut tx = WhisperServerTranscriber::new(config("http://127.0.0.1:9")).unwrap();
        let item = Item::new("https://youtu.be/abc");
        let err = tx
            .transcribe(&item, Path::new("/nonexistent/vidkb.m4a"))
            .unwrap_err();
        assert!(matches!(err, VidkbError::Transcription(_)));
        assert!(!tx.model_loaded());
    }

    #[tokio::test]
    async fn transcribes_verbose_json() {
        let server = MockServer::start().await;
        mount_model_endpoints(&server, 200).await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": " 大家好，今天聊聊 Rust。 ",
                "language": "zh",
                "duration": 12.5,
                "segments": [
                    {"id": 0, "start": 0.0, "end": 4.2, "text": " 大家好，"},
                    {"id": 1, "start": 4.2, "end": 12.5, "text": "今天聊聊 Rust。"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let media = media_file();
        let (payload, loaded_after, released) = tokio::task::spawn_blocking(move || {
            let mut tx = WhisperServerTranscriber::new(config(&uri)).unwrap();
            let payload = tx.transcribe(&Item::new("https://youtu.be/abc"), &media);
            let loaded = tx.model_loaded();
            let released = tx.release();
            (payload, loaded, released)
        })
        .await
        .unwrap();

        let payload = payload.expect("transcribe");
        assert_eq!(payload.text, "大家好，今天聊聊 Rust。");
        assert_eq!(payload.language.as_deref(), Some("zh"));
        assert_eq!(payload.segments.len(), 2);
        assert_eq!(payload.segments[0].text, "大家好，");
        assert_eq!(payload.source, TranscriptSource::Speech);
        assert!(loaded_after);
        assert!(released.is_ok());
    }

    #[tokio::test]
    async fn server_managed_models_accept_404() {
        let server = MockServer::start().await;
        mount_model_endpoints(&server, 404).await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "hi"})),
            )
            .mount(&server)
            .await;

        let uri = server.uri();
        let media = media_file();
        let result = tokio::task::spawn_blocking(move || {
            let mut tx = WhisperServerTranscriber::new(config(&uri)).unwrap();
            tx.transcribe(&Item::new("https://youtu.be/abc"), &media)
        })
        .await
        .unwrap();
        assert_eq!(result.unwrap().text, "hi");
    }

    #[tokio::test]
    async fn server_error_is_transcription_error() {
        let server = MockServer::start().await;
        mount_model_endpoints(&server, 200).await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("ffmpeg: invalid data"))
            .mount(&server)
            .await;

        let uri = server.uri();
        let media = media_file();
        let err = tokio::task::spawn_blocking(move || {
            let mut tx = WhisperServerTranscriber::new(config(&uri)).unwrap();
            tx.transcribe(&Item::new("https://youtu.be/abc"), &media)
        })
        .await
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, VidkbError::Transcription(_)));
        assert!(err.to_string().contains("invalid data"));
    }

    #[tokio::test]
    async fn unparseable_body_is_transcription_error() {
        let server = MockServer::start().await;
        mount_model_endpoints(&server, 200).await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy error</html>"))
            .mount(&server)
            .await;

        let uri = server.uri();
        let media = media_file();
        let err = tokio::task::spawn_blocking(move || {
            let mut tx = WhisperServerTranscriber::new(config(&uri)).unwrap();
            tx.transcribe(&Item::new("https://youtu.be/abc"), &media)
        })
        .await
        .unwrap()
        .unwrap_err();
        assert!(err.to_string().contains("unparseable"));
    }
}
