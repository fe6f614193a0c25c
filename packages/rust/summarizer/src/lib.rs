//! Structured summarization through a local Ollama server.
//!
//! The model is warmed up lazily through a [`ModelHandle`] and unloaded at
//! run end with `keep_alive: 0`.

pub mod parse;
pub mod prompt;

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use vidkb_shared::{
    DownloadPayload, Item, ModelBackend, ModelHandle, Result, SummarizeConfig, SummaryPayload,
    Summarizer, TranscriptPayload, VidkbError,
};

use crate::parse::parse_summary;
use crate::prompt::{ContentKind, system_prompt, truncate_chars, user_prompt};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    #[serde(default)]
    name: String,
}

fn base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(VidkbError::config(format!(
            "invalid Ollama URL {trimmed:?}: must start with http:// or https://"
        )));
    }
    Ok(trimmed.to_string())
}

fn post_generate(client: &Client, base: &str, request: &GenerateRequest<'_>) -> Result<String> {
    let response = client
        .post(format!("{base}/api/generate"))
        .json(request)
        .send()
        .map_err(|e| VidkbError::summarization(format!("Ollama unreachable at {base}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(VidkbError::summarization(format!(
            "Ollama returned HTTP {status}: {}",
            body.chars().take(500).collect::<String>()
        )));
    }

    let parsed: GenerateResponse = response
        .json()
        .map_err(|e| VidkbError::summarization(format!("unreadable Ollama response: {e}")))?;
    Ok(parsed.response)
}

// ---------------------------------------------------------------------------
// Model backend
// ---------------------------------------------------------------------------

/// An Ollama model kept resident for the duration of a run.
#[derive(Debug)]
pub struct OllamaModel {
    base: String,
    model: String,
    client: Client,
}

impl OllamaModel {
    /// Installed model names, from `GET /api/tags`.
    fn installed(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base))
            .send()
            .map_err(|e| {
                VidkbError::summarization(format!(
                    "Ollama unreachable at {}: {e} (is `ollama serve` running?)",
                    self.base
                ))
            })?;
        if !response.status().is_success() {
            return Err(VidkbError::summarization(format!(
                "Ollama /api/tags returned HTTP {}",
                response.status()
            )));
        }
        let tags: TagsResponse = response
            .json()
            .map_err(|e| VidkbError::summarization(format!("unreadable /api/tags response: {e}")))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

impl ModelBackend for OllamaModel {
    fn describe(&self) -> String {
        format!("ollama:{}", self.model)
    }

    fn load(&mut self) -> Result<()> {
        let installed = self.installed()?;
        let base_name = self.model.split(':').next().unwrap_or(&self.model).to_lowercase();
        if !installed.iter().any(|n| n.to_lowercase().contains(&base_name)) {
            warn!(
                model = %self.model,
                installed = ?installed,
                "model not listed by Ollama; run `ollama pull {}`",
                self.model
            );
        }

        // Empty prompt loads the model without generating.
        post_generate(
            &self.client,
            &self.base,
            &GenerateRequest {
                model: &self.model,
                prompt: "",
                system: None,
                format: None,
                stream: false,
                options: None,
                keep_alive: None,
            },
        )?;
        Ok(())
    }

    fn unload(&mut self) -> Result<()> {
        post_generate(
            &self.client,
            &self.base,
            &GenerateRequest {
                model: &self.model,
                prompt: "",
                system: None,
                format: None,
                stream: false,
                options: None,
                keep_alive: Some(0),
            },
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Summarizer
// ---------------------------------------------------------------------------

/// [`Summarizer`] backed by Ollama's `/api/generate`.
pub struct OllamaSummarizer {
    config: SummarizeConfig,
    base: String,
    client: Client,
    model: ModelHandle<OllamaModel>,
}

impl OllamaSummarizer {
    pub fn new(config: SummarizeConfig) -> Result<Self> {
        let base = base_url(&config.ollama_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VidkbError::config(format!("failed to build HTTP client: {e}")))?;
        let model = ModelHandle::new(OllamaModel {
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

impl Summarizer for OllamaSummarizer {
    fn name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip_all, fields(id = %item.id, model = %self.config.model))]
    fn summarize(
        &mut self,
        item: &Item,
        source: &DownloadPayload,
        transcript: &TranscriptPayload,
    ) -> Result<SummaryPayload> {
        self.model.acquire()?;

        let kind = if source.has_media() {
            ContentKind::Video
        } else {
            ContentKind::ImageText
        };
        let total_chars = transcript.text.chars().count();
        if total_chars > self.config.max_transcript_chars {
            info!(
                total_chars,
                limit = self.config.max_transcript_chars,
                "truncating input"
            );
        }
        let text = truncate_chars(&transcript.text, self.config.max_transcript_chars);
        let system = system_prompt(kind);
        let prompt = user_prompt(kind, &source.title, &text);

        info!(kind = kind.as_str(), "generating summary");
        let raw = post_generate(
            &self.client,
            &self.base,
            &GenerateRequest {
                model: &self.config.model,
                prompt: &prompt,
                system: Some(&system),
                format: Some("json"),
                stream: false,
                options: Some(GenerateOptions {
                    temperature: self.config.temperature,
                    num_predict: self.config.num_predict,
                }),
                keep_alive: None,
            },
        )?;

        let summary = parse_summary(&raw, &self.config.model)?;
        info!(
            key_points = summary.key_points.len(),
            tags = summary.tags.len(),
            "summary complete"
        );
        Ok(summary)
    }

    fn release(&mut self) -> Result<()> {
        self.model.release()
    }
}
