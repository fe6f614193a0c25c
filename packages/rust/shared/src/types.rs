//! Core domain types: items, stage outcomes, and the per-item record.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::VidkbError;
use crate::platform::{Platform, resolve_platform};

/// Current schema version for checkpoint files.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Number of hex chars kept from the URL digest.
const ID_HEX_LEN: usize = 16;

// ---------------------------------------------------------------------------
// ItemId / Item
// ---------------------------------------------------------------------------

/// Content-stable item identifier derived from the source URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Derive the identifier for a URL. The same URL always yields the same id.
    pub fn from_url(raw: &str) -> Self {
        let normalized = normalize_url(raw);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        Self(digest[..ID_HEX_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ItemId {
    type Err = VidkbError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.len() == ID_HEX_LEN && s.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(VidkbError::validation(format!("invalid item id: {s:?}")))
        }
    }
}

/// Trim and, when parseable, canonicalise a URL (fragment dropped).
fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}

/// One unit of work. `id` and `platform` are resolved once from `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub url: String,
    pub id: ItemId,
    pub platform: Platform,
}

impl Item {
    pub fn new(url: &str) -> Self {
        let url = url.trim().to_string();
        Self {
            id: ItemId::from_url(&url),
            platform: resolve_platform(&url),
            url,
        }
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Download,
    Transcribe,
    Summarize,
    Archive,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Download,
        Stage::Transcribe,
        Stage::Summarize,
        Stage::Archive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Transcribe => "transcribe",
            Self::Summarize => "summarize",
            Self::Archive => "archive",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Stage payloads
// ---------------------------------------------------------------------------

/// Output of the download stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadPayload {
    pub title: String,
    /// Local media file. `None` for image-text posts without video.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    /// Post body text (image-text posts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl DownloadPayload {
    pub fn has_media(&self) -> bool {
        self.media_path.is_some()
    }
}

/// Where transcript text came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptSource {
    #[default]
    Speech,
    PostText,
    /// Stage disabled; nothing to propagate.
    Empty,
}

/// A timed transcript segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Output of the transcribe stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptPayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<TranscriptSegment>,
    #[serde(default)]
    pub source: TranscriptSource,
}

impl TranscriptPayload {
    /// Transcript taken verbatim from an image-text post body.
    pub fn from_post_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: TranscriptSource::PostText,
            ..Default::default()
        }
    }

    /// Placeholder propagated when transcription is disabled.
    pub fn empty() -> Self {
        Self {
            source: TranscriptSource::Empty,
            ..Default::default()
        }
    }
}

/// Overall tone reported by the summarizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Sentiment {
    /// Lenient parse of model output; anything unrecognised is neutral.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "positive" => Self::Positive,
            "negative" => Self::Negative,
            _ => Self::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

/// Output of the summarize stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryPayload {
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub sentiment: Sentiment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub model: String,
}

/// Which archive sink handled a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    Notion,
    Csv,
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Notion => "notion",
            Self::Csv => "csv",
        })
    }
}

/// Output of the archive stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivePayload {
    pub sink: SinkKind,
    /// Remote record id (Notion page id). `None` for file sinks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    /// Human-readable location (database id or file path).
    pub location: String,
    /// The sink already held a record for this URL; nothing new was written.
    #[serde(default)]
    pub duplicate: bool,
}

/// Stage-specific success payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "data", rename_all = "snake_case")]
pub enum StagePayload {
    Download(DownloadPayload),
    Transcribe(TranscriptPayload),
    Summarize(SummaryPayload),
    Archive(ArchivePayload),
}

// ---------------------------------------------------------------------------
// StageOutcome
// ---------------------------------------------------------------------------

/// Error taxonomy carried in a failed outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Download,
    Transcription,
    Summarization,
    Archive,
    /// Any other error surfaced by an adapter (config, I/O).
    Internal,
}

/// Why a stage failed, kept as data in the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl From<&VidkbError> for StageFailure {
    fn from(err: &VidkbError) -> Self {
        let (kind, raw_response) = match err {
            VidkbError::Download(_) => (FailureKind::Download, None),
            VidkbError::Transcription(_) => (FailureKind::Transcription, None),
            VidkbError::Summarization { raw_response, .. } => {
                (FailureKind::Summarization, raw_response.clone())
            }
            VidkbError::Archive(_) => (FailureKind::Archive, None),
            _ => (FailureKind::Internal, None),
        };
        Self {
            kind,
            message: err.to_string(),
            raw_response,
        }
    }
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Tagged result of one stage for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    Success { payload: StagePayload },
    Skipped { reason: String },
    Failed { failure: StageFailure },
}

impl StageOutcome {
    pub fn success(payload: StagePayload) -> Self {
        Self::Success { payload }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn failed(failure: StageFailure) -> Self {
        Self::Failed { failure }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// ItemRecord
// ---------------------------------------------------------------------------

/// Overall per-item status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    PartiallyCompleted,
}

impl ItemStatus {
    /// `Completed` or `PartiallyCompleted`: the archive has the record.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::PartiallyCompleted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::PartiallyCompleted => "partially_completed",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn current_schema_version() -> u32 {
    CURRENT_SCHEMA_VERSION
}

/// Accumulated per-item state across stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    #[serde(default = "current_schema_version")]
    pub schema_version: u32,
    pub id: ItemId,
    pub url: String,
    pub platform: Platform,
    pub status: ItemStatus,
    #[serde(default)]
    pub outcomes: BTreeMap<Stage, StageOutcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ItemRecord {
    /// A fresh record for an item that has never run.
    pub fn new(item: &Item) -> Self {
        let now = Utc::now();
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            id: item.id.clone(),
            url: item.url.clone(),
            platform: item.platform,
            status: ItemStatus::Pending,
            outcomes: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.outcomes.get(&stage)
    }

    /// Record a stage outcome and recompute status.
    ///
    /// Returns `false` (and leaves the record untouched) when the outcome is
    /// identical to the stored one.
    pub fn set_outcome(&mut self, stage: Stage, outcome: StageOutcome) -> bool {
        if self.outcomes.get(&stage) == Some(&outcome) {
            return false;
        }
        self.outcomes.insert(stage, outcome);
        self.status = self.derive_status();
        self.updated_at = Utc::now();
        true
    }

    /// Status implied by the current outcomes.
    pub fn derive_status(&self) -> ItemStatus {
        if self.outcomes.is_empty() {
            return ItemStatus::Pending;
        }
        if self.outcomes.values().any(StageOutcome::is_failed) {
            return ItemStatus::Failed;
        }
        match self.outcome(Stage::Archive) {
            Some(StageOutcome::Success { .. }) => {
                if self.outcomes.values().any(StageOutcome::is_skipped) {
                    ItemStatus::PartiallyCompleted
                } else {
                    ItemStatus::Completed
                }
            }
            _ => ItemStatus::InProgress,
        }
    }

    /// First failed stage, if any.
    pub fn failure(&self) -> Option<(Stage, &StageFailure)> {
        self.outcomes.iter().find_map(|(stage, outcome)| match outcome {
            StageOutcome::Failed { failure } => Some((*stage, failure)),
            _ => None,
        })
    }

    pub fn download(&self) -> Option<&DownloadPayload> {
        match self.outcome(Stage::Download) {
            Some(StageOutcome::Success {
                payload: StagePayload::Download(p),
            }) => Some(p),
            _ => None,
        }
    }

    pub fn transcript(&self) -> Option<&TranscriptPayload> {
        match self.outcome(Stage::Transcribe) {
            Some(StageOutcome::Success {
                payload: StagePayload::Transcribe(p),
            }) => Some(p),
            _ => None,
        }
    }

    pub fn summary(&self) -> Option<&SummaryPayload> {
        match self.outcome(Stage::Summarize) {
            Some(StageOutcome::Success {
                payload: StagePayload::Summarize(p),
            }) => Some(p),
            _ => None,
        }
    }

    pub fn archive(&self) -> Option<&ArchivePayload> {
        match self.outcome(Stage::Archive) {
            Some(StageOutcome::Success {
                payload: StagePayload::Archive(p),
            }) => Some(p),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// CheckpointEntry
// ---------------------------------------------------------------------------

/// The durable projection of an [`ItemRecord`], one file per item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub schema_version: u32,
    pub saved_at: DateTime<Utc>,
    pub record: ItemRecord,
}

impl CheckpointEntry {
    pub fn new(record: ItemRecord) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            saved_at: Utc::now(),
            record,
        }
    }
}

// ---------------------------------------------------------------------------
// ArchiveEntry
// ---------------------------------------------------------------------------

/// Category used when the summarizer did not provide one.
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

/// The ten-field record written to an archive sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub title: String,
    pub url: String,
    pub platform: String,
    pub transcript: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub key_points: Vec<String>,
    pub category: String,
    pub sentiment: String,
    pub created_time: DateTime<Utc>,
}

impl ArchiveEntry {
    /// Build the archive row from whatever the record has accumulated.
    /// Skipped stages contribute empty values.
    pub fn from_record(record: &ItemRecord) -> Self {
        let title = record
            .download()
            .map(|d| d.title.trim())
            .filter(|t| !t.is_empty())
            .map(String::from)
            .unwrap_or_else(|| record.url.chars().take(50).collect());

        let summary = record.summary();
        let category = summary
            .map(|s| s.category.trim())
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CATEGORY)
            .to_string();

        Self {
            title,
            url: record.url.clone(),
            platform: record.platform.to_string(),
            transcript: record
                .transcript()
                .map(|t| t.text.clone())
                .unwrap_or_default(),
            summary: summary.map(|s| s.summary.clone()).unwrap_or_default(),
            tags: summary.map(|s| s.tags.clone()).unwrap_or_default(),
            key_points: summary.map(|s| s.key_points.clone()).unwrap_or_default(),
            category,
            sentiment: summary
                .map(|s| s.sentiment)
                .unwrap_or_default()
                .as_str()
                .to_string(),
            created_time: Utc::now(),
        }
    }
}
