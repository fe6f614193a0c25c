//! Shared types, error model, configuration, and stage contracts for vidkb.
//!
//! This crate is the foundation depended on by all other vidkb crates.
//! It provides:
//! - [`VidkbError`], the unified error type
//! - Domain types ([`Item`], [`ItemRecord`], [`StageOutcome`], payloads)
//! - Platform resolution ([`Platform`], [`resolve_platform`])
//! - Configuration ([`AppConfig`], config loading)
//! - Stage adapter traits and [`ModelHandle`]

pub mod config;
pub mod error;
pub mod model;
pub mod platform;
pub mod stage;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ArchiveConfig, DownloadConfig, NotionCredentials, PathsConfig, SummarizeConfig,
    TranscribeConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{Result, VidkbError};
pub use model::{ModelBackend, ModelHandle};
pub use platform::{Platform, Site, resolve_platform};
pub use stage::{ArchiveSink, Downloader, Summarizer, Transcriber};
pub use types::{
    ArchiveEntry, ArchivePayload, CURRENT_SCHEMA_VERSION, CheckpointEntry, DEFAULT_CATEGORY,
    DownloadPayload, FailureKind, Item, ItemId, ItemRecord, ItemStatus, Sentiment, SinkKind, Stage,
    StageFailure, StageOutcome, StagePayload, SummaryPayload, TranscriptPayload,
    TranscriptSegment, TranscriptSource,
};
