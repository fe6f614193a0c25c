//! Error types for vidkb.
//!
//! Library crates use [`VidkbError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all vidkb operations.
#[derive(Debug, thiserror::Error)]
pub enum VidkbError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Media or post acquisition failed (network, geo-block, removed content, timeout).
    #[error("download error: {0}")]
    Download(String),

    /// Speech-to-text failed (unreadable media, codec, server error).
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Summarization failed. `raw_response` keeps malformed model output for diagnosis.
    #[error("summarization error: {message}")]
    Summarization {
        message: String,
        raw_response: Option<String>,
    },

    /// Writing to the archive sink failed (auth, schema mismatch, I/O).
    #[error("archive error: {0}")]
    Archive(String),

    /// A checkpoint record exists but cannot be trusted.
    #[error("corrupt checkpoint for {id}: {message}")]
    CheckpointCorruption { id: String, message: String },

    /// Data validation error (bad input list, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, VidkbError>;

impl VidkbError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Summarization failure without a model response (endpoint unreachable etc.).
    pub fn summarization(msg: impl Into<String>) -> Self {
        Self::Summarization {
            message: msg.into(),
            raw_response: None,
        }
    }

    /// Summarization failure that keeps the raw model output.
    pub fn malformed_summary(msg: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Summarization {
            message: msg.into(),
            raw_response: Some(raw.into()),
        }
    }

    /// Mark a checkpoint file as unusable.
    pub fn corrupt_checkpoint(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::CheckpointCorruption {
            id: id.into(),
            message: msg.into(),
        }
    }
}
