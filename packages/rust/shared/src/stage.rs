//! Stage adapter traits.
//!
//! Each stage is a narrow, swappable collaborator. The orchestrator owns one
//! boxed adapter per stage and never knows which concrete tool sits behind it.

use std::path::Path;

use crate::error::Result;
use crate::types::{
    ArchiveEntry, ArchivePayload, DownloadPayload, Item, SummaryPayload, TranscriptPayload,
};

/// Acquires media (or post text) for an item.
pub trait Downloader {
    /// Short identifier used in tracing fields.
    fn name(&self) -> &str;

    /// Fetch the item. With `force`, previously downloaded files are not reused.
    fn download(&mut self, item: &Item, force: bool) -> Result<DownloadPayload>;
}

/// Turns a local media file into text.
pub trait Transcriber {
    fn name(&self) -> &str;

    fn transcribe(&mut self, item: &Item, media_path: &Path) -> Result<TranscriptPayload>;

    /// Release any loaded model. Called once at run end.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Produces a structured summary from transcript text.
pub trait Summarizer {
    fn name(&self) -> &str;

    /// `source` is the download payload, used to pick the prompt flavour.
    fn summarize(
        &mut self,
        item: &Item,
        source: &DownloadPayload,
        transcript: &TranscriptPayload,
    ) -> Result<SummaryPayload>;

    /// Release any loaded model. Called once at run end.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes the final record somewhere durable.
pub trait ArchiveSink {
    fn name(&self) -> &str;

    fn archive(&mut self, entry: &ArchiveEntry) -> Result<ArchivePayload>;
}
