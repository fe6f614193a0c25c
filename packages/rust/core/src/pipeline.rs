//! Per-item orchestration: URL → download → transcribe → summarize → archive.
//!
//! Before each stage the checkpointed record is consulted. A stage whose
//! previous outcome is `Success` is reused, never rerun, unless the run is
//! forced. Every outcome change is persisted immediately, so an interrupted
//! run resumes from the last completed stage.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, instrument, warn};
use vidkb_shared::{
    ArchiveEntry, Item, ItemRecord, ItemStatus, Result, Stage, StageFailure, StageOutcome,
    StagePayload, TranscriptPayload, VidkbError,
};
use vidkb_storage::CheckpointStore;

use crate::cleanup::CleanupScope;
use crate::stages::StageSet;

/// Flags that shape one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    /// Ignore checkpoints and previously downloaded files.
    pub force: bool,
    pub skip_transcribe: bool,
    pub skip_summary: bool,
    /// Keep downloaded media instead of deleting it when the item ends.
    pub retain_media: bool,
}

/// Where an item's state machine stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    NotStarted,
    Downloading,
    Transcribing,
    Summarizing,
    Archiving,
    Done,
    Failed,
}

/// Result of running one item.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub item: Item,
    pub status: ItemStatus,
    pub final_state: PipelineState,
    /// Failing stage and cause, when a stage failed.
    pub failure: Option<(Stage, StageFailure)>,
    /// Failure outside any stage (checkpoint I/O).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stages whose outcome was produced in this run.
    pub executed: Vec<Stage>,
    /// Stages whose earlier `Success` was reused.
    pub reused: Vec<Stage>,
    pub record: ItemRecord,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

pub(crate) fn serialize_millis<S: serde::Serializer>(
    d: &Duration,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

impl ItemReport {
    /// Report for an item that could not be run at all.
    pub fn from_error(item: &Item, err: &VidkbError, elapsed: Duration) -> Self {
        let mut record = ItemRecord::new(item);
        record.status = ItemStatus::Failed;
        Self {
            item: item.clone(),
            status: ItemStatus::Failed,
            final_state: PipelineState::Failed,
            failure: None,
            error: Some(err.to_string()),
            executed: Vec::new(),
            reused: Vec::new(),
            record,
            elapsed,
        }
    }

    /// One-line failure description, if the item failed.
    pub fn failure_message(&self) -> Option<String> {
        match (&self.failure, &self.error) {
            (Some((stage, failure)), _) => Some(format!("{stage}: {failure}")),
            (None, Some(err)) => Some(err.clone()),
            (None, None) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Progress trait
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called before an item starts. `index` is zero-based.
    fn item_started(&self, index: usize, total: usize, item: &Item);
    /// Called before a stage adapter is invoked.
    fn stage_started(&self, item: &Item, stage: Stage);
    /// Called after a stage has an outcome for this run.
    fn stage_finished(&self, item: &Item, stage: Stage, outcome: &StageOutcome, reused: bool);
    /// Called when an item is finished, whatever its status.
    fn item_finished(&self, report: &ItemReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn item_started(&self, _index: usize, _total: usize, _item: &Item) {}
    fn stage_started(&self, _item: &Item, _stage: Stage) {}
    fn stage_finished(&self, _item: &Item, _stage: Stage, _outcome: &StageOutcome, _reused: bool) {}
    fn item_finished(&self, _report: &ItemReport) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Mutable state of one item while it runs.
struct ItemRun<'i> {
    item: &'i Item,
    record: ItemRecord,
    state: PipelineState,
    executed: Vec<Stage>,
    reused: Vec<Stage>,
}

/// Drives items through the stage sequence against a checkpoint store.
pub struct Pipeline<'a> {
    store: &'a dyn CheckpointStore,
    stages: &'a mut StageSet,
    options: PipelineOptions,
    progress: &'a dyn ProgressReporter,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        store: &'a dyn CheckpointStore,
        stages: &'a mut StageSet,
        options: PipelineOptions,
        progress: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            store,
            stages,
            options,
            progress,
        }
    }

    /// Release model handles held by the adapters. Returns the number of failures.
    pub fn release_models(&mut self) -> usize {
        self.stages.release_models()
    }

    /// Run one item to completion or failure.
    ///
    /// Stage failures are returned as data in the report. `Err` means the
    /// checkpoint store itself failed.
    #[instrument(skip_all, fields(id = %item.id, url = %item.url))]
    pub fn run_item(&mut self, item: &Item) -> Result<ItemReport> {
        let started = Instant::now();
        let record = self.acquire_record(item)?;

        let mut run = ItemRun {
            item,
            record,
            state: PipelineState::NotStarted,
            executed: Vec::new(),
            reused: Vec::new(),
        };

        if !self.options.force && run.record.status.is_finished() {
            info!(status = %run.record.status, "already archived, nothing to do");
            run.reused = Stage::ALL
                .into_iter()
                .filter(|s| run.record.outcome(*s).is_some_and(StageOutcome::is_success))
                .collect();
            run.state = PipelineState::Done;
            return Ok(self.finish(run, started));
        }

        // Dropped on every exit path, including `?` and panics.
        let mut scope = CleanupScope::new(self.options.retain_media);

        let proceed = self.download_step(&mut run, &mut scope)?
            && self.transcribe_step(&mut run)?
            && self.summarize_step(&mut run)?
            && self.archive_step(&mut run)?;

        run.state = if proceed {
            PipelineState::Done
        } else {
            PipelineState::Failed
        };
        drop(scope);
        Ok(self.finish(run, started))
    }

    fn acquire_record(&self, item: &Item) -> Result<ItemRecord> {
        if self.options.force {
            info!("forced run, ignoring checkpoint");
            return Ok(ItemRecord::new(item));
        }
        match self.store.load(&item.id) {
            Ok(Some(record)) => {
                info!(status = %record.status, "resuming from checkpoint");
                Ok(record)
            }
            Ok(None) => Ok(ItemRecord::new(item)),
            Err(e @ VidkbError::CheckpointCorruption { .. }) => {
                warn!(error = %e, "checkpoint unusable, reprocessing from scratch");
                Ok(ItemRecord::new(item))
            }
            Err(e) => Err(e),
        }
    }

    fn finish(&self, run: ItemRun<'_>, started: Instant) -> ItemReport {
        let status = run.record.status;
        let final_state = match status {
            ItemStatus::Completed | ItemStatus::PartiallyCompleted => PipelineState::Done,
            ItemStatus::Failed => PipelineState::Failed,
            _ => run.state,
        };
        let failure = run.record.failure().map(|(s, f)| (s, f.clone()));
        ItemReport {
            item: run.item.clone(),
            status,
            final_state,
            failure,
            error: None,
            executed: run.executed,
            reused: run.reused,
            record: run.record,
            elapsed: started.elapsed(),
        }
    }

    // -----------------------------------------------------------------------
    // Outcome bookkeeping
    // -----------------------------------------------------------------------

    /// Record an outcome produced in this run; persist only if it changed.
    fn commit(&self, run: &mut ItemRun<'_>, stage: Stage, outcome: StageOutcome) -> Result<()> {
        run.executed.push(stage);
        self.progress.stage_finished(run.item, stage, &outcome, false);
        if run.record.set_outcome(stage, outcome) {
            self.store.save(&run.record)?;
        }
        Ok(())
    }

    fn reuse(&self, run: &mut ItemRun<'_>, stage: Stage) {
        info!(stage = %stage, "reusing checkpointed outcome");
        run.reused.push(stage);
        if let Some(outcome) = run.record.outcome(stage) {
            self.progress.stage_finished(run.item, stage, outcome, true);
        }
    }

    fn skip(&self, run: &mut ItemRun<'_>, stage: Stage, reason: &str) -> Result<bool> {
        info!(stage = %stage, reason, "stage skipped");
        self.commit(run, stage, StageOutcome::skipped(reason))?;
        Ok(true)
    }

    /// Turn an adapter result into an outcome. Returns whether to continue.
    fn settle(
        &self,
        run: &mut ItemRun<'_>,
        stage: Stage,
        result: Result<StagePayload>,
    ) -> Result<bool> {
        match result {
            Ok(payload) => {
                self.commit(run, stage, StageOutcome::success(payload))?;
                Ok(true)
            }
            Err(e) => {
                warn!(stage = %stage, error = %e, "stage failed");
                self.commit(run, stage, StageOutcome::failed(StageFailure::from(&e)))?;
                Ok(false)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    fn download_step(&mut self, run: &mut ItemRun<'_>, scope: &mut CleanupScope) -> Result<bool> {
        run.state = PipelineState::Downloading;
        let needs_media = !self.options.skip_transcribe
            && !run
                .record
                .outcome(Stage::Transcribe)
                .is_some_and(StageOutcome::is_success);

        if let Some(prior) = run.record.download() {
            let media_gone = prior.media_path.as_ref().is_some_and(|p| !p.exists());
            if !(media_gone && needs_media) {
                if let Some(path) = prior.media_path.as_ref().filter(|p| p.exists()) {
                    scope.track(path);
                }
                self.reuse(run, Stage::Download);
                return Ok(true);
            }
            warn!(
                media = ?prior.media_path,
                "media from an earlier run was released; downloading again"
            );
        }

        self.progress.stage_started(run.item, Stage::Download);
        let result = self.stages.downloader.download(run.item, self.options.force);
        if let Ok(Some(path)) = result.as_ref().map(|p| p.media_path.as_ref()) {
            scope.track(path);
        }
        self.settle(run, Stage::Download, result.map(StagePayload::Download))
    }

    fn transcribe_step(&mut self, run: &mut ItemRun<'_>) -> Result<bool> {
        run.state = PipelineState::Transcribing;
        if run.record.transcript().is_some() {
            self.reuse(run, Stage::Transcribe);
            return Ok(true);
        }
        if self.options.skip_transcribe {
            return self.skip(run, Stage::Transcribe, "transcription disabled");
        }

        let Some(download) = run.record.download().cloned() else {
            return Err(VidkbError::validation("transcribe reached without a download payload"));
        };

        let Some(media_path) = download.media_path else {
            // Image-text post: the post body is the transcript.
            let text = download.description.unwrap_or_default();
            info!(chars = text.chars().count(), "using post text as transcript");
            let payload = TranscriptPayload::from_post_text(text);
            self.commit(run, Stage::Transcribe, StageOutcome::success(StagePayload::Transcribe(payload)))?;
            return Ok(true);
        };

        self.progress.stage_started(run.item, Stage::Transcribe);
        let result = self.stages.transcriber.transcribe(run.item, &media_path);
        self.settle(run, Stage::Transcribe, result.map(StagePayload::Transcribe))
    }

    fn summarize_step(&mut self, run: &mut ItemRun<'_>) -> Result<bool> {
        run.state = PipelineState::Summarizing;
        if run.record.summary().is_some() {
            self.reuse(run, Stage::Summarize);
            return Ok(true);
        }
        if self.options.skip_summary {
            return self.skip(run, Stage::Summarize, "summarization disabled");
        }

        let transcript = run
            .record
            .transcript()
            .cloned()
            .unwrap_or_else(TranscriptPayload::empty);
        if transcript.text.trim().is_empty() {
            return self.skip(run, Stage::Summarize, "no transcript text");
        }
        let download = run.record.download().cloned().unwrap_or_default();

        self.progress.stage_started(run.item, Stage::Summarize);
        let result = self
            .stages
            .summarizer
            .summarize(run.item, &download, &transcript);
        self.settle(run, Stage::Summarize, result.map(StagePayload::Summarize))
    }

    fn archive_step(&mut self, run: &mut ItemRun<'_>) -> Result<bool> {
        run.state = PipelineState::Archiving;
        if run.record.archive().is_some() {
            self.reuse(run, Stage::Archive);
            return Ok(true);
        }

        let entry = ArchiveEntry::from_record(&run.record);
        self.progress.stage_started(run.item, Stage::Archive);
        let result = self.stages.sink.archive(&entry);
        self.settle(run, Stage::Archive, result.map(StagePayload::Archive))
    }
}
