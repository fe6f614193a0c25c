//! Batch driver: runs items in order and isolates their failures.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info, instrument, warn};
use vidkb_shared::{Item, ItemStatus};
use vidkb_storage::CheckpointStore;

use crate::pipeline::{ItemReport, Pipeline, PipelineOptions, ProgressReporter, serialize_millis};
use crate::stages::StageSet;

/// Outcome of a whole batch.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub reports: Vec<ItemReport>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl RunSummary {
    fn count(&self, status: ItemStatus) -> usize {
        self.reports.iter().filter(|r| r.status == status).count()
    }

    pub fn completed(&self) -> usize {
        self.count(ItemStatus::Completed)
    }

    pub fn partial(&self) -> usize {
        self.count(ItemStatus::PartiallyCompleted)
    }

    pub fn failed(&self) -> usize {
        self.count(ItemStatus::Failed)
    }

    /// 0 when every item finished (partially or fully), 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.reports.iter().all(|r| r.status.is_finished()) {
            0
        } else {
            1
        }
    }
}

/// Run every item in input order. One item's failure never stops the batch.
///
/// Model handles are released once after the last item.
#[instrument(skip_all, fields(items = items.len()))]
pub fn run_batch(
    items: &[Item],
    store: &dyn CheckpointStore,
    stages: &mut StageSet,
    options: PipelineOptions,
    progress: &dyn ProgressReporter,
) -> RunSummary {
    let started = Instant::now();
    let total = items.len();
    let mut pipeline = Pipeline::new(store, stages, options, progress);
    let mut reports = Vec::with_capacity(total);

    for (index, item) in items.iter().enumerate() {
        progress.item_started(index, total, item);
        let item_started = Instant::now();
        let report = match pipeline.run_item(item) {
            Ok(report) => report,
            Err(e) => {
                error!(url = %item.url, error = %e, "item aborted");
                ItemReport::from_error(item, &e, item_started.elapsed())
            }
        };
        if let Some(message) = report.failure_message() {
            warn!(url = %item.url, failure = %message, "item failed");
        }
        progress.item_finished(&report);
        reports.push(report);
    }

    let released_failures = pipeline.release_models();
    if released_failures > 0 {
        warn!(failures = released_failures, "some models could not be released");
    }

    let summary = RunSummary {
        reports,
        elapsed: started.elapsed(),
    };
    if summary.partial() > 0 {
        warn!(
            items = summary.partial(),
            "some items were archived with skipped stages"
        );
    }
    info!(
        completed = summary.completed(),
        partial = summary.partial(),
        failed = summary.failed(),
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "batch finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use crate::testing::{Harness, SummarizeMode};
    use std::sync::Mutex;
    use uuid::Uuid;
    use vidkb_shared::{FailureKind, Stage, StageOutcome};
    use vidkb_storage::FileCheckpointStore;

    fn items(urls: &[&str]) -> Vec<Item> {
        urls.iter().map(|u| Item::new(u)).collect()
    }

    #[test]
    fn one_failure_does_not_stop_the_batch() {
        let h = Harness::new();
        let mut stages = h.stages(SummarizeMode::Ok);
        let batch = items(&[
            "https://www.youtube.com/watch?v=first",
            "https://www.youtube.com/watch?v=fail",
            "https://www.youtube.com/watch?v=third",
        ]);

        let summary = run_batch(
            &batch,
            &h.store,
            &mut stages,
            PipelineOptions::default(),
            &SilentProgress,
        );

        let statuses: Vec<_> = summary.reports.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![ItemStatus::Completed, ItemStatus::Failed, ItemStatus::Completed]
        );
        assert_eq!(summary.completed(), 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(h.rows().len(), 2);

        let failed = &summary.reports[1];
        let (stage, failure) = failed.failure.as_ref().unwrap();
        assert_eq!(*stage, Stage::Download);
        assert_eq!(failure.kind, FailureKind::Download);
        assert!(failed.failure_message().unwrap().contains("404"));
    }

    #[test]
    fn partial_items_exit_zero() {
        let h = Harness::new();
        let mut stages = h.stages(SummarizeMode::Ok);
        let options = PipelineOptions {
            skip_summary: true,
            ..Default::default()
        };
        let summary = run_batch(
            &items(&["https://www.youtube.com/watch?v=a", "https://www.youtube.com/watch?v=b"]),
            &h.store,
            &mut stages,
            options,
            &SilentProgress,
        );
        assert_eq!(summary.partial(), 2);
        assert_eq!(summary.exit_code(), 0);
    }

    #[test]
    fn models_released_once_per_batch() {
        let h = Harness::new();
        let mut stages = h.stages(SummarizeMode::Ok);
        run_batch(
            &items(&["https://www.youtube.com/watch?v=a", "https://www.youtube.com/watch?v=b"]),
            &h.store,
            &mut stages,
            PipelineOptions::default(),
            &SilentProgress,
        );
        assert_eq!(h.calls.release.get(), 1);
    }

    #[test]
    fn store_errors_become_failed_reports() {
        let h = Harness::new();
        std::fs::create_dir_all(&h.root).unwrap();
        let blocker = h.root.join(format!("not-a-dir-{}", Uuid::now_v7()));
        std::fs::write(&blocker, b"x").unwrap();
        let store = FileCheckpointStore::new(&blocker);

        let mut stages = h.stages(SummarizeMode::Ok);
        let summary = run_batch(
            &items(&["https://www.youtube.com/watch?v=a"]),
            &store,
            &mut stages,
            PipelineOptions::default(),
            &SilentProgress,
        );
        let report = &summary.reports[0];
        assert_eq!(report.status, ItemStatus::Failed);
        assert!(report.error.is_some());
        assert_eq!(summary.exit_code(), 1);
    }

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<String>>,
    }

    impl ProgressReporter for Recording {
        fn item_started(&self, index: usize, total: usize, _item: &Item) {
            self.events.lock().unwrap().push(format!("item {}/{total}", index + 1));
        }
        fn stage_started(&self, _item: &Item, stage: Stage) {
            self.events.lock().unwrap().push(format!("start {stage}"));
        }
        fn stage_finished(&self, _item: &Item, stage: Stage, outcome: &StageOutcome, reused: bool) {
            let tag = if reused { "reused" } else { outcome.label() };
            self.events.lock().unwrap().push(format!("{stage} {tag}"));
        }
        fn item_finished(&self, report: &ItemReport) {
            self.events.lock().unwrap().push(format!("done {}", report.status));
        }
    }

    #[test]
    fn progress_sees_every_stage() {
        let h = Harness::new();
        let mut stages = h.stages(SummarizeMode::Ok);
        let progress = Recording::default();
        run_batch(
            &items(&["https://www.youtube.com/watch?v=a"]),
            &h.store,
            &mut stages,
            PipelineOptions::default(),
            &progress,
        );
        let events = progress.events.into_inner().unwrap();
        assert_eq!(events.first().map(String::as_str), Some("item 1/1"));
        assert!(events.contains(&"start download".to_string()));
        assert!(events.contains(&"archive success".to_string()));
        assert_eq!(events.last().map(String::as_str), Some("done completed"));
    }
}
