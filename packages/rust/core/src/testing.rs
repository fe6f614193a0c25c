//! In-memory stage adapters for orchestrator tests.

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use uuid::Uuid;
use vidkb_shared::{
    ArchiveEntry, ArchivePayload, ArchiveSink, DownloadPayload, Downloader, Item, Result,
    Sentiment, SinkKind, SummaryPayload, Summarizer, TranscriptPayload, TranscriptSource,
    Transcriber, VidkbError,
};
use vidkb_storage::FileCheckpointStore;

use crate::pipeline::{ItemReport, Pipeline, PipelineOptions, SilentProgress};
use crate::stages::StageSet;

#[derive(Clone, Copy)]
pub enum SummarizeMode {
    Ok,
    Malformed,
    Panic,
}

#[derive(Default)]
pub struct Calls {
    pub download: Rc<Cell<usize>>,
    pub transcribe: Rc<Cell<usize>>,
    pub summarize: Rc<Cell<usize>>,
    pub archive: Rc<Cell<usize>>,
    pub release: Rc<Cell<usize>>,
}

pub struct Harness {
    pub root: PathBuf,
    pub store: FileCheckpointStore,
    pub calls: Calls,
    pub fail_transcribe: Rc<Cell<bool>>,
    rows: Rc<RefCell<Vec<ArchiveEntry>>>,
}

impl Harness {
    pub fn new() -> Self {
        let root = std::env::temp_dir().join(format!("vidkb-core-{}", Uuid::now_v7()));
        Self {
            store: FileCheckpointStore::new(root.join("checkpoints")),
            root,
            calls: Calls::default(),
            fail_transcribe: Rc::new(Cell::new(false)),
            rows: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn stages(&self, mode: SummarizeMode) -> StageSet {
        StageSet {
            downloader: Box::new(FakeDownloader {
                calls: self.calls.download.clone(),
                dir: self.root.join("media"),
            }),
            transcriber: Box::new(FakeTranscriber {
                calls: self.calls.transcribe.clone(),
                releases: self.calls.release.clone(),
                fail: self.fail_transcribe.clone(),
            }),
            summarizer: Box::new(FakeSummarizer {
                calls: self.calls.summarize.clone(),
                mode,
            }),
            sink: Box::new(FakeSink {
                calls: self.calls.archive.clone(),
                rows: self.rows.clone(),
            }),
        }
    }

    pub fn run(
        &self,
        stages: &mut StageSet,
        item: &Item,
        options: PipelineOptions,
    ) -> Result<ItemReport> {
        Pipeline::new(&self.store, stages, options, &SilentProgress).run_item(item)
    }

    pub fn rows(&self) -> Vec<ArchiveEntry> {
        self.rows.borrow().clone()
    }

    pub fn checkpoint_bytes(&self, item: &Item) -> Vec<u8> {
        std::fs::read(self.store.dir().join(format!("{}.json", item.id))).unwrap()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

fn url_tail(url: &str) -> &str {
    url.rsplit(['=', '/']).next().unwrap_or(url)
}

/// Writes a small media file per item. Post URLs yield text only; URLs
/// containing `fail` fail.
struct FakeDownloader {
    calls: Rc<Cell<usize>>,
    dir: PathBuf,
}

impl Downloader for FakeDownloader {
    fn name(&self) -> &str {
        "fake-downloader"
    }

    fn download(&mut self, item: &Item, _force: bool) -> Result<DownloadPayload> {
        self.calls.set(self.calls.get() + 1);
        if item.url.contains("fail") {
            return Err(VidkbError::Download("ERROR: HTTP Error 404: Not Found".into()));
        }
        let title = format!("Title for {}", url_tail(&item.url));
        if item.url.contains("xiaohongshu") {
            return Ok(DownloadPayload {
                title,
                description: Some("post body text".into()),
                ..Default::default()
            });
        }
        std::fs::create_dir_all(&self.dir).map_err(|e| VidkbError::io(&self.dir, e))?;
        let path = self.dir.join(format!("{}.m4a", item.id));
        std::fs::write(&path, b"audio").map_err(|e| VidkbError::io(&path, e))?;
        Ok(DownloadPayload {
            title,
            media_path: Some(path),
            duration_secs: Some(212.0),
            ..Default::default()
        })
    }
}

struct FakeTranscriber {
    calls: Rc<Cell<usize>>,
    releases: Rc<Cell<usize>>,
    fail: Rc<Cell<bool>>,
}

impl Transcriber for FakeTranscriber {
    fn name(&self) -> &str {
        "fake-transcriber"
    }

    fn transcribe(&mut self, _item: &Item, media_path: &Path) -> Result<TranscriptPayload> {
        self.calls.set(self.calls.get() + 1);
        if self.fail.get() {
            return Err(VidkbError::Transcription("server returned 503".into()));
        }
        if !media_path.exists() {
            return Err(VidkbError::Transcription(format!(
                "media file missing: {}",
                media_path.display()
            )));
        }
        Ok(TranscriptPayload {
            text: "spoken words about rust".into(),
            language: Some("en".into()),
            source: TranscriptSource::Speech,
            ..Default::default()
        })
    }

    fn release(&mut self) -> Result<()> {
        self.releases.set(self.releases.get() + 1);
        Ok(())
    }
}

struct FakeSummarizer {
    calls: Rc<Cell<usize>>,
    mode: SummarizeMode,
}

impl Summarizer for FakeSummarizer {
    fn name(&self) -> &str {
        "fake-summarizer"
    }

    fn summarize(
        &mut self,
        _item: &Item,
        _source: &DownloadPayload,
        transcript: &TranscriptPayload,
    ) -> Result<SummaryPayload> {
        self.calls.set(self.calls.get() + 1);
        match self.mode {
            SummarizeMode::Ok => Ok(SummaryPayload {
                summary: format!("About: {}", transcript.text),
                key_points: vec!["one".into(), "two".into()],
                tags: vec!["rust".into()],
                category: "Tech".into(),
                sentiment: Sentiment::Positive,
                ..Default::default()
            }),
            SummarizeMode::Malformed => Err(VidkbError::malformed_summary(
                "no JSON object in response",
                "not json at all",
            )),
            SummarizeMode::Panic => panic!("summarizer crashed"),
        }
    }
}

struct FakeSink {
    calls: Rc<Cell<usize>>,
    rows: Rc<RefCell<Vec<ArchiveEntry>>>,
}

impl ArchiveSink for FakeSink {
    fn name(&self) -> &str {
        "fake-sink"
    }

    fn archive(&mut self, entry: &ArchiveEntry) -> Result<ArchivePayload> {
        self.calls.set(self.calls.get() + 1);
        self.rows.borrow_mut().push(entry.clone());
        Ok(ArchivePayload {
            sink: SinkKind::Csv,
            record_id: None,
            location: "memory".into(),
            duplicate: false,
        })
    }
}
