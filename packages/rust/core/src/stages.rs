//! The set of stage adapters used for a run.

use tracing::warn;
use vidkb_archive::select_sink;
use vidkb_downloader::YtDlpDownloader;
use vidkb_shared::{
    AppConfig, ArchiveSink, Downloader, Result, SinkKind, Summarizer, Transcriber,
};
use vidkb_summarizer::OllamaSummarizer;
use vidkb_transcriber::WhisperServerTranscriber;

/// One adapter per stage, owned for the whole run.
pub struct StageSet {
    pub downloader: Box<dyn Downloader>,
    pub transcriber: Box<dyn Transcriber>,
    pub summarizer: Box<dyn Summarizer>,
    pub sink: Box<dyn ArchiveSink>,
}

impl StageSet {
    /// Build the production adapters from configuration.
    ///
    /// Sink selection contacts Notion when credentials are present; the
    /// chosen sink kind is returned alongside.
    pub fn from_config(config: &AppConfig) -> Result<(Self, SinkKind)> {
        let downloader =
            YtDlpDownloader::new(config.download.clone(), config.paths.download_dir.clone())?;
        let transcriber = WhisperServerTranscriber::new(config.transcribe.clone())?;
        let summarizer = OllamaSummarizer::new(config.summarize.clone())?;
        let (sink, kind) = select_sink(&config.archive);

        Ok((
            Self {
                downloader: Box::new(downloader),
                transcriber: Box::new(transcriber),
                summarizer: Box::new(summarizer),
                sink,
            },
            kind,
        ))
    }

    /// Release model handles. Failures are logged; both releases are always attempted.
    pub fn release_models(&mut self) -> usize {
        let mut failures = 0;
        if let Err(e) = self.transcriber.release() {
            warn!(adapter = self.transcriber.name(), error = %e, "failed to release model");
            failures += 1;
        }
        if let Err(e) = self.summarizer.release() {
            warn!(adapter = self.summarizer.name(), error = %e, "failed to release model");
            failures += 1;
        }
        failures
    }
}
