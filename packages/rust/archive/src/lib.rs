//! Archive sinks: a Notion database or a CSV file.
//!
//! Exactly one sink is active per run. [`select_sink`] picks Notion when
//! credentials are configured and the database is reachable, CSV otherwise.

pub mod csv;
pub mod notion;

use tracing::{info, warn};
use vidkb_shared::{ArchiveConfig, ArchiveSink, NotionCredentials, SinkKind};

pub use crate::csv::{CSV_HEADER, CsvSink, csv_escape};
pub use crate::notion::{NOTION_API_BASE, NotionSink, build_properties};

/// Choose the run's sink from configuration and the environment.
pub fn select_sink(config: &ArchiveConfig) -> (Box<dyn ArchiveSink>, SinkKind) {
    select_sink_with(config.notion_credentials(), config, NOTION_API_BASE)
}

/// [`select_sink`] with explicit credentials and API base.
pub fn select_sink_with(
    credentials: Option<NotionCredentials>,
    config: &ArchiveConfig,
    api_base: &str,
) -> (Box<dyn ArchiveSink>, SinkKind) {
    let Some(credentials) = credentials else {
        info!(path = %config.export_path.display(), "Notion not configured, archiving to CSV");
        return (Box::new(CsvSink::new(&config.export_path)), SinkKind::Csv);
    };

    match NotionSink::connect(credentials, api_base) {
        Ok(sink) => {
            info!(database = %sink.database_id(), "archiving to Notion");
            (Box::new(sink), SinkKind::Notion)
        }
        Err(e) => {
            warn!(
                error = %e,
                path = %config.export_path.display(),
                "Notion unavailable, falling back to CSV"
            );
            (Box::new(CsvSink::new(&config.export_path)), SinkKind::Csv)
        }
    }
}
