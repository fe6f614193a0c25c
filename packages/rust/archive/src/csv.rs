//! Tabular export sink.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};
use vidkb_shared::{ArchiveEntry, ArchivePayload, ArchiveSink, Result, SinkKind, VidkbError};

/// Column order of the export file.
pub const CSV_HEADER: [&str; 10] = [
    "Title",
    "URL",
    "Platform",
    "Transcript",
    "Summary",
    "Tags",
    "KeyPoints",
    "Category",
    "Sentiment",
    "CreatedTime",
];

/// Separator for multi-valued columns.
const LIST_SEPARATOR: &str = "; ";

/// Quote a value if it contains a delimiter, quote, or line break.
pub fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render one entry as a CSV line (without the trailing newline).
pub fn format_row(entry: &ArchiveEntry) -> String {
    let created = entry.created_time.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let tags = entry.tags.join(LIST_SEPARATOR);
    let key_points = entry.key_points.join(LIST_SEPARATOR);
    let fields: [&str; 10] = [
        &entry.title,
        &entry.url,
        &entry.platform,
        &entry.transcript,
        &entry.summary,
        &tags,
        &key_points,
        &entry.category,
        &entry.sentiment,
        &created,
    ];
    fields.iter().map(|f| csv_escape(f)).collect::<Vec<_>>().join(",")
}

/// Appends rows to a CSV file, writing the header once.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ArchiveSink for CsvSink {
    fn name(&self) -> &str {
        "csv"
    }

    #[instrument(skip_all, fields(path = %self.path.display()))]
    fn archive(&mut self, entry: &ArchiveEntry) -> Result<ArchivePayload> {
        let io_err = |e: std::io::Error| {
            VidkbError::Archive(format!("writing {}: {e}", self.path.display()))
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        let is_empty = file.metadata().map_err(io_err)?.len() == 0;

        let mut buf = String::new();
        if is_empty {
            buf.push_str(&CSV_HEADER.join(","));
            buf.push('\n');
        }
        buf.push_str(&format_row(entry));
        buf.push('\n');

        // Single write so a row is never interleaved with a partial header.
        file.write_all(buf.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;

        debug!(header_written = is_empty, "row appended");
        Ok(ArchivePayload {
            sink: SinkKind::Csv,
            record_id: None,
            location: self.path.display().to_string(),
            duplicate: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn entry(title: &str) -> ArchiveEntry {
        ArchiveEntry {
            title: title.into(),
            url: "https://youtu.be/abc".into(),
            platform: "YouTube".into(),
            transcript: "line one\nline two".into(),
            summary: "He said \"hello\", then left".into(),
            tags: vec!["rust".into(), "cli".into()],
            key_points: vec!["one".into(), "two".into()],
            category: "Tech".into(),
            sentiment: "neutral".into(),
            created_time: Utc::now(),
        }
    }

    fn temp_csv() -> PathBuf {
        std::env::temp_dir()
            .join(format!("vidkb-csv-{}", Uuid::now_v7()))
            .join("nested")
            .join("kb.csv")
    }

    #[test]
    fn escape_rules() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape("a\nb"), "\"a\nb\"");
        assert_eq!(csv_escape("a\rb"), "\"a\rb\"");
        assert_eq!(csv_escape(""), "");
    }

    #[test]
    fn row_joins_lists() {
        let row = format_row(&entry("Talk"));
        assert!(row.starts_with("Talk,https://youtu.be/abc,YouTube,"));
        assert!(row.contains(",rust; cli,one; two,Tech,neutral,"));
        assert!(row.contains("\"He said \"\"hello\"\", then left\""));
    }

    #[test]
    fn header_written_once_and_parents_created() {
        let path = temp_csv();
        let mut sink = CsvSink::new(&path);
        let first = sink.archive(&entry("first")).unwrap();
        sink.archive(&entry("second")).unwrap();

        assert_eq!(first.sink, SinkKind::Csv);
        assert!(!first.duplicate);

        let content = std::fs::read_to_string(&path).unwrap();
        let header = CSV_HEADER.join(",");
        assert_eq!(content.matches(&header).count(), 1);
        assert!(content.starts_with(&header));
        assert!(content.contains("\nfirst,"));
        assert!(content.contains("\nsecond,"));

        let _ = std::fs::remove_dir_all(path.parent().unwrap().parent().unwrap());
    }

    #[test]
    fn empty_existing_file_gets_header() {
        let path = temp_csv();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "").unwrap();

        CsvSink::new(&path).archive(&entry("only")).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("Title,URL,Platform,"));
        let _ = std::fs::remove_dir_all(path.parent().unwrap().parent().unwrap());
    }

    #[test]
    fn unquoted_rows_have_ten_fields() {
        let mut e = entry("simple");
        e.transcript = "t".into();
        e.summary = "s".into();
        assert_eq!(format_row(&e).split(',').count(), CSV_HEADER.len());
    }
}
