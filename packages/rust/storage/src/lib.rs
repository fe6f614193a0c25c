//! Durable checkpoint storage.
//!
//! The [`FileCheckpointStore`] keeps one JSON file per item under a single
//! directory. Writes go through a temp file, `fsync`, and `rename`, so a crash
//! leaves either the previous or the new complete file, never a torn one.
//!
//! **Access rules:** one writer per checkpoint directory. Concurrent runs
//! against the same directory are not coordinated.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use vidkb_shared::{
    CURRENT_SCHEMA_VERSION, CheckpointEntry, ItemId, ItemRecord, Result, VidkbError,
};

/// Keyed persistence of [`ItemRecord`]s.
pub trait CheckpointStore {
    /// `Ok(None)` when the item has never been checkpointed.
    /// `Err(CheckpointCorruption)` when a file exists but cannot be trusted.
    fn load(&self, id: &ItemId) -> Result<Option<ItemRecord>>;

    /// Atomically replace the stored record.
    fn save(&self, record: &ItemRecord) -> Result<()>;

    fn exists(&self, id: &ItemId) -> bool;

    /// Delete a checkpoint. Missing entries are not an error.
    fn remove(&self, id: &ItemId) -> Result<()>;

    /// All readable records. Unreadable files are skipped with a warning.
    fn list(&self) -> Result<Vec<ItemRecord>>;
}

/// One `<id>.json` file per item under `dir`.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// The directory is created lazily on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &ItemId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn temp_path_for(&self, id: &ItemId) -> PathBuf {
        self.dir.join(format!(".{id}.json.tmp"))
    }

    fn decode(id: &ItemId, content: &[u8]) -> Result<ItemRecord> {
        let entry: CheckpointEntry = serde_json::from_slice(content)
            .map_err(|e| VidkbError::corrupt_checkpoint(id.as_str(), e.to_string()))?;

        if entry.schema_version != CURRENT_SCHEMA_VERSION {
            return Err(VidkbError::corrupt_checkpoint(
                id.as_str(),
                format!(
                    "unsupported schema_version {} (expected {CURRENT_SCHEMA_VERSION})",
                    entry.schema_version
                ),
            ));
        }
        if &entry.record.id != id {
            return Err(VidkbError::corrupt_checkpoint(
                id.as_str(),
                format!("file holds record for {}", entry.record.id),
            ));
        }
        Ok(entry.record)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, id: &ItemId) -> Result<Option<ItemRecord>> {
        let path = self.path_for(id);
        let content = match fs::read(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(VidkbError::io(&path, e)),
        };
        Self::decode(id, &content).map(Some)
    }

    fn save(&self, record: &ItemRecord) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| VidkbError::io(&self.dir, e))?;

        let target = self.path_for(&record.id);
        let temp = self.temp_path_for(&record.id);
        let json = serde_json::to_vec_pretty(&CheckpointEntry::new(record.clone()))
            .map_err(|e| VidkbError::validation(format!("serialize checkpoint: {e}")))?;

        {
            let mut file = File::create(&temp).map_err(|e| VidkbError::io(&temp, e))?;
            file.write_all(&json).map_err(|e| VidkbError::io(&temp, e))?;
            file.sync_all().map_err(|e| VidkbError::io(&temp, e))?;
        }

        // Atomic rename
        fs::rename(&temp, &target).map_err(|e| VidkbError::io(&target, e))?;

        // Directory fsync makes the rename itself durable; not all platforms allow it.
        if let Ok(dir) = File::open(&self.dir) {
            if let Err(e) = dir.sync_all() {
                debug!(dir = %self.dir.display(), error = %e, "directory fsync skipped");
            }
        }

        debug!(id = %record.id, status = %record.status, "checkpoint saved");
        Ok(())
    }

    fn exists(&self, id: &ItemId) -> bool {
        self.path_for(id).is_file()
    }

    fn remove(&self, id: &ItemId) -> Result<()> {
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VidkbError::io(&path, e)),
        }
    }

    fn list(&self) -> Result<Vec<ItemRecord>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(VidkbError::io(&self.dir, e)),
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| VidkbError::io(&self.dir, e))?;
            let path = entry.path();
            let Some(stem) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".json"))
            else {
                continue;
            };
            let Ok(id) = stem.parse::<ItemId>() else {
                continue;
            };
            match self.load(&id) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable checkpoint"),
            }
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }
}
