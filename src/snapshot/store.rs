//! Durable key/blob storage for snapshots.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local, Utc};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::codec::{self, Snapshot};

/// Opaque blob storage keyed by snapshot id.
pub trait SnapshotStore {
    fn put(&self, id: &str, blob: &str) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<String>>;
    /// Ids in ascending order.
    fn list(&self) -> Result<Vec<String>>;
    /// Deleting a missing id is not an error.
    fn delete(&self, id: &str) -> Result<()>;
}

/// Stores each snapshot as `<dir>/<id>.json`.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.dir.join(format!("{}.json", id)))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn put(&self, id: &str, blob: &str) -> Result<()> {
        let path = self.path_for(id)?;
        fs::create_dir_all(&self.dir)
            .context(format!("Failed to create snapshot directory: {}", self.dir.display()))?;

        // Write beside the target, then rename, so a crash never leaves half a file
        let tmp = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp)
            .context(format!("Failed to create snapshot file: {}", tmp.display()))?;
        file.write_all(blob.as_bytes())
            .context("Failed to write snapshot data")?;
        file.sync_all().context("Failed to flush snapshot data")?;
        drop(file);

        fs::rename(&tmp, &path)
            .context(format!("Failed to move snapshot into place: {}", path.display()))?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<String>> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Ok(None);
        }
        let blob = fs::read_to_string(&path)
            .context(format!("Failed to read snapshot file: {}", path.display()))?;
        Ok(Some(blob))
    }

    fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        let entries = fs::read_dir(&self.dir)
            .context(format!("Failed to read snapshot directory: {}", self.dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_id(stem).is_ok() {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn delete(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context(format!("Failed to delete snapshot: {}", path.display())),
        }
    }
}

/// Ids are file stems: ASCII letters, digits, `_` and `-` only.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(anyhow!("Snapshot id is empty"));
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(anyhow!("Invalid snapshot id: {:?}", id));
    }
    Ok(())
}

/// Default id for a snapshot taken at `at`: local `YYYYMMDD_HHMMSS`.
pub fn new_snapshot_id(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y%m%d_%H%M%S").to_string()
}

/// Encodes and stores a snapshot.
pub fn save_snapshot(store: &dyn SnapshotStore, id: &str, snapshot: &Snapshot) -> Result<()> {
    let blob = codec::encode(snapshot)?;
    store.put(id, &blob)?;
    log::info!("Snapshot saved: {}", id);
    Ok(())
}

/// Loads and decodes a snapshot. Unreadable content decodes to an empty snapshot.
pub fn load_snapshot(store: &dyn SnapshotStore, id: &str) -> Result<Option<Snapshot>> {
    Ok(store.get(id)?.map(|blob| codec::decode(&blob)))
}
