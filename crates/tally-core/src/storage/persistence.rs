//! Local snapshot persistence
//!
//! In local-only mode the full tracker state is kept in one JSON file in the
//! data directory, in the same shape as the remote document. Writes are
//! atomic (write to temp file, then rename) so a crash never leaves a
//! half-written snapshot.
//!
//! Files:
//! - `tally.json` - the snapshot

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::{SnapshotStep, StorageError, StorageResult};
use crate::document::RemoteDocument;

/// Snapshot file handler
///
/// A store without a path keeps nothing on disk; saves succeed trivially.
#[derive(Debug, Clone, Default)]
pub struct LocalStore {
    path: Option<PathBuf>,
}

impl LocalStore {
    /// Persist snapshots to the given file
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// Keep state in memory only
    pub fn in_memory() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Check if a snapshot exists on disk
    pub fn exists(&self) -> bool {
        self.path.as_ref().is_some_and(|p| p.exists())
    }

    /// Load the snapshot
    ///
    /// Returns `None` if there is no snapshot file.
    pub fn load(&self) -> StorageResult<Option<RemoteDocument>> {
        let Some(path) = self.path.as_ref() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .map_err(|e| StorageError::io(SnapshotStep::Read, path, e))?;
        let doc = RemoteDocument::from_json(&content).map_err(|e| StorageError::Corrupt {
            path: path.clone(),
            details: e.to_string(),
        })?;
        Ok(Some(doc))
    }

    /// Save the snapshot using an atomic write
    pub fn save(&self, doc: &RemoteDocument) -> StorageResult<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        let json = doc.to_json().map_err(StorageError::Encode)?;
        atomic_write(path, json.as_bytes())?;
        debug!("Saved local snapshot to {:?}", path);
        Ok(())
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| StorageError::io(SnapshotStep::CreateDir, parent, e))?;
    }

    let temp_path = path.with_extension("tmp");

    let write_err = |e| StorageError::io(SnapshotStep::Write, &temp_path, e);
    let mut file = File::create(&temp_path).map_err(write_err)?;
    file.write_all(data).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;

    fs::rename(&temp_path, path)
        .map_err(|e| StorageError::io(SnapshotStep::Replace, path, e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use tempfile::TempDir;

    fn sample_doc() -> RemoteDocument {
        let mut doc = RemoteDocument::from_json("{}").unwrap();
        doc.users
            .insert("person1".to_string(), User::new("person1", "Alex"));
        doc.tasks_data.insert("person1".to_string(), Vec::new());
        doc.next_user_id = 2;
        doc
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::new(temp_dir.path().join("tally.json"));
        assert!(!store.exists());
        assert!(store.load().unwrap().is_none());

        let doc = sample_doc();
        store.save(&doc).unwrap();
        assert!(store.exists());

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("tally.json");
        let store = LocalStore::new(path.clone());
        store.save(&sample_doc()).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tally.json");
        fs::write(&path, "not json").unwrap();

        let err = LocalStore::new(path).load().unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[test]
    fn test_in_memory_is_noop() {
        let store = LocalStore::in_memory();
        store.save(&sample_doc()).unwrap();
        assert!(!store.exists());
        assert!(store.load().unwrap().is_none());
    }
}
