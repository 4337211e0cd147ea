//! Checkpoint store: the JSON status file plus its in-memory map.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::error::CheckpointError;
use super::types::{CheckpointMap, TransferRecord};

/// Owns the checkpoint map for one run.
///
/// Shared between the transfer loop and the shutdown task through an `Arc`;
/// the map sits behind a mutex so a flush never observes a half-applied update.
pub struct CheckpointStore {
    path: PathBuf,
    records: Mutex<CheckpointMap>,
}

impl std::fmt::Debug for CheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl CheckpointStore {
    /// Load the checkpoint at `path`.
    ///
    /// Never fails: a missing or unreadable file is logged and the run starts
    /// from an empty map, i.e. every path counts as unprocessed.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match read_map(&path) {
            Ok(map) => {
                tracing::debug!(
                    path = %path.display(),
                    entries = map.len(),
                    "Loaded checkpoint"
                );
                map
            }
            Err(e) => {
                tracing::warn!("fail to read status file: {}", e);
                CheckpointMap::new()
            }
        };
        Self {
            path,
            records: Mutex::new(records),
        }
    }

    /// Build a store around an existing map without touching the disk.
    #[cfg(test)]
    pub fn with_records(path: impl Into<PathBuf>, records: CheckpointMap) -> Self {
        Self {
            path: path.into(),
            records: Mutex::new(records),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The map only ever sees whole-entry inserts, so a poisoned lock still
    /// guards a consistent map.
    fn lock(&self) -> MutexGuard<'_, CheckpointMap> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `path` was transferred successfully by an earlier attempt.
    pub fn is_done(&self, path: &str) -> bool {
        self.lock().get(path).is_some_and(TransferRecord::is_done)
    }

    #[cfg(test)]
    pub fn get(&self, path: &str) -> Option<TransferRecord> {
        self.lock().get(path).cloned()
    }

    /// Store the outcome of a finished attempt.
    ///
    /// A successful record is final: later records for the same path are ignored.
    pub fn record(&self, path: &str, record: TransferRecord) {
        let mut records = self.lock();
        if records.get(path).is_some_and(TransferRecord::is_done) {
            tracing::debug!(path, "Ignoring update for already transferred path");
            return;
        }
        records.insert(path.to_string(), record);
    }

    /// Copy of the current map.
    #[cfg(test)]
    pub fn snapshot(&self) -> CheckpointMap {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Persist the current map, fully replacing the previous file.
    ///
    /// The document is written to a sibling temp file and renamed over the
    /// checkpoint, so a crash mid-write leaves the old file intact.
    pub fn save(&self) -> Result<(), CheckpointError> {
        // Held until the rename so concurrent saves cannot interleave on the temp file.
        let records = self.lock();
        let bytes = serde_json::to_vec(&*records)?;

        let tmp_path = temp_path(&self.path);
        std::fs::write(&tmp_path, &bytes).map_err(|e| CheckpointError::Write {
            path: tmp_path.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            CheckpointError::Write {
                path: self.path.clone(),
                source: e,
            }
        })?;

        tracing::debug!(path = %self.path.display(), "Checkpoint saved");
        Ok(())
    }

    /// [`save`](Self::save), logging instead of returning the error.
    pub fn save_or_warn(&self) -> bool {
        match self.save() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("fail to write status file: {}", e);
                false
            }
        }
    }

    /// Guard that saves the map when dropped, whichever way the caller's
    /// scope is left.
    pub fn flush_on_drop(&self) -> FlushGuard<'_> {
        FlushGuard { store: self }
    }
}

/// Saves its [`CheckpointStore`] on drop. See [`CheckpointStore::flush_on_drop`].
#[must_use = "the checkpoint is saved when the guard is dropped"]
pub struct FlushGuard<'a> {
    store: &'a CheckpointStore,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.store.save_or_warn();
    }
}

/// Read and parse a checkpoint file.
pub fn read_map(path: &Path) -> Result<CheckpointMap, CheckpointError> {
    let bytes = std::fs::read(path).map_err(|e| CheckpointError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_slice(&bytes).map_err(|e| CheckpointError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
