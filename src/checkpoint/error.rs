//! Error types for the checkpoint module.

use std::path::PathBuf;

use thiserror::Error;

/// Errors reading or writing the checkpoint file.
///
/// None of these are fatal to a run: callers log them as warnings and carry
/// on with whatever state is in memory.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// The file could not be read (including "does not exist").
    #[error("Failed to read checkpoint file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file exists but is not a valid checkpoint document.
    #[error("Failed to parse checkpoint file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write checkpoint file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl CheckpointError {
    /// True when the file simply has not been created yet.
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            CheckpointError::Read { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}
