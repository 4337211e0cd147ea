use std::path::PathBuf;

use thiserror::Error;

/// Failure to deliver one file to the destination.
///
/// Every variant except [`UploadError::Cancelled`] is recorded against the
/// file in the checkpoint and retried on the next run.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("fail to create directory '{}': {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("fail to create file '{}': {source}", path.display())]
    CreateFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("fail to copy file '{path}': {source}")]
    Copy {
        path: String,
        source: std::io::Error,
    },

    /// The source path cannot be mapped safely below the destination root.
    #[error("refusing to write '{0}' outside the output directory")]
    UnsafePath(String),

    #[error("fail to read source stream for '{key}': {source}")]
    Read {
        key: String,
        source: std::io::Error,
    },

    #[error("fail to upload file '{key}': {operation} failed: {message}")]
    ObjectStore {
        operation: &'static str,
        key: String,
        message: String,
    },

    /// The stream was longer than its declared size and ran past the part limit.
    #[error("fail to upload file '{key}': more than {max_parts} parts required")]
    TooManyParts { key: String, max_parts: u32 },

    #[error("upload cancelled")]
    Cancelled,
}
