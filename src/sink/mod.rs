//! Destination side of a migration.
//!
//! A [`Sink`] is chosen once at startup from the configured [`SinkTarget`]
//! and never changes during a run.

pub mod error;
pub mod filesystem;
#[cfg(test)]
pub mod memory;
pub mod object_store;
pub mod s3;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

pub use error::UploadError;
pub use filesystem::FilesystemSink;
pub use object_store::{MultipartConfig, ObjectStore, ObjectStoreSink};
pub use s3::S3Store;

use crate::source::FileDescriptor;

/// Where files go. Exactly one may be configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    Directory(PathBuf),
    Bucket(String),
}

#[derive(Debug, Clone)]
pub enum Sink {
    Filesystem(FilesystemSink),
    ObjectStore(ObjectStoreSink),
}

impl Sink {
    /// Build the sink for `target`. Bucket targets pick up AWS credentials
    /// and region from the environment.
    pub async fn from_target(target: &SinkTarget, multipart: MultipartConfig) -> Self {
        match target {
            SinkTarget::Directory(dir) => Sink::Filesystem(FilesystemSink::new(dir)),
            SinkTarget::Bucket(bucket) => {
                let store = S3Store::from_env(bucket.clone()).await;
                Sink::ObjectStore(ObjectStoreSink::new(Arc::new(store), multipart))
            }
        }
    }

    /// Human-readable destination for log lines.
    pub fn describe(&self) -> String {
        match self {
            Sink::Filesystem(fs) => fs.root().display().to_string(),
            Sink::ObjectStore(store) => store.location(),
        }
    }

    /// Deliver `body` as the content of `file`. Returns the bytes written.
    pub async fn upload<R>(
        &self,
        file: &FileDescriptor,
        body: &mut R,
        cancel: &CancellationToken,
    ) -> Result<u64, UploadError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        match self {
            Sink::Filesystem(fs) => fs.upload(file, body, cancel).await,
            Sink::ObjectStore(store) => store
                .upload(file, body, cancel)
                .await
                .map(|report| report.bytes),
        }
    }
}
