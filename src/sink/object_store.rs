//! Object-store destination with a managed multipart uploader.
//!
//! Bodies are cut into parts of a fixed size and uploaded one part at a
//! time, so at most one part is held in memory. Stores cap the number of
//! parts per object; a file too large for the configured part size at that
//! cap gets a larger part size for its own upload only.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use super::error::UploadError;
use crate::source::FileDescriptor;

/// Smallest part size the S3 protocol accepts for all but the last part.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;
pub const DEFAULT_PART_SIZE: u64 = MIN_PART_SIZE;
/// Protocol ceiling on parts per object.
pub const MAX_UPLOAD_PARTS: u32 = 10_000;

/// A part accepted by the store, needed to complete the upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub e_tag: Option<String>,
}

/// Upload calls of the destination object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable destination, e.g. `s3://bucket`.
    fn location(&self) -> String;

    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<()>;

    /// Start a multipart upload and return its upload id.
    async fn create_multipart_upload(&self, key: &str) -> anyhow::Result<String>;

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> anyhow::Result<CompletedPart>;

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> anyhow::Result<()>;

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> anyhow::Result<()>;
}

/// Default partitioning of multipart uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultipartConfig {
    pub part_size: u64,
    pub max_parts: u32,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            max_parts: MAX_UPLOAD_PARTS,
        }
    }
}

impl MultipartConfig {
    /// Part size to use for one object of `size` bytes.
    ///
    /// Stays at the configured default unless the file would need more than
    /// `max_parts` parts, in which case it becomes `ceil(size / max_parts)`.
    pub fn part_size_for(&self, size: u64) -> u64 {
        let max_parts = u64::from(self.max_parts.max(1));
        if size > self.part_size.saturating_mul(max_parts) {
            size.div_ceil(max_parts)
        } else {
            self.part_size
        }
    }
}

/// What a finished upload looked like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    pub bytes: u64,
    pub parts: u32,
    pub part_size: u64,
}

/// Reads up to `part_size` bytes. A short result means the stream ended.
async fn read_part<R>(body: &mut R, part_size: u64, capacity: u64) -> std::io::Result<Bytes>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = Vec::with_capacity(capacity.min(part_size) as usize);
    (&mut *body).take(part_size).read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}

fn store_error(operation: &'static str, key: &str) -> impl FnOnce(anyhow::Error) -> UploadError {
    let key = key.to_string();
    move |e| UploadError::ObjectStore {
        operation,
        key,
        message: format!("{:#}", e),
    }
}

/// Uploads files as objects keyed by their source path.
#[derive(Clone)]
pub struct ObjectStoreSink {
    store: Arc<dyn ObjectStore>,
    config: MultipartConfig,
}

impl std::fmt::Debug for ObjectStoreSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreSink")
            .field("location", &self.store.location())
            .field("config", &self.config)
            .finish()
    }
}

impl ObjectStoreSink {
    pub fn new(store: Arc<dyn ObjectStore>, config: MultipartConfig) -> Self {
        Self { store, config }
    }

    #[cfg(test)]
    pub fn config(&self) -> MultipartConfig {
        self.config
    }

    pub fn location(&self) -> String {
        self.store.location()
    }

    /// Upload `body` as the object for `file`.
    ///
    /// Bodies that fit in one part go through a single `put_object`; larger
    /// ones through a multipart upload that is aborted on error or
    /// cancellation.
    pub async fn upload<R>(
        &self,
        file: &FileDescriptor,
        body: &mut R,
        cancel: &CancellationToken,
    ) -> Result<UploadReport, UploadError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let key = file.path.as_str();
        let part_size = self.config.part_size_for(file.size);
        if part_size != self.config.part_size {
            tracing::info!(
                "adjusting part size to {} for '{}' (max parts = {})",
                part_size,
                key,
                self.config.max_parts
            );
        }

        let first = tokio::select! {
            result = read_part(body, part_size, file.size) => result.map_err(|e| UploadError::Read {
                key: key.to_string(),
                source: e,
            })?,
            _ = cancel.cancelled() => return Err(UploadError::Cancelled),
        };

        if (first.len() as u64) < part_size {
            let bytes = first.len() as u64;
            tokio::select! {
                result = self.store.put_object(key, first) => result.map_err(store_error("PutObject", key))?,
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
            }
            return Ok(UploadReport {
                bytes,
                parts: 1,
                part_size,
            });
        }

        let upload_id = tokio::select! {
            result = self.store.create_multipart_upload(key) => {
                result.map_err(store_error("CreateMultipartUpload", key))?
            }
            _ = cancel.cancelled() => return Err(UploadError::Cancelled),
        };

        let result = tokio::select! {
            result = self.upload_parts(file, &upload_id, part_size, first, body) => result,
            _ = cancel.cancelled() => Err(UploadError::Cancelled),
        };

        if result.is_err() {
            if let Err(e) = self.store.abort_multipart_upload(key, &upload_id).await {
                tracing::warn!("Failed to abort multipart upload for '{}': {:#}", key, e);
            }
        }
        result
    }

    async fn upload_parts<R>(
        &self,
        file: &FileDescriptor,
        upload_id: &str,
        part_size: u64,
        first: Bytes,
        body: &mut R,
    ) -> Result<UploadReport, UploadError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let key = file.path.as_str();
        let mut completed = Vec::new();
        let mut bytes = 0u64;
        let mut part = first;
        let mut part_number: u32 = 1;

        loop {
            if part_number > self.config.max_parts {
                return Err(UploadError::TooManyParts {
                    key: key.to_string(),
                    max_parts: self.config.max_parts,
                });
            }
            bytes += part.len() as u64;
            let done = self
                .store
                .upload_part(key, upload_id, part_number as i32, part)
                .await
                .map_err(store_error("UploadPart", key))?;
            completed.push(done);

            let remaining = file.size.saturating_sub(bytes);
            part = read_part(body, part_size, remaining)
                .await
                .map_err(|e| UploadError::Read {
                    key: key.to_string(),
                    source: e,
                })?;
            if part.is_empty() {
                break;
            }
            part_number += 1;
        }

        self.store
            .complete_multipart_upload(key, upload_id, completed)
            .await
            .map_err(store_error("CompleteMultipartUpload", key))?;

        tracing::debug!(key, bytes, parts = part_number, part_size, "multipart upload complete");
        Ok(UploadReport {
            bytes,
            parts: part_number,
            part_size,
        })
    }
}
