//! The per-file migration loop.
//!
//! Files are processed one at a time in listing order. Each file is skipped
//! if the checkpoint already has it as transferred; otherwise it is
//! downloaded, optionally wrapped in a progress meter, handed to the sink,
//! and its outcome recorded. A failed file never stops the loop. A cancelled
//! file leaves no record.

pub mod progress;

use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{CheckpointStore, TransferRecord};
use crate::retry::{self, RetryAction, RetryConfig};
use crate::sink::{Sink, UploadError};
use crate::source::{FileDescriptor, SourceClient, SourceError};

use progress::ProgressReader;

/// Why a single file did not make it to the destination.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("fail to download file '{path}': {source}")]
    Download {
        path: String,
        #[source]
        source: SourceError,
    },

    #[error(transparent)]
    Upload(UploadError),

    #[error("transfer cancelled")]
    Cancelled,
}

impl From<UploadError> for TransferError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::Cancelled => TransferError::Cancelled,
            other => TransferError::Upload(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub progress: bool,
    pub retry: RetryConfig,
}

/// Counts for one run of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub listed: usize,
    pub skipped: usize,
    pub uploaded: usize,
    pub failed: usize,
    pub interrupted: bool,
}

fn classify(e: &SourceError) -> RetryAction {
    if e.is_retryable() {
        RetryAction::Retry
    } else {
        RetryAction::Abort
    }
}

/// Move every file in `files` from `source` to `sink`.
///
/// With no sink the run is a dry listing: paths not yet transferred are
/// printed and nothing is downloaded or recorded. Stops early, with
/// `interrupted` set, once `cancel` fires.
pub async fn migrate(
    source: &dyn SourceClient,
    sink: Option<&Sink>,
    files: &[FileDescriptor],
    checkpoint: &CheckpointStore,
    options: &TransferOptions,
    cancel: &CancellationToken,
) -> RunSummary {
    let started = Instant::now();
    let mut summary = RunSummary {
        listed: files.len(),
        ..Default::default()
    };

    let Some(sink) = sink else {
        for file in files {
            if checkpoint.is_done(&file.path) {
                tracing::info!("file '{}' already processed", file.path);
                summary.skipped += 1;
                continue;
            }
            println!("{}", file.path);
        }
        tracing::info!(
            "No destination given, {} of {} files left to transfer",
            files.len() - summary.skipped,
            files.len()
        );
        return summary;
    };

    for file in files {
        if cancel.is_cancelled() {
            summary.interrupted = true;
            break;
        }
        if checkpoint.is_done(&file.path) {
            tracing::info!("file '{}' already processed", file.path);
            summary.skipped += 1;
            continue;
        }

        tracing::info!("downloading '{}'", file.path);
        let bar = progress::create_progress_bar(options.progress, file.size);
        match transfer_file(source, sink, file, bar.clone(), &options.retry, cancel).await {
            Ok(bytes) => {
                checkpoint.record(&file.path, TransferRecord::succeeded());
                summary.uploaded += 1;
                tracing::debug!(path = %file.path, bytes, "transfer complete");
                tracing::info!("successfully uploaded '{}'", file.path);
            }
            Err(TransferError::Cancelled) => {
                progress::suspend(bar.as_ref(), || {
                    tracing::warn!("transfer of '{}' interrupted", file.path);
                });
                summary.interrupted = true;
                break;
            }
            Err(e) => {
                progress::suspend(bar.as_ref(), || tracing::error!("{}", e));
                checkpoint.record(&file.path, TransferRecord::failed(e.to_string()));
                summary.failed += 1;
            }
        }
    }

    log_summary(&summary, started.elapsed());
    summary
}

/// Download one file and stream it into the sink. The body is dropped, and
/// with it the connection, on every return path.
async fn transfer_file(
    source: &dyn SourceClient,
    sink: &Sink,
    file: &FileDescriptor,
    bar: Option<ProgressBar>,
    retry_config: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<u64, TransferError> {
    let opened = tokio::select! {
        result = retry::retry_with_backoff(retry_config, cancel, classify, || {
            source.download(&file.path)
        }) => result,
        _ = cancel.cancelled() => return Err(TransferError::Cancelled),
    };
    let download = match opened {
        Ok(download) => download,
        Err(_) if cancel.is_cancelled() => return Err(TransferError::Cancelled),
        Err(e) => {
            return Err(TransferError::Download {
                path: file.path.clone(),
                source: e,
            })
        }
    };

    if download.file.size != file.size {
        tracing::debug!(
            path = %file.path,
            listed = file.size,
            served = download.file.size,
            "size changed since listing"
        );
    }

    let mut body = download.body;
    if let Some(bar) = bar {
        body = Box::pin(ProgressReader::new(body, bar));
    }
    Ok(sink.upload(file, &mut body, cancel).await?)
}

fn log_summary(summary: &RunSummary, elapsed: Duration) {
    let processed = summary.skipped + summary.uploaded + summary.failed;
    tracing::info!("── Summary ──");
    if summary.interrupted {
        tracing::info!(
            "  Interrupted after {} of {} files",
            processed,
            summary.listed
        );
    }
    tracing::info!(
        "  {} uploaded, {} already processed, {} failed, {} total",
        summary.uploaded,
        summary.skipped,
        summary.failed,
        summary.listed
    );
    tracing::info!("  elapsed: {}", format_duration(elapsed));
    if summary.failed > 0 {
        tracing::warn!(
            "{} files failed and will be retried on the next run",
            summary.failed
        );
    }
}

fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
