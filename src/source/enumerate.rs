//! Recursive, paginated enumeration of the source tree.

use tokio_util::sync::CancellationToken;

use super::{FileDescriptor, ListEntry, SourceClient, SourceError};
use crate::retry::{self, RetryAction, RetryConfig};

fn classify(e: &SourceError) -> RetryAction {
    if e.is_retryable() {
        RetryAction::Retry
    } else {
        RetryAction::Abort
    }
}

fn append_files(files: &mut Vec<FileDescriptor>, entries: Vec<ListEntry>) {
    files.extend(entries.into_iter().filter_map(ListEntry::into_file));
}

/// List every file under `root`, following continuation cursors until the
/// source reports no more pages.
///
/// Folders and tombstones are dropped; file order is the order the source
/// returned them in. The whole listing is collected before any transfer
/// starts. Any page that still fails after retries aborts the listing,
/// since a partial tree cannot be resumed without a persisted cursor.
pub async fn list_files_recursively(
    client: &dyn SourceClient,
    root: &str,
    retry_config: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<Vec<FileDescriptor>, SourceError> {
    let mut page = retry::retry_with_backoff(retry_config, cancel, classify, || {
        client.list_folder(root, true)
    })
    .await?;

    let mut files = Vec::new();
    let mut pages = 1usize;
    append_files(&mut files, std::mem::take(&mut page.entries));

    while page.has_more {
        let cursor = page.cursor.clone();
        page = retry::retry_with_backoff(retry_config, cancel, classify, || {
            client.list_folder_continue(&cursor)
        })
        .await?;
        pages += 1;
        append_files(&mut files, std::mem::take(&mut page.entries));
        tracing::debug!(pages, files = files.len(), "Fetched listing page");
    }

    tracing::info!("Found {} files under '{}' ({} pages)", files.len(), root, pages);
    Ok(files)
}
