//! Source side of a migration: the remote tree being copied.
//!
//! The remote service is reached through [`SourceClient`], which exposes the
//! three calls the engine needs: a recursive listing, its continuation by
//! cursor, and a streaming download. [`DropboxClient`] is the production
//! implementation.

pub mod dropbox;
pub mod enumerate;
pub mod error;
#[cfg(test)]
pub mod memory;

use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::AsyncRead;

pub use dropbox::DropboxClient;
pub use enumerate::list_files_recursively;
pub use error::SourceError;

/// Body of a download. Read in bounded chunks; never collected in full.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// A file discovered by the enumerator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Slash-delimited, case-sensitive path as displayed by the source.
    pub path: String,
    pub size: u64,
    pub is_directory: bool,
}

impl FileDescriptor {
    pub fn file(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            is_directory: false,
        }
    }
}

/// Opaque continuation token for a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Folder,
    /// Tombstone for a path that was removed.
    Deleted,
}

/// One raw entry of a listing page, before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub path: String,
    pub size: u64,
    pub kind: EntryKind,
}

impl ListEntry {
    pub fn into_file(self) -> Option<FileDescriptor> {
        match self.kind {
            EntryKind::File => Some(FileDescriptor::file(self.path, self.size)),
            EntryKind::Folder | EntryKind::Deleted => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListPage {
    pub entries: Vec<ListEntry>,
    pub cursor: Cursor,
    pub has_more: bool,
}

/// An open download: server-side metadata plus the body stream.
pub struct Download {
    pub file: FileDescriptor,
    pub body: ByteStream,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("file", &self.file)
            .finish_non_exhaustive()
    }
}

/// Minimal async client used by the migration engine.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// First page of a listing rooted at `path`.
    async fn list_folder(&self, path: &str, recursive: bool) -> Result<ListPage, SourceError>;

    /// Next page after `cursor`.
    async fn list_folder_continue(&self, cursor: &Cursor) -> Result<ListPage, SourceError>;

    /// Open a download of the file at `path`.
    async fn download(&self, path: &str) -> Result<Download, SourceError>;
}
