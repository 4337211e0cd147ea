//! In-memory [`SourceClient`] for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio_util::io::StreamReader;

use super::{
    ByteStream, Cursor, Download, EntryKind, FileDescriptor, ListEntry, ListPage, SourceClient,
    SourceError,
};

enum Body {
    Bytes(Vec<u8>),
    Zeros,
    /// Never yields a byte.
    Stall,
    /// Yields the bytes, then a read error.
    Broken(Vec<u8>),
}

/// Source tree held in memory, split into listing pages.
///
/// Entries are appended to the current page; [`next_page`](Self::next_page)
/// starts a new one.
#[derive(Default)]
pub struct MemorySource {
    pages: Vec<Vec<ListEntry>>,
    bodies: HashMap<String, Body>,
    failing_downloads: HashSet<String>,
    failing_page: Option<usize>,
    list_calls: Mutex<Vec<String>>,
    downloads: Mutex<Vec<String>>,
    stalled: Mutex<Vec<DuplexStream>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            ..Default::default()
        }
    }

    pub fn next_page(mut self) -> Self {
        self.pages.push(Vec::new());
        self
    }

    pub fn with_entry(mut self, entry: ListEntry) -> Self {
        if let Some(page) = self.pages.last_mut() {
            page.push(entry);
        }
        self
    }

    fn with_body(self, path: &str, size: u64, body: Body) -> Self {
        let mut this = self.with_entry(ListEntry {
            path: path.to_string(),
            size,
            kind: EntryKind::File,
        });
        this.bodies.insert(path.to_string(), body);
        this
    }

    pub fn with_file(self, path: &str, content: &[u8]) -> Self {
        self.with_body(path, content.len() as u64, Body::Bytes(content.to_vec()))
    }

    /// A file of `size` zero bytes, generated on read.
    pub fn with_synthetic_file(self, path: &str, size: u64) -> Self {
        self.with_body(path, size, Body::Zeros)
    }

    /// A file whose body never produces data.
    pub fn with_stalled_file(self, path: &str, size: u64) -> Self {
        self.with_body(path, size, Body::Stall)
    }

    /// A file whose body fails after `content` has been read.
    pub fn with_broken_file(self, path: &str, size: u64, content: &[u8]) -> Self {
        self.with_body(path, size, Body::Broken(content.to_vec()))
    }

    pub fn with_folder(self, path: &str) -> Self {
        self.with_entry(ListEntry {
            path: path.to_string(),
            size: 0,
            kind: EntryKind::Folder,
        })
    }

    pub fn with_deleted(self, path: &str) -> Self {
        self.with_entry(ListEntry {
            path: path.to_string(),
            size: 0,
            kind: EntryKind::Deleted,
        })
    }

    pub fn failing_download(mut self, path: &str) -> Self {
        self.failing_downloads.insert(path.to_string());
        self
    }

    /// Make the listing call that would return page `index` fail.
    pub fn failing_page(mut self, index: usize) -> Self {
        self.failing_page = Some(index);
        self
    }

    /// Paths passed to `download`, in call order.
    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> Vec<String> {
        self.list_calls.lock().unwrap().clone()
    }

    fn page(&self, index: usize) -> Result<ListPage, SourceError> {
        if self.failing_page == Some(index) {
            return Err(SourceError::HttpStatus {
                status: 400,
                path: format!("page {}", index),
            });
        }
        let entries = self
            .pages
            .get(index)
            .cloned()
            .ok_or_else(|| SourceError::Api {
                path: format!("page {}", index),
                summary: "reset/".to_string(),
            })?;
        Ok(ListPage {
            entries,
            cursor: Cursor(format!("cursor-{}", index + 1)),
            has_more: index + 1 < self.pages.len(),
        })
    }
}

#[async_trait]
impl SourceClient for MemorySource {
    async fn list_folder(&self, path: &str, recursive: bool) -> Result<ListPage, SourceError> {
        self.list_calls
            .lock()
            .unwrap()
            .push(format!("list:{} recursive={}", path, recursive));
        self.page(0)
    }

    async fn list_folder_continue(&self, cursor: &Cursor) -> Result<ListPage, SourceError> {
        self.list_calls
            .lock()
            .unwrap()
            .push(format!("continue:{}", cursor.0));
        let index = cursor
            .0
            .strip_prefix("cursor-")
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(|| SourceError::Api {
                path: cursor.0.clone(),
                summary: "invalid cursor".to_string(),
            })?;
        self.page(index)
    }

    async fn download(&self, path: &str) -> Result<Download, SourceError> {
        self.downloads.lock().unwrap().push(path.to_string());
        if self.failing_downloads.contains(path) {
            return Err(SourceError::Api {
                path: path.to_string(),
                summary: "path/not_found/".to_string(),
            });
        }
        let size = self
            .pages
            .iter()
            .flatten()
            .find(|e| e.path == path)
            .map(|e| e.size)
            .unwrap_or(0);
        let body: ByteStream = match self.bodies.get(path) {
            Some(Body::Bytes(content)) => Box::pin(std::io::Cursor::new(content.clone())),
            Some(Body::Zeros) => Box::pin(tokio::io::repeat(0).take(size)),
            Some(Body::Stall) => {
                let (reader, writer) = tokio::io::duplex(64);
                self.stalled.lock().unwrap().push(writer);
                Box::pin(reader)
            }
            Some(Body::Broken(content)) => {
                let chunks: Vec<std::io::Result<Bytes>> = vec![
                    Ok(Bytes::from(content.clone())),
                    Err(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        "connection reset by peer",
                    )),
                ];
                Box::pin(StreamReader::new(futures_util::stream::iter(chunks)))
            }
            None => {
                return Err(SourceError::Api {
                    path: path.to_string(),
                    summary: "path/not_file/".to_string(),
                })
            }
        };
        Ok(Download {
            file: FileDescriptor::file(path, size),
            body,
        })
    }
}
