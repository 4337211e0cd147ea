//! Dropbox implementation of [`SourceClient`] over the HTTP API v2.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::io::StreamReader;

use super::{Cursor, Download, EntryKind, FileDescriptor, ListEntry, ListPage, SourceClient};
use super::SourceError;

const API_BASE: &str = "https://api.dropboxapi.com/2";
const CONTENT_BASE: &str = "https://content.dropboxapi.com/2";
const API_RESULT_HEADER: &str = "dropbox-api-result";

/// Listing and download client authenticated with a bearer token.
#[derive(Clone)]
pub struct DropboxClient {
    http: Client,
    token: String,
    api_base: String,
    content_base: String,
}

impl std::fmt::Debug for DropboxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropboxClient")
            .field("token", &"<redacted>")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ListFolderResponse {
    entries: Vec<Metadata>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = ".tag", rename_all = "snake_case")]
enum Metadata {
    File {
        path_display: Option<String>,
        path_lower: Option<String>,
        size: u64,
    },
    Folder {
        path_display: Option<String>,
        path_lower: Option<String>,
    },
    Deleted {
        path_display: Option<String>,
        path_lower: Option<String>,
    },
}

impl Metadata {
    fn into_entry(self) -> Option<ListEntry> {
        let (display, lower, size, kind) = match self {
            Metadata::File {
                path_display,
                path_lower,
                size,
            } => (path_display, path_lower, size, EntryKind::File),
            Metadata::Folder {
                path_display,
                path_lower,
            } => (path_display, path_lower, 0, EntryKind::Folder),
            Metadata::Deleted {
                path_display,
                path_lower,
            } => (path_display, path_lower, 0, EntryKind::Deleted),
        };
        let path = display.or(lower)?;
        Some(ListEntry { path, size, kind })
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error_summary: String,
}

impl From<ListFolderResponse> for ListPage {
    fn from(resp: ListFolderResponse) -> Self {
        let entries = resp
            .entries
            .into_iter()
            .filter_map(|m| {
                let entry = m.into_entry();
                if entry.is_none() {
                    tracing::warn!("Missing expected field: path_display");
                }
                entry
            })
            .collect();
        ListPage {
            entries,
            cursor: Cursor(resp.cursor),
            has_more: resp.has_more,
        }
    }
}

/// The API addresses the root folder as `""`, not `"/"`.
fn api_path(path: &str) -> &str {
    if path == "/" {
        ""
    } else {
        path
    }
}

/// Serialize `value` for an HTTP header: non-ASCII characters become
/// `\uXXXX` escapes, as the API requires for `Dropbox-API-Arg`.
fn header_safe_json(value: &Value) -> String {
    let raw = value.to_string();
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                let _ = write!(out, "\\u{:04x}", unit);
            }
        }
    }
    out
}

async fn error_from_response(path: &str, response: Response) -> SourceError {
    let status = response.status();
    if status == StatusCode::CONFLICT {
        if let Ok(body) = response.json::<ApiErrorBody>().await {
            return SourceError::Api {
                path: path.to_string(),
                summary: body.error_summary,
            };
        }
    }
    SourceError::HttpStatus {
        status: status.as_u16(),
        path: path.to_string(),
    }
}

impl DropboxClient {
    pub fn new(token: impl Into<String>) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            token: token.into(),
            api_base: API_BASE.to_string(),
            content_base: CONTENT_BASE.to_string(),
        })
    }

    /// POST a JSON RPC-style request and decode the JSON response.
    async fn rpc<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        path: &str,
        body: Value,
    ) -> Result<R, SourceError> {
        let url = format!("{}/{}", self.api_base, endpoint);
        tracing::debug!("POST {}", url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SourceError::Http {
                path: path.to_string(),
                source: e,
            })?;

        if !response.status().is_success() {
            return Err(error_from_response(path, response).await);
        }

        let bytes = response.bytes().await.map_err(|e| SourceError::Http {
            path: path.to_string(),
            source: e,
        })?;
        serde_json::from_slice(&bytes).map_err(|e| SourceError::InvalidResponse {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl SourceClient for DropboxClient {
    async fn list_folder(&self, path: &str, recursive: bool) -> Result<ListPage, SourceError> {
        let resp: ListFolderResponse = self
            .rpc(
                "files/list_folder",
                path,
                json!({ "path": api_path(path), "recursive": recursive }),
            )
            .await?;
        Ok(resp.into())
    }

    async fn list_folder_continue(&self, cursor: &Cursor) -> Result<ListPage, SourceError> {
        let resp: ListFolderResponse = self
            .rpc(
                "files/list_folder/continue",
                "<continue>",
                json!({ "cursor": cursor.0 }),
            )
            .await?;
        Ok(resp.into())
    }

    async fn download(&self, path: &str) -> Result<Download, SourceError> {
        let url = format!("{}/files/download", self.content_base);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header("Dropbox-API-Arg", header_safe_json(&json!({ "path": path })))
            .send()
            .await
            .map_err(|e| SourceError::Http {
                path: path.to_string(),
                source: e,
            })?;

        if !response.status().is_success() {
            return Err(error_from_response(path, response).await);
        }

        let invalid = |reason: String| SourceError::InvalidResponse {
            path: path.to_string(),
            reason,
        };
        let header = response
            .headers()
            .get(API_RESULT_HEADER)
            .ok_or_else(|| invalid(format!("missing {} header", API_RESULT_HEADER)))?;
        let metadata: Metadata = serde_json::from_slice(header.as_bytes())
            .map_err(|e| invalid(format!("bad {} header: {}", API_RESULT_HEADER, e)))?;
        let file = match metadata.into_entry() {
            Some(ListEntry {
                path,
                size,
                kind: EntryKind::File,
            }) => FileDescriptor::file(path, size),
            _ => return Err(invalid("download metadata is not a file".to_string())),
        };

        let body = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Download {
            file,
            body: Box::pin(StreamReader::new(body)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_folder_page() {
        let raw = json!({
            "entries": [
                {".tag": "folder", "name": "docs", "path_lower": "/docs", "path_display": "/Docs", "id": "id:1"},
                {".tag": "file", "name": "a.txt", "path_lower": "/docs/a.txt", "path_display": "/Docs/a.txt",
                 "id": "id:2", "size": 12, "rev": "015", "content_hash": "abc"},
                {".tag": "deleted", "name": "b.txt", "path_lower": "/docs/b.txt", "path_display": "/Docs/b.txt"}
            ],
            "cursor": "AAE",
            "has_more": true
        });
        let resp: ListFolderResponse = serde_json::from_value(raw).unwrap();
        let page: ListPage = resp.into();
        assert!(page.has_more);
        assert_eq!(page.cursor, Cursor("AAE".into()));
        assert_eq!(
            page.entries,
            vec![
                ListEntry {
                    path: "/Docs".into(),
                    size: 0,
                    kind: EntryKind::Folder
                },
                ListEntry {
                    path: "/Docs/a.txt".into(),
                    size: 12,
                    kind: EntryKind::File
                },
                ListEntry {
                    path: "/Docs/b.txt".into(),
                    size: 0,
                    kind: EntryKind::Deleted
                },
            ]
        );
    }

    #[test]
    fn test_entry_falls_back_to_lowercase_path() {
        let meta: Metadata =
            serde_json::from_value(json!({".tag": "file", "path_lower": "/x.bin", "size": 3}))
                .unwrap();
        assert_eq!(meta.into_entry().unwrap().path, "/x.bin");
    }

    #[test]
    fn test_entry_without_path_is_dropped() {
        let meta: Metadata = serde_json::from_value(json!({".tag": "folder"})).unwrap();
        assert!(meta.into_entry().is_none());
    }

    #[test]
    fn test_api_path_root() {
        assert_eq!(api_path("/"), "");
        assert_eq!(api_path(""), "");
        assert_eq!(api_path("/Photos"), "/Photos");
    }

    #[test]
    fn test_header_safe_json_escapes_non_ascii() {
        let header = header_safe_json(&json!({"path": "/Fotos/café.jpg"}));
        assert_eq!(header, r#"{"path":"/Fotos/caf\u00e9.jpg"}"#);
        let round_trip: Value = serde_json::from_str(&header).unwrap();
        assert_eq!(round_trip["path"], "/Fotos/café.jpg");
    }

    #[test]
    fn test_header_safe_json_escapes_astral_as_surrogate_pair() {
        let header = header_safe_json(&json!({"path": "/😀"}));
        assert_eq!(header, r#"{"path":"/\ud83d\ude00"}"#);
    }

    #[test]
    fn test_debug_redacts_token() {
        let client = DropboxClient::new("sl.secret-token").unwrap();
        let debug = format!("{:?}", client);
        assert!(!debug.contains("secret"));
    }
}
