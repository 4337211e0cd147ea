use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::error::UploadError;
use crate::source::FileDescriptor;

/// Writes each file below a local root directory, mirroring the source tree.
#[derive(Debug, Clone)]
pub struct FilesystemSink {
    root: PathBuf,
}

impl FilesystemSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path for a source path. Leading slashes are dropped; `..` and
    /// drive prefixes are rejected.
    pub fn destination(&self, source_path: &str) -> Result<PathBuf, UploadError> {
        let mut path = self.root.clone();
        let mut depth = 0usize;
        for component in Path::new(source_path).components() {
            match component {
                Component::Normal(part) => {
                    path.push(part);
                    depth += 1;
                }
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(UploadError::UnsafePath(source_path.to_string()));
                }
            }
        }
        if depth == 0 {
            return Err(UploadError::UnsafePath(source_path.to_string()));
        }
        Ok(path)
    }

    /// Copy `body` to the mirrored path, creating parent directories and
    /// truncating any existing file. Returns the number of bytes written.
    pub async fn upload<R>(
        &self,
        file: &FileDescriptor,
        body: &mut R,
        cancel: &CancellationToken,
    ) -> Result<u64, UploadError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let path = self.destination(&file.path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| UploadError::CreateDir {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let mut output = fs::File::create(&path)
            .await
            .map_err(|e| UploadError::CreateFile {
                path: path.clone(),
                source: e,
            })?;

        let copy = async {
            let written = tokio::io::copy(body, &mut output).await?;
            output.flush().await?;
            Ok::<_, std::io::Error>(written)
        };

        let written = tokio::select! {
            result = copy => result.map_err(|e| UploadError::Copy {
                path: file.path.clone(),
                source: e,
            })?,
            _ = cancel.cancelled() => return Err(UploadError::Cancelled),
        };

        tracing::debug!(
            size_bytes = written,
            path = %path.display(),
            "written",
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_destination_strips_leading_slash() {
        let sink = FilesystemSink::new("/out");
        assert_eq!(
            sink.destination("/Photos/2020/a.jpg").unwrap(),
            PathBuf::from("/out/Photos/2020/a.jpg")
        );
    }

    #[test]
    fn test_destination_rejects_parent_components() {
        let sink = FilesystemSink::new("/out");
        assert!(matches!(
            sink.destination("/a/../../etc/passwd"),
            Err(UploadError::UnsafePath(_))
        ));
    }

    #[test]
    fn test_destination_rejects_root_only() {
        let sink = FilesystemSink::new("/out");
        assert!(sink.destination("/").is_err());
    }

    #[tokio::test]
    async fn test_upload_creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FilesystemSink::new(dir.path());
        let file = FileDescriptor::file("/Docs/2021/report.txt", 5);
        let mut body: &[u8] = b"hello";
        let written = sink
            .upload(&file, &mut body, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(written, 5);
        let content = std::fs::read(dir.path().join("Docs/2021/report.txt")).unwrap();
        assert_eq!(content, b"hello");
    }

    #[tokio::test]
    async fn test_upload_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"much longer previous content").unwrap();
        let sink = FilesystemSink::new(dir.path());
        let mut body: &[u8] = b"new";
        sink.upload(
            &FileDescriptor::file("/a.txt", 3),
            &mut body,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_upload_into_existing_directory_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Docs")).unwrap();
        let sink = FilesystemSink::new(dir.path());
        let mut body: &[u8] = b"x";
        assert!(sink
            .upload(
                &FileDescriptor::file("/Docs/x", 1),
                &mut body,
                &CancellationToken::new()
            )
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_directory_blocked_by_file_is_create_dir_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Docs"), b"not a directory").unwrap();
        let sink = FilesystemSink::new(dir.path());
        let mut body: &[u8] = b"x";
        let err = sink
            .upload(
                &FileDescriptor::file("/Docs/sub/x", 1),
                &mut body,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::CreateDir { .. }));
    }

    #[tokio::test]
    async fn test_large_stream_is_copied_in_full() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FilesystemSink::new(dir.path());
        let size = 8 * 1024 * 1024 + 17;
        let mut body = tokio::io::repeat(7).take(size);
        let written = sink
            .upload(
                &FileDescriptor::file("/big.bin", size),
                &mut body,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(written, size);
        assert_eq!(
            std::fs::metadata(dir.path().join("big.bin")).unwrap().len(),
            size
        );
    }

    #[tokio::test]
    async fn test_cancel_aborts_stalled_copy() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FilesystemSink::new(dir.path());
        let (mut reader, _writer) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            sink.upload(&FileDescriptor::file("/stall", 10), &mut reader, &cancel),
        )
        .await
        .expect("cancelled upload should return promptly")
        .unwrap_err();
        assert!(matches!(err, UploadError::Cancelled));
    }
}
