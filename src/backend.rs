//! Async file backend — the lowest layer, responsible only for moving bytes
//! at known offsets. Carries no knowledge of records, headers, or crypto.
//!
//! Modeled on the open/read-range/write/truncate surface of a streaming
//! vault file handle: every operation seeks explicitly rather than relying
//! on an implicit cursor, since the storage controller interleaves reads at
//! arbitrary offsets (header, TOC, individual blobs) on the same handle.

use std::io::SeekFrom;
use std::path::Path;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{instrument, trace};

#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A single open file handle, sole owner of its `fd`. `BulkStorage` holds
/// exactly one of these; there is no connection pooling.
#[derive(Debug)]
pub struct FileBackend {
    file: File,
}

impl FileBackend {
    /// Open an existing file for read/write.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .await?;
        Ok(Self { file })
    }

    /// Create a new file, truncating if one already exists at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await?;
        Ok(Self { file })
    }

    /// Current file length in bytes.
    pub async fn size(&mut self) -> Result<u64, BackendError> {
        Ok(self.file.metadata().await?.len())
    }

    /// Read exactly `len` bytes starting at `offset`.
    #[instrument(skip(self), fields(offset, len))]
    pub async fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, BackendError> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Read the byte range `[start, end)`.
    pub async fn read_range(&mut self, start: u64, end: u64) -> Result<Vec<u8>, BackendError> {
        debug_assert!(start <= end);
        self.read_at(start, (end - start) as usize).await
    }

    /// Overwrite `data` at `offset`, growing the file if necessary.
    #[instrument(skip(self, data), fields(offset, len = data.len()))]
    pub async fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), BackendError> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.write_all(data).await?;
        Ok(())
    }

    /// Append `data` to the current end of file, returning the offset it
    /// was written at.
    #[instrument(skip(self, data), fields(len = data.len()))]
    pub async fn append(&mut self, data: &[u8]) -> Result<u64, BackendError> {
        let offset = self.size().await?;
        self.write_at(offset, data).await?;
        Ok(offset)
    }

    /// Truncate (or extend-with-zeros) the file to exactly `len` bytes.
    /// Used to roll back a partially-written `add` (spec.md §4.2: "file
    /// state is rolled back to pre-add on write failure").
    #[instrument(skip(self), fields(len))]
    pub async fn truncate_to(&mut self, len: u64) -> Result<(), BackendError> {
        trace!("truncating backend file");
        self.file.set_len(len).await?;
        Ok(())
    }

    /// Flush buffered writes and fsync the underlying descriptor.
    pub async fn sync(&mut self) -> Result<(), BackendError> {
        self.file.sync_all().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn write_then_read_at_offset() {
        let tmp = NamedTempFile::new().unwrap();
        let mut backend = FileBackend::create(tmp.path()).await.unwrap();
        backend.write_at(10, b"hello").await.unwrap();
        let back = backend.read_at(10, 5).await.unwrap();
        assert_eq!(back, b"hello");
    }

    #[tokio::test]
    async fn append_returns_prior_end_offset() {
        let tmp = NamedTempFile::new().unwrap();
        let mut backend = FileBackend::create(tmp.path()).await.unwrap();
        let first = backend.append(b"abc").await.unwrap();
        let second = backend.append(b"defg").await.unwrap();
        assert_eq!(first, 0);
        assert_eq!(second, 3);
        assert_eq!(backend.size().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn truncate_shrinks_file() {
        let tmp = NamedTempFile::new().unwrap();
        let mut backend = FileBackend::create(tmp.path()).await.unwrap();
        backend.append(b"0123456789").await.unwrap();
        backend.truncate_to(4).await.unwrap();
        assert_eq!(backend.size().await.unwrap(), 4);
        assert_eq!(backend.read_at(0, 4).await.unwrap(), b"0123");
    }

    #[tokio::test]
    async fn read_range_matches_read_at() {
        let tmp = NamedTempFile::new().unwrap();
        let mut backend = FileBackend::create(tmp.path()).await.unwrap();
        backend.write_at(0, b"0123456789").await.unwrap();
        assert_eq!(backend.read_range(2, 6).await.unwrap(), b"2345");
    }
}
