//! WebDAV file handles.
//!
//! Reads buffer the whole object at open time: the engine's streaming
//! download would otherwise pin a provider connection for the lifetime of
//! the handle, and WebDAV clients interleave reads with metadata calls.
//! Writes accumulate into a buffer that flushes through a single engine
//! upload, so the parent-exists and MIME checks apply exactly as they do
//! on the JSON API.

use std::io::SeekFrom;

use bytes::{Bytes, BytesMut};
use dav_server::fs::{DavFile, DavMetaData, FsError, FsFuture};
use tracing::debug;

use crate::error::engine_error_to_fs_error;
use crate::filesystem::StrataDav;
use crate::metadata::StrataMetaData;

/// A file handle for WebDAV operations.
pub enum StrataDavFile {
    /// Read-only handle over the buffered object body.
    Reader(ReaderHandle),
    /// Buffered write handle, flushed through the engine on `flush`.
    Writer(WriterHandle),
}

impl std::fmt::Debug for StrataDavFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrataDavFile::Reader(h) => f
                .debug_struct("StrataDavFile::Reader")
                .field("path", &h.path)
                .field("position", &h.position)
                .field("size", &h.content.len())
                .finish(),
            StrataDavFile::Writer(h) => f
                .debug_struct("StrataDavFile::Writer")
                .field("path", &h.path)
                .field("position", &h.position)
                .field("dirty", &h.dirty)
                .finish(),
        }
    }
}

/// Read-only handle.
pub struct ReaderHandle {
    path: String,
    content: Bytes,
    position: u64,
}

/// Buffered write handle.
pub struct WriterHandle {
    fs: StrataDav,
    path: String,
    buffer: BytesMut,
    position: u64,
    dirty: bool,
}

impl StrataDavFile {
    /// A reader over an already-downloaded body.
    pub fn reader(path: String, content: Bytes) -> Self {
        StrataDavFile::Reader(ReaderHandle { path, content, position: 0 })
    }

    /// A writer seeded with existing content (append/modify) or empty
    /// (create/truncate). A freshly created file counts as dirty so empty
    /// PUTs still materialize an object.
    pub fn writer(fs: StrataDav, path: String, initial: Bytes, dirty: bool) -> Self {
        StrataDavFile::Writer(WriterHandle {
            fs,
            path,
            buffer: BytesMut::from(&initial[..]),
            position: 0,
            dirty,
        })
    }
}

impl DavFile for StrataDavFile {
    fn metadata(&mut self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        Box::pin(async move {
            let size = match self {
                StrataDavFile::Reader(h) => h.content.len() as u64,
                StrataDavFile::Writer(h) => h.buffer.len() as u64,
            };
            Ok(Box::new(StrataMetaData::file_with_size(size)) as Box<dyn DavMetaData>)
        })
    }

    fn read_bytes(&mut self, count: usize) -> FsFuture<'_, Bytes> {
        Box::pin(async move {
            match self {
                StrataDavFile::Reader(h) => {
                    let start = (h.position as usize).min(h.content.len());
                    let end = (start + count).min(h.content.len());
                    h.position = end as u64;
                    Ok(h.content.slice(start..end))
                }
                StrataDavFile::Writer(h) => {
                    let start = (h.position as usize).min(h.buffer.len());
                    let end = (start + count).min(h.buffer.len());
                    h.position = end as u64;
                    Ok(Bytes::copy_from_slice(&h.buffer[start..end]))
                }
            }
        })
    }

    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<'_, ()> {
        Box::pin(async move {
            match self {
                StrataDavFile::Reader(_) => Err(FsError::Forbidden),
                StrataDavFile::Writer(h) => {
                    let start = h.position as usize;
                    let end = start + buf.len();
                    if h.buffer.len() < end {
                        h.buffer.resize(end, 0);
                    }
                    h.buffer[start..end].copy_from_slice(&buf);
                    h.position = end as u64;
                    h.dirty = true;
                    Ok(())
                }
            }
        })
    }

    fn write_buf(&mut self, mut buf: Box<dyn bytes::Buf + Send>) -> FsFuture<'_, ()> {
        Box::pin(async move {
            let bytes = buf.copy_to_bytes(buf.remaining());
            self.write_bytes(bytes).await
        })
    }

    fn seek(&mut self, pos: SeekFrom) -> FsFuture<'_, u64> {
        Box::pin(async move {
            let (size, position) = match self {
                StrataDavFile::Reader(h) => (h.content.len() as i64, h.position as i64),
                StrataDavFile::Writer(h) => (h.buffer.len() as i64, h.position as i64),
            };
            let target = match pos {
                SeekFrom::Start(n) => n as i64,
                SeekFrom::End(n) => size + n,
                SeekFrom::Current(n) => position + n,
            };
            let new_position = target.max(0) as u64;
            match self {
                StrataDavFile::Reader(h) => h.position = new_position,
                StrataDavFile::Writer(h) => h.position = new_position,
            }
            Ok(new_position)
        })
    }

    fn flush(&mut self) -> FsFuture<'_, ()> {
        Box::pin(async move {
            match self {
                StrataDavFile::Reader(_) => Ok(()),
                StrataDavFile::Writer(h) => {
                    if !h.dirty {
                        return Ok(());
                    }
                    debug!(path = %h.path, size = h.buffer.len(), "flushing WebDAV write");
                    h.fs
                        .upload_buffer(&h.path, Bytes::copy_from_slice(&h.buffer))
                        .await
                        .map_err(engine_error_to_fs_error)?;
                    h.dirty = false;
                    Ok(())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    // StrataDavFile writers need a wired engine to flush into; the full
    // write/read cycle is covered by the adapter's integration behavior in
    // the API server tests. Reader seek/read arithmetic is exercised here.
    use super::*;

    #[tokio::test]
    async fn test_reader_read_and_seek() {
        let mut file = StrataDavFile::reader("/docs/x.txt".into(), Bytes::from_static(b"hello"));

        let chunk = file.read_bytes(2).await.unwrap();
        assert_eq!(&chunk[..], b"he");

        let pos = file.seek(SeekFrom::End(-1)).await.unwrap();
        assert_eq!(pos, 4);
        let chunk = file.read_bytes(10).await.unwrap();
        assert_eq!(&chunk[..], b"o");

        // Reads past the end are empty, not errors.
        let chunk = file.read_bytes(10).await.unwrap();
        assert!(chunk.is_empty());
    }

    #[tokio::test]
    async fn test_reader_rejects_writes() {
        let mut file = StrataDavFile::reader("/docs/x.txt".into(), Bytes::from_static(b"hello"));
        let err = file.write_bytes(Bytes::from_static(b"nope")).await.unwrap_err();
        assert!(matches!(err, FsError::Forbidden));
    }
}
