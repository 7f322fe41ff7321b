//! The `DavFileSystem` implementation over the engine facade.
//!
//! One instance serves one authenticated principal: the embedder constructs
//! it after authentication and hands it to the DAV handler. Every WebDAV
//! verb translates to a facade call, so capability gating, mount
//! resolution, and cache invalidation behave identically across the JSON
//! API and WebDAV surfaces.

use std::sync::Arc;

use bytes::Bytes;
use dav_server::davpath::DavPath;
use dav_server::fs::{
    DavDirEntry, DavFile, DavFileSystem, DavMetaData, FsError, FsFuture, FsStream, OpenOptions,
    ReadDirMeta,
};
use futures::{stream, StreamExt};
use strata_core::error::Result as EngineResult;
use strata_core::principal::Principal;
use strata_core::types::{CopyOutcome, Disposition, OpContext, UploadOptions, UploadOutcome};
use strata_core::FileSystem;
use tracing::{debug, instrument};

use crate::dir_entry::StrataDirEntry;
use crate::error::engine_error_to_fs_error;
use crate::file::StrataDavFile;
use crate::metadata::StrataMetaData;

/// The virtual filesystem exposed over WebDAV for one principal.
#[derive(Clone)]
pub struct StrataDav {
    fs: Arc<FileSystem>,
    principal: Principal,
}

impl std::fmt::Debug for StrataDav {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrataDav")
            .field("principal", &self.principal.identity())
            .finish_non_exhaustive()
    }
}

impl StrataDav {
    /// Bind the facade to a principal.
    pub fn new(fs: Arc<FileSystem>, principal: Principal) -> Self {
        Self { fs, principal }
    }

    fn ctx(&self) -> OpContext {
        OpContext::new(self.principal.clone())
    }

    /// A DAV path as an engine logical path, keeping the collection slash.
    ///
    /// `as_pathbuf` hands back the percent-decoded path; the URL-encoded
    /// form is only used for tracing.
    fn parse_path(path: &DavPath) -> String {
        let decoded = path.as_pathbuf();
        let raw = decoded.to_string_lossy();
        let trimmed = raw.trim_start_matches('/').trim_end_matches('/');
        let mut logical = if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{trimmed}")
        };
        if path.is_collection() && logical != "/" {
            logical.push('/');
        }
        logical
    }

    /// Flush path for write handles.
    pub(crate) async fn upload_buffer(&self, logical_path: &str, data: Bytes) -> EngineResult<UploadOutcome> {
        self.fs
            .upload(&self.ctx(), logical_path, data, UploadOptions::default())
            .await
    }

    async fn read_whole_file(&self, logical_path: &str) -> Result<Bytes, FsError> {
        let download = self
            .fs
            .download(&self.ctx(), logical_path, Disposition::Inline)
            .await
            .map_err(engine_error_to_fs_error)?;
        let mut body = download.body;
        let mut out = Vec::with_capacity(download.content_length.unwrap_or(0) as usize);
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|_| FsError::GeneralFailure)?;
            out.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(out))
    }
}

impl DavFileSystem for StrataDav {
    #[instrument(level = "debug", skip(self, options), fields(path = %path.as_url_string()))]
    fn open<'a>(&'a self, path: &'a DavPath, options: OpenOptions) -> FsFuture<'a, Box<dyn DavFile>> {
        Box::pin(async move {
            let logical = Self::parse_path(path);
            debug!(path = %logical, options = ?options, "open");

            if options.write || options.create || options.create_new {
                let existing = self.fs.file_info(&self.ctx(), &logical).await;
                match &existing {
                    Ok(info) if info.is_directory => return Err(FsError::Forbidden),
                    Ok(_) if options.create_new => return Err(FsError::Exists),
                    _ => {}
                }

                let (initial, dirty) = if options.create_new || options.truncate {
                    (Bytes::new(), true)
                } else {
                    match existing {
                        Ok(_) => (self.read_whole_file(&logical).await?, false),
                        Err(_) if options.create => (Bytes::new(), true),
                        Err(e) => return Err(engine_error_to_fs_error(e)),
                    }
                };
                let file = StrataDavFile::writer(self.clone(), logical, initial, dirty);
                return Ok(Box::new(file) as Box<dyn DavFile>);
            }

            let content = self.read_whole_file(&logical).await?;
            Ok(Box::new(StrataDavFile::reader(logical, content)) as Box<dyn DavFile>)
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn read_dir<'a>(
        &'a self,
        path: &'a DavPath,
        _meta: ReadDirMeta,
    ) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>> {
        Box::pin(async move {
            let mut logical = Self::parse_path(path);
            if !logical.ends_with('/') {
                logical.push('/');
            }
            let listing = self
                .fs
                .list_directory(&self.ctx(), &logical)
                .await
                .map_err(engine_error_to_fs_error)?;

            let entries: Vec<Box<dyn DavDirEntry>> = listing
                .items
                .into_iter()
                .map(|item| Box::new(StrataDirEntry::new(item)) as Box<dyn DavDirEntry>)
                .collect();
            Ok(Box::pin(stream::iter(entries.into_iter().map(Ok))) as FsStream<_>)
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>> {
        Box::pin(async move {
            let logical = Self::parse_path(path);
            if logical == "/" {
                return Ok(Box::new(StrataMetaData::root()) as Box<dyn DavMetaData>);
            }
            let info = self
                .fs
                .file_info(&self.ctx(), &logical)
                .await
                .map_err(engine_error_to_fs_error)?;
            Ok(Box::new(StrataMetaData::from_info(&info)) as Box<dyn DavMetaData>)
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let mut logical = Self::parse_path(path);
            if !logical.ends_with('/') {
                logical.push('/');
            }
            self.fs
                .create_directory(&self.ctx(), &logical)
                .await
                .map_err(engine_error_to_fs_error)
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let logical = Self::parse_path(path);
            self.fs
                .remove(&self.ctx(), &logical)
                .await
                .map_err(engine_error_to_fs_error)
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let mut logical = Self::parse_path(path);
            if !logical.ends_with('/') {
                logical.push('/');
            }
            self.fs
                .remove(&self.ctx(), &logical)
                .await
                .map_err(engine_error_to_fs_error)
        })
    }

    #[instrument(level = "debug", skip(self), fields(from = %from.as_url_string(), to = %to.as_url_string()))]
    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let from_logical = Self::parse_path(from);
            let to_logical = Self::parse_path(to);
            self.fs
                .rename(&self.ctx(), &from_logical, &to_logical)
                .await
                .map_err(engine_error_to_fs_error)
        })
    }

    #[instrument(level = "debug", skip(self), fields(from = %from.as_url_string(), to = %to.as_url_string()))]
    fn copy<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let from_logical = Self::parse_path(from);
            let to_logical = Self::parse_path(to);
            // WebDAV COPY overwrites by default (RFC 4918 §9.8.4).
            let outcome = self
                .fs
                .copy(&self.ctx(), &from_logical, &to_logical, false)
                .await
                .map_err(engine_error_to_fs_error)?;
            match outcome {
                CopyOutcome::Local(stats) if stats.failed == 0 => Ok(()),
                CopyOutcome::Local(_) => Err(FsError::GeneralFailure),
                // Cross-storage transfers need a client that can execute the
                // presigned hand-off; WebDAV clients cannot.
                CopyOutcome::CrossStorage(_) => Err(FsError::NotImplemented),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dav_path(raw: &str) -> DavPath {
        DavPath::new(raw).unwrap()
    }

    #[test]
    fn test_parse_path_preserves_collection_slash() {
        assert_eq!(StrataDav::parse_path(&dav_path("/docs/a/")), "/docs/a/");
        assert_eq!(StrataDav::parse_path(&dav_path("/docs/a")), "/docs/a");
        assert_eq!(StrataDav::parse_path(&dav_path("/")), "/");
    }

    #[test]
    fn test_parse_path_decodes_percent_escapes() {
        assert_eq!(
            StrataDav::parse_path(&dav_path("/docs/my%20file.txt")),
            "/docs/my file.txt"
        );
    }
}
