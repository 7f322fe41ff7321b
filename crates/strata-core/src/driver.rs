//! The capability-declaring storage driver abstraction.
//!
//! A driver binds one storage configuration and implements the operations
//! the facade dispatches. What a driver can do is exactly the capability
//! set it declares; the facade gates every call on the required capability
//! before any I/O. Drivers receive the [`Principal`](crate::principal::Principal)
//! only to stamp ownership on file records, never for authorization.

use async_trait::async_trait;
use bytes::Bytes;

use crate::capability::Capability;
use crate::error::Result;
use crate::model::{Mount, StorageType};
use crate::types::{
    BatchRemoveResult, CompletedPart, CopyStats, DirectoryListing, Disposition, FileDownload,
    FileInfo, MultipartInit, MultipartPartInfo, MultipartUploadInfo, OpContext, PartUrl,
    PresignOptions, PresignedUrl, SearchHit, UploadOptions, UploadOutcome,
};

/// Operations a storage backend may implement.
///
/// Sub-paths are mount-relative logical paths: leading `/`, trailing `/`
/// for directory references. Mutating operations invalidate the affected
/// ancestor chain in the directory cache before returning.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// The storage kind, used in pool keys and capability errors.
    fn storage_type(&self) -> StorageType;

    /// The declared capability set.
    fn capabilities(&self) -> &'static [Capability];

    /// List one directory. Requires `Reader`.
    async fn list_directory(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        sub_path: &str,
    ) -> Result<DirectoryListing>;

    /// Stat one file or directory. Requires `Reader`.
    async fn file_info(&self, ctx: &OpContext, mount: &Mount, sub_path: &str) -> Result<FileInfo>;

    /// Stream a file body. Requires `Reader`.
    async fn download(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        sub_path: &str,
        disposition: Disposition,
    ) -> Result<FileDownload>;

    /// Store a file. Requires `Writer`.
    async fn upload(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        sub_path: &str,
        data: Bytes,
        opts: UploadOptions,
    ) -> Result<UploadOutcome>;

    /// Create a directory marker. Requires `Writer`.
    async fn create_directory(&self, ctx: &OpContext, mount: &Mount, sub_path: &str) -> Result<()>;

    /// Rename a file or directory within this storage. Requires `Atomic`.
    async fn rename(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        old_sub_path: &str,
        new_sub_path: &str,
    ) -> Result<()>;

    /// Copy a file or directory within this storage. Requires `Atomic`.
    async fn copy(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        source_sub_path: &str,
        target_sub_path: &str,
        skip_existing: bool,
    ) -> Result<CopyStats>;

    /// Delete a file or directory subtree. Requires `Writer`.
    async fn remove(&self, ctx: &OpContext, mount: &Mount, sub_path: &str) -> Result<()>;

    /// Delete many paths under one mount, never failing the batch for a
    /// single path. Requires `Writer`.
    async fn remove_batch(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        sub_paths: &[String],
    ) -> Result<BatchRemoveResult>;

    /// Generate a presigned URL. Requires `Presigned`.
    async fn presigned_url(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        sub_path: &str,
        opts: PresignOptions,
    ) -> Result<PresignedUrl>;

    /// Start a provider multipart session and presign its part URLs.
    /// Requires `Multipart`.
    async fn multipart_init(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        sub_path: &str,
        total_size: u64,
        part_size: Option<u64>,
        content_type: Option<&str>,
    ) -> Result<MultipartInit>;

    /// Finalize a multipart session. Requires `Multipart`.
    async fn multipart_complete(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        sub_path: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<UploadOutcome>;

    /// Abort a multipart session. Requires `Multipart`.
    async fn multipart_abort(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        sub_path: &str,
        upload_id: &str,
    ) -> Result<()>;

    /// Discover in-flight multipart sessions, optionally under a prefix.
    /// Requires `Multipart`.
    async fn multipart_list_uploads(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        sub_path: Option<&str>,
    ) -> Result<Vec<MultipartUploadInfo>>;

    /// List the uploaded parts of an in-flight session. Requires `Multipart`.
    async fn multipart_list_parts(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        sub_path: &str,
        upload_id: &str,
    ) -> Result<Vec<MultipartPartInfo>>;

    /// Re-presign part URLs for a resumable session. Requires `Multipart`.
    async fn multipart_refresh_urls(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        sub_path: &str,
        upload_id: &str,
        part_numbers: &[u32],
    ) -> Result<Vec<PartUrl>>;

    /// Case-insensitive basename substring search under the mount root.
    /// Returns raw hits; ordering is the facade's job. Requires `Reader`.
    async fn search(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>>;
}
