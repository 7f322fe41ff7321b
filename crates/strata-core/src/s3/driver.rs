//! The S3 storage driver.
//!
//! Layers directory semantics on a flat object store: directories are
//! zero-byte marker objects plus the implied structure of key prefixes,
//! listing goes through `ListObjectsV2` with a `/` delimiter, rename is
//! copy-then-delete, and recursive operations paginate with continuation
//! tokens. Reads consult the directory cache; mutations invalidate the
//! affected ancestor chain after they succeed.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::{Method, Response, StatusCode};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::cache::DirectoryCache;
use crate::capability::Capability;
use crate::driver::StorageDriver;
use crate::error::{EngineError, Result};
use crate::mime;
use crate::model::{FileRecord, Mount, StorageType};
use crate::path;
use crate::repo::FileRecordRepository;
use crate::s3::client::S3Client;
use crate::s3::xml;
use crate::types::{
    BatchFailure, BatchRemoveResult, CompletedPart, CopyStats, DirectoryListing, Disposition,
    FileDownload, FileInfo, ListingItem, MultipartInit, MultipartPartInfo, MultipartUploadInfo,
    OpContext, PartUrl, PresignOptions, PresignedUrl, SearchHit, UploadOptions, UploadOutcome,
    DEFAULT_PART_SIZE, PART_URL_EXPIRY_SECS,
};

/// Page size for `ListObjectsV2` walks.
const LIST_PAGE_SIZE: &str = "1000";

/// Provider ceiling on multipart part count.
const MAX_PART_COUNT: u64 = 10_000;

/// Everything the S3 driver declares.
const S3_CAPABILITIES: &[Capability] = &[
    Capability::Reader,
    Capability::Writer,
    Capability::Atomic,
    Capability::Presigned,
    Capability::Multipart,
];

/// Metadata pulled from object response headers.
#[derive(Debug, Clone, Default)]
struct ObjectMeta {
    size: Option<u64>,
    modified: Option<DateTime<Utc>>,
    etag: Option<String>,
    content_type: Option<String>,
}

fn meta_from_headers(headers: &HeaderMap) -> ObjectMeta {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    };
    ObjectMeta {
        size: text("content-length").and_then(|s| s.parse().ok()),
        modified: text("last-modified")
            .and_then(|s| DateTime::parse_from_rfc2822(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        etag: text("etag").map(|s| s.trim_matches('"').to_string()),
        content_type: text("content-type"),
    }
}

/// A driver bound to one S3 configuration.
pub struct S3Driver {
    client: S3Client,
    dir_cache: Arc<DirectoryCache>,
    file_records: Arc<dyn FileRecordRepository>,
}

impl std::fmt::Debug for S3Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Driver")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl S3Driver {
    /// Build a driver over a signed client and shared collaborators.
    pub fn new(
        client: S3Client,
        dir_cache: Arc<DirectoryCache>,
        file_records: Arc<dyn FileRecordRepository>,
    ) -> Self {
        Self { client, dir_cache, file_records }
    }

    /// The underlying client, for presigning from the facade.
    pub fn client(&self) -> &S3Client {
        &self.client
    }

    fn key(&self, sub_path: &str) -> String {
        self.client.config().object_key(sub_path)
    }

    fn logical(&self, mount: &Mount, sub_path: &str) -> String {
        if sub_path == "/" {
            format!("{}/", mount.mount_path.trim_end_matches('/'))
        } else {
            path::join(&mount.mount_path, sub_path)
        }
    }

    /// Run a provider call under the context's cancellation token and
    /// control-plane timeout.
    async fn bounded<T, F>(&self, ctx: &OpContext, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        ctx.ensure_active()?;
        let guarded = async {
            tokio::select! {
                _ = ctx.cancel.cancelled() => Err(EngineError::Cancelled),
                res = fut => res,
            }
        };
        match ctx.timeout {
            Some(limit) => tokio::time::timeout(limit, guarded)
                .await
                .map_err(|_| EngineError::from_provider(0, "provider call timed out"))?,
            None => guarded.await,
        }
    }

    /// Turn a non-success response into a typed error, mapping 404 to
    /// `NotFound`.
    async fn fail_from(response: Response) -> EngineError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = xml::parse_error(&body)
            .map(|(code, msg)| format!("{code}: {msg}"))
            .unwrap_or_else(|| {
                if body.is_empty() {
                    format!("provider returned status {status}")
                } else {
                    body
                }
            });
        if status == 404 {
            EngineError::not_found(message)
        } else {
            EngineError::from_provider(status, message)
        }
    }

    async fn expect_success(response: Response) -> Result<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::fail_from(response).await)
        }
    }

    /// One `ListObjectsV2` page under a prefix.
    async fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        max_keys: &str,
        token: Option<&str>,
    ) -> Result<xml::ListPage> {
        let mut query: Vec<(&str, String)> = vec![
            ("list-type", "2".to_string()),
            ("max-keys", max_keys.to_string()),
        ];
        if let Some(d) = delimiter {
            query.push(("delimiter", d.to_string()));
        }
        if !prefix.is_empty() {
            query.push(("prefix", prefix.to_string()));
        }
        if let Some(t) = token {
            query.push(("continuation-token", t.to_string()));
        }
        let response = self.client.request(Method::GET, "", &query, &[], None).await?;
        let response = Self::expect_success(response).await?;
        let body = response.text().await?;
        Ok(xml::parse_list_page(&body))
    }

    /// HEAD an object key.
    async fn head(&self, key: &str) -> Result<ObjectMeta> {
        let response = self.client.request(Method::HEAD, key, &[], &[], None).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(meta_from_headers(response.headers()));
        }
        // HEAD bodies are empty; synthesize the error from the status alone.
        if status == StatusCode::NOT_FOUND {
            Err(EngineError::not_found(format!("no such object: {key}")))
        } else {
            Err(EngineError::from_provider(
                status.as_u16(),
                format!("HEAD failed for {key}"),
            ))
        }
    }

    /// True when at least one key exists under the prefix.
    async fn prefix_nonempty(&self, prefix: &str) -> Result<bool> {
        let page = self.list_page(prefix, None, "1", None).await?;
        Ok(!page.objects.is_empty() || !page.common_prefixes.is_empty())
    }

    /// A directory exists when its marker object is present or any key
    /// lives under its prefix. The mount root always exists.
    async fn directory_exists(&self, dir_sub_path: &str) -> Result<bool> {
        if dir_sub_path == "/" {
            return Ok(true);
        }
        let marker = self.key(dir_sub_path);
        match self.head(&marker).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => self.prefix_nonempty(&marker).await,
            Err(e) => Err(e),
        }
    }

    async fn parent_exists(&self, sub_path: &str) -> Result<bool> {
        match path::parent_of(sub_path) {
            None => Ok(true),
            Some(parent) => self.directory_exists(&parent).await,
        }
    }

    /// True when a file object exists at the sub-path.
    async fn file_exists(&self, sub_path: &str) -> Result<bool> {
        match self.head(&self.key(sub_path)).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Server-side copy of one object key.
    async fn copy_object(&self, source_key: &str, target_key: &str) -> Result<()> {
        let headers = vec![(
            "x-amz-copy-source".to_string(),
            self.client.copy_source(source_key),
        )];
        let response = self
            .client
            .request(Method::PUT, target_key, &[], &headers, Some(Bytes::new()))
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let response = self.client.request(Method::DELETE, key, &[], &[], None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Self::fail_from(response).await);
        }
        Self::expect_success(response).await?;
        Ok(())
    }

    /// Record an uploaded object in the external file table.
    async fn record_upload(
        &self,
        ctx: &OpContext,
        key: &str,
        file_name: &str,
        content_type: &str,
        size: u64,
        etag: Option<String>,
    ) -> Result<FileRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let record = FileRecord {
            slug: FileRecord::slug_for(&id),
            id,
            filename: file_name.to_string(),
            storage_path: key.to_string(),
            s3_url: self.client.object_url(key)?.to_string(),
            mimetype: content_type.to_string(),
            size,
            s3_config_id: self.client.config().id.clone(),
            etag,
            created_by: ctx.principal.owner_tag(),
            created_at: now,
            updated_at: now,
        };
        self.file_records.insert(record.clone()).await?;
        Ok(record)
    }

    /// Best-effort cleanup of file records under a storage path.
    async fn forget_records(&self, storage_path: &str) {
        let config_id = self.client.config().id.clone();
        if let Err(e) = self
            .file_records
            .delete_by_storage_path(&config_id, storage_path)
            .await
        {
            warn!(storage_path, error = %e, "file record cleanup failed");
        }
    }

    fn invalidate_chain(&self, mount: &Mount, sub_path: &str) {
        self.dir_cache.invalidate_path_and_ancestors(&mount.id, sub_path);
    }

    /// Presign one part-upload URL.
    fn presign_part(&self, key: &str, upload_id: &str, part_number: u32) -> Result<PartUrl> {
        let query = [
            ("partNumber", part_number.to_string()),
            ("uploadId", upload_id.to_string()),
        ];
        let url = self
            .client
            .presign(&Method::PUT, key, &query, PART_URL_EXPIRY_SECS)?;
        Ok(PartUrl { part_number, url })
    }

    /// Map an object key back to this mount's logical path.
    fn logical_for_key(&self, mount: &Mount, key: &str) -> Option<String> {
        let prefix = self.client.config().key_prefix();
        let sub = key.strip_prefix(&prefix)?;
        Some(path::join(&mount.mount_path, sub))
    }
}

#[async_trait]
impl StorageDriver for S3Driver {
    fn storage_type(&self) -> StorageType {
        StorageType::S3
    }

    fn capabilities(&self) -> &'static [Capability] {
        S3_CAPABILITIES
    }

    #[instrument(skip(self, ctx, mount), fields(mount_id = %mount.id))]
    async fn list_directory(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        sub_path: &str,
    ) -> Result<DirectoryListing> {
        let dir_sub = if sub_path.ends_with('/') {
            sub_path.to_string()
        } else {
            format!("{sub_path}/")
        };

        let cache_ttl = std::time::Duration::from_secs(mount.cache_ttl_seconds);
        if !cache_ttl.is_zero() {
            if let Some(cached) = self.dir_cache.get(&mount.id, &dir_sub) {
                return Ok(cached);
            }
        }

        let prefix = if dir_sub == "/" {
            self.client.config().key_prefix()
        } else {
            self.key(&dir_sub)
        };
        let logical_dir = self.logical(mount, &dir_sub);

        let mut directories: Vec<ListingItem> = Vec::new();
        let mut files: Vec<ListingItem> = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = self
                .bounded(
                    ctx,
                    self.list_page(&prefix, Some("/"), LIST_PAGE_SIZE, token.as_deref()),
                )
                .await?;

            for common in &page.common_prefixes {
                let name = common
                    .strip_prefix(&prefix)
                    .unwrap_or(common)
                    .trim_end_matches('/');
                if name.is_empty() {
                    continue;
                }
                directories.push(ListingItem {
                    name: name.to_string(),
                    path: format!("{}/", path::join(&logical_dir, name)),
                    is_directory: true,
                    size: None,
                    modified: None,
                    etag: None,
                    mount_id: Some(mount.id.clone()),
                    is_mount: false,
                    is_virtual: false,
                });
            }

            for object in &page.objects {
                // Directory placeholders: the listed prefix itself, or any
                // marker key ending in the delimiter.
                if object.key == prefix || object.key.ends_with('/') {
                    continue;
                }
                let name = object.key.strip_prefix(&prefix).unwrap_or(&object.key);
                if name.is_empty() {
                    continue;
                }
                files.push(ListingItem {
                    name: name.to_string(),
                    path: path::join(&logical_dir, name),
                    is_directory: false,
                    size: Some(object.size),
                    modified: object.last_modified,
                    etag: object.etag.clone(),
                    mount_id: Some(mount.id.clone()),
                    is_mount: false,
                    is_virtual: false,
                });
            }

            token = page.next_token;
            if token.is_none() {
                break;
            }
        }

        directories.sort_by(|a, b| a.name.cmp(&b.name));
        files.sort_by(|a, b| a.name.cmp(&b.name));
        let mut items = directories;
        items.extend(files);

        let listing = DirectoryListing {
            path: logical_dir,
            is_virtual: false,
            is_root: dir_sub == "/" && mount.mount_path.trim_end_matches('/').is_empty(),
            mount_id: Some(mount.id.clone()),
            storage_type: Some(StorageType::S3),
            items,
        };

        if !cache_ttl.is_zero() {
            self.dir_cache.set(&mount.id, &dir_sub, listing.clone(), cache_ttl);
        }
        Ok(listing)
    }

    #[instrument(skip(self, ctx, mount), fields(mount_id = %mount.id))]
    async fn file_info(&self, ctx: &OpContext, mount: &Mount, sub_path: &str) -> Result<FileInfo> {
        let logical = self.logical(mount, sub_path);
        let name = path::basename(sub_path).to_string();

        if path::is_directory_ref(sub_path) {
            if self.bounded(ctx, self.directory_exists(sub_path)).await? {
                return Ok(FileInfo {
                    path: logical,
                    name,
                    is_directory: true,
                    size: None,
                    modified: None,
                    etag: None,
                    mime_type: Some(mime::DIRECTORY_CONTENT_TYPE.to_string()),
                });
            }
            return Err(EngineError::not_found(format!("directory {logical}")));
        }

        let key = self.key(sub_path);
        let meta = match self.bounded(ctx, self.head(&key)).await {
            Ok(meta) => Some(meta),
            // Some providers answer HEAD with 403 or an opaque failure while
            // GET works fine; fall back and discard the body.
            Err(EngineError::ProviderPermanent { status: 403, .. })
            | Err(EngineError::ProviderTransient { status: 0, .. }) => {
                let response = self
                    .bounded(ctx, async {
                        self.client.request(Method::GET, &key, &[], &[], None).await
                    })
                    .await?;
                if response.status().is_success() {
                    let meta = meta_from_headers(response.headers());
                    drop(response);
                    Some(meta)
                } else if response.status() == StatusCode::NOT_FOUND {
                    None
                } else {
                    return Err(Self::fail_from(response).await);
                }
            }
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        if let Some(meta) = meta {
            return Ok(FileInfo {
                path: logical,
                name,
                is_directory: false,
                size: meta.size,
                modified: meta.modified,
                etag: meta.etag,
                mime_type: meta.content_type,
            });
        }

        // Not an object: probe for an implicit directory before giving up.
        let dir_prefix = format!("{key}/");
        if self.bounded(ctx, self.prefix_nonempty(&dir_prefix)).await? {
            return Ok(FileInfo {
                path: format!("{logical}/"),
                name,
                is_directory: true,
                size: None,
                modified: None,
                etag: None,
                mime_type: Some(mime::DIRECTORY_CONTENT_TYPE.to_string()),
            });
        }
        Err(EngineError::not_found(format!("no such file: {logical}")))
    }

    #[instrument(skip(self, ctx, mount), fields(mount_id = %mount.id))]
    async fn download(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        sub_path: &str,
        disposition: Disposition,
    ) -> Result<FileDownload> {
        if path::is_directory_ref(sub_path) {
            return Err(EngineError::bad_request("cannot download a directory"));
        }
        let key = self.key(sub_path);
        let response = self
            .bounded(ctx, async {
                self.client.request(Method::GET, &key, &[], &[], None).await
            })
            .await?;
        let response = Self::expect_success(response).await?;
        let meta = meta_from_headers(response.headers());

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other))
            .boxed();

        Ok(FileDownload {
            file_name: path::basename(sub_path).to_string(),
            content_type: meta.content_type.unwrap_or_else(|| mime::OCTET_STREAM.to_string()),
            content_length: meta.size,
            last_modified: meta.modified,
            etag: meta.etag,
            disposition,
            body,
        })
    }

    #[instrument(skip(self, ctx, mount, data, opts), fields(mount_id = %mount.id, size = data.len()))]
    async fn upload(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        sub_path: &str,
        data: Bytes,
        opts: UploadOptions,
    ) -> Result<UploadOutcome> {
        if path::is_directory_ref(sub_path) {
            return Err(EngineError::bad_request("upload target must be a file path"));
        }
        let file_name = path::basename(sub_path).to_string();
        if file_name.is_empty() {
            return Err(EngineError::bad_request("upload target must include a file name"));
        }
        let content_type = mime::resolve_content_type(&file_name, opts.content_type.as_deref())?;

        if !self.bounded(ctx, self.parent_exists(sub_path)).await? {
            return Err(EngineError::conflict("parent directory does not exist"));
        }

        let key = self.key(sub_path);
        let size = data.len() as u64;
        let headers = vec![("content-type".to_string(), content_type.clone())];
        let response = self
            .bounded(ctx, async {
                self.client
                    .request(Method::PUT, &key, &[], &headers, Some(data))
                    .await
            })
            .await?;
        let response = Self::expect_success(response).await?;
        let etag = meta_from_headers(response.headers()).etag;

        let record = self
            .record_upload(ctx, &key, &file_name, &content_type, size, etag.clone())
            .await?;

        if let Some(parent) = path::parent_of(sub_path) {
            self.invalidate_chain(mount, &parent);
        }
        debug!(key, size, "uploaded object");

        Ok(UploadOutcome {
            use_multipart: false,
            upload_id: None,
            path: self.logical(mount, sub_path),
            size,
            etag,
            file_id: record.id,
            slug: record.slug,
        })
    }

    #[instrument(skip(self, ctx, mount), fields(mount_id = %mount.id))]
    async fn create_directory(&self, ctx: &OpContext, mount: &Mount, sub_path: &str) -> Result<()> {
        if !path::is_directory_ref(sub_path) || sub_path == "/" {
            return Err(EngineError::bad_request("directory path must end with '/'"));
        }

        let marker = self.key(sub_path);
        match self.bounded(ctx, self.head(&marker)).await {
            Ok(_) => {
                return Err(EngineError::conflict(format!(
                    "directory already exists: {}",
                    self.logical(mount, sub_path)
                )))
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        if !self.bounded(ctx, self.parent_exists(sub_path)).await? {
            return Err(EngineError::conflict("parent directory does not exist"));
        }

        let headers = vec![(
            "content-type".to_string(),
            mime::DIRECTORY_CONTENT_TYPE.to_string(),
        )];
        let response = self
            .bounded(ctx, async {
                self.client
                    .request(Method::PUT, &marker, &[], &headers, Some(Bytes::new()))
                    .await
            })
            .await?;
        Self::expect_success(response).await?;

        self.invalidate_chain(mount, sub_path);
        Ok(())
    }

    #[instrument(skip(self, ctx, mount), fields(mount_id = %mount.id))]
    async fn rename(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        old_sub_path: &str,
        new_sub_path: &str,
    ) -> Result<()> {
        let is_dir = path::is_directory_ref(old_sub_path);
        if is_dir != path::is_directory_ref(new_sub_path) {
            return Err(EngineError::bad_request(
                "rename source and destination must both be files or both be directories",
            ));
        }

        if !self.bounded(ctx, self.parent_exists(new_sub_path)).await? {
            return Err(EngineError::conflict("destination parent directory does not exist"));
        }

        if is_dir {
            if self.bounded(ctx, self.directory_exists(new_sub_path)).await? {
                return Err(EngineError::conflict("destination already exists"));
            }
            let old_prefix = self.key(old_sub_path);
            let new_prefix = self.key(new_sub_path);

            let mut moved = 0usize;
            let mut token: Option<String> = None;
            loop {
                let page = self
                    .bounded(
                        ctx,
                        self.list_page(&old_prefix, None, LIST_PAGE_SIZE, token.as_deref()),
                    )
                    .await?;
                for object in &page.objects {
                    let suffix = object.key.strip_prefix(&old_prefix).unwrap_or(&object.key);
                    let target = format!("{new_prefix}{suffix}");
                    self.bounded(ctx, self.copy_object(&object.key, &target)).await?;
                    self.bounded(ctx, self.delete_object(&object.key)).await?;
                    moved += 1;
                }
                token = page.next_token;
                if token.is_none() {
                    break;
                }
            }
            if moved == 0 {
                return Err(EngineError::not_found(format!(
                    "directory {}",
                    self.logical(mount, old_sub_path)
                )));
            }
        } else {
            if self.bounded(ctx, self.file_exists(new_sub_path)).await? {
                return Err(EngineError::conflict("destination already exists"));
            }
            let old_key = self.key(old_sub_path);
            let new_key = self.key(new_sub_path);
            self.bounded(ctx, self.copy_object(&old_key, &new_key)).await?;
            self.bounded(ctx, self.delete_object(&old_key)).await?;
        }

        self.invalidate_chain(mount, old_sub_path);
        self.invalidate_chain(mount, new_sub_path);
        Ok(())
    }

    #[instrument(skip(self, ctx, mount), fields(mount_id = %mount.id))]
    async fn copy(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        source_sub_path: &str,
        target_sub_path: &str,
        skip_existing: bool,
    ) -> Result<CopyStats> {
        let is_dir = path::is_directory_ref(source_sub_path);
        if is_dir != path::is_directory_ref(target_sub_path) {
            return Err(EngineError::bad_request(
                "copy source and destination must both be files or both be directories",
            ));
        }

        if !self.bounded(ctx, self.parent_exists(target_sub_path)).await? {
            return Err(EngineError::conflict("destination parent directory does not exist"));
        }

        let mut stats = CopyStats::default();

        if is_dir {
            let source_prefix = self.key(source_sub_path);
            let target_prefix = self.key(target_sub_path);
            let mut seen = 0usize;
            let mut token: Option<String> = None;
            loop {
                let page = self
                    .bounded(
                        ctx,
                        self.list_page(&source_prefix, None, LIST_PAGE_SIZE, token.as_deref()),
                    )
                    .await?;
                for object in &page.objects {
                    seen += 1;
                    let suffix = object.key.strip_prefix(&source_prefix).unwrap_or(&object.key);
                    let target = format!("{target_prefix}{suffix}");
                    // Marker objects always transfer so the directory shape
                    // survives; data objects honor skip_existing.
                    let is_marker = object.key.ends_with('/');
                    if skip_existing && !is_marker {
                        match self.bounded(ctx, self.head(&target)).await {
                            Ok(_) => {
                                stats.skipped += 1;
                                continue;
                            }
                            Err(e) if e.is_not_found() => {}
                            Err(e) => return Err(e),
                        }
                    }
                    match self.bounded(ctx, self.copy_object(&object.key, &target)).await {
                        Ok(()) => {
                            if !is_marker {
                                stats.success += 1;
                            }
                        }
                        Err(e) => {
                            warn!(source = %object.key, target = %target, error = %e, "copy failed");
                            stats.failed += 1;
                        }
                    }
                }
                token = page.next_token;
                if token.is_none() {
                    break;
                }
            }
            if seen == 0 {
                return Err(EngineError::not_found(format!(
                    "directory {}",
                    self.logical(mount, source_sub_path)
                )));
            }
        } else {
            if skip_existing && self.bounded(ctx, self.file_exists(target_sub_path)).await? {
                stats.skipped = 1;
            } else {
                let source_key = self.key(source_sub_path);
                let target_key = self.key(target_sub_path);
                self.bounded(ctx, self.copy_object(&source_key, &target_key)).await?;
                stats.success = 1;
            }
        }

        self.invalidate_chain(mount, target_sub_path);
        Ok(stats)
    }

    #[instrument(skip(self, ctx, mount), fields(mount_id = %mount.id))]
    async fn remove(&self, ctx: &OpContext, mount: &Mount, sub_path: &str) -> Result<()> {
        if path::is_directory_ref(sub_path) {
            let prefix = self.key(sub_path);
            let mut deleted = 0usize;
            loop {
                // Deleting shrinks the listing; restart from the front each
                // round instead of trusting a token into mutated state.
                let page = self
                    .bounded(ctx, self.list_page(&prefix, None, LIST_PAGE_SIZE, None))
                    .await?;
                if page.objects.is_empty() {
                    break;
                }
                for object in &page.objects {
                    self.bounded(ctx, self.delete_object(&object.key)).await?;
                    deleted += 1;
                }
                if page.next_token.is_none() {
                    break;
                }
            }
            if deleted == 0 {
                return Err(EngineError::not_found(format!(
                    "directory {}",
                    self.logical(mount, sub_path)
                )));
            }
            self.forget_records(&prefix).await;
        } else {
            let key = self.key(sub_path);
            self.bounded(ctx, self.delete_object(&key)).await?;
            self.forget_records(&key).await;
        }

        self.invalidate_chain(mount, sub_path);
        Ok(())
    }

    async fn remove_batch(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        sub_paths: &[String],
    ) -> Result<BatchRemoveResult> {
        let mut result = BatchRemoveResult::default();
        for sub_path in sub_paths {
            match self.remove(ctx, mount, sub_path).await {
                Ok(()) => result.success += 1,
                Err(e) => result.failed.push(BatchFailure {
                    path: self.logical(mount, sub_path),
                    error: e.to_string(),
                }),
            }
        }
        Ok(result)
    }

    #[instrument(skip(self, ctx, mount, opts), fields(mount_id = %mount.id))]
    async fn presigned_url(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        sub_path: &str,
        opts: PresignOptions,
    ) -> Result<PresignedUrl> {
        ctx.ensure_active()?;
        if path::is_directory_ref(sub_path) {
            return Err(EngineError::bad_request("cannot presign a directory reference"));
        }
        let key = self.key(sub_path);
        let mut query: Vec<(&str, String)> = Vec::new();
        if opts.force_download {
            let file_name = path::basename(sub_path);
            query.push((
                "response-content-disposition",
                format!("attachment; filename=\"{}\"", encode_filename(file_name)),
            ));
        }
        let url = self.client.presign(&opts.method, &key, &query, opts.expires_in)?;
        Ok(PresignedUrl {
            url,
            method: opts.method.to_string(),
            expires_in: opts.expires_in.clamp(1, 604_800),
        })
    }

    #[instrument(skip(self, ctx, mount, content_type), fields(mount_id = %mount.id))]
    async fn multipart_init(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        sub_path: &str,
        total_size: u64,
        part_size: Option<u64>,
        content_type: Option<&str>,
    ) -> Result<MultipartInit> {
        if path::is_directory_ref(sub_path) {
            return Err(EngineError::bad_request("multipart target must be a file path"));
        }
        let file_name = path::basename(sub_path).to_string();
        if file_name.is_empty() {
            return Err(EngineError::bad_request("multipart target must include a file name"));
        }
        let content_type = mime::resolve_content_type(&file_name, content_type)?;

        if !self.bounded(ctx, self.parent_exists(sub_path)).await? {
            return Err(EngineError::conflict("parent directory does not exist"));
        }

        let part_size = part_size.unwrap_or(DEFAULT_PART_SIZE).max(DEFAULT_PART_SIZE);
        let part_count = total_size.div_ceil(part_size).max(1);
        if part_count > MAX_PART_COUNT {
            return Err(EngineError::bad_request(format!(
                "object requires {part_count} parts; the provider maximum is {MAX_PART_COUNT}"
            )));
        }

        let key = self.key(sub_path);
        let headers = vec![("content-type".to_string(), content_type)];
        let response = self
            .bounded(ctx, async {
                self.client
                    .request(
                        Method::POST,
                        &key,
                        &[("uploads", String::new())],
                        &headers,
                        Some(Bytes::new()),
                    )
                    .await
            })
            .await?;
        let response = Self::expect_success(response).await?;
        let body = response.text().await?;
        let upload_id = xml::parse_upload_id(&body)
            .ok_or_else(|| EngineError::internal("provider response missing UploadId"))?;

        let mut part_urls = Vec::with_capacity(part_count as usize);
        for number in 1..=part_count as u32 {
            part_urls.push(self.presign_part(&key, &upload_id, number)?);
        }

        Ok(MultipartInit {
            upload_id,
            key,
            path: self.logical(mount, sub_path),
            part_size,
            part_count: part_count as u32,
            part_urls,
            created_at: Utc::now(),
            owner: ctx.principal.owner_tag(),
        })
    }

    #[instrument(skip(self, ctx, mount, parts), fields(mount_id = %mount.id, parts = parts.len()))]
    async fn multipart_complete(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        sub_path: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<UploadOutcome> {
        if parts.is_empty() {
            return Err(EngineError::bad_request("complete requires at least one part"));
        }
        let key = self.key(sub_path);
        let mut ordered: Vec<(u32, String)> = parts
            .iter()
            .map(|p| (p.part_number, p.etag.clone()))
            .collect();
        ordered.sort_by_key(|(n, _)| *n);
        let body = xml::complete_upload_body(&ordered);

        let response = self
            .bounded(ctx, async {
                self.client
                    .request(
                        Method::POST,
                        &key,
                        &[("uploadId", upload_id.to_string())],
                        &[],
                        Some(Bytes::from(body)),
                    )
                    .await
            })
            .await?;
        let response = Self::expect_success(response).await?;
        let body = response.text().await?;
        let etag = xml::text_of(&body, "ETag").map(|s| s.trim_matches('"').to_string());

        // The completion response carries no size; stat the assembled object.
        let meta = self.bounded(ctx, self.head(&key)).await.unwrap_or_default();
        let size = meta.size.unwrap_or(0);

        let file_name = path::basename(sub_path).to_string();
        let content_type = meta
            .content_type
            .unwrap_or_else(|| mime::OCTET_STREAM.to_string());
        let record = self
            .record_upload(ctx, &key, &file_name, &content_type, size, etag.clone())
            .await?;

        if let Some(parent) = path::parent_of(sub_path) {
            self.invalidate_chain(mount, &parent);
        }

        Ok(UploadOutcome {
            use_multipart: false,
            upload_id: Some(upload_id.to_string()),
            path: self.logical(mount, sub_path),
            size,
            etag,
            file_id: record.id,
            slug: record.slug,
        })
    }

    #[instrument(skip(self, ctx, mount), fields(mount_id = %mount.id))]
    async fn multipart_abort(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        sub_path: &str,
        upload_id: &str,
    ) -> Result<()> {
        let key = self.key(sub_path);
        let response = self
            .bounded(ctx, async {
                self.client
                    .request(
                        Method::DELETE,
                        &key,
                        &[("uploadId", upload_id.to_string())],
                        &[],
                        None,
                    )
                    .await
            })
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn multipart_list_uploads(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        sub_path: Option<&str>,
    ) -> Result<Vec<MultipartUploadInfo>> {
        let mut query: Vec<(&str, String)> = vec![("uploads", String::new())];
        let prefix = match sub_path {
            Some(sub) => self.key(sub),
            None => self.client.config().key_prefix(),
        };
        if !prefix.is_empty() {
            query.push(("prefix", prefix));
        }
        let response = self
            .bounded(ctx, async {
                self.client.request(Method::GET, "", &query, &[], None).await
            })
            .await?;
        let response = Self::expect_success(response).await?;
        let body = response.text().await?;
        let _ = mount;
        Ok(xml::parse_multipart_uploads(&body)
            .into_iter()
            .map(|(key, upload_id, initiated)| MultipartUploadInfo { upload_id, key, initiated })
            .collect())
    }

    async fn multipart_list_parts(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        sub_path: &str,
        upload_id: &str,
    ) -> Result<Vec<MultipartPartInfo>> {
        let _ = mount;
        let key = self.key(sub_path);
        let response = self
            .bounded(ctx, async {
                self.client
                    .request(
                        Method::GET,
                        &key,
                        &[("uploadId", upload_id.to_string())],
                        &[],
                        None,
                    )
                    .await
            })
            .await?;
        let response = Self::expect_success(response).await?;
        let body = response.text().await?;
        Ok(xml::parse_parts(&body)
            .into_iter()
            .map(|(part_number, size, etag, last_modified)| MultipartPartInfo {
                part_number,
                size,
                etag,
                last_modified,
            })
            .collect())
    }

    async fn multipart_refresh_urls(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        sub_path: &str,
        upload_id: &str,
        part_numbers: &[u32],
    ) -> Result<Vec<PartUrl>> {
        ctx.ensure_active()?;
        let _ = mount;
        let key = self.key(sub_path);
        part_numbers
            .iter()
            .map(|n| self.presign_part(&key, upload_id, *n))
            .collect()
    }

    #[instrument(skip(self, ctx, mount), fields(mount_id = %mount.id))]
    async fn search(
        &self,
        ctx: &OpContext,
        mount: &Mount,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>> {
        let needle = query.to_lowercase();
        let prefix = self.client.config().key_prefix();
        let mut hits = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = self
                .bounded(
                    ctx,
                    self.list_page(&prefix, None, LIST_PAGE_SIZE, token.as_deref()),
                )
                .await?;

            for object in &page.objects {
                if object.key.ends_with('/') {
                    continue;
                }
                let name = object.key.rsplit('/').next().unwrap_or(&object.key);
                if !name.to_lowercase().contains(&needle) {
                    continue;
                }
                let Some(logical) = self.logical_for_key(mount, &object.key) else {
                    continue;
                };
                hits.push(SearchHit {
                    name: name.to_string(),
                    path: logical,
                    size: Some(object.size),
                    modified: object.last_modified,
                    mount_id: mount.id.clone(),
                });
                if hits.len() >= max_results {
                    return Ok(hits);
                }
            }

            token = page.next_token;
            if token.is_none() {
                break;
            }
        }
        Ok(hits)
    }
}

/// Percent-encode a filename for a `Content-Disposition` parameter.
pub(crate) fn encode_filename(name: &str) -> String {
    use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};
    const FILENAME_ENCODE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'.').remove(b'-').remove(b'_');
    percent_encode(name.as_bytes(), FILENAME_ENCODE).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_filename() {
        assert_eq!(encode_filename("report.pdf"), "report.pdf");
        assert_eq!(encode_filename("my file.txt"), "my%20file.txt");
        assert_eq!(encode_filename("квартал.xlsx").contains('%'), true);
    }

    #[test]
    fn test_meta_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("content-length", "42".parse().unwrap());
        headers.insert("etag", "\"abc\"".parse().unwrap());
        headers.insert("content-type", "text/plain".parse().unwrap());
        headers.insert(
            "last-modified",
            "Wed, 12 Oct 2022 17:50:00 GMT".parse().unwrap(),
        );

        let meta = meta_from_headers(&headers);
        assert_eq!(meta.size, Some(42));
        assert_eq!(meta.etag.as_deref(), Some("abc"));
        assert_eq!(meta.content_type.as_deref(), Some("text/plain"));
        assert!(meta.modified.is_some());
    }
}
