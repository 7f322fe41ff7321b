//! The filesystem facade: the engine's public surface.
//!
//! One method per user-facing operation. Every method resolves the logical
//! path through the mount manager, checks that the resolved driver declares
//! the capability the operation needs (failing with `Unimplemented` before
//! any I/O otherwise), forwards to the driver, and leaves cache
//! invalidation to the driver. Batch operations never fail as a whole for
//! per-item errors, and search fans out across mounts with all-settled
//! semantics.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use tracing::{instrument, warn};

use crate::cache::SearchCache;
use crate::capability::{self, Capability};
use crate::error::{EngineError, Result};
use crate::manager::{MountManager, ResolvedPath};
use crate::model::Mount;
use crate::path;
use crate::types::{
    BatchCopyResult, BatchFailure, BatchRemoveResult, CompletedPart, CopyDetail, CopyItemRequest,
    CopyOutcome, CrossStorageCopy, CrossStorageMetadata, DirectoryListing, Disposition,
    FileDownload, FileInfo, MultipartInit, MultipartPartInfo, MultipartUploadInfo, OpContext,
    PartUrl, PresignOptions, PresignedUrl, SearchHit, SearchParams, SearchResults, SearchScope,
    UploadOptions, UploadOutcome,
};

/// Hard cap on raw hits collected per mount during search.
const MAX_SEARCH_RESULTS: usize = 1000;

/// Upper bound on the search page size.
const MAX_SEARCH_LIMIT: usize = 200;

/// The virtual filesystem, unified across every mount a principal can see.
pub struct FileSystem {
    manager: Arc<MountManager>,
    search_cache: Arc<SearchCache>,
}

impl std::fmt::Debug for FileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystem").finish_non_exhaustive()
    }
}

impl FileSystem {
    /// Build the facade over its collaborators.
    pub fn new(manager: Arc<MountManager>, search_cache: Arc<SearchCache>) -> Self {
        Self { manager, search_cache }
    }

    /// The mount manager, for embedders that manage mounts directly.
    pub fn manager(&self) -> &Arc<MountManager> {
        &self.manager
    }

    async fn resolve_mounted(
        &self,
        ctx: &OpContext,
        logical_path: &str,
        required: Capability,
    ) -> Result<(Arc<dyn crate::driver::StorageDriver>, Mount, String)> {
        match self.manager.get_driver_by_path(&ctx.principal, logical_path).await? {
            ResolvedPath::Mounted { driver, mount, sub_path } => {
                capability::require(driver.capabilities(), required, driver.storage_type().as_str())?;
                Ok((driver, mount, sub_path))
            }
            ResolvedPath::Virtual { path, .. } => Err(EngineError::bad_request(format!(
                "path {path} is a virtual directory; the operation needs a mounted path"
            ))),
        }
    }

    fn require_write(ctx: &OpContext) -> Result<()> {
        if ctx.principal.can_write() {
            Ok(())
        } else {
            Err(EngineError::forbidden("principal does not have write permission"))
        }
    }

    /// List a directory, real or virtual.
    #[instrument(skip(self, ctx), fields(principal = %ctx.principal.identity()))]
    pub async fn list_directory(&self, ctx: &OpContext, logical_path: &str) -> Result<DirectoryListing> {
        let logical_path = path::normalize(logical_path, true)?;
        match self.manager.get_driver_by_path(&ctx.principal, &logical_path).await? {
            ResolvedPath::Mounted { driver, mount, sub_path } => {
                capability::require(
                    driver.capabilities(),
                    Capability::Reader,
                    driver.storage_type().as_str(),
                )?;
                let listing = driver.list_directory(ctx, &mount, &sub_path).await?;
                self.manager.registry().update_last_used(&mount.id);
                Ok(listing)
            }
            ResolvedPath::Virtual { path, mounts } => {
                Ok(self.manager.registry().virtual_listing(&path, &mounts))
            }
        }
    }

    /// Stat a file or directory.
    #[instrument(skip(self, ctx), fields(principal = %ctx.principal.identity()))]
    pub async fn file_info(&self, ctx: &OpContext, logical_path: &str) -> Result<FileInfo> {
        let normalized = path::normalize(logical_path, false)?;
        match self.manager.get_driver_by_path(&ctx.principal, &normalized).await? {
            ResolvedPath::Mounted { driver, mount, sub_path } => {
                capability::require(
                    driver.capabilities(),
                    Capability::Reader,
                    driver.storage_type().as_str(),
                )?;
                let info = driver.file_info(ctx, &mount, &sub_path).await?;
                self.manager.registry().update_last_used(&mount.id);
                Ok(info)
            }
            ResolvedPath::Virtual { path, .. } => Ok(FileInfo {
                name: path::basename(&path).to_string(),
                path,
                is_directory: true,
                size: None,
                modified: None,
                etag: None,
                mime_type: None,
            }),
        }
    }

    /// Stream a file for download (`attachment`) or preview (`inline`).
    #[instrument(skip(self, ctx), fields(principal = %ctx.principal.identity()))]
    pub async fn download(
        &self,
        ctx: &OpContext,
        logical_path: &str,
        disposition: Disposition,
    ) -> Result<FileDownload> {
        let logical_path = path::normalize(logical_path, false)?;
        let (driver, mount, sub_path) =
            self.resolve_mounted(ctx, &logical_path, Capability::Reader).await?;
        let download = driver.download(ctx, &mount, &sub_path, disposition).await?;
        self.manager.registry().update_last_used(&mount.id);
        Ok(download)
    }

    /// Upload a file.
    #[instrument(skip(self, ctx, data, opts), fields(principal = %ctx.principal.identity(), size = data.len()))]
    pub async fn upload(
        &self,
        ctx: &OpContext,
        logical_path: &str,
        data: Bytes,
        opts: UploadOptions,
    ) -> Result<UploadOutcome> {
        Self::require_write(ctx)?;
        let logical_path = path::normalize(logical_path, false)?;
        let (driver, mount, sub_path) =
            self.resolve_mounted(ctx, &logical_path, Capability::Writer).await?;
        let outcome = driver.upload(ctx, &mount, &sub_path, data, opts).await?;
        self.manager.registry().update_last_used(&mount.id);
        Ok(outcome)
    }

    /// Create a directory.
    #[instrument(skip(self, ctx), fields(principal = %ctx.principal.identity()))]
    pub async fn create_directory(&self, ctx: &OpContext, logical_path: &str) -> Result<()> {
        Self::require_write(ctx)?;
        let logical_path = path::normalize(logical_path, true)?;
        let (driver, mount, sub_path) =
            self.resolve_mounted(ctx, &logical_path, Capability::Writer).await?;
        driver.create_directory(ctx, &mount, &sub_path).await?;
        self.manager.registry().update_last_used(&mount.id);
        Ok(())
    }

    /// Rename a file or directory. Cross-mount renames are rejected.
    #[instrument(skip(self, ctx), fields(principal = %ctx.principal.identity()))]
    pub async fn rename(&self, ctx: &OpContext, old_path: &str, new_path: &str) -> Result<()> {
        Self::require_write(ctx)?;
        let old_is_dir = path::is_directory_ref(old_path);
        let old_path = path::normalize(old_path, old_is_dir)?;
        let new_path = path::normalize(new_path, old_is_dir)?;

        let (driver, mount, old_sub) =
            self.resolve_mounted(ctx, &old_path, Capability::Atomic).await?;
        let (_, new_mount, new_sub) =
            self.resolve_mounted(ctx, &new_path, Capability::Atomic).await?;
        if mount.id != new_mount.id {
            return Err(EngineError::bad_request("cannot rename across mounts"));
        }

        driver.rename(ctx, &mount, &old_sub, &new_sub).await?;
        self.manager.registry().update_last_used(&mount.id);
        Ok(())
    }

    /// Copy a file or directory.
    ///
    /// Within one storage configuration the copy is executed server-side.
    /// Across configurations the engine returns presigned hand-off URLs for
    /// the caller to execute.
    #[instrument(skip(self, ctx), fields(principal = %ctx.principal.identity()))]
    pub async fn copy(
        &self,
        ctx: &OpContext,
        source_path: &str,
        target_path: &str,
        skip_existing: bool,
    ) -> Result<CopyOutcome> {
        Self::require_write(ctx)?;
        let source_is_dir = path::is_directory_ref(source_path);
        let source_path = path::normalize(source_path, source_is_dir)?;
        // When the source is a directory, the destination is corrected to
        // directory form.
        let target_path = path::normalize(target_path, source_is_dir)?;

        let (source_driver, source_mount, source_sub) =
            self.resolve_mounted(ctx, &source_path, Capability::Atomic).await?;
        let (target_driver, target_mount, target_sub) =
            self.resolve_mounted(ctx, &target_path, Capability::Atomic).await?;

        if source_mount.storage_config_id == target_mount.storage_config_id {
            let stats = source_driver
                .copy(ctx, &source_mount, &source_sub, &target_sub, skip_existing)
                .await?;
            // The driver invalidates under the source mount; a copy landing
            // in a sibling mount of the same config needs its chain dropped
            // too.
            if target_mount.id != source_mount.id {
                self.manager
                    .dir_cache()
                    .invalidate_path_and_ancestors(&target_mount.id, &target_sub);
            }
            self.manager.registry().update_last_used(&source_mount.id);
            return Ok(CopyOutcome::Local(stats));
        }

        // Cross-storage: both ends must support presigning.
        capability::require(
            source_driver.capabilities(),
            Capability::Presigned,
            source_driver.storage_type().as_str(),
        )?;
        capability::require(
            target_driver.capabilities(),
            Capability::Presigned,
            target_driver.storage_type().as_str(),
        )?;
        if source_is_dir {
            return Err(EngineError::bad_request(
                "cross-storage directory copies must be issued per file",
            ));
        }

        let info = source_driver.file_info(ctx, &source_mount, &source_sub).await?;
        let get_url = source_driver
            .presigned_url(ctx, &source_mount, &source_sub, PresignOptions::default())
            .await?;
        let put_url = target_driver
            .presigned_url(
                ctx,
                &target_mount,
                &target_sub,
                PresignOptions { method: reqwest::Method::PUT, ..PresignOptions::default() },
            )
            .await?;

        Ok(CopyOutcome::CrossStorage(Box::new(CrossStorageCopy {
            source_path,
            target_path,
            presigned_get_url: get_url.url,
            target_presigned_put_url: put_url.url,
            metadata: CrossStorageMetadata {
                size: info.size,
                content_type: info.mime_type,
                etag: info.etag,
            },
        })))
    }

    /// Remove a file or directory subtree.
    #[instrument(skip(self, ctx), fields(principal = %ctx.principal.identity()))]
    pub async fn remove(&self, ctx: &OpContext, logical_path: &str) -> Result<()> {
        Self::require_write(ctx)?;
        let is_dir = path::is_directory_ref(logical_path);
        let logical_path = path::normalize(logical_path, is_dir)?;
        let (driver, mount, sub_path) =
            self.resolve_mounted(ctx, &logical_path, Capability::Writer).await?;
        driver.remove(ctx, &mount, &sub_path).await?;
        self.manager.registry().update_last_used(&mount.id);
        Ok(())
    }

    /// Remove many paths, grouping them by resolved mount so heterogeneous
    /// batches hit the right drivers. Per-path failures land in `failed`;
    /// the call itself only fails for empty input validation elsewhere.
    #[instrument(skip(self, ctx, paths), fields(principal = %ctx.principal.identity(), count = paths.len()))]
    pub async fn batch_remove(&self, ctx: &OpContext, paths: &[String]) -> Result<BatchRemoveResult> {
        Self::require_write(ctx)?;
        let mut result = BatchRemoveResult::default();
        // Preserve per-mount ordering while grouping.
        let mut groups: HashMap<String, (Mount, Arc<dyn crate::driver::StorageDriver>, Vec<String>)> =
            HashMap::new();

        for raw in paths {
            let is_dir = path::is_directory_ref(raw);
            let normalized = match path::normalize(raw, is_dir) {
                Ok(p) => p,
                Err(e) => {
                    result.failed.push(BatchFailure { path: raw.clone(), error: e.to_string() });
                    continue;
                }
            };
            match self.resolve_mounted(ctx, &normalized, Capability::Writer).await {
                Ok((driver, mount, sub_path)) => {
                    groups
                        .entry(mount.id.clone())
                        .or_insert_with(|| (mount, driver, Vec::new()))
                        .2
                        .push(sub_path);
                }
                Err(e) => {
                    result.failed.push(BatchFailure { path: raw.clone(), error: e.to_string() });
                }
            }
        }

        for (_, (mount, driver, sub_paths)) in groups {
            match driver.remove_batch(ctx, &mount, &sub_paths).await {
                Ok(batch) => {
                    result.success += batch.success;
                    result.failed.extend(batch.failed);
                    self.manager.registry().update_last_used(&mount.id);
                }
                Err(e) => {
                    for sub in sub_paths {
                        result.failed.push(BatchFailure {
                            path: path::join(&mount.mount_path, &sub),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }
        Ok(result)
    }

    /// Copy many items, aggregating local results and cross-storage
    /// hand-offs. `skip_existing` defaults to true at the API layer.
    #[instrument(skip(self, ctx, items), fields(principal = %ctx.principal.identity(), count = items.len()))]
    pub async fn batch_copy(
        &self,
        ctx: &OpContext,
        items: &[CopyItemRequest],
        skip_existing: bool,
    ) -> Result<BatchCopyResult> {
        Self::require_write(ctx)?;
        let mut result = BatchCopyResult::default();

        for item in items {
            // Auto-correct the destination to directory form when the
            // source is a directory.
            let target = if path::is_directory_ref(&item.source)
                && !path::is_directory_ref(&item.target)
            {
                format!("{}/", item.target)
            } else {
                item.target.clone()
            };

            match self.copy(ctx, &item.source, &target, skip_existing).await {
                Ok(CopyOutcome::Local(stats)) => {
                    result.success += stats.success;
                    result.skipped += stats.skipped;
                    result.failed += stats.failed;
                    let status = if stats.failed > 0 {
                        "failed"
                    } else if stats.success == 0 && stats.skipped > 0 {
                        "skipped"
                    } else {
                        "copied"
                    };
                    result.details.push(CopyDetail {
                        source: item.source.clone(),
                        target,
                        status: status.to_string(),
                        error: None,
                    });
                }
                Ok(CopyOutcome::CrossStorage(handoff)) => {
                    result.details.push(CopyDetail {
                        source: item.source.clone(),
                        target,
                        status: "cross-storage".to_string(),
                        error: None,
                    });
                    result.cross_storage_results.push(*handoff);
                }
                Err(e) => {
                    result.failed += 1;
                    result.details.push(CopyDetail {
                        source: item.source.clone(),
                        target,
                        status: "failed".to_string(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        Ok(result)
    }

    /// Generate a presigned URL for a file.
    #[instrument(skip(self, ctx, opts), fields(principal = %ctx.principal.identity()))]
    pub async fn presigned_url(
        &self,
        ctx: &OpContext,
        logical_path: &str,
        opts: PresignOptions,
    ) -> Result<PresignedUrl> {
        if path::is_directory_ref(logical_path) {
            return Err(EngineError::bad_request("cannot presign a directory reference"));
        }
        let logical_path = path::normalize(logical_path, false)?;
        let (driver, mount, sub_path) =
            self.resolve_mounted(ctx, &logical_path, Capability::Presigned).await?;
        let url = driver.presigned_url(ctx, &mount, &sub_path, opts).await?;
        self.manager.registry().update_last_used(&mount.id);
        Ok(url)
    }

    /// Initialize a multipart upload session.
    pub async fn multipart_init(
        &self,
        ctx: &OpContext,
        logical_path: &str,
        total_size: u64,
        part_size: Option<u64>,
        content_type: Option<&str>,
    ) -> Result<MultipartInit> {
        Self::require_write(ctx)?;
        let logical_path = path::normalize(logical_path, false)?;
        let (driver, mount, sub_path) =
            self.resolve_mounted(ctx, &logical_path, Capability::Multipart).await?;
        let init = driver
            .multipart_init(ctx, &mount, &sub_path, total_size, part_size, content_type)
            .await?;
        self.manager.registry().update_last_used(&mount.id);
        Ok(init)
    }

    /// Complete a multipart upload session.
    pub async fn multipart_complete(
        &self,
        ctx: &OpContext,
        logical_path: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<UploadOutcome> {
        Self::require_write(ctx)?;
        let logical_path = path::normalize(logical_path, false)?;
        let (driver, mount, sub_path) =
            self.resolve_mounted(ctx, &logical_path, Capability::Multipart).await?;
        let outcome = driver
            .multipart_complete(ctx, &mount, &sub_path, upload_id, parts)
            .await?;
        self.manager.registry().update_last_used(&mount.id);
        Ok(outcome)
    }

    /// Abort a multipart upload session.
    pub async fn multipart_abort(
        &self,
        ctx: &OpContext,
        logical_path: &str,
        upload_id: &str,
    ) -> Result<()> {
        Self::require_write(ctx)?;
        let logical_path = path::normalize(logical_path, false)?;
        let (driver, mount, sub_path) =
            self.resolve_mounted(ctx, &logical_path, Capability::Multipart).await?;
        driver.multipart_abort(ctx, &mount, &sub_path, upload_id).await
    }

    /// Discover in-flight multipart sessions under a path.
    pub async fn multipart_list_uploads(
        &self,
        ctx: &OpContext,
        logical_path: &str,
    ) -> Result<Vec<MultipartUploadInfo>> {
        let logical_path = path::normalize(logical_path, true)?;
        let (driver, mount, sub_path) =
            self.resolve_mounted(ctx, &logical_path, Capability::Multipart).await?;
        driver
            .multipart_list_uploads(ctx, &mount, Some(&sub_path))
            .await
    }

    /// List the uploaded parts of an in-flight session.
    pub async fn multipart_list_parts(
        &self,
        ctx: &OpContext,
        logical_path: &str,
        upload_id: &str,
    ) -> Result<Vec<MultipartPartInfo>> {
        let logical_path = path::normalize(logical_path, false)?;
        let (driver, mount, sub_path) =
            self.resolve_mounted(ctx, &logical_path, Capability::Multipart).await?;
        driver
            .multipart_list_parts(ctx, &mount, &sub_path, upload_id)
            .await
    }

    /// Re-presign part URLs for a resumable session.
    pub async fn multipart_refresh_urls(
        &self,
        ctx: &OpContext,
        logical_path: &str,
        upload_id: &str,
        part_numbers: &[u32],
    ) -> Result<Vec<PartUrl>> {
        Self::require_write(ctx)?;
        let logical_path = path::normalize(logical_path, false)?;
        let (driver, mount, sub_path) =
            self.resolve_mounted(ctx, &logical_path, Capability::Multipart).await?;
        driver
            .multipart_refresh_urls(ctx, &mount, &sub_path, upload_id, part_numbers)
            .await
    }

    /// Search file names across accessible mounts.
    #[instrument(skip(self, ctx, params), fields(principal = %ctx.principal.identity()))]
    pub async fn search(
        &self,
        ctx: &OpContext,
        query: &str,
        params: SearchParams,
    ) -> Result<SearchResults> {
        let query = query.trim();
        if query.chars().count() < 2 {
            return Err(EngineError::bad_request("search query must be at least 2 characters"));
        }
        if params.limit == 0 || params.limit > MAX_SEARCH_LIMIT {
            return Err(EngineError::bad_request(format!(
                "limit must be between 1 and {MAX_SEARCH_LIMIT}"
            )));
        }

        if let Some(hits) = self.search_cache.get(
            query,
            params.scope,
            params.scope_target.as_deref(),
            &ctx.principal,
        ) {
            return Ok(paginate(hits, params.offset, params.limit, true));
        }

        let mounts = self.search_targets(ctx, &params).await?;
        let directory_filter = match params.scope {
            SearchScope::Directory => params.scope_target.clone(),
            _ => None,
        };

        // All-settled fan-out: one mount failing never fails the search.
        let searches = mounts.into_iter().map(|mount| {
            let manager = Arc::clone(&self.manager);
            async move {
                let driver = manager.get_driver(&mount).await?;
                capability::require(
                    driver.capabilities(),
                    Capability::Reader,
                    driver.storage_type().as_str(),
                )?;
                driver.search(ctx, &mount, query, MAX_SEARCH_RESULTS).await
            }
        });

        let mut hits: Vec<SearchHit> = Vec::new();
        for outcome in join_all(searches).await {
            match outcome {
                Ok(mount_hits) => hits.extend(mount_hits),
                Err(e) => warn!(error = %e, "search failed for one mount"),
            }
        }

        if let Some(dir) = &directory_filter {
            let prefix = dir.trim_end_matches('/');
            hits.retain(|h| h.path.starts_with(&format!("{prefix}/")));
        }

        let needle = query.to_lowercase();
        hits.sort_by(|a, b| {
            relevance(&b.name, &b.path, &needle)
                .cmp(&relevance(&a.name, &a.path, &needle))
                .then(b.modified.cmp(&a.modified))
                .then(a.name.cmp(&b.name))
        });

        self.search_cache.set(
            query,
            params.scope,
            params.scope_target.as_deref(),
            &ctx.principal,
            hits.clone(),
        );
        Ok(paginate(hits, params.offset, params.limit, false))
    }

    /// The mounts a search should fan out to, per its scope.
    async fn search_targets(&self, ctx: &OpContext, params: &SearchParams) -> Result<Vec<Mount>> {
        let all = self
            .manager
            .registry()
            .list_for_principal(&ctx.principal)
            .await?;
        match params.scope {
            SearchScope::Global => Ok(all),
            SearchScope::Mount => {
                let target = params.scope_target.as_deref().ok_or_else(|| {
                    EngineError::bad_request("mount scope requires a mount id target")
                })?;
                let found: Vec<Mount> = all.into_iter().filter(|m| m.id == target).collect();
                if found.is_empty() {
                    return Err(EngineError::not_found(format!("mount {target}")));
                }
                Ok(found)
            }
            SearchScope::Directory => {
                let target = params.scope_target.as_deref().ok_or_else(|| {
                    EngineError::bad_request("directory scope requires a path target")
                })?;
                let normalized = path::normalize(target, true)?;
                match self.manager.get_driver_by_path(&ctx.principal, &normalized).await? {
                    ResolvedPath::Mounted { mount, .. } => Ok(vec![mount]),
                    ResolvedPath::Virtual { mounts, .. } => Ok(mounts),
                }
            }
        }
    }
}

/// Relevance tiers: exact filename > filename prefix > filename substring >
/// path substring.
fn relevance(name: &str, path: &str, needle: &str) -> u8 {
    let name = name.to_lowercase();
    if name == *needle {
        4
    } else if name.starts_with(needle) {
        3
    } else if name.contains(needle) {
        2
    } else if path.to_lowercase().contains(needle) {
        1
    } else {
        0
    }
}

fn paginate(hits: Vec<SearchHit>, offset: usize, limit: usize, cached: bool) -> SearchResults {
    let total = hits.len();
    let items: Vec<SearchHit> = hits.into_iter().skip(offset).take(limit).collect();
    SearchResults { total, offset, limit, items, cached }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn hit(name: &str, path: &str, modified_secs: i64) -> SearchHit {
        SearchHit {
            name: name.to_string(),
            path: path.to_string(),
            size: Some(1),
            modified: Some(Utc.timestamp_opt(modified_secs, 0).unwrap()),
            mount_id: "m1".into(),
        }
    }

    #[test]
    fn test_relevance_tiers() {
        assert_eq!(relevance("report.pdf", "/docs/report.pdf", "report.pdf"), 4);
        assert_eq!(relevance("report.pdf", "/docs/report.pdf", "report"), 3);
        assert_eq!(relevance("q3-report.pdf", "/docs/q3-report.pdf", "report"), 2);
        assert_eq!(relevance("summary.txt", "/reports/summary.txt", "report"), 1);
        assert_eq!(relevance("summary.txt", "/other/summary.txt", "report"), 0);
    }

    #[test]
    fn test_relevance_case_insensitive() {
        assert_eq!(relevance("Report.PDF", "/docs/Report.PDF", "report.pdf"), 4);
    }

    #[test]
    fn test_sort_order_by_relevance_then_recency() {
        let needle = "report";
        let mut hits = vec![
            hit("q3-report.pdf", "/a/q3-report.pdf", 100),
            hit("report", "/a/report", 50),
            hit("report-draft.md", "/a/report-draft.md", 300),
            hit("report-final.md", "/a/report-final.md", 200),
        ];
        hits.sort_by(|a, b| {
            relevance(&b.name, &b.path, needle)
                .cmp(&relevance(&a.name, &a.path, needle))
                .then(b.modified.cmp(&a.modified))
                .then(a.name.cmp(&b.name))
        });
        let names: Vec<&str> = hits.iter().map(|h| h.name.as_str()).collect();
        // Exact match first; then prefix matches newest-first; substring last.
        assert_eq!(
            names,
            vec!["report", "report-draft.md", "report-final.md", "q3-report.pdf"]
        );
    }

    #[test]
    fn test_paginate() {
        let hits: Vec<SearchHit> = (0..10)
            .map(|i| hit(&format!("f{i}"), &format!("/a/f{i}"), i))
            .collect();
        let page = paginate(hits, 4, 3, false);
        assert_eq!(page.total, 10);
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.items[0].name, "f4");
        assert!(!page.cached);
    }

    #[test]
    fn test_paginate_offset_past_end() {
        let page = paginate(vec![hit("a", "/a", 0)], 5, 10, true);
        assert_eq!(page.total, 1);
        assert!(page.items.is_empty());
        assert!(page.cached);
    }
}
