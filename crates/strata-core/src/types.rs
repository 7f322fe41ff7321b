//! Value types exchanged between the facade, drivers, and protocol adapters.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};
use crate::model::StorageType;
use crate::principal::Principal;

/// Default per-operation timeout for control-plane calls.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-operation context carried through every engine call.
///
/// The cancellation token is propagated to outbound I/O; drivers check it
/// before provider calls and skip cache mutations once it fires. Streaming
/// downloads ignore the timeout (the body transfer is unbounded).
#[derive(Debug, Clone)]
pub struct OpContext {
    /// The authenticated caller.
    pub principal: Principal,
    /// Cancellation signal for this operation.
    pub cancel: CancellationToken,
    /// Control-plane timeout. `None` means unbounded.
    pub timeout: Option<Duration>,
}

impl OpContext {
    /// Context with the default control-plane timeout.
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            cancel: CancellationToken::new(),
            timeout: Some(DEFAULT_OP_TIMEOUT),
        }
    }

    /// Fail with [`EngineError::Cancelled`] if the token has fired.
    pub fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// One entry in a directory listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingItem {
    /// Entry name, no slashes.
    pub name: String,
    /// Full logical path; directories end with `/`.
    pub path: String,
    /// True for directories.
    pub is_directory: bool,
    /// Size in bytes; absent for directories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Last-modified timestamp, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    /// Quote-stripped ETag, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// The mount this entry belongs to, when resolvable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_id: Option<String>,
    /// True when the entry is itself a mount point.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_mount: bool,
    /// True when the entry was synthesized from the mount table rather than
    /// observed in storage.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_virtual: bool,
}

/// A directory listing, real or synthesized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryListing {
    /// The listed logical path, in directory form.
    pub path: String,
    /// True when synthesized from the mount table.
    pub is_virtual: bool,
    /// True for the namespace root.
    pub is_root: bool,
    /// The backing mount, for real listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_id: Option<String>,
    /// The backing storage type, for real listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_type: Option<StorageType>,
    /// Entries, directories first, both groups lexicographic.
    pub items: Vec<ListingItem>,
}

/// Metadata for a single file or directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// Full logical path.
    pub path: String,
    /// Entry name.
    pub name: String,
    /// True for directories.
    pub is_directory: bool,
    /// Size in bytes; absent for directories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Last-modified timestamp, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    /// Quote-stripped ETag, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Content type, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// How a download response asks the client to present the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Render in place (`preview`).
    Inline,
    /// Save to disk (`download`).
    Attachment,
}

/// A stream of body chunks from the provider.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + 'static>>;

/// A streaming download response.
///
/// Ownership of the body transfers to the protocol layer; every exit path
/// must either consume or drop it, which releases the connection.
pub struct FileDownload {
    /// File name for the disposition header.
    pub file_name: String,
    /// Content type from the provider.
    pub content_type: String,
    /// Body length, when the provider declared one.
    pub content_length: Option<u64>,
    /// Last-modified timestamp, when known.
    pub last_modified: Option<DateTime<Utc>>,
    /// Quote-stripped ETag, when known.
    pub etag: Option<String>,
    /// Presentation hint.
    pub disposition: Disposition,
    /// The body stream.
    pub body: ByteStream,
}

impl std::fmt::Debug for FileDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDownload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("disposition", &self.disposition)
            .finish_non_exhaustive()
    }
}

/// Options for a single-shot upload.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Content type supplied by the caller; merged with the filename guess.
    pub content_type: Option<String>,
}

/// Result of a successful upload (single-shot or completed multipart).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    /// Whether the caller should switch to the multipart protocol instead.
    pub use_multipart: bool,
    /// Provider upload id, for multipart hand-off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    /// Final logical path.
    pub path: String,
    /// Object size in bytes.
    pub size: u64,
    /// Quote-stripped ETag, when the provider returned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Id of the recorded file row.
    pub file_id: String,
    /// Shareable slug of the recorded file row.
    pub slug: String,
}

/// Counters for a local (same-config) copy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyStats {
    /// Objects copied.
    pub success: u64,
    /// Objects skipped because the destination existed.
    pub skipped: u64,
    /// Objects that failed to copy.
    pub failed: u64,
}

/// Hand-off data for a copy that crosses storage configurations.
///
/// The engine cannot stream between two providers itself; it returns
/// presigned endpoints for the caller (front end or worker) to execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossStorageCopy {
    /// Source logical path.
    pub source_path: String,
    /// Destination logical path.
    pub target_path: String,
    /// Presigned GET on the source object.
    pub presigned_get_url: String,
    /// Presigned PUT on the destination object.
    pub target_presigned_put_url: String,
    /// Source object metadata the executor needs.
    pub metadata: CrossStorageMetadata,
}

/// Metadata accompanying a cross-storage hand-off.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossStorageMetadata {
    /// Object size in bytes, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Content type, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Source ETag, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

/// Result of a copy: either executed locally or handed off.
#[derive(Debug, Clone)]
pub enum CopyOutcome {
    /// Copied server-side within one storage configuration.
    Local(CopyStats),
    /// Crosses configurations; the caller executes the transfer.
    CrossStorage(Box<CrossStorageCopy>),
}

/// One failed path in a batch operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    /// The path that failed.
    pub path: String,
    /// Human-readable error.
    pub error: String,
}

/// Aggregate result of a batch remove.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRemoveResult {
    /// Paths removed.
    pub success: u64,
    /// Paths that failed, with reasons.
    pub failed: Vec<BatchFailure>,
}

/// One source/target pair for a batch copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyItemRequest {
    /// Source logical path.
    pub source: String,
    /// Target logical path.
    pub target: String,
}

/// Per-item detail in a batch copy result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyDetail {
    /// Source logical path.
    pub source: String,
    /// Target logical path after any directory-form correction.
    pub target: String,
    /// `copied`, `skipped`, `cross-storage`, or `failed`.
    pub status: String,
    /// Error text for failed items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate result of a batch copy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCopyResult {
    /// Items copied locally.
    pub success: u64,
    /// Items skipped because the destination existed.
    pub skipped: u64,
    /// Items that failed.
    pub failed: u64,
    /// Per-item outcomes.
    pub details: Vec<CopyDetail>,
    /// Hand-offs for copies that crossed storage configurations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cross_storage_results: Vec<CrossStorageCopy>,
}

/// Options for presigned URL generation.
#[derive(Debug, Clone)]
pub struct PresignOptions {
    /// HTTP method the URL authorizes. Defaults to GET.
    pub method: reqwest::Method,
    /// URL lifetime in seconds. Defaults to seven days.
    pub expires_in: u64,
    /// Attach a `response-content-disposition` forcing download.
    pub force_download: bool,
}

/// Default presigned URL lifetime: seven days.
pub const DEFAULT_PRESIGN_EXPIRY_SECS: u64 = 604_800;

impl Default for PresignOptions {
    fn default() -> Self {
        Self {
            method: reqwest::Method::GET,
            expires_in: DEFAULT_PRESIGN_EXPIRY_SECS,
            force_download: false,
        }
    }
}

/// A generated presigned URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUrl {
    /// The signed URL.
    pub url: String,
    /// Method it authorizes.
    pub method: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

/// Default multipart part size: 5 MiB, the provider minimum.
pub const DEFAULT_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Lifetime of presigned part-upload URLs: one hour.
pub const PART_URL_EXPIRY_SECS: u64 = 3_600;

/// A presigned PUT URL for one part.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartUrl {
    /// 1-based part number.
    pub part_number: u32,
    /// Presigned PUT URL for this part.
    pub url: String,
}

/// An initialized multipart session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartInit {
    /// Provider upload id.
    pub upload_id: String,
    /// Final object key.
    pub key: String,
    /// Final logical path.
    pub path: String,
    /// Part size in bytes.
    pub part_size: u64,
    /// Number of parts the caller should upload.
    pub part_count: u32,
    /// One presigned PUT URL per part.
    pub part_urls: Vec<PartUrl>,
    /// Session creation time.
    pub created_at: DateTime<Utc>,
    /// Ownership tag of the initiating principal.
    pub owner: String,
}

/// A part reported back on completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    /// 1-based part number.
    pub part_number: u32,
    /// ETag the provider returned for the part upload.
    pub etag: String,
}

/// An in-flight multipart upload discovered at the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartUploadInfo {
    /// Provider upload id.
    pub upload_id: String,
    /// Object key being assembled.
    pub key: String,
    /// When the provider says the session was initiated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiated: Option<DateTime<Utc>>,
}

/// One uploaded part of an in-flight session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartPartInfo {
    /// 1-based part number.
    pub part_number: u32,
    /// Part size in bytes.
    pub size: u64,
    /// Part ETag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// When the part was uploaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// Search scope selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    /// Every mount the principal can access.
    Global,
    /// One mount.
    Mount,
    /// One directory subtree.
    Directory,
}

impl SearchScope {
    /// Name used in cache keys.
    pub fn as_str(self) -> &'static str {
        match self {
            SearchScope::Global => "global",
            SearchScope::Mount => "mount",
            SearchScope::Directory => "directory",
        }
    }
}

/// Validated search parameters.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Scope selector.
    pub scope: SearchScope,
    /// Mount id or directory path, depending on scope.
    pub scope_target: Option<String>,
    /// Page size, 1..=200.
    pub limit: usize,
    /// Page offset.
    pub offset: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            scope: SearchScope::Global,
            scope_target: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// One search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// File name.
    pub name: String,
    /// Full logical path.
    pub path: String,
    /// Size in bytes, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Last-modified timestamp, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    /// The mount the hit lives under.
    pub mount_id: String,
}

/// A merged, scored, paginated search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    /// Total hits before pagination.
    pub total: usize,
    /// Page offset.
    pub offset: usize,
    /// Page size.
    pub limit: usize,
    /// The page of hits.
    pub items: Vec<SearchHit>,
    /// True when served from the search cache.
    pub cached: bool,
}
