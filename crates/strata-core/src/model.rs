//! Persisted entity models: mounts, storage configurations, file records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Backing storage kind for a mount.
///
/// Only S3-compatible stores are implemented; the enum exists so the driver
/// pool key and the capability error messages stay honest if another kind is
/// ever added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// An S3-compatible object store.
    S3,
}

impl StorageType {
    /// Lower-case name used in pool keys and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            StorageType::S3 => "s3",
        }
    }
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which signing algorithm a provider expects.
///
/// Everything current speaks V4; V2 remains representable for legacy
/// configurations but the client refuses to sign with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignatureVersion {
    /// Legacy AWS signature version 2.
    V2,
    /// AWS signature version 4.
    #[default]
    V4,
}

/// A binding of a logical path prefix to a storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mount {
    /// Unique id.
    pub id: String,
    /// Owning admin user id.
    pub owner_user_id: String,
    /// Display name.
    pub name: String,
    /// Absolute logical prefix, without a trailing slash (except `/`).
    pub mount_path: String,
    /// Backing storage kind.
    pub storage_type: StorageType,
    /// Storage configuration this mount resolves through.
    pub storage_config_id: String,
    /// Directory cache TTL for this mount, in seconds. Zero disables caching.
    pub cache_ttl_seconds: u64,
    /// Ordering hint for listings of mount points.
    pub sort_order: i32,
    /// Only active mounts participate in resolution.
    pub is_active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
    /// Last successful driver call through this mount, best-effort.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Mount {
    /// Create an active mount with fresh timestamps.
    pub fn new(
        owner_user_id: impl Into<String>,
        name: impl Into<String>,
        mount_path: impl Into<String>,
        storage_config_id: impl Into<String>,
        cache_ttl_seconds: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            owner_user_id: owner_user_id.into(),
            name: name.into(),
            mount_path: mount_path.into(),
            storage_type: StorageType::S3,
            storage_config_id: storage_config_id.into(),
            cache_ttl_seconds,
            sort_order: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_used_at: None,
        }
    }
}

/// An S3 endpoint configuration.
///
/// The secret key is stored encrypted; [`crate::config::S3ConfigStore`]
/// decrypts it only when constructing a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// Unique id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Endpoint URL, e.g. `https://s3.amazonaws.com` or a MinIO address.
    pub endpoint: String,
    /// Signing region.
    pub region: String,
    /// Bucket name.
    pub bucket: String,
    /// Access key id.
    pub access_key_id: String,
    /// AES-256-GCM encrypted secret key, base64.
    pub encrypted_secret_key: String,
    /// Path-style (`endpoint/bucket/key`) vs virtual-hosted addressing.
    pub path_style: bool,
    /// Key prefix applied before everything else. May be empty.
    #[serde(default)]
    pub root_prefix: String,
    /// Additional folder under the root prefix. May be empty.
    #[serde(default)]
    pub default_folder: String,
    /// Free-form provider label (`AWS`, `MinIO`, `R2`, ...), informational.
    #[serde(default)]
    pub provider_type: String,
    /// Signing algorithm the provider expects.
    #[serde(default)]
    pub signature_version: SignatureVersion,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl S3Config {
    /// The effective key prefix: `root_prefix + default_folder`, each
    /// non-empty component normalized to end in `/`, with no leading slash.
    pub fn key_prefix(&self) -> String {
        let mut prefix = String::new();
        for part in [&self.root_prefix, &self.default_folder] {
            let trimmed = part.trim_matches('/');
            if !trimmed.is_empty() {
                prefix.push_str(trimmed);
                prefix.push('/');
            }
        }
        prefix
    }

    /// Map a sub-path (leading `/`, optional trailing `/`) to an object key.
    ///
    /// Directory references keep their trailing slash so the result can be
    /// used directly as a listing prefix or marker key.
    pub fn object_key(&self, sub_path: &str) -> String {
        format!("{}{}", self.key_prefix(), sub_path.trim_start_matches('/'))
    }
}

/// A row recorded in the external `files` table on every upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Unique id.
    pub id: String,
    /// Original file name.
    pub filename: String,
    /// Object key inside the bucket.
    pub storage_path: String,
    /// Canonical object URL.
    pub s3_url: String,
    /// Content type.
    pub mimetype: String,
    /// Object size in bytes.
    pub size: u64,
    /// The configuration the object lives under.
    pub s3_config_id: String,
    /// Short shareable slug, `M-` followed by the first five id characters.
    pub slug: String,
    /// Quote-stripped ETag, when the provider returned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Ownership tag: `admin:<id>` or `apikey:<id>`.
    pub created_by: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    /// Derive the slug for a record id.
    pub fn slug_for(id: &str) -> String {
        let head: String = id.chars().filter(|c| *c != '-').take(5).collect();
        format!("M-{head}")
    }
}
