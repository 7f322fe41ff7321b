//! Repository interfaces over the external relational store.
//!
//! The engine never talks SQL; it sees three narrow repository traits. The
//! in-memory implementations back the development server and the test
//! suites, and define the semantics a database-backed implementation must
//! match.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::{EngineError, Result};
use crate::model::{FileRecord, Mount, S3Config};

/// Persistence for mounts.
#[async_trait]
pub trait MountRepository: Send + Sync {
    /// Every mount, active or not.
    async fn list_all(&self) -> Result<Vec<Mount>>;

    /// Mounts owned by one admin user.
    async fn list_for_owner(&self, owner_user_id: &str) -> Result<Vec<Mount>>;

    /// Fetch one mount.
    async fn get(&self, id: &str) -> Result<Option<Mount>>;

    /// Insert a new mount.
    async fn insert(&self, mount: Mount) -> Result<()>;

    /// Replace an existing mount.
    async fn update(&self, mount: Mount) -> Result<()>;

    /// Delete a mount.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Best-effort bump of `last_used_at`. Must never block the data path;
    /// callers invoke it from a detached task and swallow failures.
    async fn touch_last_used(&self, id: &str, when: DateTime<Utc>) -> Result<()>;
}

/// Persistence for S3 configurations.
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    /// Every configuration.
    async fn list_all(&self) -> Result<Vec<S3Config>>;

    /// Fetch one configuration.
    async fn get(&self, id: &str) -> Result<Option<S3Config>>;

    /// Insert a new configuration.
    async fn insert(&self, config: S3Config) -> Result<()>;

    /// Replace an existing configuration.
    async fn update(&self, config: S3Config) -> Result<()>;

    /// Delete a configuration.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Persistence for file records created on upload.
#[async_trait]
pub trait FileRecordRepository: Send + Sync {
    /// Insert a record.
    async fn insert(&self, record: FileRecord) -> Result<()>;

    /// Fetch by slug.
    async fn get_by_slug(&self, slug: &str) -> Result<Option<FileRecord>>;

    /// Delete every record under a storage path (exact file key, or prefix
    /// for directory removals). Returns the number deleted.
    async fn delete_by_storage_path(&self, s3_config_id: &str, storage_path: &str) -> Result<usize>;
}

/// DashMap-backed [`MountRepository`].
#[derive(Debug, Default)]
pub struct InMemoryMountRepository {
    mounts: DashMap<String, Mount>,
}

impl InMemoryMountRepository {
    /// Empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MountRepository for InMemoryMountRepository {
    async fn list_all(&self) -> Result<Vec<Mount>> {
        let mut out: Vec<Mount> = self.mounts.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.name.cmp(&b.name)));
        Ok(out)
    }

    async fn list_for_owner(&self, owner_user_id: &str) -> Result<Vec<Mount>> {
        let mut out: Vec<Mount> = self
            .mounts
            .iter()
            .filter(|e| e.value().owner_user_id == owner_user_id)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.name.cmp(&b.name)));
        Ok(out)
    }

    async fn get(&self, id: &str) -> Result<Option<Mount>> {
        Ok(self.mounts.get(id).map(|e| e.value().clone()))
    }

    async fn insert(&self, mount: Mount) -> Result<()> {
        self.mounts.insert(mount.id.clone(), mount);
        Ok(())
    }

    async fn update(&self, mount: Mount) -> Result<()> {
        if !self.mounts.contains_key(&mount.id) {
            return Err(EngineError::not_found(format!("mount {}", mount.id)));
        }
        self.mounts.insert(mount.id.clone(), mount);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.mounts.remove(id);
        Ok(())
    }

    async fn touch_last_used(&self, id: &str, when: DateTime<Utc>) -> Result<()> {
        if let Some(mut entry) = self.mounts.get_mut(id) {
            entry.last_used_at = Some(when);
        }
        Ok(())
    }
}

/// DashMap-backed [`ConfigRepository`].
#[derive(Debug, Default)]
pub struct InMemoryConfigRepository {
    configs: DashMap<String, S3Config>,
}

impl InMemoryConfigRepository {
    /// Empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigRepository for InMemoryConfigRepository {
    async fn list_all(&self) -> Result<Vec<S3Config>> {
        Ok(self.configs.iter().map(|e| e.value().clone()).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<S3Config>> {
        Ok(self.configs.get(id).map(|e| e.value().clone()))
    }

    async fn insert(&self, config: S3Config) -> Result<()> {
        self.configs.insert(config.id.clone(), config);
        Ok(())
    }

    async fn update(&self, config: S3Config) -> Result<()> {
        if !self.configs.contains_key(&config.id) {
            return Err(EngineError::not_found(format!("s3 config {}", config.id)));
        }
        self.configs.insert(config.id.clone(), config);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.configs.remove(id);
        Ok(())
    }
}

/// DashMap-backed [`FileRecordRepository`].
#[derive(Debug, Default)]
pub struct InMemoryFileRecordRepository {
    records: DashMap<String, FileRecord>,
}

impl InMemoryFileRecordRepository {
    /// Empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records. Test observability.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl FileRecordRepository for InMemoryFileRecordRepository {
    async fn insert(&self, record: FileRecord) -> Result<()> {
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<FileRecord>> {
        Ok(self
            .records
            .iter()
            .find(|e| e.value().slug == slug)
            .map(|e| e.value().clone()))
    }

    async fn delete_by_storage_path(&self, s3_config_id: &str, storage_path: &str) -> Result<usize> {
        let before = self.records.len();
        self.records.retain(|_, r| {
            !(r.s3_config_id == s3_config_id
                && (r.storage_path == storage_path
                    || (storage_path.ends_with('/') && r.storage_path.starts_with(storage_path))))
        });
        Ok(before.saturating_sub(self.records.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileRecord;
    use uuid::Uuid;

    fn record(key: &str) -> FileRecord {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        FileRecord {
            slug: FileRecord::slug_for(&id),
            id,
            filename: "x.txt".into(),
            storage_path: key.into(),
            s3_url: format!("http://localhost/b/{key}"),
            mimetype: "text/plain".into(),
            size: 2,
            s3_config_id: "c1".into(),
            etag: None,
            created_by: "admin:1".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_mount_crud() {
        let repo = InMemoryMountRepository::new();
        let mount = Mount::new("1", "docs", "/docs", "c1", 60);
        let id = mount.id.clone();
        repo.insert(mount).await.unwrap();

        assert!(repo.get(&id).await.unwrap().is_some());
        assert_eq!(repo.list_for_owner("1").await.unwrap().len(), 1);
        assert!(repo.list_for_owner("2").await.unwrap().is_empty());

        repo.delete(&id).await.unwrap();
        assert!(repo.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_touch_last_used_missing_mount_is_silent() {
        let repo = InMemoryMountRepository::new();
        // Best-effort contract: no error for an unknown id.
        assert!(repo.touch_last_used("nope", Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn test_file_record_delete_by_prefix() {
        let repo = InMemoryFileRecordRepository::new();
        repo.insert(record("root/a/x.txt")).await.unwrap();
        repo.insert(record("root/a/y.txt")).await.unwrap();
        repo.insert(record("root/b/z.txt")).await.unwrap();

        let deleted = repo.delete_by_storage_path("c1", "root/a/").await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(repo.len(), 1);

        let deleted = repo.delete_by_storage_path("c1", "root/b/z.txt").await.unwrap();
        assert_eq!(deleted, 1);
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_file_record_slug_lookup() {
        let repo = InMemoryFileRecordRepository::new();
        let rec = record("root/a/x.txt");
        let slug = rec.slug.clone();
        repo.insert(rec).await.unwrap();
        assert!(repo.get_by_slug(&slug).await.unwrap().is_some());
        assert!(repo.get_by_slug("M-zzzzz").await.unwrap().is_none());
    }
}
