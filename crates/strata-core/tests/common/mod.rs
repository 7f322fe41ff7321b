//! Shared test harness: fake S3 plus a fully wired engine.

pub mod fake_s3;

use std::sync::Arc;

use strata_core::cache::{DirectoryCache, SearchCache};
use strata_core::config::S3ConfigStore;
use strata_core::fs::FileSystem;
use strata_core::manager::MountManager;
use strata_core::model::{Mount, S3Config, SignatureVersion};
use strata_core::principal::Principal;
use strata_core::registry::MountRegistry;
use strata_core::repo::{
    InMemoryConfigRepository, InMemoryFileRecordRepository, InMemoryMountRepository,
    MountRepository,
};
use strata_core::secret::{SecretCipher, MASTER_KEY_LEN};
use strata_core::types::OpContext;

use fake_s3::FakeS3;

/// A wired engine against a fake S3, with handles for assertions.
pub struct TestEngine {
    pub fs: FileSystem,
    pub ctx: OpContext,
    pub mount_id: String,
    pub mounts: Arc<InMemoryMountRepository>,
    pub file_records: Arc<InMemoryFileRecordRepository>,
    pub dir_cache: Arc<DirectoryCache>,
    pub configs: Arc<S3ConfigStore>,
}

fn s3_config(id: &str, endpoint: &str, bucket: &str, root_prefix: &str) -> S3Config {
    let now = chrono::Utc::now();
    S3Config {
        id: id.to_string(),
        name: format!("{bucket} at {endpoint}"),
        endpoint: endpoint.to_string(),
        region: "us-east-1".to_string(),
        bucket: bucket.to_string(),
        access_key_id: "test-access-key".to_string(),
        encrypted_secret_key: String::new(),
        path_style: true,
        root_prefix: root_prefix.to_string(),
        default_folder: String::new(),
        provider_type: "Fake".to_string(),
        signature_version: SignatureVersion::V4,
        created_at: now,
        updated_at: now,
    }
}

/// Build an engine with one mount `/docs` → `b/root/` on the fake server.
pub async fn engine_with_docs_mount(fake: &FakeS3) -> TestEngine {
    engine_with_mounts(fake, &[("c1", "b", "root", "/docs", 60)]).await
}

/// Build an engine with the given `(config_id, bucket, root_prefix,
/// mount_path, cache_ttl)` tuples, all owned by admin `1`.
pub async fn engine_with_mounts(
    fake: &FakeS3,
    specs: &[(&str, &str, &str, &str, u64)],
) -> TestEngine {
    let mount_repo = Arc::new(InMemoryMountRepository::new());
    let config_repo = Arc::new(InMemoryConfigRepository::new());
    let file_records = Arc::new(InMemoryFileRecordRepository::new());
    let cipher = SecretCipher::new(&[9u8; MASTER_KEY_LEN]).unwrap();
    let configs = Arc::new(S3ConfigStore::new(config_repo, cipher));

    let mut first_mount_id = String::new();
    for (config_id, bucket, root_prefix, mount_path, ttl) in specs {
        configs
            .create(
                s3_config(config_id, &fake.endpoint(), bucket, root_prefix),
                "test-secret-key",
            )
            .await
            .unwrap();
        let mount = Mount::new("1", mount_path.trim_matches('/'), *mount_path, *config_id, *ttl);
        if first_mount_id.is_empty() {
            first_mount_id = mount.id.clone();
        }
        mount_repo.insert(mount).await.unwrap();
    }

    let registry = MountRegistry::new(mount_repo.clone() as Arc<dyn MountRepository>);
    let dir_cache = Arc::new(DirectoryCache::new());
    let manager = MountManager::new(
        registry,
        Arc::clone(&configs),
        Arc::clone(&dir_cache),
        file_records.clone(),
    );
    let fs = FileSystem::new(manager, Arc::new(SearchCache::default()));

    TestEngine {
        fs,
        ctx: OpContext::new(Principal::admin("1")),
        mount_id: first_mount_id,
        mounts: mount_repo,
        file_records,
        dir_cache,
        configs,
    }
}
