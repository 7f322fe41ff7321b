//! The mount manager: a driver pool keyed by storage configuration.
//!
//! Drivers are expensive to build (secret decryption, HTTP client setup),
//! so one driver is pooled per `(storage_type, config_id)` and shared by
//! every mount referencing that configuration. Construction happens under a
//! per-key async lock so concurrent first calls build exactly one driver.
//! Configuration changes evict the pooled driver; the next call rebuilds it
//! against the updated configuration.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::cache::DirectoryCache;
use crate::config::S3ConfigStore;
use crate::driver::StorageDriver;
use crate::error::Result;
use crate::model::{Mount, StorageType};
use crate::principal::Principal;
use crate::registry::{MountRegistry, Resolution};
use crate::repo::FileRecordRepository;
use crate::s3::{S3Client, S3Driver};

type PoolKey = (StorageType, String);

/// Pools storage drivers and resolves logical paths to them.
pub struct MountManager {
    registry: MountRegistry,
    configs: Arc<S3ConfigStore>,
    dir_cache: Arc<DirectoryCache>,
    file_records: Arc<dyn FileRecordRepository>,
    pool: DashMap<PoolKey, Arc<dyn StorageDriver>>,
    build_locks: DashMap<PoolKey, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for MountManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountManager")
            .field("pooled_drivers", &self.pool.len())
            .finish_non_exhaustive()
    }
}

/// What a logical path resolves to: a driver-backed mount or a virtual
/// ancestor directory.
pub enum ResolvedPath {
    /// The path lives under a mount; the driver is ready to use.
    Mounted {
        /// The pooled driver for the mount's configuration.
        driver: Arc<dyn StorageDriver>,
        /// The winning mount.
        mount: Mount,
        /// Mount-relative sub-path.
        sub_path: String,
    },
    /// The path is an ancestor of one or more mounts.
    Virtual {
        /// The queried path, in directory form.
        path: String,
        /// Mounts below the path.
        mounts: Vec<Mount>,
    },
}

impl MountManager {
    /// Build a manager over its collaborators.
    pub fn new(
        registry: MountRegistry,
        configs: Arc<S3ConfigStore>,
        dir_cache: Arc<DirectoryCache>,
        file_records: Arc<dyn FileRecordRepository>,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            registry,
            configs,
            dir_cache,
            file_records,
            pool: DashMap::new(),
            build_locks: DashMap::new(),
        });

        // Config changes tear down the pooled driver so the next call
        // re-reads the configuration.
        let weak = Arc::downgrade(&manager);
        manager.configs.subscribe(Box::new(move |config_id| {
            if let Some(manager) = weak.upgrade() {
                manager.clear_config_cache(StorageType::S3, config_id);
            }
        }));
        manager
    }

    /// The mount registry.
    pub fn registry(&self) -> &MountRegistry {
        &self.registry
    }

    /// The shared directory cache.
    pub fn dir_cache(&self) -> &Arc<DirectoryCache> {
        &self.dir_cache
    }

    /// Fetch or build the driver for a mount.
    #[instrument(skip(self, mount), fields(mount_id = %mount.id, config_id = %mount.storage_config_id))]
    pub async fn get_driver(&self, mount: &Mount) -> Result<Arc<dyn StorageDriver>> {
        let key: PoolKey = (mount.storage_type, mount.storage_config_id.clone());
        if let Some(driver) = self.pool.get(&key) {
            return Ok(Arc::clone(driver.value()));
        }

        // One builder per key; losers of the race reuse the winner's driver.
        let lock = Arc::clone(
            self.build_locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let _guard = lock.lock().await;

        if let Some(driver) = self.pool.get(&key) {
            return Ok(Arc::clone(driver.value()));
        }

        let config = self.configs.get(&mount.storage_config_id).await?;
        let secret = self.configs.decrypt_secret(&config)?;
        let client = S3Client::new(config, secret)?;
        let driver: Arc<dyn StorageDriver> = Arc::new(S3Driver::new(
            client,
            Arc::clone(&self.dir_cache),
            Arc::clone(&self.file_records),
        ));
        debug!(config_id = %mount.storage_config_id, "built storage driver");
        self.pool.insert(key, Arc::clone(&driver));
        Ok(driver)
    }

    /// Resolve a logical path to a driver, mount, and sub-path (or a
    /// virtual listing).
    pub async fn get_driver_by_path(
        &self,
        principal: &Principal,
        logical_path: &str,
    ) -> Result<ResolvedPath> {
        match self.registry.resolve(principal, logical_path).await? {
            Resolution::Mounted { mount, sub_path } => {
                let driver = self.get_driver(&mount).await?;
                Ok(ResolvedPath::Mounted { driver, mount, sub_path })
            }
            Resolution::Virtual { path, mounts } => Ok(ResolvedPath::Virtual { path, mounts }),
        }
    }

    /// Tear down the pooled driver for a configuration and drop its cached
    /// listings.
    pub fn clear_config_cache(&self, storage_type: StorageType, config_id: &str) {
        let key: PoolKey = (storage_type, config_id.to_string());
        if self.pool.remove(&key).is_some() {
            debug!(config_id, "evicted pooled driver");
        }
        self.build_locks.remove(&key);
    }

    /// Number of pooled drivers. Test observability.
    pub fn pooled_driver_count(&self) -> usize {
        self.pool.len()
    }
}
