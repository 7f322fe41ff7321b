//! Storage configuration store with credential decryption.
//!
//! Wraps the [`ConfigRepository`] with the process-wide [`SecretCipher`]
//! and a change-notification hook: whenever a configuration is updated or
//! deleted, downstream driver pools are told to drop their cached clients
//! so the next call re-reads the (possibly changed) configuration.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::error::{EngineError, Result};
use crate::model::S3Config;
use crate::repo::ConfigRepository;
use crate::secret::SecretCipher;

/// Callback invoked with a config id when that configuration changes.
pub type ConfigChangedHook = Box<dyn Fn(&str) + Send + Sync>;

/// CRUD over S3 configurations plus secret decryption.
pub struct S3ConfigStore {
    repo: Arc<dyn ConfigRepository>,
    cipher: SecretCipher,
    hooks: RwLock<Vec<ConfigChangedHook>>,
}

impl std::fmt::Debug for S3ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ConfigStore")
            .field("hooks", &self.hooks.read().len())
            .finish_non_exhaustive()
    }
}

impl S3ConfigStore {
    /// Build a store over a repository and cipher.
    pub fn new(repo: Arc<dyn ConfigRepository>, cipher: SecretCipher) -> Self {
        Self {
            repo,
            cipher,
            hooks: RwLock::new(Vec::new()),
        }
    }

    /// Register a hook fired on every config update or deletion.
    pub fn subscribe(&self, hook: ConfigChangedHook) {
        self.hooks.write().push(hook);
    }

    /// Fetch a configuration, failing with `NotFound` when absent.
    pub async fn get(&self, id: &str) -> Result<S3Config> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("s3 config {id}")))
    }

    /// Every configuration.
    pub async fn list(&self) -> Result<Vec<S3Config>> {
        self.repo.list_all().await
    }

    /// Insert a configuration, encrypting the supplied plaintext secret.
    #[instrument(skip(self, config, plaintext_secret), fields(config_id = %config.id))]
    pub async fn create(&self, mut config: S3Config, plaintext_secret: &str) -> Result<S3Config> {
        config.encrypted_secret_key = self.cipher.encrypt(plaintext_secret)?;
        config.created_at = Utc::now();
        config.updated_at = config.created_at;
        self.repo.insert(config.clone()).await?;
        Ok(config)
    }

    /// Replace a configuration. Pass a new plaintext secret to rotate the
    /// credential, or `None` to keep the stored one.
    #[instrument(skip(self, config, plaintext_secret), fields(config_id = %config.id))]
    pub async fn update(&self, mut config: S3Config, plaintext_secret: Option<&str>) -> Result<S3Config> {
        if let Some(secret) = plaintext_secret {
            config.encrypted_secret_key = self.cipher.encrypt(secret)?;
        } else {
            let existing = self.get(&config.id).await?;
            config.encrypted_secret_key = existing.encrypted_secret_key;
        }
        config.updated_at = Utc::now();
        self.repo.update(config.clone()).await?;
        self.on_config_changed(&config.id);
        Ok(config)
    }

    /// Delete a configuration.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.repo.delete(id).await?;
        self.on_config_changed(id);
        Ok(())
    }

    /// Decrypt the secret key of a configuration. Called only when
    /// constructing a client; the result is zeroized on drop.
    pub fn decrypt_secret(&self, config: &S3Config) -> Result<Zeroizing<String>> {
        self.cipher.decrypt(&config.encrypted_secret_key)
    }

    /// Notify subscribers that a configuration changed shape.
    pub fn on_config_changed(&self, id: &str) {
        debug!(config_id = %id, "configuration changed, notifying subscribers");
        for hook in self.hooks.read().iter() {
            hook(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SignatureVersion;
    use crate::repo::InMemoryConfigRepository;
    use crate::secret::MASTER_KEY_LEN;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> S3ConfigStore {
        S3ConfigStore::new(
            Arc::new(InMemoryConfigRepository::new()),
            SecretCipher::new(&[1u8; MASTER_KEY_LEN]).unwrap(),
        )
    }

    fn config(id: &str) -> S3Config {
        let now = Utc::now();
        S3Config {
            id: id.into(),
            name: "test".into(),
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "b".into(),
            access_key_id: "ak".into(),
            encrypted_secret_key: String::new(),
            path_style: true,
            root_prefix: String::new(),
            default_folder: String::new(),
            provider_type: "MinIO".into(),
            signature_version: SignatureVersion::V4,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_secret_encrypted_at_rest_and_decryptable() {
        let store = store();
        let created = store.create(config("c1"), "sk-secret").await.unwrap();
        assert_ne!(created.encrypted_secret_key, "sk-secret");
        assert!(!created.encrypted_secret_key.is_empty());

        let decrypted = store.decrypt_secret(&created).unwrap();
        assert_eq!(decrypted.as_str(), "sk-secret");
    }

    #[tokio::test]
    async fn test_update_without_rotation_keeps_secret() {
        let store = store();
        let created = store.create(config("c1"), "sk-secret").await.unwrap();

        let mut updated = created.clone();
        updated.bucket = "other".into();
        let updated = store.update(updated, None).await.unwrap();

        assert_eq!(store.decrypt_secret(&updated).unwrap().as_str(), "sk-secret");
        assert_eq!(updated.bucket, "other");
    }

    #[tokio::test]
    async fn test_change_hook_fires_on_update_and_delete() {
        let store = store();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        store.subscribe(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let created = store.create(config("c1"), "s").await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        store.update(created, Some("s2")).await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        store.delete("c1").await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
