//! Mount resolution: logical path → (mount, sub-path), or a virtual listing.
//!
//! Resolution considers only active mounts visible to the principal, sorted
//! by mount path length descending, so the longest prefix wins. A logical
//! path that matches no mount but is a proper ancestor of at least one is
//! *virtual*: its listing is synthesized from the mount table.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument, trace};

use crate::error::{EngineError, Result};
use crate::model::Mount;
use crate::path;
use crate::principal::Principal;
use crate::repo::MountRepository;
use crate::types::{DirectoryListing, ListingItem};

/// Top-level segments that can never be mount paths; the embedder may add
/// its own on top of these.
pub const BUILTIN_RESERVED_SEGMENTS: &[&str] = &["api", "dav"];

/// Outcome of resolving a logical path.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The path lives under one mount.
    Mounted {
        /// The winning mount.
        mount: Mount,
        /// Remainder of the path with a leading `/`; trailing slash survives.
        sub_path: String,
    },
    /// The path is a proper ancestor of one or more mounts.
    Virtual {
        /// The queried path, in directory form.
        path: String,
        /// Mounts whose paths live below the queried path.
        mounts: Vec<Mount>,
    },
}

/// Resolves logical paths against the persisted mount table.
pub struct MountRegistry {
    mounts: Arc<dyn MountRepository>,
    reserved_segments: Vec<String>,
}

impl std::fmt::Debug for MountRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountRegistry")
            .field("reserved_segments", &self.reserved_segments)
            .finish_non_exhaustive()
    }
}

impl MountRegistry {
    /// Registry with the built-in reserved segments.
    pub fn new(mounts: Arc<dyn MountRepository>) -> Self {
        Self::with_reserved(mounts, Vec::new())
    }

    /// Registry with additional embedder-supplied reserved segments.
    pub fn with_reserved(mounts: Arc<dyn MountRepository>, extra: Vec<String>) -> Self {
        let mut reserved_segments: Vec<String> =
            BUILTIN_RESERVED_SEGMENTS.iter().map(|s| s.to_string()).collect();
        reserved_segments.extend(extra);
        Self { mounts, reserved_segments }
    }

    /// Active mounts visible to a principal, longest mount path first.
    ///
    /// Admins see the mounts they own; API keys see only their permitted
    /// mount set.
    pub async fn list_for_principal(&self, principal: &Principal) -> Result<Vec<Mount>> {
        let mut visible = match principal {
            Principal::Admin { user_id } => self.mounts.list_for_owner(user_id).await?,
            Principal::ApiKey { permitted_mount_ids, .. } => {
                let all = self.mounts.list_all().await?;
                all.into_iter()
                    .filter(|m| permitted_mount_ids.contains(&m.id))
                    .collect()
            }
        };
        visible.retain(|m| m.is_active);
        visible.sort_by(|a, b| b.mount_path.len().cmp(&a.mount_path.len()));
        Ok(visible)
    }

    /// Resolve a logical path for a principal.
    #[instrument(skip(self, principal), fields(principal = %principal.identity()))]
    pub async fn resolve(&self, principal: &Principal, logical_path: &str) -> Result<Resolution> {
        if !principal.path_in_scope(logical_path) {
            return Err(EngineError::forbidden(format!(
                "path {logical_path} is outside the permitted base path"
            )));
        }

        let candidates = self.list_for_principal(principal).await?;
        let lookup = logical_path.trim_end_matches('/');
        let lookup = if lookup.is_empty() { "/" } else { lookup };

        for mount in &candidates {
            let prefix = mount.mount_path.trim_end_matches('/');
            let matched = if prefix.is_empty() {
                true
            } else {
                lookup == prefix || lookup.starts_with(&format!("{prefix}/"))
            };
            if matched {
                let sub_path = path::strip_prefix(logical_path, &mount.mount_path)
                    .unwrap_or_else(|| "/".to_string());
                trace!(mount_id = %mount.id, sub_path = %sub_path, "resolved to mount");
                return Ok(Resolution::Mounted { mount: mount.clone(), sub_path });
            }
        }

        // No mount covers the path; it may still be a virtual ancestor.
        let dir_path = if logical_path.ends_with('/') {
            logical_path.to_string()
        } else {
            format!("{}/", lookup.trim_end_matches('/'))
        };
        let dir_path = if dir_path == "//" { "/".to_string() } else { dir_path };

        let ancestor = dir_path.trim_end_matches('/').to_string();
        let below: Vec<Mount> = candidates
            .into_iter()
            .filter(|m| {
                let mp = m.mount_path.trim_end_matches('/');
                if ancestor.is_empty() {
                    return !mp.is_empty();
                }
                mp.len() > ancestor.len()
                    && mp.starts_with(&ancestor)
                    && mp.as_bytes()[ancestor.len()] == b'/'
            })
            .collect();

        if below.is_empty() {
            return Err(EngineError::not_found(format!("no mount for path {logical_path}")));
        }
        debug!(path = %dir_path, mounts = below.len(), "virtual ancestor listing");
        Ok(Resolution::Virtual { path: dir_path, mounts: below })
    }

    /// Synthesize the listing of a virtual directory from mount paths.
    ///
    /// Mount points directly below the path become mount entries; deeper
    /// mounts contribute their next path segment as a virtual directory.
    pub fn virtual_listing(&self, dir_path: &str, mounts: &[Mount]) -> DirectoryListing {
        let prefix = dir_path.trim_end_matches('/');
        let mut items: Vec<ListingItem> = Vec::new();

        for mount in mounts {
            let mp = mount.mount_path.trim_end_matches('/');
            let rest = if prefix.is_empty() {
                mp.trim_start_matches('/')
            } else {
                match mp.strip_prefix(&format!("{prefix}/")) {
                    Some(rest) => rest,
                    None => continue,
                }
            };
            let segment = rest.split('/').next().unwrap_or("");
            if segment.is_empty() {
                continue;
            }
            let is_mount_point = rest == segment;
            let item_path = format!("{}/{}/", prefix, segment);
            if let Some(existing) = items.iter_mut().find(|i| i.name == segment) {
                // A mount point wins over an intermediate with the same name.
                if is_mount_point {
                    existing.is_mount = true;
                    existing.is_virtual = false;
                    existing.mount_id = Some(mount.id.clone());
                    existing.modified = Some(mount.updated_at);
                }
                continue;
            }
            items.push(ListingItem {
                name: segment.to_string(),
                path: item_path,
                is_directory: true,
                size: None,
                modified: Some(mount.updated_at),
                etag: None,
                mount_id: is_mount_point.then(|| mount.id.clone()),
                is_mount: is_mount_point,
                is_virtual: !is_mount_point,
            });
        }

        items.sort_by(|a, b| a.name.cmp(&b.name));

        DirectoryListing {
            path: if prefix.is_empty() { "/".to_string() } else { format!("{prefix}/") },
            is_virtual: true,
            is_root: prefix.is_empty(),
            mount_id: None,
            storage_type: None,
            items,
        }
    }

    /// Bump a mount's `last_used_at`, off the data path. Failures are
    /// swallowed after a debug log.
    pub fn update_last_used(&self, mount_id: &str) {
        let repo = Arc::clone(&self.mounts);
        let mount_id = mount_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = repo.touch_last_used(&mount_id, Utc::now()).await {
                debug!(mount_id = %mount_id, error = %e, "last_used update failed");
            }
        });
    }

    /// Validate a mount path for creation: absolute, normalized, and not
    /// under a reserved top-level segment.
    pub fn validate_mount_path(&self, mount_path: &str) -> Result<()> {
        let normalized = path::normalize(mount_path, false)?;
        if normalized == "/" {
            return Ok(());
        }
        let first = normalized.trim_start_matches('/').split('/').next().unwrap_or("");
        if self.reserved_segments.iter().any(|r| r == first) {
            return Err(EngineError::bad_request(format!(
                "mount path may not start with reserved segment /{first}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::ApiKeyPermissions;
    use crate::repo::InMemoryMountRepository;

    async fn registry_with(mounts: Vec<Mount>) -> MountRegistry {
        let repo = Arc::new(InMemoryMountRepository::new());
        for m in mounts {
            repo.insert(m).await.unwrap();
        }
        MountRegistry::new(repo)
    }

    fn mount(owner: &str, path: &str) -> Mount {
        Mount::new(owner, path.trim_matches('/'), path, "c1", 60)
    }

    #[tokio::test]
    async fn test_longest_prefix_wins() {
        let registry = registry_with(vec![
            mount("1", "/docs"),
            mount("1", "/docs/archive"),
        ])
        .await;
        let admin = Principal::admin("1");

        match registry.resolve(&admin, "/docs/archive/2024/x.txt").await.unwrap() {
            Resolution::Mounted { mount, sub_path } => {
                assert_eq!(mount.mount_path, "/docs/archive");
                assert_eq!(sub_path, "/2024/x.txt");
            }
            other => panic!("expected mounted resolution, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exact_mount_path_resolves_to_root_sub_path() {
        let registry = registry_with(vec![mount("1", "/docs")]).await;
        let admin = Principal::admin("1");

        match registry.resolve(&admin, "/docs/").await.unwrap() {
            Resolution::Mounted { sub_path, .. } => assert_eq!(sub_path, "/"),
            other => panic!("expected mounted resolution, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_inactive_mounts_excluded() {
        let mut m = mount("1", "/docs");
        m.is_active = false;
        let registry = registry_with(vec![m]).await;
        let admin = Principal::admin("1");

        assert!(registry.resolve(&admin, "/docs/x").await.is_err());
    }

    #[tokio::test]
    async fn test_virtual_ancestor() {
        let registry = registry_with(vec![mount("1", "/media/photos")]).await;
        let admin = Principal::admin("1");

        match registry.resolve(&admin, "/media/").await.unwrap() {
            Resolution::Virtual { path, mounts } => {
                assert_eq!(path, "/media/");
                assert_eq!(mounts.len(), 1);
            }
            other => panic!("expected virtual resolution, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_root_is_virtual_when_unmounted() {
        let registry = registry_with(vec![mount("1", "/docs")]).await;
        let admin = Principal::admin("1");

        match registry.resolve(&admin, "/").await.unwrap() {
            Resolution::Virtual { path, .. } => assert_eq!(path, "/"),
            other => panic!("expected virtual resolution, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unrelated_path_not_found() {
        let registry = registry_with(vec![mount("1", "/docs")]).await;
        let admin = Principal::admin("1");
        let err = registry.resolve(&admin, "/elsewhere/x").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_api_key_restricted_to_permitted_mounts() {
        let docs = mount("1", "/docs");
        let media = mount("1", "/media");
        let docs_id = docs.id.clone();
        let registry = registry_with(vec![docs, media]).await;

        let key = Principal::ApiKey {
            key_id: "k1".into(),
            permitted_mount_ids: vec![docs_id],
            base_path: "/".into(),
            permissions: ApiKeyPermissions { read: true, write: true },
        };

        assert!(matches!(
            registry.resolve(&key, "/docs/x").await.unwrap(),
            Resolution::Mounted { .. }
        ));
        assert!(registry.resolve(&key, "/media/x").await.is_err());
    }

    #[tokio::test]
    async fn test_api_key_base_path_enforced() {
        let registry = registry_with(vec![mount("1", "/docs")]).await;
        let key = Principal::ApiKey {
            key_id: "k1".into(),
            permitted_mount_ids: vec![],
            base_path: "/docs/team".into(),
            permissions: ApiKeyPermissions::default(),
        };

        let err = registry.resolve(&key, "/docs/private/x").await.unwrap_err();
        assert!(matches!(err, EngineError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_virtual_listing_synthesis() {
        let photos = mount("1", "/media/photos");
        let registry = registry_with(vec![photos.clone(), mount("1", "/media/video/raw")]).await;
        let admin = Principal::admin("1");

        let (path, mounts) = match registry.resolve(&admin, "/media/").await.unwrap() {
            Resolution::Virtual { path, mounts } => (path, mounts),
            other => panic!("expected virtual, got {other:?}"),
        };
        let listing = registry.virtual_listing(&path, &mounts);

        assert!(listing.is_virtual);
        assert_eq!(listing.items.len(), 2);

        let photo_item = listing.items.iter().find(|i| i.name == "photos").unwrap();
        assert!(photo_item.is_mount);
        assert_eq!(photo_item.mount_id.as_deref(), Some(photos.id.as_str()));

        let video_item = listing.items.iter().find(|i| i.name == "video").unwrap();
        assert!(video_item.is_virtual);
        assert!(!video_item.is_mount);
    }

    #[tokio::test]
    async fn test_root_virtual_listing() {
        let registry = registry_with(vec![mount("1", "/docs"), mount("1", "/media/photos")]).await;
        let listing = registry.virtual_listing(
            "/",
            &registry
                .list_for_principal(&Principal::admin("1"))
                .await
                .unwrap(),
        );
        assert!(listing.is_root);
        let names: Vec<&str> = listing.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["docs", "media"]);
    }

    #[tokio::test]
    async fn test_reserved_mount_paths_rejected() {
        let registry = registry_with(vec![]).await;
        assert!(registry.validate_mount_path("/api/x").is_err());
        assert!(registry.validate_mount_path("/dav").is_err());
        assert!(registry.validate_mount_path("/docs").is_ok());
    }
}
