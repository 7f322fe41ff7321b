//! Authenticated principals.
//!
//! The engine never authenticates anyone itself; it receives an
//! already-authenticated [`Principal`] from the embedding layer. Principals
//! are used for two things only: restricting the candidate mount set during
//! resolution, and stamping ownership on file records.

use serde::{Deserialize, Serialize};

/// Operations an API key is allowed to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyPermissions {
    /// Read operations (list, stat, download, search, presign GET).
    pub read: bool,
    /// Mutating operations (upload, mkdir, rename, copy, delete, multipart).
    pub write: bool,
}

impl Default for ApiKeyPermissions {
    fn default() -> Self {
        Self { read: true, write: false }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    /// An administrator; sees every mount they own.
    Admin {
        /// The admin user id.
        user_id: String,
    },
    /// An API key scoped to an explicit mount set and base path.
    ApiKey {
        /// The key id.
        key_id: String,
        /// Mounts this key may resolve into.
        permitted_mount_ids: Vec<String>,
        /// Logical path prefix the key is confined to (`/` for unrestricted).
        base_path: String,
        /// Allowed operation classes.
        permissions: ApiKeyPermissions,
    },
}

impl Principal {
    /// Convenience constructor for an admin principal.
    pub fn admin(user_id: impl Into<String>) -> Self {
        Principal::Admin { user_id: user_id.into() }
    }

    /// The ownership tag persisted on file records:
    /// `admin:<id>` or `apikey:<id>`.
    pub fn owner_tag(&self) -> String {
        match self {
            Principal::Admin { user_id } => format!("admin:{user_id}"),
            Principal::ApiKey { key_id, .. } => format!("apikey:{key_id}"),
        }
    }

    /// A stable identity string, used for cache keying. Identical to the
    /// owner tag so cached results can never leak across principals.
    pub fn identity(&self) -> String {
        self.owner_tag()
    }

    /// True if write operations are permitted.
    ///
    /// Admins can always write; API keys only when their permissions say so.
    pub fn can_write(&self) -> bool {
        match self {
            Principal::Admin { .. } => true,
            Principal::ApiKey { permissions, .. } => permissions.write,
        }
    }

    /// The base path this principal is confined to, if any.
    pub fn base_path(&self) -> Option<&str> {
        match self {
            Principal::Admin { .. } => None,
            Principal::ApiKey { base_path, .. } => {
                let trimmed = base_path.trim_end_matches('/');
                if trimmed.is_empty() {
                    None
                } else {
                    Some(base_path.as_str())
                }
            }
        }
    }

    /// True when a logical path lies inside this principal's base path.
    pub fn path_in_scope(&self, logical_path: &str) -> bool {
        match self.base_path() {
            None => true,
            Some(base) => {
                let base = base.trim_end_matches('/');
                logical_path == base || logical_path.starts_with(&format!("{base}/"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_key(base: &str) -> Principal {
        Principal::ApiKey {
            key_id: "k1".into(),
            permitted_mount_ids: vec!["m1".into()],
            base_path: base.into(),
            permissions: ApiKeyPermissions { read: true, write: true },
        }
    }

    #[test]
    fn test_owner_tags() {
        assert_eq!(Principal::admin("42").owner_tag(), "admin:42");
        assert_eq!(api_key("/").owner_tag(), "apikey:k1");
    }

    #[test]
    fn test_admin_scope_is_unbounded() {
        let p = Principal::admin("42");
        assert!(p.path_in_scope("/anything/at/all"));
        assert!(p.can_write());
    }

    #[test]
    fn test_api_key_base_path() {
        let p = api_key("/docs/");
        assert!(p.path_in_scope("/docs"));
        assert!(p.path_in_scope("/docs/a/b.txt"));
        assert!(!p.path_in_scope("/docs-other/x"));
        assert!(!p.path_in_scope("/elsewhere"));
    }

    #[test]
    fn test_api_key_root_base_path() {
        let p = api_key("/");
        assert!(p.path_in_scope("/anywhere"));
    }

    #[test]
    fn test_default_permissions_are_read_only() {
        let perms = ApiKeyPermissions::default();
        assert!(perms.read);
        assert!(!perms.write);
    }
}
