//! TOML configuration for the development server.
//!
//! The config file declares storage configurations (with plaintext secret
//! keys that get encrypted into the store at load time), mounts, and the
//! principal the server runs as. Production embedders replace this with
//! their own persistence and authentication.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use strata_core::principal::{ApiKeyPermissions, Principal};

/// Top-level config file shape.
#[derive(Debug, Deserialize)]
pub struct ServerConfigFile {
    /// Bind address for the API server.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Storage configurations.
    #[serde(default, rename = "s3_config")]
    pub s3_configs: Vec<S3ConfigEntry>,
    /// Mounts.
    #[serde(default, rename = "mount")]
    pub mounts: Vec<MountEntry>,
    /// The principal the server runs as.
    pub principal: PrincipalEntry,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// One `[[s3_config]]` block.
#[derive(Debug, Deserialize)]
pub struct S3ConfigEntry {
    pub id: String,
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    /// Plaintext here; encrypted at rest once loaded into the store.
    pub secret_access_key: String,
    #[serde(default)]
    pub path_style: bool,
    #[serde(default)]
    pub root_prefix: String,
    #[serde(default)]
    pub default_folder: String,
    #[serde(default)]
    pub provider_type: String,
}

/// One `[[mount]]` block.
#[derive(Debug, Deserialize)]
pub struct MountEntry {
    pub name: String,
    pub mount_path: String,
    /// References an `[[s3_config]]` id.
    pub s3_config: String,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
    #[serde(default)]
    pub sort_order: i32,
}

fn default_cache_ttl() -> u64 {
    60
}

/// The `[principal]` block.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrincipalEntry {
    /// Run as an admin user.
    Admin {
        user_id: String,
    },
    /// Run as an API key restricted to named mounts.
    ApiKey {
        key_id: String,
        /// Mount *names* from this file; resolved to ids at load.
        permitted_mounts: Vec<String>,
        #[serde(default = "default_base_path")]
        base_path: String,
        #[serde(default)]
        write: bool,
    },
}

fn default_base_path() -> String {
    "/".to_string()
}

impl ServerConfigFile {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: ServerConfigFile =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for mount in &self.mounts {
            if !self.s3_configs.iter().any(|c| c.id == mount.s3_config) {
                bail!(
                    "mount {} references unknown s3_config {}",
                    mount.name,
                    mount.s3_config
                );
            }
            if !mount.mount_path.starts_with('/') {
                bail!("mount path must be absolute: {}", mount.mount_path);
            }
        }
        Ok(())
    }

    /// Resolve the configured principal against the loaded mounts.
    pub fn principal(&self, mount_ids_by_name: &[(String, String)]) -> Result<Principal> {
        match &self.principal {
            PrincipalEntry::Admin { user_id } => Ok(Principal::admin(user_id.clone())),
            PrincipalEntry::ApiKey { key_id, permitted_mounts, base_path, write } => {
                let mut permitted_mount_ids = Vec::new();
                for name in permitted_mounts {
                    let id = mount_ids_by_name
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, id)| id.clone());
                    match id {
                        Some(id) => permitted_mount_ids.push(id),
                        None => bail!("principal references unknown mount {name}"),
                    }
                }
                Ok(Principal::ApiKey {
                    key_id: key_id.clone(),
                    permitted_mount_ids,
                    base_path: base_path.clone(),
                    permissions: ApiKeyPermissions { read: true, write: *write },
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
bind = "127.0.0.1:9100"

[[s3_config]]
id = "primary"
endpoint = "http://localhost:9000"
region = "us-east-1"
bucket = "data"
access_key_id = "minioadmin"
secret_access_key = "minioadmin"
path_style = true
root_prefix = "strata"

[[mount]]
name = "docs"
mount_path = "/docs"
s3_config = "primary"
cache_ttl_seconds = 30

[principal]
kind = "admin"
user_id = "admin"
"#;

    #[test]
    fn test_parse_example() {
        let config: ServerConfigFile = toml::from_str(EXAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.bind.port(), 9100);
        assert_eq!(config.s3_configs.len(), 1);
        assert_eq!(config.mounts[0].cache_ttl_seconds, 30);
        assert!(matches!(config.principal, PrincipalEntry::Admin { .. }));
    }

    #[test]
    fn test_unknown_config_reference_rejected() {
        let broken = EXAMPLE.replace("s3_config = \"primary\"", "s3_config = \"nope\"");
        let config: ServerConfigFile = toml::from_str(&broken).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_principal_resolution() {
        let raw = r#"
[[s3_config]]
id = "primary"
endpoint = "http://localhost:9000"
region = "us-east-1"
bucket = "data"
access_key_id = "ak"
secret_access_key = "sk"

[[mount]]
name = "docs"
mount_path = "/docs"
s3_config = "primary"

[principal]
kind = "api_key"
key_id = "k1"
permitted_mounts = ["docs"]
write = true
"#;
        let config: ServerConfigFile = toml::from_str(raw).unwrap();
        let principal = config
            .principal(&[("docs".to_string(), "mount-1".to_string())])
            .unwrap();
        match principal {
            Principal::ApiKey { permitted_mount_ids, permissions, .. } => {
                assert_eq!(permitted_mount_ids, vec!["mount-1"]);
                assert!(permissions.write);
            }
            other => panic!("expected api key principal, got {other:?}"),
        }
    }
}
