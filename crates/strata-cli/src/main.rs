//! The `strata` binary: serve the unified filesystem over HTTP and WebDAV.

#![deny(unsafe_code)]

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::{Parser, Subcommand};
use rand::RngCore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use strata_core::cache::{DirectoryCache, SearchCache};
use strata_core::config::S3ConfigStore;
use strata_core::fs::FileSystem;
use strata_core::manager::MountManager;
use strata_core::model::{Mount, S3Config, SignatureVersion};
use strata_core::registry::MountRegistry;
use strata_core::repo::{
    InMemoryConfigRepository, InMemoryFileRecordRepository, InMemoryMountRepository,
    MountRepository,
};
use strata_core::secret::{SecretCipher, MASTER_KEY_LEN};

use strata_api::{ApiServer, AppState, ServerConfig};
use strata_webdav::DavHeaders;

use crate::config::ServerConfigFile;

/// Environment variable carrying the base64 master key for credential
/// encryption at rest.
const MASTER_KEY_ENV: &str = "STRATA_MASTER_KEY";

/// Serve S3-backed mounts over a JSON API and WebDAV
#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version)]
#[command(after_help = "EXAMPLES:
    # Start the server from a config file
    strata serve --config strata.toml

    # Override the bind address
    strata serve --config strata.toml --bind 0.0.0.0:8080

    # Show the configured mounts
    strata mounts --config strata.toml
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "strata.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the API and WebDAV server
    Serve {
        /// Bind address, overriding the config file
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// List the configured mounts
    Mounts,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "strata_core=info,strata_api=info,strata_webdav=info",
        1 => "strata_core=debug,strata_api=debug,strata_webdav=debug",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// The master key from the environment, or an ephemeral one for dev runs.
fn master_cipher() -> Result<SecretCipher> {
    match std::env::var(MASTER_KEY_ENV) {
        Ok(encoded) => SecretCipher::from_base64(&encoded)
            .map_err(|e| anyhow::anyhow!("invalid {MASTER_KEY_ENV}: {e}")),
        Err(_) => {
            warn!(
                "{MASTER_KEY_ENV} is not set; using an ephemeral key \
                 (encrypted secrets will not survive a restart)"
            );
            let mut key = [0u8; MASTER_KEY_LEN];
            rand::thread_rng().fill_bytes(&mut key);
            SecretCipher::new(&key).map_err(|e| anyhow::anyhow!("{e}"))
        }
    }
}

/// Everything `serve` needs from a loaded config.
struct LoadedEngine {
    fs: Arc<FileSystem>,
    principal: strata_core::principal::Principal,
}

async fn build_engine(file: &ServerConfigFile) -> Result<LoadedEngine> {
    let mount_repo = Arc::new(InMemoryMountRepository::new());
    let config_repo = Arc::new(InMemoryConfigRepository::new());
    let file_records = Arc::new(InMemoryFileRecordRepository::new());
    let configs = Arc::new(S3ConfigStore::new(config_repo, master_cipher()?));

    for entry in &file.s3_configs {
        let now = chrono::Utc::now();
        let config = S3Config {
            id: entry.id.clone(),
            name: entry.id.clone(),
            endpoint: entry.endpoint.clone(),
            region: entry.region.clone(),
            bucket: entry.bucket.clone(),
            access_key_id: entry.access_key_id.clone(),
            encrypted_secret_key: String::new(),
            path_style: entry.path_style,
            root_prefix: entry.root_prefix.clone(),
            default_folder: entry.default_folder.clone(),
            provider_type: entry.provider_type.clone(),
            signature_version: SignatureVersion::V4,
            created_at: now,
            updated_at: now,
        };
        configs
            .create(config, &entry.secret_access_key)
            .await
            .map_err(|e| anyhow::anyhow!("loading s3 config {}: {e}", entry.id))?;
    }

    let registry = MountRegistry::new(mount_repo.clone() as Arc<dyn MountRepository>);
    let owner = match &file.principal {
        config::PrincipalEntry::Admin { user_id } => user_id.clone(),
        // API-key servers still need an owner for the mount rows.
        config::PrincipalEntry::ApiKey { .. } => "admin".to_string(),
    };

    let mut mount_ids_by_name: Vec<(String, String)> = Vec::new();
    for entry in &file.mounts {
        registry
            .validate_mount_path(&entry.mount_path)
            .map_err(|e| anyhow::anyhow!("mount {}: {e}", entry.name))?;
        let mut mount = Mount::new(
            owner.clone(),
            entry.name.clone(),
            entry.mount_path.clone(),
            entry.s3_config.clone(),
            entry.cache_ttl_seconds,
        );
        mount.sort_order = entry.sort_order;
        mount_ids_by_name.push((entry.name.clone(), mount.id.clone()));
        mount_repo.insert(mount).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    }

    let principal = file.principal(&mount_ids_by_name)?;
    let manager = MountManager::new(
        registry,
        configs,
        Arc::new(DirectoryCache::new()),
        file_records,
    );
    let fs = Arc::new(FileSystem::new(manager, Arc::new(SearchCache::default())));

    Ok(LoadedEngine { fs, principal })
}

async fn run_serve(file: ServerConfigFile, bind: Option<SocketAddr>) -> Result<()> {
    let engine = build_engine(&file).await?;
    let state = AppState::new(engine.fs, engine.principal, DavHeaders::default());

    let config = ServerConfig { bind: bind.unwrap_or(file.bind) };
    let server = ApiServer::start(state, config)
        .await
        .context("starting API server")?;

    info!(url = %server.url(), "strata is serving");
    info!(dav = %format!("{}/dav", server.url()), "WebDAV endpoint");

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");
    server.stop().await;
    Ok(())
}

fn run_mounts(file: &ServerConfigFile) {
    if file.mounts.is_empty() {
        println!("no mounts configured");
        return;
    }
    for mount in &file.mounts {
        println!(
            "{:<20} {:<30} -> {} (ttl {}s)",
            mount.name, mount.mount_path, mount.s3_config, mount.cache_ttl_seconds
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let file = ServerConfigFile::load(&cli.config)?;
    match cli.command {
        Command::Serve { bind } => run_serve(file, bind).await,
        Command::Mounts => {
            run_mounts(&file);
            Ok(())
        }
    }
}
