//! Strata core: a virtual filesystem engine over S3-compatible object
//! stores.
//!
//! The engine unifies one or more object stores behind a single
//! hierarchical namespace. Logical paths resolve through per-principal
//! *mounts* to an object key on a specific bucket; drivers translate
//! list/stat/download/upload/rename/copy/delete/presign/multipart
//! operations to provider calls, layering directory semantics on flat key
//! spaces; a short-lived directory cache with ancestor-chain invalidation
//! amortizes listing cost.
//!
//! # Layering
//!
//! ```text
//! FileSystem (capability gating, batches, search fan-out)
//!     |
//! MountManager (driver pool)  --  MountRegistry (longest-prefix resolution)
//!     |
//! StorageDriver (S3Driver: directory emulation over ListObjectsV2 et al.)
//!     |
//! S3Client (SigV4 signing, reqwest)
//! ```
//!
//! Protocol adapters (`strata-webdav`, `strata-api`) sit on top of
//! [`FileSystem`] and never talk to drivers directly.

#![deny(unsafe_code)]

pub mod cache;
pub mod capability;
pub mod config;
pub mod driver;
pub mod error;
pub mod fs;
pub mod manager;
pub mod mime;
pub mod model;
pub mod path;
pub mod principal;
pub mod registry;
pub mod repo;
pub mod s3;
pub mod secret;
pub mod types;

pub use cache::{DirectoryCache, SearchCache};
pub use capability::Capability;
pub use config::S3ConfigStore;
pub use driver::StorageDriver;
pub use error::{EngineError, Result};
pub use fs::FileSystem;
pub use manager::{MountManager, ResolvedPath};
pub use model::{FileRecord, Mount, S3Config, StorageType};
pub use principal::{ApiKeyPermissions, Principal};
pub use registry::{MountRegistry, Resolution};
pub use secret::SecretCipher;
pub use types::{DirectoryListing, FileInfo, ListingItem, OpContext};
