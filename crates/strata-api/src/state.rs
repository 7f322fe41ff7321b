//! Shared application state for the API surface.

use std::sync::Arc;

use dav_server::DavHandler;
use strata_core::principal::Principal;
use strata_core::types::OpContext;
use strata_core::FileSystem;
use strata_webdav::{dav_handler, DavHeaders, StrataDav};

/// Everything the handlers need.
///
/// Authentication is the embedder's concern; this state carries the single
/// resolved principal of the development server. A production embedder
/// swaps `principal` for a per-request extractor and constructs one
/// `StrataDav` per authenticated session.
#[derive(Clone)]
pub struct AppState {
    /// The engine facade.
    pub fs: Arc<FileSystem>,
    /// The authenticated principal.
    pub principal: Principal,
    /// The WebDAV handler mounted at `/dav`.
    pub dav: Arc<DavHandler>,
    /// Headers stamped on every `/dav` response.
    pub dav_headers: Arc<DavHeaders>,
}

impl AppState {
    /// Wire the state for one principal.
    pub fn new(fs: Arc<FileSystem>, principal: Principal, dav_headers: DavHeaders) -> Self {
        let dav_fs = StrataDav::new(Arc::clone(&fs), principal.clone());
        Self {
            fs,
            principal,
            dav: Arc::new(dav_handler(dav_fs, "/dav")),
            dav_headers: Arc::new(dav_headers),
        }
    }

    /// A fresh operation context for one request.
    pub fn ctx(&self) -> OpContext {
        OpContext::new(self.principal.clone())
    }
}
