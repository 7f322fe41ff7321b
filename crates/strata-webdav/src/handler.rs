//! DAV handler construction and protocol response headers.
//!
//! WebDAV clients on Windows and macOS probe for specific headers before
//! they will mount a share; the header set here is what those clients
//! expect. The embedder can override or extend the set per platform.

use dav_server::fakels::FakeLs;
use dav_server::DavHandler;

use crate::filesystem::StrataDav;

/// Methods the surface answers, advertised via `Allow` and `Public`.
pub const SUPPORTED_METHODS: &str =
    "OPTIONS, GET, HEAD, PUT, DELETE, PROPFIND, PROPPATCH, MKCOL, COPY, MOVE, LOCK, UNLOCK";

/// How long preflight results may be cached, in seconds.
pub const CORS_MAX_AGE: &str = "86400";

/// Response headers added to every WebDAV response.
#[derive(Debug, Clone)]
pub struct DavHeaders {
    /// `Access-Control-Allow-Origin` value.
    pub allow_origin: String,
    /// `Access-Control-Allow-Headers` value.
    pub allow_headers: String,
    /// Extra per-platform headers the embedder wants appended.
    pub platform_overrides: Vec<(String, String)>,
}

impl Default for DavHeaders {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_headers: "Authorization, Content-Type, Depth, Destination, Overwrite".to_string(),
            platform_overrides: Vec::new(),
        }
    }
}

impl DavHeaders {
    /// The full header list to stamp on responses.
    pub fn to_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("DAV".to_string(), "1,2".to_string()),
            ("MS-Author-Via".to_string(), "DAV".to_string()),
            ("Microsoft-Server-WebDAV-Extensions".to_string(), "1".to_string()),
            ("X-MSDAVEXT".to_string(), "1".to_string()),
            ("Allow".to_string(), SUPPORTED_METHODS.to_string()),
            ("Public".to_string(), SUPPORTED_METHODS.to_string()),
            ("Access-Control-Allow-Origin".to_string(), self.allow_origin.clone()),
            ("Access-Control-Allow-Methods".to_string(), SUPPORTED_METHODS.to_string()),
            ("Access-Control-Allow-Headers".to_string(), self.allow_headers.clone()),
            ("Access-Control-Max-Age".to_string(), CORS_MAX_AGE.to_string()),
        ];
        headers.extend(self.platform_overrides.iter().cloned());
        headers
    }
}

/// Build the DAV handler for a filesystem, stripping the mount prefix.
///
/// `FakeLs` provides the minimal class-2 lock answers Windows and macOS
/// clients insist on; object stores have no real locks to offer.
pub fn dav_handler(fs: StrataDav, prefix: &str) -> DavHandler {
    DavHandler::builder()
        .strip_prefix(prefix)
        .filesystem(Box::new(fs))
        .locksystem(FakeLs::new())
        .build_handler()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_headers_cover_protocol_surface() {
        let headers = DavHeaders::default().to_headers();
        let find = |name: &str| {
            headers
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(find("DAV"), Some("1,2"));
        assert_eq!(find("MS-Author-Via"), Some("DAV"));
        assert_eq!(find("X-MSDAVEXT"), Some("1"));
        assert_eq!(find("Access-Control-Max-Age"), Some("86400"));
        assert!(find("Allow").unwrap().contains("PROPFIND"));
        assert!(find("Allow").unwrap().contains("LOCK"));
    }

    #[test]
    fn test_platform_overrides_appended() {
        let headers = DavHeaders {
            platform_overrides: vec![("X-Custom".to_string(), "yes".to_string())],
            ..DavHeaders::default()
        };
        assert!(headers.to_headers().iter().any(|(k, v)| k == "X-Custom" && v == "yes"));
    }
}
