//! Low-level S3 HTTP client: URL construction, request signing, dispatch.
//!
//! One client exists per storage configuration, pooled by the mount
//! manager. It speaks plain HTTP via `reqwest` with SigV4 signatures; the
//! driver above it interprets statuses and bodies.

use bytes::Bytes;
use chrono::Utc;
use reqwest::{Method, Response};
use tracing::{debug, trace};
use url::Url;
use zeroize::Zeroizing;

use crate::error::{EngineError, Result};
use crate::model::{S3Config, SignatureVersion};
use crate::s3::sign::{self, SigningCredentials, EMPTY_PAYLOAD_HASH};

/// Connect timeout for provider sockets. Overall operation deadlines are
/// enforced by the caller's context, not here, because streaming downloads
/// are unbounded.
const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// A signed HTTP client for one S3 configuration.
pub struct S3Client {
    http: reqwest::Client,
    config: S3Config,
    credentials: SigningCredentials,
}

impl std::fmt::Debug for S3Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Client")
            .field("endpoint", &self.config.endpoint)
            .field("bucket", &self.config.bucket)
            .field("path_style", &self.config.path_style)
            .finish_non_exhaustive()
    }
}

impl S3Client {
    /// Build a client from a configuration and its decrypted secret key.
    pub fn new(config: S3Config, secret_key: Zeroizing<String>) -> Result<Self> {
        if config.signature_version == SignatureVersion::V2 {
            return Err(EngineError::bad_request(format!(
                "s3 config {} requests signature v2, which is not supported",
                config.id
            )));
        }
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| EngineError::internal(format!("failed to build HTTP client: {e}")))?;
        let credentials = SigningCredentials {
            access_key_id: config.access_key_id.clone(),
            secret_access_key: secret_key.to_string(),
        };
        Ok(Self { http, config, credentials })
    }

    /// The configuration this client speaks for.
    pub fn config(&self) -> &S3Config {
        &self.config
    }

    fn endpoint(&self) -> &str {
        self.config.endpoint.trim_end_matches('/')
    }

    /// The URL of an object key, honoring path-style vs virtual-hosted
    /// addressing. An empty key addresses the bucket itself.
    pub fn object_url(&self, key: &str) -> Result<Url> {
        let key = key.trim_start_matches('/');
        let raw = if self.config.path_style {
            if key.is_empty() {
                format!("{}/{}", self.endpoint(), self.config.bucket)
            } else {
                format!("{}/{}/{}", self.endpoint(), self.config.bucket, encode_key(key))
            }
        } else {
            let endpoint = Url::parse(self.endpoint())
                .map_err(|e| EngineError::internal(format!("invalid endpoint URL: {e}")))?;
            let host = endpoint
                .host_str()
                .ok_or_else(|| EngineError::internal("endpoint URL has no host"))?;
            let scheme = endpoint.scheme();
            let port = endpoint.port().map(|p| format!(":{p}")).unwrap_or_default();
            if key.is_empty() {
                format!("{scheme}://{}.{host}{port}", self.config.bucket)
            } else {
                format!("{scheme}://{}.{host}{port}/{}", self.config.bucket, encode_key(key))
            }
        };
        Url::parse(&raw).map_err(|e| EngineError::internal(format!("invalid object URL: {e}")))
    }

    /// Issue a signed request.
    ///
    /// `query` lands in the URL and participates in signing;
    /// `extra_headers` are signed and sent (e.g. `content-type`,
    /// `x-amz-copy-source`).
    pub async fn request(
        &self,
        method: Method,
        key: &str,
        query: &[(&str, String)],
        extra_headers: &[(String, String)],
        body: Option<Bytes>,
    ) -> Result<Response> {
        let mut url = self.object_url(key)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                if v.is_empty() {
                    pairs.append_key_only(k);
                } else {
                    pairs.append_pair(k, v);
                }
            }
        }

        let payload_hash = match &body {
            Some(bytes) => sign::sha256_hex(bytes),
            None => EMPTY_PAYLOAD_HASH.to_string(),
        };

        let headers = sign::sign_request(
            &self.credentials,
            &self.config.region,
            method.as_str(),
            &url,
            extra_headers,
            &payload_hash,
            Utc::now(),
        )?;

        trace!(method = %method, url = %url, "s3 request");

        let mut request = self.http.request(method.clone(), url.clone());
        for (k, v) in &headers {
            // reqwest fills in Host itself; re-setting it is harmless but noisy.
            if k != "host" {
                request = request.header(k, v);
            }
        }
        if let Some(bytes) = body {
            request = request.header("content-length", bytes.len().to_string());
            request = request.body(bytes);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            debug!(method = %method, url = %url, status = %response.status(), "s3 request failed");
        }
        Ok(response)
    }

    /// Generate a presigned URL for an object.
    ///
    /// `extra_query` is included before signing, so response-override
    /// parameters and multipart coordinates are covered by the signature.
    pub fn presign(
        &self,
        method: &Method,
        key: &str,
        extra_query: &[(&str, String)],
        expires_in: u64,
    ) -> Result<String> {
        let mut url = self.object_url(key)?;
        if !extra_query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in extra_query {
                pairs.append_pair(k, v);
            }
        }
        let signed = sign::presign_url(
            &self.credentials,
            &self.config.region,
            method.as_str(),
            &url,
            expires_in,
            Utc::now(),
        )?;
        Ok(signed.to_string())
    }

    /// The `CopySource` header value for a key in this bucket, URL-encoded.
    pub fn copy_source(&self, key: &str) -> String {
        format!("{}/{}", self.config.bucket, encode_key(key.trim_start_matches('/')))
    }
}

/// Percent-encode an object key for use in a URL path, preserving `/`.
fn encode_key(key: &str) -> String {
    use percent_encoding::{percent_encode, AsciiSet, CONTROLS};
    // Everything a URL path cannot carry raw; slashes separate segments.
    const PATH_ENCODE: &AsciiSet = &CONTROLS
        .add(b' ')
        .add(b'"')
        .add(b'#')
        .add(b'%')
        .add(b'<')
        .add(b'>')
        .add(b'?')
        .add(b'`')
        .add(b'{')
        .add(b'}')
        .add(b'[')
        .add(b']')
        .add(b'|')
        .add(b'\\')
        .add(b'^');
    percent_encode(key.as_bytes(), PATH_ENCODE).to_string()
}
