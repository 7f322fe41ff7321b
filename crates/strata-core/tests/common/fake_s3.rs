//! In-process S3 test double.
//!
//! Serves the subset of the S3 REST API the driver exercises against an
//! in-memory object map: path-style `GET`/`PUT`/`HEAD`/`DELETE`,
//! `ListObjectsV2` with prefix/delimiter/continuation paging, `CopyObject`,
//! and the multipart upload lifecycle. Signatures are accepted blindly;
//! the double tests driver semantics, not authentication.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use md5::{Digest, Md5};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use uuid::Uuid;

/// One stored object.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
    pub etag: String,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MultipartSession {
    key: String,
    content_type: String,
    parts: BTreeMap<u32, Bytes>,
}

/// Shared fake state: `bucket/key` → object.
#[derive(Debug, Default)]
pub struct FakeState {
    objects: DashMap<String, StoredObject>,
    uploads: DashMap<String, MultipartSession>,
}

impl FakeState {
    /// Direct object lookup for assertions.
    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects.get(&format!("{bucket}/{key}")).map(|o| o.clone())
    }

    /// Number of stored objects.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Number of in-flight multipart sessions.
    pub fn upload_count(&self) -> usize {
        self.uploads.len()
    }
}

fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// A running fake S3 server.
pub struct FakeS3 {
    /// Bound address.
    pub addr: SocketAddr,
    /// Shared state for assertions.
    pub state: Arc<FakeState>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl FakeS3 {
    /// Start on an ephemeral port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake s3");
        let addr = listener.local_addr().expect("local addr");
        let state = Arc::new(FakeState::default());
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { break };
                        let state = Arc::clone(&accept_state);
                        tokio::spawn(async move {
                            let service = service_fn(move |req: Request<Incoming>| {
                                let state = Arc::clone(&state);
                                async move { Ok::<_, Infallible>(handle(state, req).await) }
                            });
                            let _ = auto::Builder::new(TokioExecutor::new())
                                .serve_connection(TokioIo::new(stream), service)
                                .await;
                        });
                    }
                }
            }
        });

        Self { addr, state, shutdown: Some(shutdown_tx) }
    }

    /// The endpoint URL clients should use (path-style).
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for FakeS3 {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn query_map(query: Option<&str>) -> Vec<(String, String)> {
    let Some(query) = query else { return Vec::new() };
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn query_get<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn query_has(pairs: &[(String, String)], key: &str) -> bool {
    pairs.iter().any(|(k, _)| k == key)
}

fn xml_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/xml")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

fn not_found() -> Response<Full<Bytes>> {
    xml_response(
        StatusCode::NOT_FOUND,
        "<Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message></Error>"
            .to_string(),
    )
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

async fn handle(state: Arc<FakeState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let headers = req.headers().clone();
    let query = query_map(uri.query());

    let path = uri.path().trim_start_matches('/');
    let (bucket, key) = match path.split_once('/') {
        Some((b, k)) => (b.to_string(), percent_decode(k)),
        None => (path.to_string(), String::new()),
    };

    let body = req
        .into_body()
        .collect()
        .await
        .map(|b| b.to_bytes())
        .unwrap_or_default();

    match method {
        Method::GET if key.is_empty() && query_has(&query, "uploads") => {
            list_uploads(&state, &bucket, &query)
        }
        Method::GET if key.is_empty() => list_objects(&state, &bucket, &query),
        Method::GET if query_has(&query, "uploadId") => list_parts(&state, &query),
        Method::GET => match state.objects.get(&format!("{bucket}/{key}")) {
            Some(object) => {
                let object = object.clone();
                Response::builder()
                    .status(StatusCode::OK)
                    .header("content-type", object.content_type.clone())
                    .header("content-length", object.data.len().to_string())
                    .header("etag", format!("\"{}\"", object.etag))
                    .header(
                        "last-modified",
                        object.modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
                    )
                    .body(Full::new(object.data))
                    .unwrap()
            }
            None => not_found(),
        },
        Method::HEAD => match state.objects.get(&format!("{bucket}/{key}")) {
            Some(object) => Response::builder()
                .status(StatusCode::OK)
                .header("content-type", object.content_type.clone())
                .header("content-length", object.data.len().to_string())
                .header("etag", format!("\"{}\"", object.etag))
                .header(
                    "last-modified",
                    object.modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
                )
                .body(Full::new(Bytes::new()))
                .unwrap(),
            None => Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Full::new(Bytes::new()))
                .unwrap(),
        },
        Method::PUT if query_has(&query, "partNumber") => {
            let upload_id = query_get(&query, "uploadId").unwrap_or_default().to_string();
            let part_number: u32 = query_get(&query, "partNumber")
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            let etag = md5_hex(&body);
            match state.uploads.get_mut(&upload_id) {
                Some(mut session) => {
                    session.parts.insert(part_number, body);
                    Response::builder()
                        .status(StatusCode::OK)
                        .header("etag", format!("\"{etag}\""))
                        .body(Full::new(Bytes::new()))
                        .unwrap()
                }
                None => not_found(),
            }
        }
        Method::PUT => {
            // CopyObject when the copy-source header is present.
            if let Some(source) = headers.get("x-amz-copy-source").and_then(|v| v.to_str().ok()) {
                let source = percent_decode(source.trim_start_matches('/'));
                let Some(object) = state.objects.get(&source).map(|o| o.clone()) else {
                    return not_found();
                };
                state.objects.insert(
                    format!("{bucket}/{key}"),
                    StoredObject { modified: Utc::now(), ..object },
                );
                return xml_response(
                    StatusCode::OK,
                    "<CopyObjectResult><ETag>\"copied\"</ETag></CopyObjectResult>".to_string(),
                );
            }
            let content_type = headers
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/octet-stream")
                .to_string();
            let etag = md5_hex(&body);
            state.objects.insert(
                format!("{bucket}/{key}"),
                StoredObject {
                    data: body,
                    content_type,
                    etag: etag.clone(),
                    modified: Utc::now(),
                },
            );
            Response::builder()
                .status(StatusCode::OK)
                .header("etag", format!("\"{etag}\""))
                .body(Full::new(Bytes::new()))
                .unwrap()
        }
        Method::POST if query_has(&query, "uploads") => {
            let upload_id = Uuid::new_v4().to_string();
            let content_type = headers
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/octet-stream")
                .to_string();
            state.uploads.insert(
                upload_id.clone(),
                MultipartSession {
                    key: format!("{bucket}/{key}"),
                    content_type,
                    parts: BTreeMap::new(),
                },
            );
            xml_response(
                StatusCode::OK,
                format!(
                    "<InitiateMultipartUploadResult><Bucket>{bucket}</Bucket><Key>{}</Key><UploadId>{upload_id}</UploadId></InitiateMultipartUploadResult>",
                    escape_xml(&key)
                ),
            )
        }
        Method::POST if query_has(&query, "uploadId") => {
            let upload_id = query_get(&query, "uploadId").unwrap_or_default().to_string();
            let Some((_, session)) = state.uploads.remove(&upload_id) else {
                return not_found();
            };
            let mut assembled = Vec::new();
            for (_, part) in session.parts {
                assembled.extend_from_slice(&part);
            }
            let etag = md5_hex(&assembled);
            state.objects.insert(
                session.key,
                StoredObject {
                    data: Bytes::from(assembled),
                    content_type: session.content_type,
                    etag: etag.clone(),
                    modified: Utc::now(),
                },
            );
            xml_response(
                StatusCode::OK,
                format!(
                    "<CompleteMultipartUploadResult><ETag>\"{etag}\"</ETag></CompleteMultipartUploadResult>"
                ),
            )
        }
        Method::DELETE if query_has(&query, "uploadId") => {
            let upload_id = query_get(&query, "uploadId").unwrap_or_default();
            state.uploads.remove(upload_id);
            Response::builder()
                .status(StatusCode::NO_CONTENT)
                .body(Full::new(Bytes::new()))
                .unwrap()
        }
        Method::DELETE => {
            if state.objects.remove(&format!("{bucket}/{key}")).is_some() {
                Response::builder()
                    .status(StatusCode::NO_CONTENT)
                    .body(Full::new(Bytes::new()))
                    .unwrap()
            } else {
                not_found()
            }
        }
        _ => Response::builder()
            .status(StatusCode::METHOD_NOT_ALLOWED)
            .body(Full::new(Bytes::new()))
            .unwrap(),
    }
}

fn percent_decode(input: &str) -> String {
    percent_encoding::percent_decode_str(input)
        .decode_utf8_lossy()
        .to_string()
}

fn list_objects(
    state: &FakeState,
    bucket: &str,
    query: &[(String, String)],
) -> Response<Full<Bytes>> {
    let prefix = query_get(query, "prefix").unwrap_or("");
    let delimiter = query_get(query, "delimiter");
    let max_keys: usize = query_get(query, "max-keys")
        .and_then(|m| m.parse().ok())
        .unwrap_or(1000);
    let after = query_get(query, "continuation-token").unwrap_or("");

    let bucket_prefix = format!("{bucket}/");
    let mut keys: Vec<(String, StoredObject)> = state
        .objects
        .iter()
        .filter_map(|entry| {
            entry
                .key()
                .strip_prefix(&bucket_prefix)
                .map(|k| (k.to_string(), entry.value().clone()))
        })
        .filter(|(k, _)| k.starts_with(prefix) && k.as_str() > after)
        .collect();
    keys.sort_by(|a, b| a.0.cmp(&b.0));

    let mut contents = String::new();
    let mut prefixes: Vec<String> = Vec::new();
    let mut emitted = 0usize;
    let mut last_key = String::new();
    let mut truncated = false;

    for (key, object) in &keys {
        if emitted >= max_keys {
            truncated = true;
            break;
        }
        last_key = key.clone();
        if let Some(delim) = delimiter {
            let remainder = &key[prefix.len()..];
            if let Some(pos) = remainder.find(delim) {
                let common = format!("{prefix}{}", &remainder[..pos + delim.len()]);
                if !prefixes.contains(&common) {
                    prefixes.push(common);
                    emitted += 1;
                }
                continue;
            }
        }
        contents.push_str(&format!(
            "<Contents><Key>{}</Key><Size>{}</Size><LastModified>{}</LastModified><ETag>\"{}\"</ETag></Contents>",
            escape_xml(key),
            object.data.len(),
            object.modified.to_rfc3339(),
            object.etag,
        ));
        emitted += 1;
    }

    let mut body = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?><ListBucketResult>");
    body.push_str(&format!("<Name>{bucket}</Name>"));
    body.push_str(&format!("<IsTruncated>{truncated}</IsTruncated>"));
    if truncated {
        body.push_str(&format!(
            "<NextContinuationToken>{}</NextContinuationToken>",
            escape_xml(&last_key)
        ));
    }
    body.push_str(&contents);
    for common in prefixes {
        body.push_str(&format!(
            "<CommonPrefixes><Prefix>{}</Prefix></CommonPrefixes>",
            escape_xml(&common)
        ));
    }
    body.push_str("</ListBucketResult>");
    xml_response(StatusCode::OK, body)
}

fn list_uploads(
    state: &FakeState,
    bucket: &str,
    query: &[(String, String)],
) -> Response<Full<Bytes>> {
    let prefix = query_get(query, "prefix").unwrap_or("");
    let bucket_prefix = format!("{bucket}/");
    let mut body = String::from("<ListMultipartUploadsResult>");
    for entry in state.uploads.iter() {
        let Some(key) = entry.value().key.strip_prefix(&bucket_prefix) else {
            continue;
        };
        if !key.starts_with(prefix) {
            continue;
        }
        body.push_str(&format!(
            "<Upload><Key>{}</Key><UploadId>{}</UploadId><Initiated>{}</Initiated></Upload>",
            escape_xml(key),
            entry.key(),
            Utc::now().to_rfc3339(),
        ));
    }
    body.push_str("</ListMultipartUploadsResult>");
    xml_response(StatusCode::OK, body)
}

fn list_parts(state: &FakeState, query: &[(String, String)]) -> Response<Full<Bytes>> {
    let upload_id = query_get(query, "uploadId").unwrap_or_default();
    let Some(session) = state.uploads.get(upload_id) else {
        return not_found();
    };
    let mut body = String::from("<ListPartsResult>");
    for (number, data) in &session.parts {
        body.push_str(&format!(
            "<Part><PartNumber>{number}</PartNumber><Size>{}</Size><ETag>\"{}\"</ETag></Part>",
            data.len(),
            md5_hex(data),
        ));
    }
    body.push_str("</ListPartsResult>");
    xml_response(StatusCode::OK, body)
}
