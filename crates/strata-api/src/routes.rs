//! Route table and handlers for the `/api/fs` surface and `/dav`.

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info_span;

use strata_core::error::EngineError;
use strata_core::types::{
    CompletedPart, CopyItemRequest, CopyOutcome, Disposition, FileDownload, PresignOptions,
    SearchParams, SearchScope, UploadOptions, DEFAULT_PRESIGN_EXPIRY_SECS,
};

use crate::disposition_filename;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Build the full router: JSON API, WebDAV, CORS, tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/fs/list", get(list))
        .route("/api/fs/info", get(info))
        .route("/api/fs/download", get(download))
        .route("/api/fs/preview", get(preview))
        .route(
            "/api/fs/upload",
            post(upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/fs/mkdir", post(mkdir))
        .route("/api/fs/remove", delete(remove))
        .route("/api/fs/rename", post(rename))
        .route("/api/fs/copy", post(copy))
        .route("/api/fs/batch-remove", post(batch_remove))
        .route("/api/fs/batch-copy", post(batch_copy))
        .route("/api/fs/presign", post(presign))
        .route("/api/fs/mpu/init", post(mpu_init))
        .route("/api/fs/mpu/part-urls", post(mpu_part_urls))
        .route("/api/fs/mpu/refresh", post(mpu_part_urls))
        .route("/api/fs/mpu/complete", post(mpu_complete))
        .route("/api/fs/mpu/abort", post(mpu_abort))
        .route("/api/fs/mpu/list", get(mpu_list))
        .route("/api/fs/mpu/parts", get(mpu_parts))
        .route("/api/fs/search", get(search))
        .route("/dav", any(dav))
        .route("/dav/{*rest}", any(dav))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct PathQuery {
    path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresignQuery {
    path: String,
    expires_in: Option<u64>,
    #[serde(default)]
    force_download: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenameBody {
    old_path: String,
    new_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CopyBody {
    source: String,
    target: String,
    skip_existing: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct BatchRemoveBody {
    paths: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchCopyBody {
    items: Vec<CopyItemRequest>,
    skip_existing: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct MkdirBody {
    path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MpuInitBody {
    path: String,
    file_size: u64,
    part_size: Option<u64>,
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MpuRefreshBody {
    path: String,
    upload_id: String,
    part_numbers: Vec<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MpuCompleteBody {
    path: String,
    upload_id: String,
    parts: Vec<CompletedPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MpuAbortBody {
    path: String,
    upload_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MpuQuery {
    path: String,
    upload_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchQuery {
    q: String,
    scope: Option<String>,
    scope_target: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn list(State(state): State<AppState>, Query(q): Query<PathQuery>) -> ApiResult<Response> {
    let listing = state.fs.list_directory(&state.ctx(), &q.path).await?;
    Ok(Json(listing).into_response())
}

async fn info(State(state): State<AppState>, Query(q): Query<PathQuery>) -> ApiResult<Response> {
    let info = state.fs.file_info(&state.ctx(), &q.path).await?;
    Ok(Json(info).into_response())
}

async fn download(State(state): State<AppState>, Query(q): Query<PathQuery>) -> ApiResult<Response> {
    let download = state
        .fs
        .download(&state.ctx(), &q.path, Disposition::Attachment)
        .await?;
    Ok(download_response(download))
}

async fn preview(State(state): State<AppState>, Query(q): Query<PathQuery>) -> ApiResult<Response> {
    let download = state
        .fs
        .download(&state.ctx(), &q.path, Disposition::Inline)
        .await?;
    Ok(download_response(download))
}

/// Stream a download with its content headers and permissive CORS.
fn download_response(download: FileDownload) -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&download.content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    let disposition = match download.disposition {
        Disposition::Inline => "inline".to_string(),
        Disposition::Attachment => format!(
            "attachment; filename=\"{}\"",
            disposition_filename(&download.file_name)
        ),
    };
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Some(length) = download.content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    if let Some(modified) = download.last_modified {
        let value = modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(header::LAST_MODIFIED, value);
        }
    }
    if let Some(etag) = &download.etag {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{etag}\"")) {
            headers.insert(header::ETAG, value);
        }
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );

    (StatusCode::OK, headers, Body::from_stream(download.body)).into_response()
}

async fn upload(
    State(state): State<AppState>,
    Query(q): Query<PathQuery>,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> ApiResult<Response> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        // The transport default is not a meaningful file type.
        .filter(|ct| *ct != "application/octet-stream")
        .map(|ct| ct.to_string());
    let outcome = state
        .fs
        .upload(&state.ctx(), &q.path, body, UploadOptions { content_type })
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)).into_response())
}

async fn mkdir(State(state): State<AppState>, Json(body): Json<MkdirBody>) -> ApiResult<Response> {
    state.fs.create_directory(&state.ctx(), &body.path).await?;
    Ok(StatusCode::CREATED.into_response())
}

async fn remove(State(state): State<AppState>, Query(q): Query<PathQuery>) -> ApiResult<Response> {
    state.fs.remove(&state.ctx(), &q.path).await?;
    Ok(StatusCode::OK.into_response())
}

async fn rename(State(state): State<AppState>, Json(body): Json<RenameBody>) -> ApiResult<Response> {
    state
        .fs
        .rename(&state.ctx(), &body.old_path, &body.new_path)
        .await?;
    Ok(StatusCode::OK.into_response())
}

async fn copy(State(state): State<AppState>, Json(body): Json<CopyBody>) -> ApiResult<Response> {
    let outcome = state
        .fs
        .copy(
            &state.ctx(),
            &body.source,
            &body.target,
            body.skip_existing.unwrap_or(true),
        )
        .await?;
    let response = match outcome {
        CopyOutcome::Local(stats) => Json(serde_json::json!({
            "crossStorage": false,
            "stats": stats,
        })),
        CopyOutcome::CrossStorage(handoff) => Json(serde_json::json!({
            "crossStorage": true,
            "handoff": handoff,
        })),
    };
    Ok(response.into_response())
}

async fn batch_remove(
    State(state): State<AppState>,
    Json(body): Json<BatchRemoveBody>,
) -> ApiResult<Response> {
    let result = state.fs.batch_remove(&state.ctx(), &body.paths).await?;
    Ok(Json(result).into_response())
}

async fn batch_copy(
    State(state): State<AppState>,
    Json(body): Json<BatchCopyBody>,
) -> ApiResult<Response> {
    let result = state
        .fs
        .batch_copy(&state.ctx(), &body.items, body.skip_existing.unwrap_or(true))
        .await?;
    Ok(Json(result).into_response())
}

async fn presign(
    State(state): State<AppState>,
    Query(q): Query<PresignQuery>,
) -> ApiResult<Response> {
    let opts = PresignOptions {
        method: reqwest::Method::GET,
        expires_in: q.expires_in.unwrap_or(DEFAULT_PRESIGN_EXPIRY_SECS),
        force_download: q.force_download,
    };
    let url = state.fs.presigned_url(&state.ctx(), &q.path, opts).await?;
    Ok(Json(url).into_response())
}

async fn mpu_init(
    State(state): State<AppState>,
    Json(body): Json<MpuInitBody>,
) -> ApiResult<Response> {
    let init = state
        .fs
        .multipart_init(
            &state.ctx(),
            &body.path,
            body.file_size,
            body.part_size,
            body.content_type.as_deref(),
        )
        .await?;
    Ok(Json(init).into_response())
}

async fn mpu_part_urls(
    State(state): State<AppState>,
    Json(body): Json<MpuRefreshBody>,
) -> ApiResult<Response> {
    let urls = state
        .fs
        .multipart_refresh_urls(&state.ctx(), &body.path, &body.upload_id, &body.part_numbers)
        .await?;
    Ok(Json(urls).into_response())
}

async fn mpu_complete(
    State(state): State<AppState>,
    Json(body): Json<MpuCompleteBody>,
) -> ApiResult<Response> {
    let outcome = state
        .fs
        .multipart_complete(&state.ctx(), &body.path, &body.upload_id, &body.parts)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)).into_response())
}

async fn mpu_abort(
    State(state): State<AppState>,
    Json(body): Json<MpuAbortBody>,
) -> ApiResult<Response> {
    state
        .fs
        .multipart_abort(&state.ctx(), &body.path, &body.upload_id)
        .await?;
    Ok(StatusCode::OK.into_response())
}

async fn mpu_list(State(state): State<AppState>, Query(q): Query<MpuQuery>) -> ApiResult<Response> {
    let uploads = state
        .fs
        .multipart_list_uploads(&state.ctx(), &q.path)
        .await?;
    Ok(Json(uploads).into_response())
}

async fn mpu_parts(State(state): State<AppState>, Query(q): Query<MpuQuery>) -> ApiResult<Response> {
    let upload_id = q.upload_id.ok_or_else(|| {
        ApiError(EngineError::bad_request("uploadId query parameter is required"))
    })?;
    let parts = state
        .fs
        .multipart_list_parts(&state.ctx(), &q.path, &upload_id)
        .await?;
    Ok(Json(parts).into_response())
}

/// Parse a scope string from the query surface.
fn parse_scope(raw: Option<&str>) -> Result<SearchScope, EngineError> {
    match raw.unwrap_or("global") {
        "global" => Ok(SearchScope::Global),
        "mount" => Ok(SearchScope::Mount),
        "directory" => Ok(SearchScope::Directory),
        other => Err(EngineError::bad_request(format!(
            "scope must be one of global, mount, directory; got {other}"
        ))),
    }
}

async fn search(State(state): State<AppState>, Query(q): Query<SearchQuery>) -> ApiResult<Response> {
    let limit = q.limit.unwrap_or(50);
    let offset = q.offset.unwrap_or(0);
    if !(1..=200).contains(&limit) {
        return Err(ApiError(EngineError::bad_request("limit must be between 1 and 200")));
    }
    if offset < 0 {
        return Err(ApiError(EngineError::bad_request("offset must not be negative")));
    }

    let params = SearchParams {
        scope: parse_scope(q.scope.as_deref())?,
        scope_target: q.scope_target,
        limit: limit as usize,
        offset: offset as usize,
    };
    let results = state.fs.search(&state.ctx(), &q.q, params).await?;
    Ok(Json(results).into_response())
}

/// Pass WebDAV traffic through to the DAV handler, stamping the protocol
/// headers clients probe for.
async fn dav(State(state): State<AppState>, req: Request) -> Response {
    let response = state.dav.handle(req).await;
    let mut response = response.map(Body::new);
    let headers = response.headers_mut();
    for (name, value) in state.dav_headers.to_headers() {
        if let (Ok(name), Ok(value)) = (
            header::HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            headers.insert(name, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scope() {
        assert!(matches!(parse_scope(None), Ok(SearchScope::Global)));
        assert!(matches!(parse_scope(Some("mount")), Ok(SearchScope::Mount)));
        assert!(matches!(parse_scope(Some("directory")), Ok(SearchScope::Directory)));
        assert!(parse_scope(Some("everything")).is_err());
    }

    #[test]
    fn test_body_deserialization_is_camel_case() {
        let body: MpuCompleteBody = serde_json::from_str(
            r#"{"path":"/docs/a.bin","uploadId":"u1","parts":[{"partNumber":1,"etag":"e1"}]}"#,
        )
        .unwrap();
        assert_eq!(body.upload_id, "u1");
        assert_eq!(body.parts[0].part_number, 1);

        let body: CopyBody =
            serde_json::from_str(r#"{"source":"/a","target":"/b","skipExisting":false}"#).unwrap();
        assert_eq!(body.skip_existing, Some(false));
    }
}
