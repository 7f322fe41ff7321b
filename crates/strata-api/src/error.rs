//! Engine errors as JSON API responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use strata_core::error::EngineError;

/// The JSON error envelope every failing endpoint returns.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error kind.
    pub error: &'static str,
    /// Human-readable message.
    pub message: String,
}

/// Wrapper giving [`EngineError`] an `IntoResponse` impl.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: self.0.kind(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result alias for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_engine_mapping() {
        let resp = ApiError(EngineError::not_found("x")).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = ApiError(EngineError::conflict("x")).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = ApiError(EngineError::unimplemented("s3", "Multipart")).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);
    }
}
