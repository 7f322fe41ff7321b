//! Error types for the virtual filesystem engine.
//!
//! All engine operations fail with [`EngineError`], a closed set of error
//! kinds that protocol adapters map onto their own vocabularies (HTTP status
//! codes, WebDAV `FsError`s). Provider errors carry the original HTTP status
//! so callers can distinguish transient congestion from hard failures.

use thiserror::Error;

/// Errors raised by engine operations.
///
/// The set is closed on purpose: every failure a driver or the facade can
/// produce maps onto exactly one of these kinds, and the protocol layers
/// exhaustively match on them.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The path, mount, or object does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// What was being looked up.
        message: String,
    },

    /// The operation conflicts with existing state (target exists, parent
    /// directory missing, directory not empty where emptiness is required).
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflicting state.
        message: String,
    },

    /// The request itself is malformed (bad path, invalid parameters).
    #[error("bad request: {message}")]
    BadRequest {
        /// What was wrong with the request.
        message: String,
    },

    /// The principal is known but not allowed to do this.
    #[error("forbidden: {message}")]
    Forbidden {
        /// Why access was denied.
        message: String,
    },

    /// No valid principal was supplied.
    #[error("unauthenticated: {message}")]
    Unauthenticated {
        /// Why authentication failed.
        message: String,
    },

    /// The resolved storage driver does not declare the capability this
    /// operation needs. Raised by the facade before any I/O happens.
    #[error("{message}")]
    Unimplemented {
        /// The standard "storage driver <type> does not support <capability>"
        /// message.
        message: String,
    },

    /// A provider error that is likely to succeed on retry (5xx, 429,
    /// connection failures).
    #[error("provider error ({status}): {message}")]
    ProviderTransient {
        /// Description from the provider, if any.
        message: String,
        /// Original provider HTTP status (0 when the request never got a
        /// response).
        status: u16,
    },

    /// A provider error that will not succeed on retry (4xx other than 429).
    #[error("provider error ({status}): {message}")]
    ProviderPermanent {
        /// Description from the provider, if any.
        message: String,
        /// Original provider HTTP status.
        status: u16,
    },

    /// The operation was cancelled via its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// An internal invariant was violated.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl EngineError {
    /// Shorthand for a [`EngineError::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        EngineError::NotFound { message: message.into() }
    }

    /// Shorthand for a [`EngineError::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        EngineError::Conflict { message: message.into() }
    }

    /// Shorthand for a [`EngineError::BadRequest`].
    pub fn bad_request(message: impl Into<String>) -> Self {
        EngineError::BadRequest { message: message.into() }
    }

    /// Shorthand for a [`EngineError::Forbidden`].
    pub fn forbidden(message: impl Into<String>) -> Self {
        EngineError::Forbidden { message: message.into() }
    }

    /// Shorthand for a [`EngineError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        EngineError::Internal { message: message.into() }
    }

    /// The capability-gating failure, with the standard message shape.
    pub fn unimplemented(storage_type: &str, capability: &str) -> Self {
        EngineError::Unimplemented {
            message: format!("storage driver {storage_type} does not support {capability}"),
        }
    }

    /// Classify a provider HTTP status into a transient or permanent error.
    ///
    /// 5xx and 429 are considered retryable; everything else is permanent.
    /// Status 0 means the request never completed (DNS, TLS, connection
    /// reset) and is treated as transient.
    pub fn from_provider(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 0 || status == 429 || status >= 500 {
            EngineError::ProviderTransient { message, status }
        } else {
            EngineError::ProviderPermanent { message, status }
        }
    }

    /// The HTTP status this error maps to on the JSON API surface.
    pub fn http_status(&self) -> u16 {
        match self {
            EngineError::NotFound { .. } => 404,
            EngineError::Conflict { .. } => 409,
            EngineError::BadRequest { .. } => 400,
            EngineError::Forbidden { .. } => 403,
            EngineError::Unauthenticated { .. } => 401,
            EngineError::Unimplemented { .. } => 501,
            EngineError::ProviderTransient { .. } => 502,
            EngineError::ProviderPermanent { status, .. } => match status {
                403 => 403,
                404 => 404,
                _ => 502,
            },
            EngineError::Cancelled => 499,
            EngineError::Internal { .. } => 500,
        }
    }

    /// A stable machine-readable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "not_found",
            EngineError::Conflict { .. } => "conflict",
            EngineError::BadRequest { .. } => "bad_request",
            EngineError::Forbidden { .. } => "forbidden",
            EngineError::Unauthenticated { .. } => "unauthenticated",
            EngineError::Unimplemented { .. } => "unimplemented",
            EngineError::ProviderTransient { .. } => "provider_transient",
            EngineError::ProviderPermanent { .. } => "provider_permanent",
            EngineError::Cancelled => "cancelled",
            EngineError::Internal { .. } => "internal",
        }
    }

    /// True when the error signals a missing object or path.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::NotFound { .. } | EngineError::ProviderPermanent { status: 404, .. }
        )
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        let status = e.status().map(|s| s.as_u16()).unwrap_or(0);
        EngineError::from_provider(status, e.to_string())
    }
}

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_classification() {
        assert!(matches!(
            EngineError::from_provider(503, "slow down"),
            EngineError::ProviderTransient { status: 503, .. }
        ));
        assert!(matches!(
            EngineError::from_provider(429, "throttled"),
            EngineError::ProviderTransient { status: 429, .. }
        ));
        assert!(matches!(
            EngineError::from_provider(404, "no such key"),
            EngineError::ProviderPermanent { status: 404, .. }
        ));
        assert!(matches!(
            EngineError::from_provider(0, "connection reset"),
            EngineError::ProviderTransient { status: 0, .. }
        ));
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(EngineError::not_found("x").http_status(), 404);
        assert_eq!(EngineError::conflict("x").http_status(), 409);
        assert_eq!(EngineError::bad_request("x").http_status(), 400);
        assert_eq!(EngineError::unimplemented("s3", "Multipart").http_status(), 501);
        assert_eq!(EngineError::from_provider(404, "x").http_status(), 404);
        assert_eq!(EngineError::from_provider(500, "x").http_status(), 502);
    }

    #[test]
    fn test_unimplemented_message() {
        let e = EngineError::unimplemented("s3", "Presigned");
        assert_eq!(e.to_string(), "storage driver s3 does not support Presigned");
    }
}
