//! Mapping engine errors onto the dav-server error vocabulary.

use dav_server::fs::FsError;
use strata_core::error::EngineError;

/// Convert an engine error to the `FsError` dav-server expects.
///
/// Takes ownership to compose with `.map_err()`.
#[allow(clippy::needless_pass_by_value)]
pub fn engine_error_to_fs_error(e: EngineError) -> FsError {
    match e {
        EngineError::NotFound { .. } => FsError::NotFound,
        EngineError::Conflict { .. } => FsError::Exists,
        EngineError::Forbidden { .. } | EngineError::Unauthenticated { .. } => FsError::Forbidden,
        EngineError::Unimplemented { .. } => FsError::NotImplemented,
        EngineError::ProviderPermanent { status: 404, .. } => FsError::NotFound,
        EngineError::ProviderPermanent { status: 403, .. } => FsError::Forbidden,
        EngineError::BadRequest { .. }
        | EngineError::ProviderTransient { .. }
        | EngineError::ProviderPermanent { .. }
        | EngineError::Cancelled
        | EngineError::Internal { .. } => FsError::GeneralFailure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            engine_error_to_fs_error(EngineError::not_found("x")),
            FsError::NotFound
        ));
        assert!(matches!(
            engine_error_to_fs_error(EngineError::conflict("x")),
            FsError::Exists
        ));
        assert!(matches!(
            engine_error_to_fs_error(EngineError::unimplemented("s3", "Atomic")),
            FsError::NotImplemented
        ));
        assert!(matches!(
            engine_error_to_fs_error(EngineError::from_provider(404, "gone")),
            FsError::NotFound
        ));
        assert!(matches!(
            engine_error_to_fs_error(EngineError::from_provider(500, "boom")),
            FsError::GeneralFailure
        ));
    }
}
