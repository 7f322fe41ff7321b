//! Driver capability declarations.
//!
//! Every storage driver advertises a subset of the closed capability set.
//! The facade checks the required capability before any I/O and fails fast
//! with `Unimplemented` when it is missing. There is no reflective feature
//! probing anywhere: what a driver can do is exactly what it declares.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// A declared feature of a storage driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Listing, stat, download, search.
    Reader,
    /// Upload, directory creation, delete.
    Writer,
    /// Rename and server-side copy.
    Atomic,
    /// Presigned URL generation.
    Presigned,
    /// Provider multipart upload sessions.
    Multipart,
}

impl Capability {
    /// The capability name used in error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Reader => "Reader",
            Capability::Writer => "Writer",
            Capability::Atomic => "Atomic",
            Capability::Presigned => "Presigned",
            Capability::Multipart => "Multipart",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fail with `Unimplemented` unless `declared` contains `required`.
pub fn require(declared: &[Capability], required: Capability, storage_type: &str) -> Result<()> {
    if declared.contains(&required) {
        Ok(())
    } else {
        Err(EngineError::unimplemented(storage_type, required.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_present() {
        let caps = [Capability::Reader, Capability::Writer];
        assert!(require(&caps, Capability::Reader, "s3").is_ok());
    }

    #[test]
    fn test_require_missing() {
        let caps = [Capability::Reader];
        let err = require(&caps, Capability::Multipart, "s3").unwrap_err();
        assert_eq!(err.to_string(), "storage driver s3 does not support Multipart");
        assert_eq!(err.http_status(), 501);
    }
}
