//! Content-type derivation and the executable upload guard.

use crate::error::{EngineError, Result};

/// Extensions whose MIME group is considered executable. Uploads with these
/// extensions are rejected outright. The set is closed; embedders cannot
/// widen or narrow it.
pub const EXECUTABLE_EXTENSIONS: &[&str] = &[
    "exe", "dll", "msi", "com", "bat", "cmd", "scr", "ps1", "sh", "jar", "apk", "vbs",
];

/// Fallback content type when nothing better is known.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Content type used for zero-byte directory markers.
pub const DIRECTORY_CONTENT_TYPE: &str = "application/x-directory";

/// Lower-case extension of a file name, if any.
fn extension(file_name: &str) -> Option<String> {
    file_name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())
}

/// True when the file name belongs to the executable MIME group.
pub fn is_executable(file_name: &str) -> bool {
    extension(file_name)
        .map(|ext| EXECUTABLE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Derive the content type for an upload from the file name and any
/// caller-provided MIME, rejecting executable types.
pub fn resolve_content_type(file_name: &str, provided: Option<&str>) -> Result<String> {
    if is_executable(file_name) {
        return Err(EngineError::forbidden(format!(
            "uploads of executable file type are not allowed: {file_name}"
        )));
    }
    if let Some(mime) = provided {
        if !mime.trim().is_empty() {
            return Ok(mime.trim().to_string());
        }
    }
    Ok(mime_guess::from_path(file_name)
        .first_raw()
        .unwrap_or(OCTET_STREAM)
        .to_string())
}
