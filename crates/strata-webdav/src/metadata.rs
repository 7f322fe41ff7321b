//! `DavMetaData` for engine entries.

use std::time::SystemTime;

use dav_server::fs::{DavMetaData, FsError};
use strata_core::types::{FileInfo, ListingItem};

/// Metadata for a file or directory served over WebDAV.
#[derive(Debug, Clone)]
pub enum StrataMetaData {
    /// The namespace root or any directory.
    Directory {
        /// Modification time, when known.
        modified: Option<SystemTime>,
    },
    /// A regular file.
    File {
        /// File size in bytes.
        size: u64,
        /// Modification time, when known.
        modified: Option<SystemTime>,
    },
}

impl StrataMetaData {
    /// Root directory metadata.
    pub fn root() -> Self {
        StrataMetaData::Directory { modified: None }
    }

    /// Metadata for an in-progress write buffer.
    pub fn file_with_size(size: u64) -> Self {
        StrataMetaData::File { size, modified: Some(SystemTime::now()) }
    }

    /// Convert engine file info.
    pub fn from_info(info: &FileInfo) -> Self {
        let modified = info.modified.map(SystemTime::from);
        if info.is_directory {
            StrataMetaData::Directory { modified }
        } else {
            StrataMetaData::File { size: info.size.unwrap_or(0), modified }
        }
    }

    /// Convert a listing item.
    pub fn from_item(item: &ListingItem) -> Self {
        let modified = item.modified.map(SystemTime::from);
        if item.is_directory {
            StrataMetaData::Directory { modified }
        } else {
            StrataMetaData::File { size: item.size.unwrap_or(0), modified }
        }
    }
}

impl DavMetaData for StrataMetaData {
    fn len(&self) -> u64 {
        match self {
            StrataMetaData::Directory { .. } => 0,
            StrataMetaData::File { size, .. } => *size,
        }
    }

    fn modified(&self) -> Result<SystemTime, FsError> {
        // Object stores do not always report timestamps; WebDAV clients
        // need *something* for getlastmodified.
        let modified = match self {
            StrataMetaData::Directory { modified } | StrataMetaData::File { modified, .. } => {
                *modified
            }
        };
        Ok(modified.unwrap_or(SystemTime::UNIX_EPOCH))
    }

    fn is_dir(&self) -> bool {
        matches!(self, StrataMetaData::Directory { .. })
    }

    fn is_file(&self) -> bool {
        matches!(self, StrataMetaData::File { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_is_directory() {
        let meta = StrataMetaData::root();
        assert!(meta.is_dir());
        assert!(!meta.is_file());
        assert_eq!(meta.len(), 0);
    }

    #[test]
    fn test_file_metadata() {
        let meta = StrataMetaData::file_with_size(1024);
        assert!(meta.is_file());
        assert_eq!(meta.len(), 1024);
        assert!(meta.modified().is_ok());
    }
}
