//! `DavDirEntry` for engine listing items.

use dav_server::fs::{DavDirEntry, DavMetaData, FsFuture};
use strata_core::types::ListingItem;

use crate::metadata::StrataMetaData;

/// One directory entry served over WebDAV.
#[derive(Debug, Clone)]
pub struct StrataDirEntry {
    item: ListingItem,
}

impl StrataDirEntry {
    /// Wrap a listing item.
    pub fn new(item: ListingItem) -> Self {
        Self { item }
    }
}

impl DavDirEntry for StrataDirEntry {
    fn name(&self) -> Vec<u8> {
        self.item.name.as_bytes().to_vec()
    }

    fn metadata(&self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        Box::pin(async move {
            Ok(Box::new(StrataMetaData::from_item(&self.item)) as Box<dyn DavMetaData>)
        })
    }
}
