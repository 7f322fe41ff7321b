//! Minimal parsing for the handful of S3 XML shapes the driver consumes.
//!
//! S3 responses are small, flat documents with a fixed vocabulary; a cursor
//! scanner over tag pairs is enough and keeps repeated blocks (`<Contents>`,
//! `<Part>`) correctly separated.

use chrono::{DateTime, Utc};

/// Decode the five standard XML entities.
fn unescape(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    input
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Escape text for embedding in a request body.
fn escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// The inner text of the first `<tag>...</tag>` pair in `xml`.
pub fn text_of(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(unescape(xml[start..end].trim()))
}

/// The inner text of every `<tag>...</tag>` pair, in document order.
/// Assumes the tag does not nest within itself, which holds for every S3
/// response shape.
pub fn blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut out = Vec::new();
    let mut cursor = 0;
    while let Some(rel_start) = xml[cursor..].find(&open) {
        let start = cursor + rel_start + open.len();
        match xml[start..].find(&close) {
            Some(rel_end) => {
                out.push(&xml[start..start + rel_end]);
                cursor = start + rel_end + close.len();
            }
            None => break,
        }
    }
    out
}

/// One object from a `ListObjectsV2` page.
#[derive(Debug, Clone)]
pub struct ObjectSummary {
    /// Full object key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Last-modified timestamp.
    pub last_modified: Option<DateTime<Utc>>,
    /// Quote-stripped ETag.
    pub etag: Option<String>,
}

/// A parsed `ListObjectsV2` page.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// `<Contents>` entries.
    pub objects: Vec<ObjectSummary>,
    /// `<CommonPrefixes>` values, with their trailing delimiter intact.
    pub common_prefixes: Vec<String>,
    /// Continuation token for the next page, if the listing was truncated.
    pub next_token: Option<String>,
}

/// Parse a `ListObjectsV2` response body.
pub fn parse_list_page(xml: &str) -> ListPage {
    let mut page = ListPage::default();

    for block in blocks(xml, "Contents") {
        let Some(key) = text_of(block, "Key") else { continue };
        page.objects.push(ObjectSummary {
            key,
            size: text_of(block, "Size")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            last_modified: text_of(block, "LastModified")
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            etag: text_of(block, "ETag").map(|s| s.trim_matches('"').to_string()),
        });
    }

    for block in blocks(xml, "CommonPrefixes") {
        if let Some(prefix) = text_of(block, "Prefix") {
            page.common_prefixes.push(prefix);
        }
    }

    // IsTruncated guards against providers that echo a token on the last page.
    let truncated = text_of(xml, "IsTruncated").as_deref() == Some("true");
    if truncated {
        page.next_token = text_of(xml, "NextContinuationToken");
    }
    page
}

/// Upload id from an `InitiateMultipartUpload` response.
pub fn parse_upload_id(xml: &str) -> Option<String> {
    text_of(xml, "UploadId")
}

/// `(key, upload_id, initiated)` triples from a `ListMultipartUploads`
/// response.
pub fn parse_multipart_uploads(xml: &str) -> Vec<(String, String, Option<DateTime<Utc>>)> {
    blocks(xml, "Upload")
        .into_iter()
        .filter_map(|block| {
            let key = text_of(block, "Key")?;
            let upload_id = text_of(block, "UploadId")?;
            let initiated = text_of(block, "Initiated")
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc));
            Some((key, upload_id, initiated))
        })
        .collect()
}

/// `(part_number, size, etag, last_modified)` tuples from a `ListParts`
/// response.
pub fn parse_parts(xml: &str) -> Vec<(u32, u64, Option<String>, Option<DateTime<Utc>>)> {
    blocks(xml, "Part")
        .into_iter()
        .filter_map(|block| {
            let number: u32 = text_of(block, "PartNumber")?.parse().ok()?;
            let size: u64 = text_of(block, "Size")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            let etag = text_of(block, "ETag").map(|s| s.trim_matches('"').to_string());
            let modified = text_of(block, "LastModified")
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc));
            Some((number, size, etag, modified))
        })
        .collect()
}

/// Build the `CompleteMultipartUpload` request body.
pub fn complete_upload_body(parts: &[(u32, String)]) -> String {
    let mut xml = String::from("<CompleteMultipartUpload>");
    for (number, etag) in parts {
        xml.push_str(&format!(
            "<Part><PartNumber>{number}</PartNumber><ETag>{}</ETag></Part>",
            escape(etag)
        ));
    }
    xml.push_str("</CompleteMultipartUpload>");
    xml
}

/// Extract `(code, message)` from an S3 error body, when present.
pub fn parse_error(xml: &str) -> Option<(String, String)> {
    let code = text_of(xml, "Code")?;
    let message = text_of(xml, "Message").unwrap_or_default();
    Some((code, message))
}
