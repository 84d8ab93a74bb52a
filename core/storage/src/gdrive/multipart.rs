//! `multipart/related` body encoding for Drive uploads.
//!
//! The body always has exactly two parts: JSON metadata first, file content
//! second. The boundary is random per body and is regenerated until it does
//! not occur in either part.

use bytes::{BufMut, Bytes, BytesMut};
use serde_json::Value;
use uuid::Uuid;

/// Content type used when the caller does not know the file's type.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// An encoded multipart body with the boundary it was built with.
#[derive(Debug, Clone)]
pub struct MultipartBody {
    boundary: String,
    body: Bytes,
}

impl MultipartBody {
    /// Encode metadata and content into a single body.
    ///
    /// `content_type` falls back to [`DEFAULT_CONTENT_TYPE`] when `None` or blank.
    pub fn encode(metadata: &Value, content: &[u8], content_type: Option<&str>) -> Self {
        let metadata = metadata.to_string();
        let content_type = content_type
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);

        let mut boundary = random_boundary();
        while contains(metadata.as_bytes(), boundary.as_bytes())
            || contains(content, boundary.as_bytes())
        {
            boundary = random_boundary();
        }

        let mut body = BytesMut::with_capacity(metadata.len() + content.len() + 256);

        body.put_slice(format!("--{}\r\n", boundary).as_bytes());
        body.put_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.put_slice(metadata.as_bytes());
        body.put_slice(b"\r\n");

        body.put_slice(format!("--{}\r\n", boundary).as_bytes());
        body.put_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.put_slice(content);
        body.put_slice(b"\r\n");

        body.put_slice(format!("--{}--\r\n", boundary).as_bytes());

        Self {
            boundary,
            body: body.freeze(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the request's `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/related; boundary={}", self.boundary)
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.body
    }
}

fn random_boundary() -> String {
    format!("accredify_{}", Uuid::new_v4().simple())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

/// Split a `multipart/related` body into `(headers, payload)` pairs.
///
/// Used by tests to inspect what was sent on the wire.
pub fn split_parts<'a>(body: &'a [u8], boundary: &str) -> Vec<(&'a [u8], &'a [u8])> {
    let delimiter = format!("--{}", boundary);
    let delimiter = delimiter.as_bytes();

    let mut positions = Vec::new();
    let mut i = 0;
    while i + delimiter.len() <= body.len() {
        if &body[i..i + delimiter.len()] == delimiter {
            positions.push(i);
            i += delimiter.len();
        } else {
            i += 1;
        }
    }

    let mut parts = Vec::new();
    for pair in positions.windows(2) {
        let start = pair[0] + delimiter.len();
        let end = pair[1];
        let Some(segment) = body.get(start..end) else {
            continue;
        };
        let segment = segment.strip_prefix(b"\r\n").unwrap_or(segment);
        let segment = segment.strip_suffix(b"\r\n").unwrap_or(segment);
        if let Some(split) = segment.windows(4).position(|w| w == b"\r\n\r\n") {
            parts.push((&segment[..split], &segment[split + 4..]));
        }
    }
    parts
}
