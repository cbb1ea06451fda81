//! Common types for the storage collaborators

use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use std::fmt;
use std::pin::Pin;

/// Async stream of object bytes
pub type ReadStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Body handed to an upload; the stream ends when the producer is done
pub type UploadBody = Pin<Box<dyn Stream<Item = Bytes> + Send>>;

/// Default content type for uploaded branch outputs
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Byte window of an object, `offset .. offset + length`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    /// Index of the last byte in the window, or `None` when the window is
    /// empty or runs past `u64::MAX`
    pub fn last_byte(&self) -> Option<u64> {
        self.length
            .checked_sub(1)
            .and_then(|span| self.offset.checked_add(span))
    }

    /// HTTP `Range` header value. HTTP ranges are inclusive on both ends.
    ///
    /// A window without a last byte reads to the end of the object.
    pub fn to_http_header(&self) -> String {
        match self.last_byte() {
            Some(last) => format!("bytes={}-{}", self.offset, last),
            None => format!("bytes={}-", self.offset),
        }
    }
}

/// Where an upload should land
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectTarget {
    /// Bucket or container identifier
    pub container: String,
    /// Fully resolved object key
    pub key: String,
    /// MIME type recorded with the object
    pub content_type: String,
}

impl ObjectTarget {
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }

    /// Builder pattern: set content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

/// Reference to a durably stored object
///
/// Serializes as its URI (e.g. `s3://bucket/prefix/key`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub struct ObjectRef {
    pub scheme: String,
    pub container: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(
        scheme: impl Into<String>,
        container: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            container: container.into(),
            key: key.into(),
        }
    }

    pub fn uri(&self) -> String {
        format!("{}://{}/{}", self.scheme, self.container, self.key)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

impl From<ObjectRef> for String {
    fn from(object: ObjectRef) -> Self {
        object.uri()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_header_is_inclusive() {
        let range = ByteRange {
            offset: 100,
            length: 50,
        };
        assert_eq!(range.to_http_header(), "bytes=100-149");
    }

    #[test]
    fn test_range_without_last_byte() {
        let overflowing = ByteRange {
            offset: u64::MAX,
            length: 2,
        };
        assert_eq!(overflowing.last_byte(), None);
        let empty = ByteRange {
            offset: 7,
            length: 0,
        };
        assert_eq!(empty.last_byte(), None);
        let single = ByteRange {
            offset: u64::MAX,
            length: 1,
        };
        assert_eq!(single.to_http_header(), format!("bytes={}-{}", u64::MAX, u64::MAX));
    }

    #[test]
    fn test_object_ref_serializes_as_uri() {
        let object = ObjectRef::new("s3", "bucket", "out/abc");
        assert_eq!(object.to_string(), "s3://bucket/out/abc");
        assert_eq!(
            serde_json::to_value(&object).unwrap(),
            serde_json::json!("s3://bucket/out/abc")
        );
    }

    #[test]
    fn test_target_defaults_to_json() {
        let target = ObjectTarget::new("bucket", "key");
        assert_eq!(target.content_type, DEFAULT_CONTENT_TYPE);
        let target = target.with_content_type("application/x-ndjson");
        assert_eq!(target.content_type, "application/x-ndjson");
    }
}
