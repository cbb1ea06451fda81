//! Input location parsing
//!
//! Supported formats:
//! - `s3://bucket/key` or `https://s3.amazonaws.com/bucket/key`, optionally
//!   followed by `?offset=N&length=M` to read a byte window
//! - `file:///path/to/input.json`
//! - `memory://container/key` (in-process store)
//! - anything else is treated as a local filesystem path

use super::error::{BackendError, BackendResult};
use super::types::ByteRange;
use regex::Regex;
use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

fn s3_pattern() -> &'static Regex {
    static RX_S3: OnceLock<Regex> = OnceLock::new();
    RX_S3.get_or_init(|| {
        Regex::new(
            r"(?i)^(?:s3://|https://s3\.amazonaws\.com/)([^/]+)/([^?]+)(?:\?offset=(\d+)&length=(\d+))?$",
        )
        .expect("static S3 location pattern is valid")
    })
}

fn memory_pattern() -> &'static Regex {
    static RX_MEMORY: OnceLock<Regex> = OnceLock::new();
    RX_MEMORY.get_or_init(|| {
        Regex::new(r"^memory://([^/]+)/(.+)$").expect("static memory location pattern is valid")
    })
}

/// A parsed external input reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Object in S3 or an S3-compatible store
    S3 {
        bucket: String,
        key: String,
        range: Option<ByteRange>,
    },

    /// Local file
    File(PathBuf),

    /// Object held by an in-process `MemoryBackend`
    Memory { container: String, key: String },
}

impl Location {
    /// Parse a location string
    pub fn parse(raw: &str) -> BackendResult<Self> {
        if raw.trim().is_empty() {
            return Err(BackendError::InvalidLocation {
                location: raw.to_string(),
                reason: "location must be a non-empty string".to_string(),
            });
        }

        if let Some(caps) = s3_pattern().captures(raw) {
            let range = match (caps.get(3), caps.get(4)) {
                (Some(offset), Some(length)) => {
                    let range = ByteRange {
                        offset: parse_number(raw, offset.as_str())?,
                        length: parse_number(raw, length.as_str())?,
                    };
                    if range.last_byte().is_none() {
                        return Err(BackendError::InvalidLocation {
                            location: raw.to_string(),
                            reason: "byte range is empty or out of bounds".to_string(),
                        });
                    }
                    Some(range)
                }
                _ => None,
            };
            return Ok(Location::S3 {
                bucket: caps[1].to_string(),
                key: caps[2].to_string(),
                range,
            });
        }

        if let Some(caps) = memory_pattern().captures(raw) {
            return Ok(Location::Memory {
                container: caps[1].to_string(),
                key: caps[2].to_string(),
            });
        }

        if let Some(path) = raw.strip_prefix("file://") {
            return Ok(Location::File(PathBuf::from(path)));
        }

        if raw.contains("://") {
            return Err(BackendError::InvalidLocation {
                location: raw.to_string(),
                reason: "unrecognized location scheme".to_string(),
            });
        }

        Ok(Location::File(PathBuf::from(raw)))
    }

    /// Scheme used to pick a backend from the registry
    pub fn scheme(&self) -> &'static str {
        match self {
            Location::S3 { .. } => "s3",
            Location::File(_) => "file",
            Location::Memory { .. } => "memory",
        }
    }
}

fn parse_number(raw: &str, digits: &str) -> BackendResult<u64> {
    digits.parse().map_err(|_| BackendError::InvalidLocation {
        location: raw.to_string(),
        reason: format!("byte offset '{}' out of range", digits),
    })
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::S3 { bucket, key, range } => {
                write!(f, "s3://{}/{}", bucket, key)?;
                if let Some(range) = range {
                    write!(f, "?offset={}&length={}", range.offset, range.length)?;
                }
                Ok(())
            }
            Location::File(path) => write!(f, "file://{}", path.display()),
            Location::Memory { container, key } => write!(f, "memory://{}/{}", container, key),
        }
    }
}
