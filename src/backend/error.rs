//! Error types for the storage collaborators
//!
//! Raised by object stores while opening inputs or uploading branch outputs.
//! The pipeline turns them into `SwitchError::Source` or `SwitchError::Sink`
//! depending on which side of the run failed.

use std::fmt;
use std::io;

/// Result type alias for backend operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Unified error type for backend operations
#[derive(Debug)]
pub enum BackendError {
    /// I/O error occurred during backend operation
    Io(io::Error),

    /// Object or file not found on backend
    NotFound { location: String, backend: String },

    /// Location string could not be parsed
    InvalidLocation { location: String, reason: String },

    /// Invalid configuration for backend
    InvalidConfig { backend: String, message: String },

    /// Backend operation not supported (or backend not compiled in)
    Unsupported { backend: String, operation: String },

    /// Upload was rejected or could not be completed
    UploadFailed { backend: String, message: String },

    /// Generic backend error with context
    Other { backend: String, message: String },
}

impl BackendError {
    /// Check if this error indicates the resource was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound { .. })
    }

    /// Get the backend name associated with this error, if any
    pub fn backend_name(&self) -> Option<&str> {
        match self {
            BackendError::NotFound { backend, .. } => Some(backend),
            BackendError::InvalidConfig { backend, .. } => Some(backend),
            BackendError::Unsupported { backend, .. } => Some(backend),
            BackendError::UploadFailed { backend, .. } => Some(backend),
            BackendError::Other { backend, .. } => Some(backend),
            _ => None,
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Io(err) => write!(f, "I/O error: {}", err),
            BackendError::NotFound { location, backend } => {
                write!(f, "Not found on {}: {}", backend, location)
            }
            BackendError::InvalidLocation { location, reason } => {
                write!(f, "Invalid location '{}': {}", location, reason)
            }
            BackendError::InvalidConfig { backend, message } => {
                write!(f, "Invalid configuration for {}: {}", backend, message)
            }
            BackendError::Unsupported { backend, operation } => {
                write!(
                    f,
                    "Operation '{}' not supported by backend {}",
                    operation, backend
                )
            }
            BackendError::UploadFailed { backend, message } => {
                write!(f, "Upload to {} failed: {}", backend, message)
            }
            BackendError::Other { backend, message } => {
                write!(f, "{} error: {}", backend, message)
            }
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackendError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for BackendError {
    fn from(err: io::Error) -> Self {
        BackendError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = BackendError::NotFound {
            location: "s3://bucket/key".to_string(),
            backend: "s3".to_string(),
        };
        assert_eq!(err.to_string(), "Not found on s3: s3://bucket/key");
        assert!(err.is_not_found());
        assert_eq!(err.backend_name(), Some("s3"));
    }

    #[test]
    fn test_io_conversion() {
        let err: BackendError = io::Error::new(io::ErrorKind::PermissionDenied, "nope").into();
        assert!(matches!(err, BackendError::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.backend_name(), None);
    }
}
