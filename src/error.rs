/*!
 * Error types for Switchyard
 */

use std::io;
use thiserror::Error;

use crate::backend::BackendError;

pub type Result<T> = std::result::Result<T, SwitchError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FATAL: i32 = 2;
pub const EXIT_CONFIG: i32 = 3;

/// Run-level errors. Any of these aborts the run and no result is produced.
#[derive(Error, Debug)]
pub enum SwitchError {
    /// Invalid invocation configuration (missing or malformed fields)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input could not be located, read or decoded
    #[error("Source error: {0}")]
    Source(String),

    /// A sink failed to write or upload its records
    #[error("Sink error for case {case_index}: {message}")]
    Sink { case_index: usize, message: String },

    /// I/O error outside of the source and sinks (request files, output files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Request or response (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A branch or broadcaster task panicked or was cancelled
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SwitchError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SwitchError::Config(_) => EXIT_CONFIG,
            _ => EXIT_FATAL,
        }
    }

    /// Wrap a storage error raised while reading the input
    pub fn source(err: impl std::fmt::Display) -> Self {
        SwitchError::Source(err.to_string())
    }

    /// Wrap a storage error raised while writing a branch's output
    pub fn sink(case_index: usize, err: impl std::fmt::Display) -> Self {
        SwitchError::Sink {
            case_index,
            message: err.to_string(),
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, SwitchError::Config(_))
    }

    pub fn is_source(&self) -> bool {
        matches!(self, SwitchError::Source(_))
    }

    pub fn is_sink(&self) -> bool {
        matches!(self, SwitchError::Sink { .. })
    }
}

impl From<toml::de::Error> for SwitchError {
    fn from(err: toml::de::Error) -> Self {
        SwitchError::Config(format!("Invalid config file: {}", err))
    }
}

impl From<BackendError> for SwitchError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::InvalidConfig { .. } | BackendError::Unsupported { .. } => {
                SwitchError::Config(err.to_string())
            }
            other => SwitchError::Source(other.to_string()),
        }
    }
}
