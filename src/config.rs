/*!
 * Configuration types for Switchyard
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SwitchError};

#[cfg(feature = "s3-native")]
use crate::backend::S3Settings;

/// Default bound of each broadcaster-to-branch channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Default ceiling on waiting for sink uploads to be acknowledged
pub const DEFAULT_DURABILITY_TIMEOUT_MS: u64 = 25_000;

/// Runtime configuration for the router
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Records buffered per branch before the broadcaster waits
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// How long to wait for durable sinks before completing anyway
    #[serde(default = "default_durability_timeout_ms")]
    pub durability_timeout_ms: u64,

    /// Store that receives durable branch outputs
    #[serde(default)]
    pub destination_backend: DestinationBackend,

    /// Base directory for the local backend
    #[serde(default)]
    pub local_root: Option<PathBuf>,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,

    /// S3 client settings
    #[cfg(feature = "s3-native")]
    #[serde(default)]
    pub s3: S3Settings,
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_durability_timeout_ms() -> u64 {
    DEFAULT_DURABILITY_TIMEOUT_MS
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            durability_timeout_ms: DEFAULT_DURABILITY_TIMEOUT_MS,
            destination_backend: DestinationBackend::default(),
            local_root: None,
            log_level: LogLevel::default(),
            log_file: None,
            verbose: false,
            #[cfg(feature = "s3-native")]
            s3: S3Settings::default(),
        }
    }
}

impl RouterConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SwitchError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: RouterConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(SwitchError::Config(
                "channel_capacity must be greater than zero".to_string(),
            ));
        }

        #[cfg(feature = "s3-native")]
        self.s3
            .validate()
            .map_err(|e| SwitchError::Config(e.to_string()))?;

        Ok(())
    }

    pub fn durability_timeout(&self) -> Duration {
        Duration::from_millis(self.durability_timeout_ms)
    }
}

/// Store that receives durable branch outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DestinationBackend {
    /// S3 or an S3-compatible service (requires the `s3-native` feature)
    #[default]
    S3,
    /// Local filesystem, under `local_root`
    Local,
    /// In-process memory store
    Memory,
}

impl DestinationBackend {
    /// Registry scheme serving this destination
    pub fn scheme(&self) -> &'static str {
        match self {
            DestinationBackend::S3 => "s3",
            DestinationBackend::Local => "file",
            DestinationBackend::Memory => "memory",
        }
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}
