/*!
 * Invocation request and response types
 *
 * A request names its input (a literal array or an external location), the
 * ordered list of cases, and optionally a durable destination:
 *
 * ```json
 * {
 *   "input": [{"id": 1, "lastName": "Doe"}],
 *   "cases": [
 *     {"expression": "x.lastName == \"Doe\""},
 *     {"default": true}
 *   ],
 *   "s3": {"bucketName": "results", "keyPrefix": "switch/"}
 * }
 * ```
 */

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::BranchOutput;
use crate::error::{Result, SwitchError};

/// Input specification: literal records or an external reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputSpec {
    Records(Vec<Value>),
    Location(String),
}

impl InputSpec {
    /// An empty location string counts as no input at all
    pub fn is_blank(&self) -> bool {
        matches!(self, InputSpec::Location(raw) if raw.trim().is_empty())
    }
}

/// One case as written in a request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseConfig {
    /// Sandboxed expression evaluated with the record bound as `x`
    #[serde(default)]
    pub expression: Option<String>,

    /// Name of a predicate registered with the router
    #[serde(default)]
    pub predicate: Option<String>,

    /// Pass every record regardless of predicate
    #[serde(default)]
    pub always_run: bool,

    /// Pass records that no regular case passed
    #[serde(default)]
    pub default: bool,
}

impl CaseConfig {
    pub fn expression(source: impl Into<String>) -> Self {
        Self {
            expression: Some(source.into()),
            ..Default::default()
        }
    }

    pub fn named(predicate: impl Into<String>) -> Self {
        Self {
            predicate: Some(predicate.into()),
            ..Default::default()
        }
    }

    pub fn always_run() -> Self {
        Self {
            always_run: true,
            ..Default::default()
        }
    }

    pub fn default_case() -> Self {
        Self {
            default: true,
            ..Default::default()
        }
    }
}

/// Durable destination for branch outputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationConfig {
    /// Bucket or container identifier
    #[serde(default, alias = "containerId")]
    pub bucket_name: Option<String>,

    /// Prefix for generated object keys
    #[serde(default)]
    pub key_prefix: Option<String>,

    /// Content type for stored outputs
    #[serde(default)]
    pub content_type: Option<String>,
}

/// A validated destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub container: String,
    pub key_prefix: String,
    pub content_type: Option<String>,
}

impl DestinationConfig {
    /// Both the container and the key prefix are required
    pub fn validate(&self) -> Result<Destination> {
        let container = self
            .bucket_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                SwitchError::Config("\"s3.bucketName\" argument is required".to_string())
            })?;
        let key_prefix = self
            .key_prefix
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                SwitchError::Config("\"s3.keyPrefix\" argument is required".to_string())
            })?;

        Ok(Destination {
            container: container.to_string(),
            key_prefix: key_prefix.to_string(),
            content_type: self.content_type.clone(),
        })
    }
}

/// Router invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchRequest {
    #[serde(default)]
    pub input: Option<InputSpec>,

    #[serde(default)]
    pub cases: Vec<CaseConfig>,

    #[serde(default, alias = "s3")]
    pub durable_destination: Option<DestinationConfig>,
}

impl SwitchRequest {
    pub fn new(input: InputSpec, cases: Vec<CaseConfig>) -> Self {
        Self {
            input: Some(input),
            cases,
            durable_destination: None,
        }
    }

    /// Builder pattern: store outputs under a durable destination
    pub fn with_destination(
        mut self,
        bucket_name: impl Into<String>,
        key_prefix: impl Into<String>,
    ) -> Self {
        self.durable_destination = Some(DestinationConfig {
            bucket_name: Some(bucket_name.into()),
            key_prefix: Some(key_prefix.into()),
            content_type: None,
        });
        self
    }

    /// Parse a request from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Router response: one output per case, in case order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchResponse {
    pub data: Vec<BranchOutput>,
}
