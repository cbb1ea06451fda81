//! Record sources
//!
//! Opens the request's input as a lazy, single-pass stream of records.

use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;

use super::decode::decode_array;
use super::Record;
use crate::backend::{BackendRegistry, Location};
use crate::error::{Result, SwitchError};
use crate::request::InputSpec;

/// Lazy sequence of records; the first error ends it
pub type RecordStream = BoxStream<'static, Result<Record>>;

/// Open the input described by `input`
///
/// Literal arrays are served from memory. Locations are resolved through
/// the registry by scheme and decoded incrementally as a JSON array.
pub async fn open_source(input: &InputSpec, backends: &BackendRegistry) -> Result<RecordStream> {
    match input {
        InputSpec::Records(records) => {
            if records.is_empty() {
                return Err(SwitchError::Source(
                    "input must be a non-empty array or a location".to_string(),
                ));
            }
            Ok(from_records(records.clone()))
        }
        InputSpec::Location(raw) => {
            let location = Location::parse(raw).map_err(SwitchError::source)?;
            let store = backends
                .get(location.scheme())
                .map_err(SwitchError::source)?;

            tracing::debug!(
                "Reading input from {} via {} backend",
                location,
                store.backend_name()
            );

            let bytes = store.read(&location).await.map_err(SwitchError::source)?;
            Ok(decode_array(bytes)
                .map(|item| item.map(Arc::new).map_err(SwitchError::source))
                .boxed())
        }
    }
}

/// Serve an in-memory list of records
pub fn from_records(records: Vec<serde_json::Value>) -> RecordStream {
    stream::iter(records.into_iter().map(|r| Ok(Arc::new(r)))).boxed()
}
