/*!
 * Switchyard - streaming switch router for JSON records
 *
 * Reads one stream of records and routes every record to each of N cases:
 * - Cases filter with sandboxed expressions or registered Rust predicates
 * - `alwaysRun` cases take everything, default cases take the leftovers
 * - Every branch runs concurrently behind a bounded broadcast channel
 * - Branch outputs are returned inline or streamed to an object store
 *   (local filesystem, memory, S3)
 *
 * ```no_run
 * use serde_json::json;
 * use switchyard::{CaseConfig, InputSpec, RouterConfig, SwitchRequest, SwitchRouter};
 *
 * # async fn demo() -> switchyard::Result<()> {
 * let router = SwitchRouter::new(RouterConfig::default());
 * let request = SwitchRequest::new(
 *     InputSpec::Records(vec![json!({"lastName": "Doe"}), json!({"lastName": "Smith"})]),
 *     vec![
 *         CaseConfig::expression(r#"x.lastName == "Doe""#),
 *         CaseConfig::default_case(),
 *     ],
 * );
 * let response = router.handle(request).await?;
 * assert_eq!(response.data.len(), 2);
 * # Ok(())
 * # }
 * ```
 */

pub mod backend;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod request;
pub mod router;

// Re-export commonly used types
pub use config::{DestinationBackend, LogLevel, RouterConfig};
pub use core::{BranchOutput, BranchStats, Case, Pipeline, PipelineState, RunOutcome};
pub use error::{Result, SwitchError};
pub use request::{CaseConfig, DestinationConfig, InputSpec, SwitchRequest, SwitchResponse};
pub use router::SwitchRouter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
