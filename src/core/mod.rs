/*!
 * Core routing pipeline
 */

pub mod broadcast;
pub mod case;
pub mod decode;
pub mod pipeline;
pub mod predicate;
pub mod sink;
pub mod source;

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::backend::ObjectRef;

pub use case::{BranchStats, Case, CaseEvaluator};
pub use pipeline::{Pipeline, PipelineState, RunOutcome};
pub use predicate::{
    predicate_fn, ExpressionEngine, ExpressionPredicate, Predicate, PredicateError,
    PredicateRegistry,
};
pub use sink::{DurableTarget, SinkMode};
pub use source::{open_source, RecordStream};

/// A record shared read-only by every branch
pub type Record = Arc<Value>;

/// What one case produced
///
/// Serializes as either the array of matching records or the stored
/// object's URI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BranchOutput {
    Records(Vec<Value>),
    Stored(ObjectRef),
}

impl BranchOutput {
    /// Matching records, when kept in memory
    pub fn records(&self) -> Option<&[Value]> {
        match self {
            BranchOutput::Records(records) => Some(records),
            BranchOutput::Stored(_) => None,
        }
    }

    /// Stored object, when written to a durable destination
    pub fn stored(&self) -> Option<&ObjectRef> {
        match self {
            BranchOutput::Records(_) => None,
            BranchOutput::Stored(object) => Some(object),
        }
    }
}
