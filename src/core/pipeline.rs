/*!
 * Run coordinator
 *
 * Wires one source to N branches and collects their outputs:
 *
 * ```text
 * source ──▶ broadcaster ──┬──▶ branch 0: case evaluator ──▶ sink 0
 *                          ├──▶ branch 1: case evaluator ──▶ sink 1
 *                          └──▶ ...
 * ```
 *
 * Every branch runs as its own task. Once all branches have finished, the
 * coordinator waits for every durable sink to be acknowledged, bounded by a
 * single deadline for the whole run. The first branch failure aborts the
 * run and discards all partial outputs.
 */

use futures::future::try_join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::broadcast::{broadcast, Broadcast, BranchFeed};
use super::case::{BranchStats, Case, CaseEvaluator};
use super::sink::{PendingOutput, RecordSink, SinkMode};
use super::source::RecordStream;
use super::BranchOutput;
use crate::config::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_DURABILITY_TIMEOUT_MS};
use crate::error::{Result, SwitchError};
use crate::request::SwitchResponse;

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    Running,
    AwaitingDurability,
    Completed,
    Failed,
}

/// Result of a completed run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    /// One output per case, in case order
    pub outputs: Vec<BranchOutput>,
    /// One entry per case, in case order
    pub stats: Vec<BranchStats>,
    pub records_read: u64,
}

impl RunOutcome {
    pub fn into_response(self) -> SwitchResponse {
        SwitchResponse { data: self.outputs }
    }
}

/// A branch that consumed its whole feed
#[derive(Debug)]
struct FinishedBranch {
    stats: BranchStats,
    pending: PendingOutput,
}

/// One switch run over a fixed list of cases
#[derive(Debug)]
pub struct Pipeline {
    cases: Arc<[Case]>,
    sinks: SinkMode,
    channel_capacity: usize,
    durability_timeout: Duration,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(cases: Vec<Case>, sinks: SinkMode) -> Self {
        Self {
            cases: cases.into(),
            sinks,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            durability_timeout: Duration::from_millis(DEFAULT_DURABILITY_TIMEOUT_MS),
            state: PipelineState::Idle,
        }
    }

    /// Builder pattern: set the per-branch channel bound
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Builder pattern: set the durability deadline
    pub fn with_durability_timeout(mut self, timeout: Duration) -> Self {
        self.durability_timeout = timeout;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn transition(&mut self, next: PipelineState) {
        tracing::debug!("Pipeline {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Route every record of `source` through the cases
    ///
    /// A pipeline runs once; later calls fail with `SwitchError::Internal`.
    pub async fn run(&mut self, source: RecordStream) -> Result<RunOutcome> {
        if self.state != PipelineState::Idle {
            return Err(SwitchError::Internal(format!(
                "pipeline cannot run from state {:?}",
                self.state
            )));
        }

        let result = self.execute(source).await;
        match &result {
            Ok(outcome) => {
                self.transition(PipelineState::Completed);
                tracing::info!(
                    "Routed {} records through {} cases",
                    outcome.records_read,
                    outcome.outputs.len()
                );
            }
            Err(e) => {
                self.transition(PipelineState::Failed);
                tracing::error!("Run failed: {}", e);
            }
        }
        result
    }

    async fn execute(&mut self, source: RecordStream) -> Result<RunOutcome> {
        self.transition(PipelineState::Running);

        let branch_count = self.cases.len();
        if branch_count == 0 {
            return Ok(RunOutcome::default());
        }

        let Broadcast { feeds, producer } = broadcast(source, branch_count, self.channel_capacity);

        let mut branches = JoinSet::new();
        for (index, feed) in feeds.into_iter().enumerate() {
            let sink = self.sinks.open(index);
            branches.spawn(run_branch(index, Arc::clone(&self.cases), feed, sink));
        }

        // Dropping the join set on failure aborts the remaining branches
        let finished = match join_branches(&mut branches, branch_count).await {
            Ok(finished) => finished,
            Err(e) => {
                producer.abort();
                return Err(e);
            }
        };

        let records_read = producer
            .await
            .map_err(|e| SwitchError::Internal(format!("broadcaster task failed: {}", e)))??;

        self.transition(PipelineState::AwaitingDurability);
        let deadline = Instant::now() + self.durability_timeout;

        let mut stats = Vec::with_capacity(branch_count);
        let mut pending = Vec::with_capacity(branch_count);
        for branch in finished {
            tracing::debug!(
                "Case {}: {} of {} records passed ({} predicate errors)",
                branch.stats.case_index,
                branch.stats.passed,
                branch.stats.seen,
                branch.stats.predicate_errors
            );
            stats.push(branch.stats);
            pending.push(branch.pending.resolve(deadline));
        }
        let outputs = try_join_all(pending).await?;

        Ok(RunOutcome {
            outputs,
            stats,
            records_read,
        })
    }
}

async fn run_branch(
    index: usize,
    cases: Arc<[Case]>,
    mut feed: BranchFeed,
    mut sink: Box<dyn RecordSink>,
) -> Result<FinishedBranch> {
    let mut evaluator = CaseEvaluator::new(index, cases);

    while let Some(delivery) = feed.next().await {
        let record = delivery?;
        if evaluator.evaluate(&record) {
            sink.accept(record).await?;
        }
    }

    let pending = sink.finish().await?;
    Ok(FinishedBranch {
        stats: evaluator.stats(),
        pending,
    })
}

/// Collect finished branches in case order, failing on the first error
async fn join_branches(
    branches: &mut JoinSet<Result<FinishedBranch>>,
    branch_count: usize,
) -> Result<Vec<FinishedBranch>> {
    let mut slots: Vec<Option<FinishedBranch>> = (0..branch_count).map(|_| None).collect();

    while let Some(joined) = branches.join_next().await {
        let branch = joined
            .map_err(|e| SwitchError::Internal(format!("branch task failed: {}", e)))??;
        let index = branch.stats.case_index;
        slots[index] = Some(branch);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| SwitchError::Internal(format!("branch {} did not finish", index)))
        })
        .collect()
}
