/*!
 * Case membership rules
 *
 * Each branch asks one question per record: does this record belong to my
 * case? The answer depends on the kind of case:
 *
 * - an `alwaysRun` case takes every record
 * - a default case takes a record only when no regular case takes it
 * - a regular case takes a record when its predicate is truthy
 *
 * A predicate that fails counts as "no" for that record on that case and
 * nothing else. Default cases re-evaluate the regular predicates themselves,
 * so no branch ever waits on another.
 */

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::predicate::{json_truthy, Predicate};

/// One case of a switch
#[derive(Clone, Default)]
pub struct Case {
    predicate: Option<Arc<dyn Predicate>>,
    always_run: bool,
    is_default: bool,
}

impl Case {
    /// Regular case filtered by `predicate`
    pub fn new(predicate: Arc<dyn Predicate>) -> Self {
        Self {
            predicate: Some(predicate),
            ..Default::default()
        }
    }

    /// Regular case with no predicate; records pass on their own truthiness
    pub fn accept_all() -> Self {
        Self::default()
    }

    pub fn always_run() -> Self {
        Self {
            always_run: true,
            ..Default::default()
        }
    }

    pub fn default_case() -> Self {
        Self {
            is_default: true,
            ..Default::default()
        }
    }

    /// Builder pattern: set the predicate
    pub fn with_predicate(mut self, predicate: Arc<dyn Predicate>) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn is_always_run(&self) -> bool {
        self.always_run
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// Regular cases are the ones a default case defers to
    pub fn is_regular(&self) -> bool {
        !self.always_run && !self.is_default
    }

    /// Apply this case's own predicate, ignoring the default rule
    fn predicate_passes(&self, record: &Value) -> Verdict {
        let Some(predicate) = &self.predicate else {
            return Verdict::from_bool(json_truthy(record));
        };

        match predicate.evaluate(record) {
            Ok(passed) => Verdict::from_bool(passed),
            Err(e) => {
                tracing::debug!("Predicate error treated as non-match: {}", e);
                Verdict::Error
            }
        }
    }
}

impl fmt::Debug for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Case")
            .field("has_predicate", &self.predicate.is_some())
            .field("always_run", &self.always_run)
            .field("is_default", &self.is_default)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Pass,
    Reject,
    Error,
}

impl Verdict {
    fn from_bool(passed: bool) -> Self {
        if passed {
            Verdict::Pass
        } else {
            Verdict::Reject
        }
    }
}

/// Decide whether `record` passes the case at `case_index`
pub fn evaluate(record: &Value, case_index: usize, cases: &[Case]) -> bool {
    CaseEvaluator::new(case_index, cases.iter().cloned().collect()).evaluate(record)
}

/// Per-branch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchStats {
    pub case_index: usize,
    /// Records delivered to the branch
    pub seen: u64,
    /// Records that passed the case
    pub passed: u64,
    /// Predicate failures recovered as non-matches
    pub predicate_errors: u64,
}

/// Evaluates one branch's case over a stream of records
#[derive(Debug, Clone)]
pub struct CaseEvaluator {
    case_index: usize,
    cases: Arc<[Case]>,
    stats: BranchStats,
}

impl CaseEvaluator {
    pub fn new(case_index: usize, cases: Arc<[Case]>) -> Self {
        debug_assert!(case_index < cases.len());
        Self {
            case_index,
            cases,
            stats: BranchStats {
                case_index,
                ..Default::default()
            },
        }
    }

    pub fn evaluate(&mut self, record: &Value) -> bool {
        self.stats.seen += 1;

        let case = &self.cases[self.case_index];
        let passed = if case.always_run {
            true
        } else if case.is_default {
            !self.any_regular_case_passes(record)
        } else {
            match case.predicate_passes(record) {
                Verdict::Pass => true,
                Verdict::Reject => false,
                Verdict::Error => {
                    self.stats.predicate_errors += 1;
                    false
                }
            }
        };

        if passed {
            self.stats.passed += 1;
        }
        passed
    }

    fn any_regular_case_passes(&mut self, record: &Value) -> bool {
        for (index, other) in self.cases.iter().enumerate() {
            if index == self.case_index || !other.is_regular() {
                continue;
            }
            match other.predicate_passes(record) {
                Verdict::Pass => return true,
                Verdict::Reject => {}
                Verdict::Error => self.stats.predicate_errors += 1,
            }
        }
        false
    }

    pub fn stats(&self) -> BranchStats {
        self.stats
    }
}
