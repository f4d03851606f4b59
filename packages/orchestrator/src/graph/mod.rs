//! The execution graph - steps, outcome-keyed edges, and the builder.
//!
//! The graph is data, not behavior: steps are identified by index, edges live
//! in a `(step, outcome)` table, and all validation happens at build time.
//! Execution never mutates the graph; all mutation happens in the
//! `ExtractionState`.

pub mod builder;
pub mod compiled;

pub use builder::GraphBuilder;
pub use compiled::{CompiledStep, ExecutionGraph, StepId};

use serde::{Deserialize, Serialize};

/// Outcome category keying graph edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The step completed and execution advances.
    Ok,
    /// A transient failure that may be retried.
    Retryable,
    /// A terminal failure.
    Permanent,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OutcomeKind::Ok => "ok",
            OutcomeKind::Retryable => "retryable",
            OutcomeKind::Permanent => "permanent",
        };
        f.write_str(s)
    }
}

/// What a step does when the executor reaches it.
///
/// Step names in a graph are free-form; the kind fixes the semantics, which
/// is what makes graphs parametrizable without the executor inspecting names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Check the locator is well-formed for the source type.
    Validate,
    /// Resolve an agent from the registry; none means permanent failure.
    Dispatch,
    /// Invoke the agent's `attempt`. The only step that may self-loop.
    Extract,
    /// Reshape the agent payload into the canonical result schema.
    Normalize,
    /// Terminal: mark the source succeeded.
    Finalize,
    /// Terminal: mark the source failed with the pending error.
    Fail,
}

impl StepKind {
    /// The outcome categories this step kind can produce.
    pub fn producible_outcomes(self) -> &'static [OutcomeKind] {
        match self {
            StepKind::Validate | StepKind::Dispatch => {
                &[OutcomeKind::Ok, OutcomeKind::Permanent]
            }
            StepKind::Extract => &[
                OutcomeKind::Ok,
                OutcomeKind::Retryable,
                OutcomeKind::Permanent,
            ],
            StepKind::Normalize => &[OutcomeKind::Ok],
            StepKind::Finalize | StepKind::Fail => &[],
        }
    }

    /// Whether this step ends the walk.
    pub fn is_terminal(self) -> bool {
        matches!(self, StepKind::Finalize | StepKind::Fail)
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            StepKind::Validate => "validate",
            StepKind::Dispatch => "dispatch",
            StepKind::Extract => "extract",
            StepKind::Normalize => "normalize",
            StepKind::Finalize => "finalize",
            StepKind::Fail => "fail",
        }
    }
}
