//! The compiled, immutable execution graph.

use std::collections::HashMap;

use crate::error::GraphResult;
use crate::graph::{GraphBuilder, OutcomeKind, StepKind};

/// Index of a step within a compiled graph.
pub type StepId = usize;

/// A compiled step: a free-form name plus fixed execution semantics.
#[derive(Debug, Clone)]
pub struct CompiledStep {
    pub name: String,
    pub kind: StepKind,
}

/// An immutable directed workflow of steps with outcome-keyed edges.
///
/// Built once by [`GraphBuilder`] and shared read-only across jobs; all
/// mutation during execution happens in the `ExtractionState`, never here.
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    steps: Vec<CompiledStep>,
    edges: HashMap<(StepId, OutcomeKind), StepId>,
    entry: StepId,
    max_attempts: u32,
}

impl ExecutionGraph {
    pub(crate) fn from_parts(
        steps: Vec<CompiledStep>,
        edges: HashMap<(StepId, OutcomeKind), StepId>,
        entry: StepId,
        max_attempts: u32,
    ) -> Self {
        Self {
            steps,
            edges,
            entry,
            max_attempts,
        }
    }

    /// Build the canonical extraction graph:
    /// validate → dispatch → extract → normalize → finalize, failures to
    /// fail, bounded retry self-loop on extract.
    pub fn standard(max_attempts: u32) -> GraphResult<Self> {
        GraphBuilder::new()
            .step("validate", StepKind::Validate)
            .step("dispatch", StepKind::Dispatch)
            .step("extract", StepKind::Extract)
            .step("normalize", StepKind::Normalize)
            .step("finalize", StepKind::Finalize)
            .step("fail", StepKind::Fail)
            .entry("validate")
            .edge("validate", OutcomeKind::Ok, "dispatch")
            .edge("validate", OutcomeKind::Permanent, "fail")
            .edge("dispatch", OutcomeKind::Ok, "extract")
            .edge("dispatch", OutcomeKind::Permanent, "fail")
            .edge("extract", OutcomeKind::Ok, "normalize")
            .edge("extract", OutcomeKind::Retryable, "extract")
            .edge("extract", OutcomeKind::Permanent, "fail")
            .edge("normalize", OutcomeKind::Ok, "finalize")
            .compile(max_attempts)
    }

    /// The entry step.
    pub fn entry(&self) -> StepId {
        self.entry
    }

    /// Look up a step by id.
    ///
    /// Step ids originate from this graph, so the index is always valid.
    pub fn step(&self, id: StepId) -> &CompiledStep {
        &self.steps[id]
    }

    /// Follow the edge for `(step, outcome)`.
    ///
    /// `None` means the outcome has no edge - a contract violation when it
    /// occurs at execution time, since compilation guarantees coverage of
    /// every producible outcome.
    pub fn next(&self, step: StepId, outcome: OutcomeKind) -> Option<StepId> {
        self.edges.get(&(step, outcome)).copied()
    }

    /// The configured retry ceiling.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Number of steps.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_graph_edges() {
        let graph = ExecutionGraph::standard(3).unwrap();

        let entry = graph.entry();
        assert_eq!(graph.step(entry).kind, StepKind::Validate);

        let dispatch = graph.next(entry, OutcomeKind::Ok).unwrap();
        assert_eq!(graph.step(dispatch).kind, StepKind::Dispatch);

        let extract = graph.next(dispatch, OutcomeKind::Ok).unwrap();
        assert_eq!(graph.step(extract).kind, StepKind::Extract);

        // Retry self-loop
        assert_eq!(graph.next(extract, OutcomeKind::Retryable), Some(extract));

        let normalize = graph.next(extract, OutcomeKind::Ok).unwrap();
        assert_eq!(graph.step(normalize).kind, StepKind::Normalize);

        let finalize = graph.next(normalize, OutcomeKind::Ok).unwrap();
        assert_eq!(graph.step(finalize).kind, StepKind::Finalize);
        assert!(graph.step(finalize).kind.is_terminal());

        let fail = graph.next(extract, OutcomeKind::Permanent).unwrap();
        assert_eq!(graph.step(fail).kind, StepKind::Fail);

        // Terminal steps have no outgoing edges
        assert_eq!(graph.next(finalize, OutcomeKind::Ok), None);
        assert_eq!(graph.next(fail, OutcomeKind::Ok), None);
    }
}
