//! Declarative graph construction with build-time validation.
//!
//! Building with missing edges, invalid self-loops, cycles, or an unbounded
//! retry configuration fails at compile time, not at execution time.

use std::collections::HashMap;

use crate::error::{GraphError, GraphResult};
use crate::graph::compiled::{CompiledStep, ExecutionGraph, StepId};
use crate::graph::{OutcomeKind, StepKind};

#[derive(Debug, Clone)]
struct StepDef {
    name: String,
    kind: StepKind,
}

#[derive(Debug, Clone)]
struct EdgeDef {
    from: String,
    outcome: OutcomeKind,
    to: String,
}

/// Builder for an [`ExecutionGraph`].
///
/// # Example
///
/// ```rust,ignore
/// let graph = GraphBuilder::new()
///     .step("validate", StepKind::Validate)
///     .step("dispatch", StepKind::Dispatch)
///     .step("extract", StepKind::Extract)
///     .step("normalize", StepKind::Normalize)
///     .step("finalize", StepKind::Finalize)
///     .step("fail", StepKind::Fail)
///     .entry("validate")
///     .edge("validate", OutcomeKind::Ok, "dispatch")
///     // ...
///     .compile(3)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    steps: Vec<StepDef>,
    edges: Vec<EdgeDef>,
    entry: Option<String>,
}

impl GraphBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a named step.
    pub fn step(mut self, name: impl Into<String>, kind: StepKind) -> Self {
        self.steps.push(StepDef {
            name: name.into(),
            kind,
        });
        self
    }

    /// Declare an edge from `from` to `to`, taken when `from` produces
    /// `outcome`.
    pub fn edge(
        mut self,
        from: impl Into<String>,
        outcome: OutcomeKind,
        to: impl Into<String>,
    ) -> Self {
        self.edges.push(EdgeDef {
            from: from.into(),
            outcome,
            to: to.into(),
        });
        self
    }

    /// Set the entry step.
    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Validate and compile the graph.
    ///
    /// `max_attempts` bounds the extract retry self-loop; zero is rejected
    /// when a retry loop exists.
    pub fn compile(self, max_attempts: u32) -> GraphResult<ExecutionGraph> {
        // Step names must be unique.
        let mut index: HashMap<String, StepId> = HashMap::new();
        for (i, step) in self.steps.iter().enumerate() {
            if index.insert(step.name.clone(), i).is_some() {
                return Err(GraphError::DuplicateStep(step.name.clone()));
            }
        }

        // Every required kind must be present.
        for kind in [
            StepKind::Validate,
            StepKind::Dispatch,
            StepKind::Extract,
            StepKind::Normalize,
            StepKind::Finalize,
            StepKind::Fail,
        ] {
            if !self.steps.iter().any(|s| s.kind == kind) {
                return Err(GraphError::MissingStepKind(kind.name()));
            }
        }

        let entry_name = self.entry.ok_or(GraphError::MissingEntry)?;
        let entry = *index
            .get(&entry_name)
            .ok_or_else(|| GraphError::UnknownStep(entry_name.clone()))?;

        // Resolve edges into the (step, outcome) table.
        let mut edges: HashMap<(StepId, OutcomeKind), StepId> = HashMap::new();
        let mut has_retry_loop = false;

        for edge in &self.edges {
            let from = *index
                .get(&edge.from)
                .ok_or_else(|| GraphError::UnknownStep(edge.from.clone()))?;
            let to = *index
                .get(&edge.to)
                .ok_or_else(|| GraphError::UnknownStep(edge.to.clone()))?;

            let from_kind = self.steps[from].kind;
            if !from_kind.producible_outcomes().contains(&edge.outcome) {
                return Err(GraphError::InvalidEdge {
                    step: edge.from.clone(),
                    outcome: edge.outcome,
                });
            }

            if from == to {
                // The bounded retry transition is the only permitted self-loop.
                if from_kind != StepKind::Extract || edge.outcome != OutcomeKind::Retryable {
                    return Err(GraphError::InvalidSelfLoop(edge.from.clone()));
                }
                has_retry_loop = true;
            }

            if edges.insert((from, edge.outcome), to).is_some() {
                return Err(GraphError::DuplicateEdge {
                    step: edge.from.clone(),
                    outcome: edge.outcome,
                });
            }
        }

        // Every producible outcome of every step needs an edge.
        for (i, step) in self.steps.iter().enumerate() {
            for outcome in step.kind.producible_outcomes() {
                if !edges.contains_key(&(i, *outcome)) {
                    return Err(GraphError::MissingEdge {
                        step: step.name.clone(),
                        outcome: *outcome,
                    });
                }
            }
        }

        if has_retry_loop && max_attempts == 0 {
            let extract = self
                .steps
                .iter()
                .find(|s| s.kind == StepKind::Extract)
                .map(|s| s.name.clone())
                .unwrap_or_else(|| "extract".to_string());
            return Err(GraphError::UnboundedRetry(extract));
        }

        // Acyclicity check ignoring the retry self-loop.
        detect_cycles(&self.steps, &edges)?;

        let steps = self
            .steps
            .into_iter()
            .map(|s| CompiledStep {
                name: s.name,
                kind: s.kind,
            })
            .collect();

        Ok(ExecutionGraph::from_parts(steps, edges, entry, max_attempts))
    }
}

/// Depth-first cycle detection over the edge table, skipping self-loops
/// (the only permitted one was already checked to be the retry transition).
fn detect_cycles(
    steps: &[StepDef],
    edges: &HashMap<(StepId, OutcomeKind), StepId>,
) -> GraphResult<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    fn visit(
        node: StepId,
        steps: &[StepDef],
        adjacency: &[Vec<StepId>],
        marks: &mut [Mark],
    ) -> GraphResult<()> {
        match marks[node] {
            Mark::Done => return Ok(()),
            Mark::InProgress => return Err(GraphError::CycleDetected(steps[node].name.clone())),
            Mark::Unvisited => {}
        }
        marks[node] = Mark::InProgress;
        for &next in &adjacency[node] {
            visit(next, steps, adjacency, marks)?;
        }
        marks[node] = Mark::Done;
        Ok(())
    }

    let mut adjacency: Vec<Vec<StepId>> = vec![Vec::new(); steps.len()];
    for (&(from, _), &to) in edges {
        if from != to {
            adjacency[from].push(to);
        }
    }

    let mut marks = vec![Mark::Unvisited; steps.len()];
    for node in 0..steps.len() {
        visit(node, steps, &adjacency, &mut marks)?;
    }
    Ok(())
}
