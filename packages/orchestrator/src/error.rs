//! Typed errors for the orchestration core.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.
//!
//! Failures that belong to a single source (validation, no capable agent,
//! agent-reported failures, timeouts, cancellation) are never returned from
//! these types: they are classified and recorded on the `Source` itself so
//! callers can distinguish data-quality problems from orchestration bugs.

use thiserror::Error;

use crate::graph::OutcomeKind;

/// Errors raised while compiling an execution graph.
///
/// All of these surface at build time. A graph that compiles cannot produce
/// a missing-edge condition at execution time except through a programming
/// contract violation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// A step name was used twice in the builder.
    #[error("duplicate step `{0}`")]
    DuplicateStep(String),

    /// An edge or the entry point references a step that was never declared.
    #[error("unknown step `{0}`")]
    UnknownStep(String),

    /// No entry step was configured.
    #[error("no entry step configured")]
    MissingEntry,

    /// A required step kind is absent from the graph.
    #[error("graph has no `{0}` step")]
    MissingStepKind(&'static str),

    /// A step can produce an outcome that has no edge.
    #[error("step `{step}` has no edge for outcome `{outcome}`")]
    MissingEdge { step: String, outcome: OutcomeKind },

    /// Two edges were declared for the same (step, outcome) pair.
    #[error("step `{step}` has more than one edge for outcome `{outcome}`")]
    DuplicateEdge { step: String, outcome: OutcomeKind },

    /// An edge was declared for an outcome the step cannot produce.
    #[error("step `{step}` cannot produce outcome `{outcome}`")]
    InvalidEdge { step: String, outcome: OutcomeKind },

    /// A self-loop was declared outside the extract retry transition.
    #[error("self-loop on `{0}` is only permitted for the extract retry transition")]
    InvalidSelfLoop(String),

    /// The graph cycles through the given step. Only the bounded retry
    /// self-loop on the extract step may cycle.
    #[error("cycle detected through step `{0}`")]
    CycleDetected(String),

    /// A retry self-loop exists but the attempt ceiling is zero.
    #[error("retry loop on `{0}` requires max_attempts >= 1")]
    UnboundedRetry(String),
}

/// Errors raised while registering agents.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A second priority-0 (primary) handler was registered for a type.
    #[error("a primary agent is already registered for source type `{source_type}`")]
    DuplicatePrimary { source_type: String },

    /// The agent does not support the source type it was registered against.
    #[error("agent `{agent}` does not support source type `{source_type}`")]
    UnsupportedType { agent: String, source_type: String },
}

/// Errors returned to callers from the orchestrator surface.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Graph compilation failed.
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// Agent registration failed.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A job was submitted with no sources.
    #[error("job contains no sources")]
    EmptyJob,

    /// The job driver task failed (panicked or was aborted externally).
    #[error("job task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Result type alias for graph compilation.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Result type alias for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
