//! Sources - the per-input unit tracked through the state machine.
//!
//! A `Source` is created when a job is initialized and mutated only by the
//! orchestrator as it advances through graph steps. Agents receive a snapshot
//! and never write back; once a source reaches a terminal status it is
//! immutable.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::record::NormalizedRecord;

/// Classification of a source, determining which agents may handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// A web page reachable over HTTP(S).
    Web,
    /// A local catalog document (PDF, price list, export).
    Document,
    /// A remote API endpoint. No built-in agent handles this type.
    Api,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceType::Web => "web",
            SourceType::Document => "document",
            SourceType::Api => "api",
        };
        f.write_str(s)
    }
}

/// Per-source state machine status.
///
/// `Pending` is initial; `Succeeded`, `Failed` and `Cancelled` are terminal.
/// The orchestrator is the only writer and transitions follow the compiled
/// graph's edges, so observers may cache terminal statuses freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Pending,
    Validating,
    Dispatching,
    Extracting,
    Retrying,
    Normalizing,
    Succeeded,
    Failed,
    Cancelled,
}

impl SourceStatus {
    /// Whether this status is terminal (no further transitions).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SourceStatus::Succeeded | SourceStatus::Failed | SourceStatus::Cancelled
        )
    }
}

impl std::fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceStatus::Pending => "pending",
            SourceStatus::Validating => "validating",
            SourceStatus::Dispatching => "dispatching",
            SourceStatus::Extracting => "extracting",
            SourceStatus::Retrying => "retrying",
            SourceStatus::Normalizing => "normalizing",
            SourceStatus::Succeeded => "succeeded",
            SourceStatus::Failed => "failed",
            SourceStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Classification of a recorded failure.
///
/// Agent-level errors never escape raw: they are classified into one of
/// these kinds and recorded on the source before the caller sees any status.
/// `Contract` marks orchestration bugs (malformed graph edge, re-execution of
/// a non-pending source) so callers can separate them from data problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed locator or unusable source definition. Never retried.
    Validation,
    /// Registry resolution returned no agents for the source type.
    NoCapableAgent,
    /// Transient agent failure, retried per policy.
    Retryable,
    /// Agent gave up, or retries were exhausted.
    Permanent,
    /// A single attempt exceeded the per-attempt timeout.
    Timeout,
    /// Orchestration contract violation - a bug, not a data problem.
    Contract,
    /// The job was cancelled before this source reached a terminal status.
    Cancelled,
}

/// Error detail recorded on a failed (or cancelled) source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    /// Failure classification.
    pub kind: ErrorKind,

    /// Human-readable reason, originating from the agent or the orchestrator.
    pub message: String,

    /// Name of the agent that reported the failure, when one was involved.
    pub agent: Option<String>,
}

impl SourceError {
    /// Create a new error with no agent attribution.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            agent: None,
        }
    }

    /// Attribute the error to an agent.
    pub fn from_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.agent {
            Some(agent) => write!(f, "{:?} ({}): {}", self.kind, agent, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

/// Identifier of a source, unique within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub Uuid);

impl SourceId {
    /// Generate a fresh source id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One catalog input tracked through the extraction state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Unique id within the job.
    pub id: SourceId,

    /// Which agent family may handle this source.
    pub source_type: SourceType,

    /// URL or file reference. Shape is checked by the validate step.
    pub locator: String,

    /// Optional display name.
    pub name: Option<String>,

    /// Current state machine position.
    pub status: SourceStatus,

    /// Number of extraction attempts made so far.
    pub attempts: u32,

    /// One entry per retryable failure observed, in order.
    #[serde(default)]
    pub retry_history: Vec<String>,

    /// Terminal error detail, if the source failed or was cancelled.
    pub error: Option<SourceError>,

    /// Normalized result payload, present once the source succeeded.
    pub result: Option<NormalizedRecord>,
}

impl Source {
    /// Create a new pending source.
    pub fn new(source_type: SourceType, locator: impl Into<String>) -> Self {
        Self {
            id: SourceId::new(),
            source_type,
            locator: locator.into(),
            name: None,
            status: SourceStatus::Pending,
            attempts: 0,
            retry_history: Vec::new(),
            error: None,
            result: None,
        }
    }

    /// Set a display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Whether the source has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Record a retryable failure reason. Called once per retryable outcome.
    pub(crate) fn record_retryable(&mut self, reason: impl Into<String>) {
        debug_assert!(!self.is_terminal());
        self.retry_history.push(reason.into());
    }

    /// Mark the source failed with the given error.
    pub(crate) fn fail(&mut self, error: SourceError) {
        debug_assert!(!self.is_terminal());
        self.error = Some(error);
        self.status = SourceStatus::Failed;
    }

    /// Mark the source succeeded with its normalized record.
    pub(crate) fn succeed(&mut self, record: NormalizedRecord) {
        debug_assert!(!self.is_terminal());
        self.result = Some(record);
        self.status = SourceStatus::Succeeded;
    }

    /// Mark the source cancelled.
    pub(crate) fn cancel(&mut self) {
        debug_assert!(!self.is_terminal());
        self.error = Some(SourceError::new(
            ErrorKind::Cancelled,
            "job cancelled before the source reached a terminal status",
        ));
        self.status = SourceStatus::Cancelled;
    }
}
