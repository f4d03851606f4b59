//! The agent capability interface.
//!
//! Every extraction agent implements [`ExtractionAgent`]: accept a source,
//! attempt extraction, report an outcome. Side effects are confined to I/O
//! against the external resource the agent targets; agents never mutate the
//! source or the extraction state - all state mutation is the orchestrator's
//! exclusive responsibility.
//!
//! An agent may itself dispatch to sub-extractors (the web agent routes by
//! locator shape); that is an internal concern invisible to the orchestrator.

use async_trait::async_trait;

use crate::graph::OutcomeKind;
use crate::types::record::RawExtract;
use crate::types::source::{Source, SourceType};

/// Result of one extraction attempt.
#[derive(Debug, Clone)]
pub enum AgentOutcome {
    /// Extraction worked; payload is normalized by the orchestrator.
    Success(RawExtract),
    /// Transient failure - the orchestrator retries per policy.
    Retryable(String),
    /// The agent gives up on this source.
    Permanent(String),
}

impl AgentOutcome {
    /// Convenience constructor for a retryable failure.
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self::Retryable(reason.into())
    }

    /// Convenience constructor for a permanent failure.
    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::Permanent(reason.into())
    }

    /// The outcome category used for graph edge lookup.
    pub fn kind(&self) -> OutcomeKind {
        match self {
            AgentOutcome::Success(_) => OutcomeKind::Ok,
            AgentOutcome::Retryable(_) => OutcomeKind::Retryable,
            AgentOutcome::Permanent(_) => OutcomeKind::Permanent,
        }
    }
}

/// Capability contract for extraction agents.
///
/// Calling `attempt` with a source whose type the agent does not support is
/// a caller error, not a runtime outcome; the orchestrator only dispatches
/// through the registry, which enforces support at registration time.
#[async_trait]
pub trait ExtractionAgent: Send + Sync {
    /// Agent name, used for logging and error attribution.
    fn name(&self) -> &str;

    /// Whether this agent can handle the given source type.
    fn supports(&self, source_type: SourceType) -> bool;

    /// Attempt extraction against the source's external resource.
    async fn attempt(&self, source: &Source) -> AgentOutcome;
}
