//! Job-level extraction state.
//!
//! Exactly one `ExtractionState` exists per job. It is exclusively owned by
//! the orchestrator while the job runs; on completion ownership transfers to
//! the caller for read-only inspection. The job-level status is derived from
//! source statuses and recomputed on every transition, never from a stale
//! snapshot.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::source::{ErrorKind, Source, SourceError, SourceId, SourceStatus};

/// Identifier of an extraction job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a fresh, time-ordered job id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Derived job-level status.
///
/// `Complete` if and only if every source has reached a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// No source has started yet.
    Pending,
    /// At least one source is in flight or waiting behind the concurrency limit.
    Running,
    /// Every source is terminal (succeeded, failed or cancelled).
    Complete,
}

/// Per-source error detail included in the job summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceErrorDetail {
    pub source_id: SourceId,
    pub locator: String,
    pub error: SourceError,
}

/// Terminal counts plus full error detail per failed source.
///
/// Partial success is a normal, expected outcome: callers should inspect the
/// counts rather than treat any failure as job-fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Failures classified as orchestration bugs, counted separately from
    /// data-quality failures (they are included in `failed` as well).
    pub contract_violations: usize,
    pub errors: Vec<SourceErrorDetail>,
}

/// The aggregate owning all sources of one extraction job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionState {
    /// Job identifier, assigned at creation.
    pub job_id: JobId,

    /// When the job was created.
    pub created_at: DateTime<Utc>,

    /// Ordered source collection, keyed by source id.
    pub sources: IndexMap<SourceId, Source>,

    /// Derived status. Maintained by `recompute_status`.
    pub status: JobStatus,
}

impl ExtractionState {
    /// Create a new state owning the given sources.
    pub fn new(sources: Vec<Source>) -> Self {
        let sources: IndexMap<SourceId, Source> =
            sources.into_iter().map(|s| (s.id, s)).collect();
        Self {
            job_id: JobId::new(),
            created_at: Utc::now(),
            sources,
            status: JobStatus::Pending,
        }
    }

    /// Look up a source by id.
    pub fn source(&self, id: &SourceId) -> Option<&Source> {
        self.sources.get(id)
    }

    /// Iterate sources in submission order.
    pub fn sources(&self) -> impl Iterator<Item = &Source> {
        self.sources.values()
    }

    /// Number of sources in the job.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the job has no sources.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Recompute the derived job status from the current source statuses.
    ///
    /// Called after every source transition so the aggregate never reflects
    /// a partially-written update.
    pub fn recompute_status(&mut self) {
        self.status = derive_status(self.sources.values().map(|s| s.status));
    }

    /// Whether every source is terminal.
    pub fn is_complete(&self) -> bool {
        self.status == JobStatus::Complete
    }

    /// Build the terminal-count summary with per-source error detail.
    pub fn summary(&self) -> JobSummary {
        let mut summary = JobSummary {
            total: self.sources.len(),
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            contract_violations: 0,
            errors: Vec::new(),
        };

        for source in self.sources.values() {
            match source.status {
                SourceStatus::Succeeded => summary.succeeded += 1,
                SourceStatus::Failed => summary.failed += 1,
                SourceStatus::Cancelled => summary.cancelled += 1,
                _ => {}
            }
            if let Some(error) = &source.error {
                if error.kind == ErrorKind::Contract {
                    summary.contract_violations += 1;
                }
                summary.errors.push(SourceErrorDetail {
                    source_id: source.id,
                    locator: source.locator.clone(),
                    error: error.clone(),
                });
            }
        }

        summary
    }
}

/// Derive the job status from an iterator of source statuses.
pub(crate) fn derive_status(statuses: impl Iterator<Item = SourceStatus>) -> JobStatus {
    let mut any = false;
    let mut all_terminal = true;
    let mut all_pending = true;

    for status in statuses {
        any = true;
        all_terminal &= status.is_terminal();
        all_pending &= status == SourceStatus::Pending;
    }

    if !any || all_terminal {
        JobStatus::Complete
    } else if all_pending {
        JobStatus::Pending
    } else {
        JobStatus::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::source::SourceType;

    fn two_source_state() -> ExtractionState {
        ExtractionState::new(vec![
            Source::new(SourceType::Web, "https://a.example/catalog"),
            Source::new(SourceType::Document, "/data/catalog.pdf"),
        ])
    }

    #[test]
    fn test_new_state_is_pending() {
        let state = two_source_state();
        assert_eq!(state.status, JobStatus::Pending);
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_complete_iff_all_terminal() {
        let mut state = two_source_state();
        let ids: Vec<SourceId> = state.sources.keys().copied().collect();

        state.sources[&ids[0]].status = SourceStatus::Extracting;
        state.recompute_status();
        assert_eq!(state.status, JobStatus::Running);

        state.sources[&ids[0]].status = SourceStatus::Succeeded;
        state.recompute_status();
        assert_eq!(state.status, JobStatus::Running);

        state.sources[&ids[1]].status = SourceStatus::Failed;
        state.recompute_status();
        assert_eq!(state.status, JobStatus::Complete);
        assert!(state.is_complete());
    }

    #[test]
    fn test_summary_counts_and_errors() {
        let mut state = two_source_state();
        let ids: Vec<SourceId> = state.sources.keys().copied().collect();

        state.sources[&ids[0]].status = SourceStatus::Succeeded;
        state.sources[&ids[1]].fail(SourceError::new(
            ErrorKind::NoCapableAgent,
            "no agent registered for source type `document`",
        ));
        state.recompute_status();

        let summary = state.summary();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.cancelled, 0);
        assert_eq!(summary.contract_violations, 0);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].error.kind, ErrorKind::NoCapableAgent);
    }

    #[test]
    fn test_contract_violations_counted_separately() {
        let mut state = two_source_state();
        let ids: Vec<SourceId> = state.sources.keys().copied().collect();

        state.sources[&ids[0]].fail(SourceError::new(
            ErrorKind::Contract,
            "source was not pending at execution start",
        ));
        state.sources[&ids[1]].status = SourceStatus::Succeeded;
        state.recompute_status();

        let summary = state.summary();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.contract_violations, 1);
    }

    #[test]
    fn test_sources_keep_submission_order() {
        let state = ExtractionState::new(vec![
            Source::new(SourceType::Web, "https://first.example"),
            Source::new(SourceType::Web, "https://second.example"),
            Source::new(SourceType::Web, "https://third.example"),
        ]);
        let locators: Vec<&str> = state.sources().map(|s| s.locator.as_str()).collect();
        assert_eq!(
            locators,
            vec![
                "https://first.example",
                "https://second.example",
                "https://third.example"
            ]
        );
    }
}
