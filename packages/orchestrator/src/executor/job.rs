//! Job submission surface - handles and streaming updates.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::source::{SourceId, SourceStatus};
use crate::types::state::{ExtractionState, JobId, JobStatus};

/// One status transition, streamed to the caller as the job progresses.
#[derive(Debug, Clone)]
pub struct JobUpdate {
    pub job_id: JobId,
    pub source_id: SourceId,
    /// New status of the source that transitioned.
    pub status: SourceStatus,
    /// Attempts made against that source so far.
    pub attempts: u32,
    /// Job-level status recomputed after this transition.
    pub job_status: JobStatus,
}

/// Handle to a submitted job.
///
/// Returned immediately by `Orchestrator::submit`; the job runs in the
/// background. Callers can stream updates, request cancellation, or block on
/// the final state with [`JobHandle::wait`].
pub struct JobHandle {
    pub(crate) job_id: JobId,
    pub(crate) token: CancellationToken,
    pub(crate) updates: mpsc::UnboundedReceiver<JobUpdate>,
    pub(crate) task: JoinHandle<ExtractionState>,
}

impl JobHandle {
    /// The job identifier, available before any source has started.
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Request cancellation of the whole job.
    ///
    /// Non-terminal sources stop advancing and end `Cancelled`; sources that
    /// already reached a terminal status keep it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// A clone of the job's cancellation token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Receive the next status transition, or `None` once the job finished
    /// and all updates were drained.
    pub async fn next_update(&mut self) -> Option<JobUpdate> {
        self.updates.recv().await
    }

    /// Block until every source is terminal and take ownership of the final
    /// state.
    pub async fn wait(self) -> Result<ExtractionState> {
        Ok(self.task.await?)
    }
}
