//! The orchestrator - walks the compiled graph once per source.
//!
//! Sources within one job are independent units of work and run in parallel
//! under a semaphore-bounded concurrency limit. Each source's walk is
//! sequential and single-owner: mutation goes through a per-source lock,
//! and only the job-level aggregate recompute is synchronized job-wide, so
//! concurrent sources never contend on the same lock.

pub mod job;

pub use job::{JobHandle, JobUpdate};

use std::sync::{Arc, Mutex};

use futures::future::join_all;
use indexmap::IndexMap;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::graph::{ExecutionGraph, OutcomeKind, StepId, StepKind};
use crate::registry::AgentRegistry;
use crate::traits::agent::{AgentOutcome, ExtractionAgent};
use crate::types::config::OrchestratorConfig;
use crate::types::record::{NormalizedRecord, RawExtract};
use crate::types::source::{ErrorKind, Source, SourceError, SourceId, SourceStatus, SourceType};
use crate::types::state::{derive_status, ExtractionState, JobStatus};

/// Top-level entry point: executes extraction jobs against a compiled graph
/// and a read-only agent registry.
///
/// The graph and registry are constructed once and shared across jobs; the
/// orchestrator is the sole owner of each job's `ExtractionState` until the
/// job completes.
pub struct Orchestrator {
    graph: Arc<ExecutionGraph>,
    registry: Arc<AgentRegistry>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create an orchestrator with the canonical graph and default config.
    pub fn new(registry: AgentRegistry) -> Result<Self> {
        Self::with_config(registry, OrchestratorConfig::default())
    }

    /// Create an orchestrator with the canonical graph, bounded by
    /// `config.max_attempts`.
    pub fn with_config(registry: AgentRegistry, config: OrchestratorConfig) -> Result<Self> {
        let graph = ExecutionGraph::standard(config.max_attempts)?;
        Ok(Self::with_graph(graph, registry, config))
    }

    /// Create an orchestrator with a custom compiled graph.
    ///
    /// The graph's `max_attempts` governs the retry bound; the config's
    /// value is ignored in favor of the compiled one.
    pub fn with_graph(
        graph: ExecutionGraph,
        registry: AgentRegistry,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            graph: Arc::new(graph),
            registry: Arc::new(registry),
            config,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Submit a job asynchronously.
    ///
    /// Returns a [`JobHandle`] immediately; the final state is delivered
    /// through [`JobHandle::wait`] and transitions stream through
    /// [`JobHandle::next_update`].
    pub fn submit(&self, sources: Vec<Source>) -> Result<JobHandle> {
        self.submit_state(ExtractionState::new(sources))
    }

    /// Submit a pre-built state (sources must be `Pending`; any that is not
    /// is recorded as a contract violation without affecting the others).
    pub fn submit_state(&self, state: ExtractionState) -> Result<JobHandle> {
        if state.is_empty() {
            return Err(crate::error::OrchestratorError::EmptyJob);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let job_id = state.job_id;

        let graph = Arc::clone(&self.graph);
        let registry = Arc::clone(&self.registry);
        let config = self.config.clone();
        let task = tokio::spawn(drive_job(graph, registry, config, state, tx, token.clone()));

        Ok(JobHandle {
            job_id,
            token,
            updates: rx,
            task,
        })
    }

    /// Run a job synchronously: block until every source is terminal.
    pub async fn run(&self, sources: Vec<Source>) -> Result<ExtractionState> {
        self.submit(sources)?.wait().await
    }

    /// Run a pre-built state synchronously.
    pub async fn run_state(&self, state: ExtractionState) -> Result<ExtractionState> {
        self.submit_state(state)?.wait().await
    }
}

/// Job-level aggregate, recomputed under its own lock on every transition.
struct Aggregate {
    statuses: IndexMap<SourceId, SourceStatus>,
    job_status: JobStatus,
}

/// State shared between the per-source walk tasks.
///
/// Each source has its own lock; the aggregate lock is only held for the
/// recompute, never across agent I/O.
struct JobShared {
    job_id: crate::types::state::JobId,
    sources: IndexMap<SourceId, Mutex<Source>>,
    aggregate: Mutex<Aggregate>,
    updates: mpsc::UnboundedSender<JobUpdate>,
}

impl JobShared {
    fn source(&self, id: SourceId) -> &Mutex<Source> {
        self.sources
            .get(&id)
            .expect("source id originates from this job")
    }

    /// Run `f` under the source lock without touching the aggregate.
    /// For mutations that do not change the status.
    fn with_source<T>(&self, id: SourceId, f: impl FnOnce(&mut Source) -> T) -> T {
        let mut source = self.source(id).lock().unwrap();
        f(&mut source)
    }

    /// Clone the source for handing to an agent.
    fn snapshot(&self, id: SourceId) -> Source {
        self.source(id).lock().unwrap().clone()
    }

    /// Apply a status-changing mutation, recompute the job-level aggregate,
    /// and stream the transition.
    fn transition(&self, id: SourceId, f: impl FnOnce(&mut Source)) {
        let (status, attempts) = {
            let mut source = self.source(id).lock().unwrap();
            f(&mut source);
            (source.status, source.attempts)
        };

        let job_status = {
            let mut aggregate = self.aggregate.lock().unwrap();
            aggregate.statuses.insert(id, status);
            aggregate.job_status = derive_status(aggregate.statuses.values().copied());
            aggregate.job_status
        };

        // Receiver may have been dropped by a caller that only wants the
        // final state.
        let _ = self.updates.send(JobUpdate {
            job_id: self.job_id,
            source_id: id,
            status,
            attempts,
            job_status,
        });
    }
}

/// Everything a per-source walk needs.
#[derive(Clone)]
struct WalkCtx {
    shared: Arc<JobShared>,
    graph: Arc<ExecutionGraph>,
    registry: Arc<AgentRegistry>,
    config: OrchestratorConfig,
    token: CancellationToken,
}

/// Drive one job to completion and return the final state.
async fn drive_job(
    graph: Arc<ExecutionGraph>,
    registry: Arc<AgentRegistry>,
    config: OrchestratorConfig,
    state: ExtractionState,
    updates: mpsc::UnboundedSender<JobUpdate>,
    token: CancellationToken,
) -> ExtractionState {
    let job_id = state.job_id;
    let created_at = state.created_at;
    info!(%job_id, sources = state.len(), "starting extraction job");

    let order: Vec<SourceId> = state.sources.keys().copied().collect();
    let statuses: IndexMap<SourceId, SourceStatus> = state
        .sources
        .iter()
        .map(|(id, source)| (*id, source.status))
        .collect();

    let shared = Arc::new(JobShared {
        job_id,
        sources: state
            .sources
            .into_iter()
            .map(|(id, source)| (id, Mutex::new(source)))
            .collect(),
        aggregate: Mutex::new(Aggregate {
            statuses,
            job_status: state.status,
        }),
        updates,
    });

    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_sources));
    let mut tasks = Vec::with_capacity(order.len());

    for id in order {
        let ctx = WalkCtx {
            shared: Arc::clone(&shared),
            graph: Arc::clone(&graph),
            registry: Arc::clone(&registry),
            config: config.clone(),
            token: token.clone(),
        };
        let semaphore = Arc::clone(&semaphore);

        tasks.push(tokio::spawn(async move {
            // Sources waiting behind the concurrency limit must not start
            // once cancellation is observed.
            let _permit = tokio::select! {
                _ = ctx.token.cancelled() => {
                    ctx.shared.transition(id, |s| s.cancel());
                    return;
                }
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };
            walk_source(ctx, id).await;
        }));
    }

    for result in join_all(tasks).await {
        if let Err(e) = result {
            warn!(%job_id, "source task panicked: {e}");
        }
    }

    let sources = match Arc::try_unwrap(shared) {
        Ok(shared) => shared
            .sources
            .into_iter()
            .map(|(id, source)| (id, source.into_inner().unwrap()))
            .collect(),
        Err(shared) => shared
            .sources
            .iter()
            .map(|(id, source)| (*id, source.lock().unwrap().clone()))
            .collect(),
    };

    let mut state = ExtractionState {
        job_id,
        created_at,
        sources,
        status: JobStatus::Pending,
    };

    // A panicked task can leave its source non-terminal; surface that as a
    // contract violation rather than a silently stuck source.
    for source in state.sources.values_mut() {
        if !source.is_terminal() {
            if token.is_cancelled() {
                source.cancel();
            } else {
                source.fail(SourceError::new(
                    ErrorKind::Contract,
                    "source execution ended without reaching a terminal status",
                ));
            }
        }
    }
    state.recompute_status();

    let summary = state.summary();
    info!(
        %job_id,
        succeeded = summary.succeeded,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "extraction job finished"
    );

    state
}

/// Walk the compiled graph for one source.
async fn walk_source(ctx: WalkCtx, id: SourceId) {
    // Re-execution guard: a source must be Pending when its walk starts.
    // Attempting to execute an already-advanced source is a contract
    // violation confined to that source.
    {
        let status = ctx.shared.with_source(id, |s| s.status);
        if status != SourceStatus::Pending {
            warn!(
                source = %id,
                %status,
                "contract violation: source is not pending at execution start"
            );
            if !status.is_terminal() {
                ctx.shared.transition(id, move |s| {
                    s.fail(SourceError::new(
                        ErrorKind::Contract,
                        format!("source was `{status}` (not pending) when execution started"),
                    ));
                });
            }
            return;
        }
    }

    if ctx.token.is_cancelled() {
        ctx.shared.transition(id, |s| s.cancel());
        return;
    }

    let max_attempts = ctx.graph.max_attempts();
    let mut current: StepId = ctx.graph.entry();
    let mut agent: Option<Arc<dyn ExtractionAgent>> = None;
    let mut raw: Option<RawExtract> = None;
    let mut normalized: Option<NormalizedRecord> = None;
    let mut pending_error: Option<SourceError> = None;

    loop {
        if ctx.token.is_cancelled() {
            ctx.shared.transition(id, |s| s.cancel());
            return;
        }

        let kind = ctx.graph.step(current).kind;
        let outcome: OutcomeKind = match kind {
            StepKind::Validate => {
                ctx.shared
                    .transition(id, |s| s.status = SourceStatus::Validating);
                let (source_type, locator) = ctx
                    .shared
                    .with_source(id, |s| (s.source_type, s.locator.clone()));

                match validate_locator(source_type, &locator) {
                    Ok(()) => OutcomeKind::Ok,
                    Err(reason) => {
                        pending_error = Some(SourceError::new(ErrorKind::Validation, reason));
                        OutcomeKind::Permanent
                    }
                }
            }

            StepKind::Dispatch => {
                ctx.shared
                    .transition(id, |s| s.status = SourceStatus::Dispatching);
                let source_type = ctx.shared.with_source(id, |s| s.source_type);

                match ctx.registry.resolve(source_type).into_iter().next() {
                    Some(resolved) => {
                        debug!(source = %id, agent = resolved.name(), "dispatched");
                        agent = Some(resolved);
                        OutcomeKind::Ok
                    }
                    None => {
                        pending_error = Some(SourceError::new(
                            ErrorKind::NoCapableAgent,
                            format!("no agent registered for source type `{source_type}`"),
                        ));
                        OutcomeKind::Permanent
                    }
                }
            }

            StepKind::Extract => {
                let Some(agent) = agent.clone() else {
                    contract_fail(&ctx, id, "extract step reached without a dispatched agent");
                    return;
                };

                ctx.shared.transition(id, |s| {
                    s.status = SourceStatus::Extracting;
                    s.attempts += 1;
                });

                let snapshot = ctx.shared.snapshot(id);
                let attempt =
                    tokio::time::timeout(ctx.config.per_attempt_timeout, agent.attempt(&snapshot));

                let result = if ctx.config.abort_in_flight {
                    tokio::select! {
                        _ = ctx.token.cancelled() => {
                            ctx.shared.transition(id, |s| s.cancel());
                            return;
                        }
                        result = attempt => result,
                    }
                } else {
                    attempt.await
                };

                let agent_outcome = match result {
                    Ok(outcome) => outcome,
                    Err(_) => AgentOutcome::retryable(format!(
                        "attempt timed out after {:?}",
                        ctx.config.per_attempt_timeout
                    )),
                };

                // Cancellation observed while the attempt ran: the source is
                // not yet terminal, so it ends cancelled regardless of the
                // attempt's outcome.
                if ctx.token.is_cancelled() {
                    ctx.shared.transition(id, |s| s.cancel());
                    return;
                }

                match agent_outcome {
                    AgentOutcome::Success(extract) => {
                        raw = Some(extract);
                        OutcomeKind::Ok
                    }
                    AgentOutcome::Retryable(reason) => {
                        let attempts = ctx.shared.with_source(id, |s| {
                            s.record_retryable(reason.clone());
                            s.attempts
                        });

                        if attempts >= max_attempts {
                            // Exhaustion converts deterministically to a
                            // permanent failure carrying the last reason.
                            pending_error = Some(
                                SourceError::new(
                                    ErrorKind::Permanent,
                                    format!("retries exhausted after {attempts} attempts: {reason}"),
                                )
                                .from_agent(agent.name()),
                            );
                            OutcomeKind::Permanent
                        } else {
                            debug!(
                                source = %id,
                                attempts,
                                "retryable failure: {reason}"
                            );
                            ctx.shared
                                .transition(id, |s| s.status = SourceStatus::Retrying);
                            tokio::time::sleep(ctx.config.delay_for(attempts)).await;
                            OutcomeKind::Retryable
                        }
                    }
                    AgentOutcome::Permanent(reason) => {
                        pending_error = Some(
                            SourceError::new(ErrorKind::Permanent, reason)
                                .from_agent(agent.name()),
                        );
                        OutcomeKind::Permanent
                    }
                }
            }

            StepKind::Normalize => {
                ctx.shared
                    .transition(id, |s| s.status = SourceStatus::Normalizing);

                let Some(extract) = raw.take() else {
                    contract_fail(&ctx, id, "normalize step reached without an agent payload");
                    return;
                };
                let agent_name = agent
                    .as_ref()
                    .map(|a| a.name().to_string())
                    .unwrap_or_else(|| "unknown".to_string());

                normalized = Some(NormalizedRecord::from_raw(id, agent_name, extract));
                OutcomeKind::Ok
            }

            StepKind::Finalize => {
                let Some(record) = normalized.take() else {
                    contract_fail(&ctx, id, "finalize step reached without a normalized record");
                    return;
                };
                ctx.shared.transition(id, move |s| s.succeed(record));
                return;
            }

            StepKind::Fail => {
                let error = pending_error.take().unwrap_or_else(|| {
                    SourceError::new(
                        ErrorKind::Contract,
                        "fail step reached with no recorded error",
                    )
                });
                warn!(source = %id, error = %error, "source failed");
                ctx.shared.transition(id, move |s| s.fail(error));
                return;
            }
        };

        // An outcome with no matching edge is a programming-contract
        // violation, never a silent no-op.
        match ctx.graph.next(current, outcome) {
            Some(next) => current = next,
            None => {
                let step = ctx.graph.step(current).name.clone();
                contract_fail(
                    &ctx,
                    id,
                    format!("no edge for outcome `{outcome}` from step `{step}`"),
                );
                return;
            }
        }
    }
}

/// Record a contract violation on the source and stop its execution.
fn contract_fail(ctx: &WalkCtx, id: SourceId, message: impl Into<String>) {
    let message = message.into();
    warn!(source = %id, "orchestration contract violation: {message}");
    ctx.shared.transition(id, move |s| {
        s.fail(SourceError::new(ErrorKind::Contract, message));
    });
}

/// Check the locator is well-formed for the source type.
fn validate_locator(source_type: SourceType, locator: &str) -> std::result::Result<(), String> {
    match source_type {
        SourceType::Web | SourceType::Api => {
            let url = url::Url::parse(locator)
                .map_err(|e| format!("invalid URL `{locator}`: {e}"))?;
            match url.scheme() {
                "http" | "https" => Ok(()),
                other => Err(format!("unsupported URL scheme `{other}`")),
            }
        }
        SourceType::Document => {
            if locator.trim().is_empty() {
                Err("document locator is empty".to_string())
            } else {
                Ok(())
            }
        }
    }
}
