//! End-to-end orchestration scenarios against mock agents.

use std::sync::Arc;
use std::time::Duration;

use catalog_orchestrator::testing::MockAgent;
use catalog_orchestrator::{
    AgentRegistry, ErrorKind, ExtractionState, JobStatus, Orchestrator, OrchestratorConfig,
    OrchestratorError, Source, SourceStatus, SourceType,
};

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig::new()
        .with_fixed_backoff()
        .with_backoff_base_delay(Duration::from_millis(1))
}

#[tokio::test]
async fn mixed_job_partial_success() {
    let web = Arc::new(MockAgent::new("web").supporting([SourceType::Web]));
    let doc = Arc::new(
        MockAgent::new("doc")
            .supporting([SourceType::Document])
            .failing_then_succeeding("/data/catalog.pdf", 2),
    );

    let mut registry = AgentRegistry::new();
    registry.register_primary(SourceType::Web, web.clone()).unwrap();
    registry.register_primary(SourceType::Document, doc.clone()).unwrap();

    let sources = vec![
        Source::new(SourceType::Web, "https://shop.example.com/catalog"),
        Source::new(SourceType::Document, "/data/catalog.pdf"),
        Source::new(SourceType::Api, "https://api.example.com/v1/items"),
    ];
    let api_id = sources[2].id;
    let doc_id = sources[1].id;
    let web_id = sources[0].id;

    let orchestrator = Orchestrator::with_config(registry, fast_config()).unwrap();
    let state = orchestrator.run(sources).await.unwrap();

    assert_eq!(state.status, JobStatus::Complete);

    // Web source succeeds on the first attempt.
    let web_source = state.source(&web_id).unwrap();
    assert_eq!(web_source.status, SourceStatus::Succeeded);
    assert_eq!(web_source.attempts, 1);
    let record = web_source.result.as_ref().unwrap();
    assert_eq!(record.agent, "web");
    assert!(!record.items.is_empty());
    assert!(!record.content_hash.is_empty());

    // Document source needed two retries; each retryable failure is recorded.
    let doc_source = state.source(&doc_id).unwrap();
    assert_eq!(doc_source.status, SourceStatus::Succeeded);
    assert_eq!(doc_source.attempts, 3);
    assert_eq!(doc_source.retry_history.len(), 2);
    assert_eq!(doc.call_count("/data/catalog.pdf"), 3);

    // No agent handles API sources; extraction is never attempted.
    let api_source = state.source(&api_id).unwrap();
    assert_eq!(api_source.status, SourceStatus::Failed);
    let error = api_source.error.as_ref().unwrap();
    assert_eq!(error.kind, ErrorKind::NoCapableAgent);
    assert!(error.message.contains("api"));
    assert_eq!(web.call_count("https://api.example.com/v1/items"), 0);
    assert_eq!(doc.call_count("https://api.example.com/v1/items"), 0);

    let summary = state.summary();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.cancelled, 0);
    assert_eq!(summary.contract_violations, 0);
    assert_eq!(summary.errors.len(), 1);
}

#[tokio::test]
async fn retries_exhaust_into_permanent_failure() {
    let agent = Arc::new(MockAgent::new("flaky").with_script(
        "https://down.example.com",
        (0..10).map(|_| catalog_orchestrator::AgentOutcome::retryable("connection reset")),
    ));

    let mut registry = AgentRegistry::new();
    registry.register_primary(SourceType::Web, agent.clone()).unwrap();

    let orchestrator =
        Orchestrator::with_config(registry, fast_config().with_max_attempts(3)).unwrap();
    let state = orchestrator
        .run(vec![Source::new(SourceType::Web, "https://down.example.com")])
        .await
        .unwrap();

    let source = state.sources().next().unwrap();
    assert_eq!(source.status, SourceStatus::Failed);
    assert_eq!(source.attempts, 3);
    assert_eq!(source.retry_history.len(), 3);
    assert_eq!(agent.call_count("https://down.example.com"), 3);

    let error = source.error.as_ref().unwrap();
    assert_eq!(error.kind, ErrorKind::Permanent);
    assert_eq!(error.agent.as_deref(), Some("flaky"));
    assert!(error.message.contains("retries exhausted"));
    assert!(error.message.contains("connection reset"));
}

#[tokio::test]
async fn timed_out_attempts_are_retried_then_fail() {
    let agent = Arc::new(MockAgent::new("slow").with_delay(Duration::from_millis(200)));

    let mut registry = AgentRegistry::new();
    registry.register_primary(SourceType::Web, agent).unwrap();

    let config = fast_config()
        .with_max_attempts(2)
        .with_per_attempt_timeout(Duration::from_millis(20));
    let orchestrator = Orchestrator::with_config(registry, config).unwrap();

    let state = orchestrator
        .run(vec![Source::new(SourceType::Web, "https://slow.example.com")])
        .await
        .unwrap();

    let source = state.sources().next().unwrap();
    assert_eq!(source.status, SourceStatus::Failed);
    assert_eq!(source.attempts, 2);
    assert_eq!(source.retry_history.len(), 2);
    assert!(source.retry_history[0].contains("timed out"));
    assert_eq!(source.error.as_ref().unwrap().kind, ErrorKind::Permanent);
}

#[tokio::test]
async fn invalid_locator_fails_validation_without_dispatch() {
    let agent = Arc::new(MockAgent::new("web").supporting([SourceType::Web]));

    let mut registry = AgentRegistry::new();
    registry.register_primary(SourceType::Web, agent.clone()).unwrap();

    let orchestrator = Orchestrator::with_config(registry, fast_config()).unwrap();
    let state = orchestrator
        .run(vec![Source::new(SourceType::Web, "not a url")])
        .await
        .unwrap();

    let source = state.sources().next().unwrap();
    assert_eq!(source.status, SourceStatus::Failed);
    assert_eq!(source.error.as_ref().unwrap().kind, ErrorKind::Validation);
    assert_eq!(source.attempts, 0);
    assert_eq!(agent.total_calls(), 0);
}

#[tokio::test]
async fn empty_job_is_rejected() {
    let orchestrator = Orchestrator::new(AgentRegistry::new()).unwrap();
    let err = orchestrator.run(Vec::new()).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::EmptyJob));
}

#[tokio::test]
async fn updates_stream_per_source_transitions_in_order() {
    let agent = Arc::new(MockAgent::new("web").supporting([SourceType::Web]));

    let mut registry = AgentRegistry::new();
    registry.register_primary(SourceType::Web, agent).unwrap();

    let orchestrator = Orchestrator::with_config(registry, fast_config()).unwrap();
    let mut handle = orchestrator
        .submit(vec![Source::new(SourceType::Web, "https://shop.example.com")])
        .unwrap();

    // The handle carries the job id before any work happens.
    let job_id = handle.job_id();

    let mut seen = Vec::new();
    while let Some(update) = handle.next_update().await {
        assert_eq!(update.job_id, job_id);
        seen.push(update.status);
        if update.status.is_terminal() {
            break;
        }
    }

    assert_eq!(
        seen,
        vec![
            SourceStatus::Validating,
            SourceStatus::Dispatching,
            SourceStatus::Extracting,
            SourceStatus::Normalizing,
            SourceStatus::Succeeded,
        ]
    );

    let state = handle.wait().await.unwrap();
    assert_eq!(state.status, JobStatus::Complete);
}

#[tokio::test]
async fn cancellation_preserves_terminal_sources() {
    let quick = Arc::new(MockAgent::new("quick").supporting([SourceType::Web]));
    let slow = Arc::new(
        MockAgent::new("slow")
            .supporting([SourceType::Document])
            .with_delay(Duration::from_secs(30)),
    );

    let mut registry = AgentRegistry::new();
    registry.register_primary(SourceType::Web, quick).unwrap();
    registry.register_primary(SourceType::Document, slow.clone()).unwrap();

    let sources = vec![
        Source::new(SourceType::Web, "https://a.example.com"),
        Source::new(SourceType::Web, "https://b.example.com"),
        Source::new(SourceType::Web, "https://c.example.com"),
        Source::new(SourceType::Document, "/data/one.pdf"),
        Source::new(SourceType::Document, "/data/two.pdf"),
    ];

    let config = fast_config()
        .with_max_concurrent_sources(5)
        .abort_in_flight(true);
    let orchestrator = Orchestrator::with_config(registry, config).unwrap();
    let mut handle = orchestrator.submit(sources).unwrap();

    // Wait for the three quick sources to finish, then cancel the rest.
    let mut succeeded = 0;
    while let Some(update) = handle.next_update().await {
        if update.status == SourceStatus::Succeeded {
            succeeded += 1;
            if succeeded == 3 {
                break;
            }
        }
    }
    handle.cancel();

    let state = handle.wait().await.unwrap();
    assert_eq!(state.status, JobStatus::Complete);

    let summary = state.summary();
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.cancelled, 2);
    assert_eq!(summary.failed, 0);

    for source in state.sources() {
        match source.source_type {
            SourceType::Web => assert_eq!(source.status, SourceStatus::Succeeded),
            _ => {
                assert_eq!(source.status, SourceStatus::Cancelled);
                assert_eq!(source.error.as_ref().unwrap().kind, ErrorKind::Cancelled);
            }
        }
    }

    // In-flight attempts were aborted, not re-issued.
    assert!(slow.total_calls() <= 2);
}

#[tokio::test]
async fn non_pending_source_is_a_contract_violation() {
    let agent = Arc::new(MockAgent::new("web").supporting([SourceType::Web]));

    let mut registry = AgentRegistry::new();
    registry.register_primary(SourceType::Web, agent).unwrap();

    let mut state = ExtractionState::new(vec![
        Source::new(SourceType::Web, "https://fresh.example.com"),
        Source::new(SourceType::Web, "https://stale.example.com"),
    ]);
    let ids: Vec<_> = state.sources.keys().copied().collect();
    // Simulate a state that was already partially executed elsewhere.
    state.sources[&ids[1]].status = SourceStatus::Extracting;

    let orchestrator = Orchestrator::with_config(registry, fast_config()).unwrap();
    let state = orchestrator.run_state(state).await.unwrap();

    let fresh = state.source(&ids[0]).unwrap();
    assert_eq!(fresh.status, SourceStatus::Succeeded);

    let stale = state.source(&ids[1]).unwrap();
    assert_eq!(stale.status, SourceStatus::Failed);
    assert_eq!(stale.error.as_ref().unwrap().kind, ErrorKind::Contract);

    let summary = state.summary();
    assert_eq!(summary.contract_violations, 1);
    assert_eq!(summary.succeeded, 1);
}

#[tokio::test]
async fn final_state_round_trips_through_serde() {
    let agent = Arc::new(MockAgent::new("web").supporting([SourceType::Web]));

    let mut registry = AgentRegistry::new();
    registry.register_primary(SourceType::Web, agent).unwrap();

    let orchestrator = Orchestrator::with_config(registry, fast_config()).unwrap();
    let state = orchestrator
        .run(vec![
            Source::new(SourceType::Web, "https://shop.example.com/catalog"),
            Source::new(SourceType::Api, "https://api.example.com/v1"),
        ])
        .await
        .unwrap();

    let json = serde_json::to_string(&state).unwrap();
    let back: ExtractionState = serde_json::from_str(&json).unwrap();

    assert_eq!(back.job_id, state.job_id);
    assert_eq!(back.status, JobStatus::Complete);
    assert_eq!(back.len(), 2);
    for (original, restored) in state.sources().zip(back.sources()) {
        assert_eq!(original.id, restored.id);
        assert_eq!(original.status, restored.status);
        assert_eq!(original.result, restored.result);
    }
}
