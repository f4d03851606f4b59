//! Testing utilities including mock implementations.
//!
//! These are useful for testing orchestration logic without making real
//! network or filesystem calls.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::traits::agent::{AgentOutcome, ExtractionAgent};
use crate::types::record::{fields, RawExtract};
use crate::types::source::{Source, SourceType};

/// A mock extraction agent with scripted, per-locator outcome sequences.
///
/// Unscripted locators succeed with a single placeholder item. Every call is
/// recorded for assertions.
pub struct MockAgent {
    name: String,
    supported: Vec<SourceType>,
    delay: Option<Duration>,
    scripts: Mutex<HashMap<String, VecDeque<AgentOutcome>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockAgent {
    /// Create a mock supporting all source types.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supported: vec![SourceType::Web, SourceType::Document, SourceType::Api],
            delay: None,
            scripts: Mutex::new(HashMap::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Restrict the supported source types.
    pub fn supporting(mut self, types: impl IntoIterator<Item = SourceType>) -> Self {
        self.supported = types.into_iter().collect();
        self
    }

    /// Sleep for `delay` before answering each attempt.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Script the outcome sequence for a locator. Outcomes are consumed in
    /// order; once exhausted, further attempts get the default success.
    pub fn with_script(
        self,
        locator: impl Into<String>,
        outcomes: impl IntoIterator<Item = AgentOutcome>,
    ) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(locator.into(), outcomes.into_iter().collect());
        self
    }

    /// Script `failures` retryable failures followed by a success.
    pub fn failing_then_succeeding(self, locator: impl Into<String>, failures: usize) -> Self {
        let locator = locator.into();
        let mut outcomes: Vec<AgentOutcome> = (0..failures)
            .map(|i| AgentOutcome::retryable(format!("transient failure #{}", i + 1)))
            .collect();
        outcomes.push(AgentOutcome::Success(Self::default_extract(&locator)));
        self.with_script(locator, outcomes)
    }

    /// All locators attempted so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of attempts made against a locator.
    pub fn call_count(&self, locator: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.as_str() == locator)
            .count()
    }

    /// Total number of attempts across all locators.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn default_extract(locator: &str) -> RawExtract {
        RawExtract::new().with_item(
            [
                (fields::NAME.to_string(), json!("mock item")),
                (fields::PAGE.to_string(), json!(locator)),
            ]
            .into_iter()
            .collect(),
        )
    }
}

#[async_trait]
impl ExtractionAgent for MockAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, source_type: SourceType) -> bool {
        self.supported.contains(&source_type)
    }

    async fn attempt(&self, source: &Source) -> AgentOutcome {
        self.calls.lock().unwrap().push(source.locator.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&source.locator)
            .and_then(|queue| queue.pop_front());

        scripted.unwrap_or_else(|| AgentOutcome::Success(Self::default_extract(&source.locator)))
    }
}
