//! Orchestrator configuration.

use std::time::Duration;

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Same delay before every retry.
    Fixed,
    /// Delay doubles (or grows by `factor`) per attempt, capped.
    Exponential { factor: u32, cap: Duration },
}

/// Configuration for the orchestrator.
///
/// Constructed once and shared read-only across jobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Retry ceiling per source. An attempt that fails retryably when this
    /// many attempts have been made converts to a permanent failure.
    pub max_attempts: u32,

    /// Base delay before the first retry.
    pub backoff_base_delay: Duration,

    /// How the delay grows across retries.
    pub backoff: BackoffStrategy,

    /// Timeout applied to each individual agent attempt. An elapsed timeout
    /// is treated as a retryable failure.
    pub per_attempt_timeout: Duration,

    /// Maximum number of sources extracting concurrently within one job.
    pub max_concurrent_sources: usize,

    /// When true, cancellation aborts in-flight agent attempts; when false,
    /// an in-flight attempt is allowed to finish before cancellation is
    /// applied to the source.
    pub abort_in_flight: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_delay: Duration::from_millis(500),
            backoff: BackoffStrategy::Exponential {
                factor: 2,
                cap: Duration::from_secs(30),
            },
            per_attempt_timeout: Duration::from_secs(30),
            max_concurrent_sources: 4,
            abort_in_flight: false,
        }
    }
}

impl OrchestratorConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry ceiling.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the base backoff delay.
    pub fn with_backoff_base_delay(mut self, delay: Duration) -> Self {
        self.backoff_base_delay = delay;
        self
    }

    /// Use a fixed backoff strategy.
    pub fn with_fixed_backoff(mut self) -> Self {
        self.backoff = BackoffStrategy::Fixed;
        self
    }

    /// Use an exponential backoff strategy.
    pub fn with_exponential_backoff(mut self, factor: u32, cap: Duration) -> Self {
        self.backoff = BackoffStrategy::Exponential { factor, cap };
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_per_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.per_attempt_timeout = timeout;
        self
    }

    /// Set the concurrency limit.
    pub fn with_max_concurrent_sources(mut self, max: usize) -> Self {
        self.max_concurrent_sources = max.max(1);
        self
    }

    /// Abort in-flight agent attempts on cancellation.
    pub fn abort_in_flight(mut self, abort: bool) -> Self {
        self.abort_in_flight = abort;
        self
    }

    /// Delay to sleep before re-entering the extract step.
    ///
    /// `attempt` is the number of attempts already made (>= 1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            BackoffStrategy::Fixed => self.backoff_base_delay,
            BackoffStrategy::Exponential { factor, cap } => {
                let exponent = attempt.saturating_sub(1).min(16);
                let multiplier = u64::from(factor).saturating_pow(exponent);
                self.backoff_base_delay
                    .saturating_mul(multiplier.min(u64::from(u32::MAX)) as u32)
                    .min(cap)
            }
        }
    }
}
