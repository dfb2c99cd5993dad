use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

/// Whether a failure is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Timeouts, 5xx, 429, process spawn hiccups.
    Soft,
    Hard,
}

/// Bounded exponential backoff shared by every stage that talks to the network.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1))
            .with_jitter()
    }

    /// Run `op`, retrying while `classify` says the error is [`FailureClass::Soft`].
    pub async fn retry<T, E, F, Fut, C>(&self, what: &str, op: F, classify: C) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> FailureClass,
        E: Display,
    {
        op.retry(self.backoff())
            .sleep(tokio::time::sleep)
            .when(|e| classify(e) == FailureClass::Soft)
            .notify(|e, delay| {
                tracing::warn!(
                    operation = what,
                    error = %e,
                    retry_in = %humantime::format_duration(delay),
                    "Retrying after transient failure"
                );
            })
            .await
    }
}
