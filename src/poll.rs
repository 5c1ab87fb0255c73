//! Fixed-interval polling for eventually consistent external state.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Error, Result};

/// Options for [`poll_until`].
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Pause between observations.
    pub interval: Duration,
    /// Deadline measured from the first observation.
    pub timeout: Duration,
    /// What is being waited on; carried by the timeout error.
    pub label: String,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(300),
            label: "condition".to_string(),
        }
    }
}

impl PollOptions {
    /// Creates options with default interval and timeout for `label`.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    /// Sets the interval between observations.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the overall deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Repeatedly runs `observe` until `predicate` accepts an observation.
///
/// Returns the first accepted observation. Fails with [`Error::Timeout`]
/// once the deadline passes without one. Observations run strictly one at a
/// time and the task sleeps between them.
pub async fn poll_until<T, F, Fut, P>(mut observe: F, predicate: P, opts: &PollOptions) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
    P: Fn(&T) -> bool,
{
    let deadline = Instant::now() + opts.timeout;
    let mut attempts = 0u32;

    while Instant::now() < deadline {
        let observation = observe().await;
        attempts += 1;

        if predicate(&observation) {
            tracing::debug!(label = %opts.label, attempts, "poll condition met");
            return Ok(observation);
        }

        tracing::trace!(label = %opts.label, attempts, "poll condition not yet met");
        tokio::time::sleep(opts.interval).await;
    }

    tracing::warn!(label = %opts.label, attempts, "poll timed out");
    Err(Error::Timeout {
        label: opts.label.clone(),
        after: opts.timeout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn opts(interval_ms: u64, timeout_ms: u64) -> PollOptions {
        PollOptions::new("test condition")
            .with_interval(Duration::from_millis(interval_ms))
            .with_timeout(Duration::from_millis(timeout_ms))
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_satisfying_observation_without_extra_calls() {
        let calls = Cell::new(0u32);

        let result = poll_until(
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { n }
            },
            |n| *n == 3,
            &opts(100, 10_000),
        )
        .await
        .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn predicate_sees_full_observation() {
        let result = poll_until(
            || async { vec!["SUCCESS", "FAILURE"] },
            |checks| !checks.is_empty() && checks.iter().all(|c| *c != "PENDING"),
            &opts(100, 1_000),
        )
        .await
        .unwrap();

        assert_eq!(result, vec!["SUCCESS", "FAILURE"]);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_deadline_not_before() {
        let start = Instant::now();
        let calls = Cell::new(0u32);

        let err = poll_until(
            || {
                calls.set(calls.get() + 1);
                async { false }
            },
            |ready| *ready,
            &opts(100, 1_000),
        )
        .await
        .unwrap_err();

        assert!(start.elapsed() >= Duration::from_millis(1_000));
        assert!(start.elapsed() < Duration::from_millis(1_200));
        assert_eq!(calls.get(), 10);
        match err {
            Error::Timeout { label, after } => {
                assert_eq!(label, "test condition");
                assert_eq!(after, Duration::from_millis(1_000));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_success_does_not_sleep() {
        let start = Instant::now();
        let value = poll_until(|| async { 42 }, |_| true, &opts(60_000, 120_000))
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
