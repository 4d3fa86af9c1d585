//! Bounded exponential backoff for Kubernetes API calls
//!
//! Reads of the engine, experiment and result resources, as well as status
//! writes, go through [`retry_with_backoff_if`] so a transient API server
//! hiccup does not abort an experiment. The caller decides which errors are
//! transient; anything else is returned on the first failure.
//!
//! ```ignore
//! use chaos_common::retry::{retry_with_backoff_if, RetryConfig};
//!
//! let engine = retry_with_backoff_if(
//!     &RetryConfig::with_max_attempts(5),
//!     "get_engine",
//!     |e: &kube::Error| chaos_common::kube_utils::is_transient(e),
//!     || engines.get_opt("engine-nginx"),
//! )
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// Attempt budget and delay curve for retried API calls
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first; 0 retries forever
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Growth factor applied after every failed attempt
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Default delay curve with a custom attempt budget
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Run the operation exactly once
    pub fn no_retry() -> Self {
        Self::with_max_attempts(1)
    }

    /// Whether `attempt` used up the budget. A budget of 0 never runs out.
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }

    /// Delay that follows `delay`, capped at `max_delay`
    fn next_delay(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.backoff_multiplier).min(self.max_delay)
    }
}

/// Scale `delay` by a random factor in `[0.5, 1.5)`
fn jittered(delay: Duration) -> Duration {
    delay.mul_f64(rand::thread_rng().gen_range(0.5..1.5))
}

/// Retry `operation` while `is_retryable` accepts the error, until it
/// succeeds or the attempt budget runs out. The last error is returned.
pub async fn retry_with_backoff_if<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    is_retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) => e,
        };

        if config.exhausted(attempt) {
            error!(
                operation = %operation_name,
                attempts = attempt,
                error = %err,
                "giving up after repeated failures"
            );
            return Err(err);
        }

        let pause = jittered(delay);
        warn!(
            operation = %operation_name,
            attempt,
            error = %err,
            delay_ms = pause.as_millis() as u64,
            "transient failure, backing off"
        );
        tokio::time::sleep(pause).await;
        delay = config.next_delay(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn always(_: &String) -> bool {
        true
    }

    /// Operation that fails `failures` times with "503" before returning 7
    fn flaky(
        calls: Arc<AtomicU32>,
        failures: u32,
    ) -> impl FnMut() -> std::future::Ready<Result<u32, String>> {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if n < failures {
                Err("503 service unavailable".to_string())
            } else {
                Ok(7)
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_absorbed() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_with_backoff_if(
            &RetryConfig::with_max_attempts(4),
            "get_engine",
            always,
            flaky(calls.clone(), 3),
        )
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_is_respected() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_with_backoff_if(
            &RetryConfig::with_max_attempts(2),
            "get_engine",
            always,
            flaky(calls.clone(), 10),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn no_retry_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_with_backoff_if(
            &RetryConfig::no_retry(),
            "get_job",
            always,
            flaky(calls.clone(), 1),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn permanent_errors_return_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_with_backoff_if(
            &RetryConfig::default(),
            "get_experiment",
            |e: &String| !e.starts_with("503"),
            flaky(calls.clone(), 1),
        )
        .await;

        assert_eq!(result, Err("503 service unavailable".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delays_grow_until_capped() {
        let config = RetryConfig {
            max_attempts: 0,
            initial_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        };
        assert_eq!(config.next_delay(Duration::from_secs(3)), Duration::from_secs(6));
        assert_eq!(config.next_delay(Duration::from_secs(6)), Duration::from_secs(10));
        assert!(!config.exhausted(1_000));
    }

    #[test]
    fn jitter_stays_in_band() {
        for _ in 0..100 {
            let d = jittered(Duration::from_millis(1000));
            assert!(d >= Duration::from_millis(500) && d <= Duration::from_millis(1500));
        }
    }
}
