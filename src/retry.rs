use crate::error::ErrorKind;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one)
    pub max_attempts: u32,
    /// Initial delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles the delay each time)
    pub backoff_multiplier: f64,
    /// Fraction of the delay added as random jitter (0.2 = up to +20%)
    pub jitter: f64,
    /// Wall-clock limit for a single attempt
    pub attempt_timeout: Duration,
    /// Give up after this many consecutive overload failures
    pub overload_fast_fail_after: u32,
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: 0.0,
            attempt_timeout: Duration::from_secs(60),
            overload_fast_fail_after: u32::MAX,
        }
    }

    /// Set the maximum delay between retries
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set the jitter fraction (clamped to 0.0..=1.0)
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Set the per-attempt timeout
    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Fail fast after `count` consecutive overload failures
    pub fn with_overload_fast_fail(mut self, count: u32) -> Self {
        self.overload_fast_fail_after = count.max(1);
        self
    }

    /// Preset: Provider translation calls (3 attempts, jittered, 60s per attempt)
    /// Delays: 2s, 4s (+up to 20%), stop after 2 overloads in a row
    pub fn translation() -> Self {
        Self::new(3, Duration::from_secs(2))
            .with_max_delay(Duration::from_secs(30))
            .with_backoff_multiplier(2.0)
            .with_jitter(0.2)
            .with_attempt_timeout(Duration::from_secs(60))
            .with_overload_fast_fail(2)
    }

    /// Calculate the delay for a given attempt number (0-indexed), before jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay_ms = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        let delay = Duration::from_millis(delay_ms as u64);
        delay.min(self.max_delay)
    }

    /// Delay for an attempt with jitter drawn from the thread RNG
    fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.delay_for_attempt(attempt);
        if base.is_zero() || self.jitter <= 0.0 {
            return base;
        }
        let unit: f64 = rand::thread_rng().gen_range(0.0..1.0);
        apply_jitter(base, self.jitter, unit).min(self.max_delay)
    }
}

/// Stretch `delay` by up to `jitter` of itself; `unit` is a sample in `[0, 1)`.
pub fn apply_jitter(delay: Duration, jitter: f64, unit: f64) -> Duration {
    let factor = 1.0 + jitter.clamp(0.0, 1.0) * unit.clamp(0.0, 1.0);
    Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
}

/// How the classified retry loop should treat one failure.
pub trait RetryClassify {
    fn error_kind(&self) -> ErrorKind;

    /// Failure that signals sustained overload (counts toward fast-fail)
    fn is_overload(&self) -> bool {
        false
    }
}

impl RetryClassify for crate::error::ProviderError {
    fn error_kind(&self) -> ErrorKind {
        self.kind()
    }

    fn is_overload(&self) -> bool {
        crate::error::ProviderError::is_overload(self)
    }
}

/// Execute an async operation with retries driven by an error classifier.
///
/// Each attempt runs under `config.attempt_timeout`; a timed-out attempt is
/// turned into an error by `on_timeout(attempt, limit)` and treated like any
/// other failure.
/// Non-retryable kinds return immediately, and after
/// `config.overload_fast_fail_after` consecutive overload failures the loop
/// gives up without spending the rest of its budget.
///
/// # Panics
/// Panics if `config.max_attempts` is 0
pub async fn with_retry_classified<T, E, F, Fut, TO>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
    mut on_timeout: TO,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + RetryClassify,
    TO: FnMut(u32, Duration) -> E,
{
    assert!(
        config.max_attempts >= 1,
        "RetryConfig.max_attempts must be >= 1, got {}",
        config.max_attempts
    );

    let mut last_error: Option<E> = None;
    let mut consecutive_overloads = 0u32;

    for attempt in 0..config.max_attempts {
        let delay = config.jittered_delay(attempt);
        if !delay.is_zero() {
            debug!(
                "{}: Retry attempt {}/{} after {:?}",
                operation_name,
                attempt + 1,
                config.max_attempts,
                delay
            );
            sleep(delay).await;
        }

        let outcome = match timeout(config.attempt_timeout, operation(attempt)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(on_timeout(attempt, config.attempt_timeout)),
        };

        match outcome {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        "{}: Succeeded on attempt {}/{}",
                        operation_name,
                        attempt + 1,
                        config.max_attempts
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                let kind = e.error_kind();
                if !kind.is_retryable() {
                    debug!(
                        "{}: {} error is not retryable, failing immediately: {}",
                        operation_name, kind, e
                    );
                    return Err(e);
                }

                if e.is_overload() {
                    consecutive_overloads += 1;
                } else {
                    consecutive_overloads = 0;
                }

                if consecutive_overloads >= config.overload_fast_fail_after
                    && attempt + 1 < config.max_attempts
                {
                    warn!(
                        "{}: {} consecutive overload failures, giving up early: {}",
                        operation_name, consecutive_overloads, e
                    );
                    return Err(e);
                }

                log_failed_attempt(config, operation_name, attempt, &e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.expect("At least one attempt should have been made"))
}

fn log_failed_attempt<E: std::fmt::Display>(
    config: &RetryConfig,
    operation_name: &str,
    attempt: u32,
    error: &E,
) {
    let remaining = config.max_attempts - attempt - 1;
    if remaining > 0 {
        warn!(
            "{}: Attempt {}/{} failed ({}), {} retries remaining",
            operation_name,
            attempt + 1,
            config.max_attempts,
            error,
            remaining
        );
    } else {
        warn!(
            "{}: All {} attempts failed. Last error: {}",
            operation_name, config.max_attempts, error
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct TestError {
        kind: ErrorKind,
        overload: bool,
    }

    impl TestError {
        fn of(kind: ErrorKind) -> Self {
            Self {
                kind,
                overload: false,
            }
        }

        fn overload() -> Self {
            Self {
                kind: ErrorKind::Server,
                overload: true,
            }
        }
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{} error", self.kind)
        }
    }

    impl RetryClassify for TestError {
        fn error_kind(&self) -> ErrorKind {
            self.kind
        }

        fn is_overload(&self) -> bool {
            self.overload
        }
    }

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig::new(max_attempts, Duration::from_millis(5))
            .with_attempt_timeout(Duration::from_secs(5))
    }

    // ==================== RetryConfig Tests ====================

    #[test]
    fn test_retry_config_translation_preset() {
        let config = RetryConfig::translation();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay, Duration::from_secs(2));
        assert_eq!(config.attempt_timeout, Duration::from_secs(60));
        assert_eq!(config.overload_fast_fail_after, 2);
        assert!((config.jitter - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_jitter_is_clamped() {
        assert_eq!(RetryConfig::translation().with_jitter(3.0).jitter, 1.0);
        assert_eq!(RetryConfig::translation().with_jitter(-1.0).jitter, 0.0);
    }

    // ==================== Backoff Tests ====================

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig::new(4, Duration::from_secs(1)).with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_respects_max() {
        let config = RetryConfig::new(10, Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(3))
            .with_backoff_multiplier(2.0);

        // Attempt 4 would be 8 seconds, but max is 3
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(3));
        assert_eq!(config.delay_for_attempt(9), Duration::from_secs(3));
    }

    #[test]
    fn test_apply_jitter_bounds() {
        let base = Duration::from_millis(1000);
        assert_eq!(apply_jitter(base, 0.2, 0.0), Duration::from_millis(1000));
        assert_eq!(apply_jitter(base, 0.2, 0.5), Duration::from_millis(1100));
        assert!(apply_jitter(base, 0.2, 0.999) <= Duration::from_millis(1200));
        assert_eq!(apply_jitter(base, 0.0, 0.9), base);
    }

    #[test]
    fn test_jittered_delay_stays_within_cap() {
        let config = RetryConfig::new(5, Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(150))
            .with_jitter(1.0);

        for _ in 0..50 {
            let first = config.jittered_delay(1);
            assert!(first >= Duration::from_millis(100));
            assert!(first <= Duration::from_millis(150));
            assert_eq!(config.jittered_delay(2), Duration::from_millis(150));
        }
        assert_eq!(config.jittered_delay(0), Duration::ZERO);
    }

    // ==================== with_retry_classified Tests ====================

    #[tokio::test]
    #[should_panic(expected = "max_attempts must be >= 1")]
    async fn test_classified_panics_on_zero_attempts() {
        let config = RetryConfig::new(0, Duration::from_millis(100));

        let _result: Result<(), TestError> = with_retry_classified(
            &config,
            "zero_attempts",
            |_| async { Ok(()) },
            |_, _| TestError::overload(),
        )
        .await;
    }

    #[tokio::test]
    async fn test_classified_retries_rate_limit_then_succeeds() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<&str, TestError> = with_retry_classified(
            &fast_config(3),
            "rate_limited",
            |_| {
                let c = counter_clone.clone();
                async move {
                    match c.fetch_add(1, Ordering::SeqCst) {
                        0 => Err(TestError::of(ErrorKind::RateLimit)),
                        _ => Ok("done"),
                    }
                }
            },
            |_, _| TestError::overload(),
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_classified_quota_fails_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<(), TestError> = with_retry_classified(
            &fast_config(5),
            "quota",
            |_| {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::of(ErrorKind::Quota))
                }
            },
            |_, _| TestError::overload(),
        )
        .await;

        assert_eq!(result.unwrap_err().kind, ErrorKind::Quota);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_classified_auth_client_parse_not_retried() {
        for kind in [ErrorKind::Auth, ErrorKind::Client, ErrorKind::Parse] {
            let counter = Arc::new(AtomicU32::new(0));
            let counter_clone = counter.clone();

            let result: Result<(), TestError> = with_retry_classified(
                &fast_config(3),
                "non_retryable",
                |_| {
                    let c = counter_clone.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Err(TestError::of(kind))
                    }
                },
                |_, _| TestError::overload(),
            )
            .await;

            assert!(result.is_err());
            assert_eq!(counter.load(Ordering::SeqCst), 1, "{} should not retry", kind);
        }
    }

    #[tokio::test]
    async fn test_classified_server_errors_exhaust_attempts() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<(), TestError> = with_retry_classified(
            &fast_config(4),
            "server",
            |_| {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::of(ErrorKind::Server))
                }
            },
            |_, _| TestError::overload(),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_classified_overload_fast_fails() {
        let config = fast_config(5).with_overload_fast_fail(2);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<(), TestError> = with_retry_classified(
            &config,
            "overloaded",
            |_| {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::overload())
                }
            },
            |_, _| TestError::overload(),
        )
        .await;

        assert!(result.unwrap_err().overload);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_classified_overload_counter_resets_on_other_errors() {
        let config = fast_config(4).with_overload_fast_fail(2);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<(), TestError> = with_retry_classified(
            &config,
            "mixed",
            |_| {
                let c = counter_clone.clone();
                async move {
                    match c.fetch_add(1, Ordering::SeqCst) {
                        0 | 2 => Err(TestError::overload()),
                        _ => Err(TestError::of(ErrorKind::RateLimit)),
                    }
                }
            },
            |_, _| TestError::overload(),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_classified_timeout_is_retried() {
        let config = RetryConfig::new(3, Duration::from_millis(5))
            .with_attempt_timeout(Duration::from_millis(50));
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let mut timed_out = Vec::new();

        let result: Result<&str, TestError> = with_retry_classified(
            &config,
            "hanging",
            |_| {
                let c = counter_clone.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        sleep(Duration::from_secs(10)).await;
                    }
                    Ok("recovered")
                }
            },
            |attempt, limit| {
                timed_out.push((attempt, limit));
                TestError::of(ErrorKind::Server)
            },
        )
        .await;

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(timed_out, vec![(0, Duration::from_millis(50))]);
    }

    #[tokio::test]
    async fn test_classified_passes_attempt_index() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let _result: Result<(), TestError> = with_retry_classified(
            &fast_config(3),
            "attempts",
            |attempt| {
                let seen = seen_clone.clone();
                async move {
                    seen.lock().unwrap().push(attempt);
                    Err(TestError::of(ErrorKind::Unknown))
                }
            },
            |_, _| TestError::overload(),
        )
        .await;

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }
}
