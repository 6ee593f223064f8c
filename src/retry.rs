use std::future::Future;
use std::time::Duration;

use rand::Rng as _;

/// Outcome of classifying a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Server-mandated cooldown. The wait is authoritative and does not
    /// count against the retry budget.
    RateLimited(Duration),
    /// Transient fault, retried with exponential backoff.
    Retryable,
    /// Cannot succeed as issued; returned immediately.
    Fatal,
}

/// Errors that know how to classify themselves for the retry executor.
pub trait Classify {
    fn classify(&self) -> Classification;
}

/// Backoff configuration for [`retry_with_backoff`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::remote_operation()
    }
}

impl RetryPolicy {
    /// Policy for calls against the remote messaging service.
    pub fn remote_operation() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(120),
            exponential_base: 2.0,
            jitter: true,
        }
    }

    /// Policy for local file and subprocess work. Pair it with a classifier
    /// that only retries I/O-level faults, such as [`classify_io`].
    pub fn local_file_operation() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            exponential_base: 1.5,
            jitter: false,
        }
    }

    /// Delay before retry number `attempt` (1-indexed).
    ///
    /// Formula: `min(base * exponential_base^(attempt-1) * (1 + jitter), max)`,
    /// with jitter drawn from `[0, 0.1)` when enabled.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter {
            rand::thread_rng().gen_range(0.0..0.1)
        } else {
            0.0
        };
        self.delay_with_jitter(attempt, jitter)
    }

    fn delay_with_jitter(&self, attempt: u32, jitter_fraction: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64()
            * self.exponential_base.powi(exponent)
            * (1.0 + jitter_fraction);
        let max = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= max {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Classifier for local file operations: only I/O faults that can clear up
/// on their own are retried.
pub fn classify_io(err: &std::io::Error) -> Classification {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::Interrupted
        | ErrorKind::WouldBlock
        | ErrorKind::TimedOut
        | ErrorKind::PermissionDenied
        | ErrorKind::UnexpectedEof => Classification::Retryable,
        _ => Classification::Fatal,
    }
}

/// Retry an async operation, switching on the classifier's verdict.
///
/// - `RateLimited(wait)`: sleep exactly `wait`, retry, budget untouched
/// - `Retryable`: sleep the backoff delay, retry, up to `max_retries` times
/// - `Fatal`: return the error at once
///
/// Returns the first `Ok`, or the last error once the budget is spent.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    policy: &RetryPolicy,
    classifier: C,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> Classification,
    E: std::fmt::Display,
{
    let mut retries = 0u32;

    loop {
        let err = match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => e,
        };
        match classifier(&err) {
            Classification::Fatal => return Err(err),
            Classification::RateLimited(wait) => {
                tracing::warn!(
                    "Rate limited, waiting {:.1}s before retrying: {}",
                    wait.as_secs_f64(),
                    err
                );
                tokio::time::sleep(wait).await;
            }
            Classification::Retryable => {
                if retries >= policy.max_retries {
                    return Err(err);
                }
                retries += 1;
                let delay = policy.delay_for_attempt(retries);
                tracing::warn!(
                    "Retryable error (retry {}/{}), retrying in {:.1}s: {}",
                    retries,
                    policy.max_retries,
                    delay.as_secs_f64(),
                    err
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// [`retry_with_backoff`] using the error type's own classification.
pub async fn execute<F, Fut, T, E>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + std::fmt::Display,
{
    retry_with_backoff(policy, |e: &E| e.classify(), operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn instant_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            exponential_base: 2.0,
            jitter: false,
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum TestError {
        Limited(u64),
        Blip,
        Broken,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Classify for TestError {
        fn classify(&self) -> Classification {
            match self {
                Self::Limited(secs) => Classification::RateLimited(Duration::from_secs(*secs)),
                Self::Blip => Classification::Retryable,
                Self::Broken => Classification::Fatal,
            }
        }
    }

    /// Operation that fails with `script[n]` on call `n`, then succeeds.
    fn scripted(
        script: Vec<TestError>,
        calls: Arc<AtomicU32>,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = Result<u32, TestError>> + Send>> {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) as usize;
            let outcome = script.get(n).copied();
            Box::pin(async move {
                match outcome {
                    Some(e) => Err(e),
                    None => Ok(n as u32),
                }
            })
        }
    }

    #[test]
    fn test_preset_policies() {
        let remote = RetryPolicy::remote_operation();
        assert_eq!(remote.max_retries, 3);
        assert_eq!(remote.base_delay, Duration::from_secs(2));
        assert_eq!(remote.max_delay, Duration::from_secs(120));
        assert_eq!(remote.exponential_base, 2.0);
        assert!(remote.jitter);

        let local = RetryPolicy::local_file_operation();
        assert_eq!(local.max_retries, 2);
        assert_eq!(local.base_delay, Duration::from_secs(1));
        assert_eq!(local.max_delay, Duration::from_secs(10));
        assert!(!local.jitter);
    }

    #[test]
    fn test_delay_exponential_without_jitter() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::remote_operation()
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_jitter_stays_within_ten_percent() {
        let policy = RetryPolicy::remote_operation();
        for _ in 0..50 {
            let d = policy.delay_for_attempt(2);
            assert!(d >= Duration::from_secs(4));
            assert!(d < Duration::from_secs_f64(4.4));
        }
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = RetryPolicy::remote_operation();
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(120));
        assert_eq!(policy.delay_with_jitter(7, 0.09), Duration::from_secs(120));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(120));
    }

    #[test]
    fn test_local_policy_uses_gentler_growth() {
        let policy = RetryPolicy::local_file_operation();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs_f64(1.5));
    }

    #[test]
    fn test_classify_io() {
        use std::io::{Error, ErrorKind};
        assert_eq!(
            classify_io(&Error::from(ErrorKind::TimedOut)),
            Classification::Retryable
        );
        assert_eq!(
            classify_io(&Error::from(ErrorKind::PermissionDenied)),
            Classification::Retryable
        );
        assert_eq!(
            classify_io(&Error::from(ErrorKind::NotFound)),
            Classification::Fatal
        );
    }

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = execute(&instant_policy(3), scripted(vec![], calls.clone())).await;
        assert_eq!(result.unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fatal_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = execute(
            &instant_policy(3),
            scripted(vec![TestError::Broken], calls.clone()),
        )
        .await;
        assert_eq!(result.unwrap_err(), TestError::Broken);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retryable_exhausts_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = execute(
            &instant_policy(2),
            scripted(vec![TestError::Blip; 5], calls.clone()),
        )
        .await;
        assert_eq!(result.unwrap_err(), TestError::Blip);
        // 1 initial + 2 retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_succeeds_after_retryable_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = execute(
            &instant_policy(3),
            scripted(vec![TestError::Blip, TestError::Blip], calls.clone()),
        )
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_sleeps_exactly_the_hint() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();
        let result = execute(
            &RetryPolicy::remote_operation(),
            scripted(vec![TestError::Limited(37)], calls.clone()),
        )
        .await;
        assert_eq!(result.unwrap(), 1);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(37));
        assert!(elapsed < Duration::from_secs(38));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limits_do_not_consume_retry_budget() {
        // max_retries retryable failures interleaved with several rate limits
        // still succeeds: only the Blips count against the cap.
        let calls = Arc::new(AtomicU32::new(0));
        let script = vec![
            TestError::Limited(5),
            TestError::Blip,
            TestError::Limited(5),
            TestError::Limited(5),
            TestError::Blip,
            TestError::Limited(5),
        ];
        let result = execute(&instant_policy(2), scripted(script, calls.clone())).await;
        assert_eq!(result.unwrap(), 6);
        assert_eq!(calls.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_custom_classifier_overrides_error_classification() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_with_backoff(
            &instant_policy(3),
            |_: &TestError| Classification::Fatal,
            scripted(vec![TestError::Blip], calls.clone()),
        )
        .await;
        assert_eq!(result.unwrap_err(), TestError::Blip);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
