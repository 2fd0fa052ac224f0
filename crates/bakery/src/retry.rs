//! Retry policy shared by the upload and build pipelines.

use std::future::Future;
use std::time::Duration;

use cake_remote::RemoteError;
use rand::Rng;
use tokio_util::sync::CancellationToken;

/// How a pipeline retries a failed remote operation on the same slice.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
    /// Attempts per slice, the first one included. `None` never gives up.
    pub max_attempts: Option<u32>,
    /// Apply ±25% jitter to every delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            max_attempts: Some(10),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Fixed `delay` between attempts, never giving up.
    ///
    /// `RetryPolicy::forever(Duration::from_secs(10))` is the classic
    /// operator-supervised upload loop.
    pub fn forever(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            backoff_factor: 1.0,
            max_attempts: None,
            jitter: false,
        }
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: Some(1),
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Whether another attempt may follow `attempts_made` failed ones.
    pub fn allows_another(&self, attempts_made: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts_made < max)
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if !self.jitter || capped <= 0.0 {
            return Duration::from_secs_f64(capped.max(0.0));
        }
        let offset: f64 = rand::thread_rng().gen_range(-1.0..1.0);
        let with_jitter = (capped + capped * 0.25 * offset).max(0.05);
        Duration::from_secs_f64(with_jitter)
    }
}

/// Why [`retry_remote`] gave up.
#[derive(Debug)]
pub(crate) enum RetryFailure {
    Exhausted { attempts: u32, last: RemoteError },
    Cancelled,
}

/// Runs `op` until it succeeds, the policy runs out, or `cancel` fires.
///
/// `on_retry` sees every failure that will be retried, with the attempt
/// number and the delay about to be slept.
pub(crate) async fn retry_remote<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
    mut on_retry: impl FnMut(u32, Duration, &RemoteError),
) -> Result<T, RetryFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryFailure::Cancelled);
        }
        attempt = attempt.saturating_add(1);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryFailure::Cancelled),
            r = op() => r,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !err.is_retryable() || !policy.allows_another(attempt) {
            return Err(RetryFailure::Exhausted {
                attempts: attempt,
                last: err,
            });
        }

        let delay = policy.delay_for_attempt(attempt);
        on_retry(attempt, delay, &err);

        tokio::select! {
            _ = cancel.cancelled() => return Err(RetryFailure::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
