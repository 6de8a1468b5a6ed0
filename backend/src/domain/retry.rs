//! Bounded retry with jittered exponential backoff.
//!
//! Compare-and-set races and store serialization conflicts are resolved by
//! re-running the whole read-validate-write cycle. The policy bounds the number
//! of cycles; exhausting it surfaces [`ErrorCode::Conflict`].
//!
//! [`ErrorCode::Conflict`]: super::ErrorCode::Conflict

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use tracing::debug;

use super::Error;

/// Retry limits for contended writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Cap applied to the exponential delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(25),
            max_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Exponential base delay before retrying after `attempt` failed.
    ///
    /// # Examples
    /// ```
    /// use std::time::Duration;
    /// use smartqueue::domain::RetryPolicy;
    ///
    /// let policy = RetryPolicy {
    ///     max_attempts: 5,
    ///     initial_backoff: Duration::from_millis(10),
    ///     max_backoff: Duration::from_millis(30),
    /// };
    /// assert_eq!(policy.base_delay(1), Duration::from_millis(10));
    /// assert_eq!(policy.base_delay(2), Duration::from_millis(20));
    /// assert_eq!(policy.base_delay(3), Duration::from_millis(30));
    /// ```
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = 2_u32.saturating_pow(attempt.saturating_sub(1));
        let base_ms = u64::try_from(self.initial_backoff.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_backoff.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(u64::from(exponent)).min(max_ms))
    }
}

/// Async sleeping abstraction so tests can skip real delays.
#[async_trait]
pub trait RetrySleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Jitter applied on top of the exponential base delay.
pub trait BackoffJitter: Send + Sync {
    fn jittered_delay(&self, base: Duration, attempt: u32, now: DateTime<Utc>) -> Duration;
}

/// Sleeper backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl RetrySleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Adds up to a quarter of the base delay, seeded from the clock's
/// sub-second nanos so contending writers spread out.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttemptJitter;

impl BackoffJitter for AttemptJitter {
    fn jittered_delay(&self, base: Duration, attempt: u32, now: DateTime<Utc>) -> Duration {
        let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        let spread = (base_ms / 4).max(1);
        let seed = u64::from(now.timestamp_subsec_nanos()).rotate_left(attempt) ^ u64::from(attempt);
        Duration::from_millis(base_ms.saturating_add(seed % spread.saturating_add(1)))
    }
}

/// Outcome of one attempt inside [`Retrier::run`].
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Done(T),
    /// A concurrent writer won; the cycle may be re-run.
    Contended(String),
    Failed(Error),
}

/// Runs closures under a [`RetryPolicy`].
#[derive(Clone)]
pub struct Retrier {
    policy: RetryPolicy,
    sleeper: Arc<dyn RetrySleeper>,
    jitter: Arc<dyn BackoffJitter>,
    clock: Arc<dyn Clock>,
}

impl Retrier {
    /// Build a retrier from explicit sleeper and jitter seams.
    pub fn new(
        policy: RetryPolicy,
        sleeper: Arc<dyn RetrySleeper>,
        jitter: Arc<dyn BackoffJitter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            policy,
            sleeper,
            jitter,
            clock,
        }
    }

    /// Tokio sleeper with deterministic jitter.
    pub fn with_policy(policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self::new(policy, Arc::new(TokioSleeper), Arc::new(AttemptJitter), clock)
    }

    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `attempt` until it finishes, fails, or the policy is exhausted.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AttemptOutcome<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_contention = String::new();

        for current in 1..=max_attempts {
            match attempt().await {
                AttemptOutcome::Done(value) => return Ok(value),
                AttemptOutcome::Failed(error) => return Err(error),
                AttemptOutcome::Contended(reason) => {
                    debug!(operation, attempt = current, %reason, "write contended");
                    last_contention = reason;
                    if current < max_attempts {
                        let base = self.policy.base_delay(current);
                        let delay = self.jitter.jittered_delay(base, current, self.clock.utc());
                        self.sleeper.sleep(delay).await;
                    }
                }
            }
        }

        Err(Error::conflict(format!(
            "{operation} lost {max_attempts} concurrent update race(s): {last_contention}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use mockable::DefaultClock;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::domain::ErrorCode;

    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl RetrySleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().expect("delays mutex").push(duration);
        }
    }

    struct NoJitter;

    impl BackoffJitter for NoJitter {
        fn jittered_delay(&self, base: Duration, _attempt: u32, _now: DateTime<Utc>) -> Duration {
            base
        }
    }

    #[fixture]
    fn sleeper() -> Arc<RecordingSleeper> {
        Arc::new(RecordingSleeper::default())
    }

    fn retrier(sleeper: Arc<RecordingSleeper>, max_attempts: u32) -> Retrier {
        Retrier::new(
            RetryPolicy {
                max_attempts,
                initial_backoff: Duration::from_millis(10),
                max_backoff: Duration::from_millis(15),
            },
            sleeper,
            Arc::new(NoJitter),
            Arc::new(DefaultClock),
        )
    }

    #[rstest]
    #[tokio::test]
    async fn succeeds_after_contention(sleeper: Arc<RecordingSleeper>) {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result = retrier(Arc::clone(&sleeper), 3)
            .run("call", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    AttemptOutcome::Contended("stale".to_owned())
                } else {
                    AttemptOutcome::Done(7)
                }
            })
            .await;

        assert_eq!(result.expect("second attempt wins"), 7);
        assert_eq!(
            *sleeper.delays.lock().expect("delays mutex"),
            vec![Duration::from_millis(10)]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn exhaustion_is_a_conflict(sleeper: Arc<RecordingSleeper>) {
        let result: Result<(), Error> = retrier(Arc::clone(&sleeper), 3)
            .run("complete", || async { AttemptOutcome::Contended("stale".to_owned()) })
            .await;

        let err = result.expect_err("retries exhausted");
        assert_eq!(err.code(), ErrorCode::Conflict);
        assert_eq!(
            *sleeper.delays.lock().expect("delays mutex"),
            vec![Duration::from_millis(10), Duration::from_millis(15)]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn failures_are_not_retried(sleeper: Arc<RecordingSleeper>) {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), Error> = retrier(Arc::clone(&sleeper), 5)
            .run("cancel", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                AttemptOutcome::Failed(Error::invalid_transition("used"))
            })
            .await;

        assert_eq!(result.expect_err("fails").code(), ErrorCode::InvalidTransition);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays.lock().expect("delays mutex").is_empty());
    }

    #[rstest]
    fn jitter_stays_within_a_quarter_of_base() {
        let base = Duration::from_millis(100);
        let delay = AttemptJitter.jittered_delay(base, 2, Utc::now());
        assert!(delay >= base);
        assert!(delay <= Duration::from_millis(125));
    }
}
