//! Retryable units of work.
//!
//! Every remote git call is wrapped into a [`VcsOperation`] so the same retry
//! and timing policy applies regardless of the backend that executes it.

use crate::common::result::VcsResult;
use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// A unit of work that either produces a value or fails with a [`VcsError`](crate::common::error::VcsError).
///
/// Operations may be invoked more than once.
#[async_trait]
pub trait VcsOperation<T: Send>: Send + Sync {
    async fn call(&self) -> VcsResult<T>;
}

#[async_trait]
impl<T, O> VcsOperation<T> for Box<O>
where
    T: Send,
    O: VcsOperation<T> + ?Sized,
{
    async fn call(&self) -> VcsResult<T> {
        (**self).call().await
    }
}

/// Adapts a closure returning a future into a [`VcsOperation`].
pub struct FnOperation<F> {
    f: F,
}

/// Creates a [`VcsOperation`] from a closure.
///
/// ```
/// use gitvcs::common::error::VcsError;
/// use gitvcs::common::operation::{operation, VcsOperation};
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// let op = operation(|| async { Ok::<_, VcsError>(42) });
/// assert_eq!(rt.block_on(op.call()).unwrap(), 42);
/// ```
pub fn operation<F>(f: F) -> FnOperation<F> {
    FnOperation { f }
}

#[async_trait]
impl<T, F, Fut> VcsOperation<T> for FnOperation<F>
where
    T: Send,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = VcsResult<T>> + Send,
{
    async fn call(&self) -> VcsResult<T> {
        (self.f)().await
    }
}

/// How many times an operation is attempted and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
        }
    }

    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay before the attempt following `attempt` (1-based).
    /// Doubles on every retry starting from the initial delay.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

/// Re-runs the wrapped operation while its error is recoverable.
pub struct Retry<O> {
    inner: O,
    policy: RetryPolicy,
    description: String,
}

impl<O> Retry<O> {
    pub fn new(inner: O, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            description: "operation".to_string(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl<T, O> VcsOperation<T> for Retry<O>
where
    T: Send,
    O: VcsOperation<T>,
{
    async fn call(&self) -> VcsResult<T> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.call().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !e.is_recoverable(attempt, max_attempts) {
                        if attempt > 1 {
                            warn!(
                                "{} failed after {} attempt(s): {}",
                                self.description, attempt, e
                            );
                        }
                        return Err(e);
                    }
                    let delay = self.policy.delay_after(attempt);
                    info!(
                        "{} failed (attempt {}/{}), will repeat in {}ms: {}",
                        self.description,
                        attempt,
                        max_attempts,
                        delay.as_millis(),
                        e
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Logs how long the wrapped operation took.
pub struct Timed<O> {
    inner: O,
    action: String,
    target: String,
}

impl<O> Timed<O> {
    pub fn new(inner: O, action: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            inner,
            action: action.into(),
            target: target.into(),
        }
    }
}

#[async_trait]
impl<T, O> VcsOperation<T> for Timed<O>
where
    T: Send,
    O: VcsOperation<T>,
{
    async fn call(&self) -> VcsResult<T> {
        let start = Instant::now();
        let result = self.inner.call().await;
        let elapsed = start.elapsed().as_millis();
        match &result {
            Ok(_) => debug!(
                "[{}] repository: {} took {}ms",
                self.action, self.target, elapsed
            ),
            Err(_) => debug!(
                "[{}] repository: {} failed after {}ms",
                self.action, self.target, elapsed
            ),
        }
        result
    }
}
