//! Retry logic for sessions and radio operations.
//!
//! A single session run makes exactly one attempt per stage. This module
//! layers whole-attempt retries on top, with exponential backoff and jitter,
//! for any error type that can say whether it is worth retrying.
//!
//! # Example
//!
//! ```
//! use spplink_core::{RetryConfig, with_retry, RadioError};
//!
//! # async fn example() -> Result<(), RadioError> {
//! let config = RetryConfig::new(3);
//!
//! let channel = with_retry(&config, "channel query", || async {
//!     Ok::<_, RadioError>(1u8)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Error, RadioError, SessionError};

/// Errors that know whether a fresh attempt could succeed.
pub trait Retryable {
    /// Whether the failed operation is worth repeating.
    fn is_retryable(&self) -> bool;
}

impl Retryable for SessionError {
    fn is_retryable(&self) -> bool {
        SessionError::is_retryable(self)
    }
}

impl Retryable for RadioError {
    fn is_retryable(&self) -> bool {
        match self {
            RadioError::NoAdapter | RadioError::AdapterOff => false,
            RadioError::InvalidAddress(_) => false,
            RadioError::Timeout { .. } | RadioError::Io(_) | RadioError::Backend(_) => true,
        }
    }
}

impl Retryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Session(e) => e.is_retryable(),
            Error::Radio(e) => e.is_retryable(),
            Error::Io(_) => true,
            Error::NotConnected | Error::InvalidConfig(_) => false,
        }
    }
}

/// How many times to repeat a failed operation and how long to wait between
/// attempts.
///
/// Delays grow geometrically from `base_delay` by `factor` and are capped at
/// `max_delay`. With `jitter` on, each delay is stretched by up to a quarter
/// so that several clients retrying against one device spread out.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Wait before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single wait, before jitter.
    pub max_delay: Duration,
    /// Growth per retry. `1.0` keeps the delay constant.
    pub factor: f64,
    /// Add up to 25% random extra wait.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryConfig {
    /// `max_retries` retries starting at 500 ms, doubling up to 10 s.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            factor: 2.0,
            jitter: true,
        }
    }

    /// Single attempt.
    pub fn none() -> Self {
        Self::new(0)
    }

    /// Retry configuration for whole sessions.
    ///
    /// A session already waits out a full discovery timeout before failing,
    /// so retries start after a couple of seconds to let a busy device drop
    /// its previous client.
    pub fn for_session() -> Self {
        Self::new(3)
            .base_delay(Duration::from_secs(2))
            .max_delay(Duration::from_secs(30))
    }

    /// Two fast retries without jitter. Handy in tests.
    pub fn quick() -> Self {
        Self::new(2)
            .base_delay(Duration::from_millis(50))
            .max_delay(Duration::from_millis(500))
            .jitter(false)
    }

    #[must_use]
    pub fn max_retries(self, max_retries: u32) -> Self {
        Self { max_retries, ..self }
    }

    #[must_use]
    pub fn base_delay(self, base_delay: Duration) -> Self {
        Self { base_delay, ..self }
    }

    #[must_use]
    pub fn max_delay(self, max_delay: Duration) -> Self {
        Self { max_delay, ..self }
    }

    #[must_use]
    pub fn factor(self, factor: f64) -> Self {
        Self { factor, ..self }
    }

    #[must_use]
    pub fn jitter(self, jitter: bool) -> Self {
        Self { jitter, ..self }
    }

    /// Wait after failed attempt number `retry` (0-based).
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let grown = self.base_delay.as_secs_f64() * self.factor.powi(exponent);
        let secs = grown.min(self.max_delay.as_secs_f64());
        let stretch = if self.jitter {
            1.0 + rand::rng().random_range(0.0..0.25)
        } else {
            1.0
        };
        Duration::from_secs_f64(secs * stretch)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// runs out of retries. The last error is returned.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    with_retry_notify(config, operation_name, operation, |_, _| {}).await
}

/// Like [`with_retry`], calling `on_retry(attempt, delay)` before each
/// backoff sleep. `attempt` is the 1-based number of the attempt about to
/// start.
pub async fn with_retry_notify<F, Fut, T, E, N>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
    on_retry: N,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
    N: Fn(u32, Duration),
{
    let attempts = config.max_retries + 1;
    let mut retry = 0;
    loop {
        let err = match operation().await {
            Ok(value) => {
                if retry > 0 {
                    debug!(operation = operation_name, retry, "Succeeded after retrying");
                }
                return Ok(value);
            }
            Err(err) => err,
        };
        if !err.is_retryable() || retry >= config.max_retries {
            return Err(err);
        }

        let delay = config.delay_for_attempt(retry);
        warn!(
            operation = operation_name,
            "Attempt {}/{} failed: {}; next in {:?}",
            retry + 1,
            attempts,
            err,
            delay
        );
        retry += 1;
        on_retry(retry + 1, delay);
        sleep(delay).await;
    }
}
