//! Retry utilities with exponential backoff for resilient API calls.

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

use crate::sources::SourceError;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap for the exponential part of the delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Random extra delay, as a fraction of the backoff delay
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

impl RetryConfig {
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Backoff before retry number `retry` (1-based), without jitter
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(retry.saturating_sub(1) as i32);
        Duration::from_secs_f64(exp.min(self.max_delay.as_secs_f64()).max(0.0))
    }

    fn delay_with_jitter(&self, retry: u32) -> Duration {
        let base = self.backoff(retry);
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }
        let extra = rand::thread_rng().gen_range(0.0..=self.jitter) * base.as_secs_f64();
        base + Duration::from_secs_f64(extra)
    }
}

/// Transient errors that should trigger a retry
#[derive(Debug, Clone, PartialEq)]
pub enum TransientError {
    /// Connection failures and interrupted bodies
    Network,
    /// Request timeout
    Timeout,
    /// HTTP 429, with the server's Retry-After if it sent one
    TooManyRequests(Option<Duration>),
    /// HTTP 5xx
    ServerError(u16),
}

impl TransientError {
    /// Check if a SourceError represents a transient error
    pub fn from_source_error(err: &SourceError) -> Option<Self> {
        match err {
            SourceError::Network(_) => Some(TransientError::Network),
            SourceError::Timeout => Some(TransientError::Timeout),
            SourceError::RateLimit { retry_after } => {
                Some(TransientError::TooManyRequests(*retry_after))
            }
            SourceError::Server { status, .. } => Some(TransientError::ServerError(*status)),
            _ => None,
        }
    }

    /// Minimum delay the server asked for, if any
    pub fn requested_delay(&self) -> Option<Duration> {
        match self {
            TransientError::TooManyRequests(retry_after) => *retry_after,
            _ => None,
        }
    }
}

/// Execute an async operation with retry logic
///
/// Transient errors are retried up to `config.max_retries` times with
/// exponential backoff plus jitter. Permanent errors are returned at once;
/// exhausted retries come back as [`SourceError::RetriesExhausted`].
pub async fn with_retry<T, F, Fut>(config: RetryConfig, operation: F) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SourceError>>,
{
    let mut attempts = 0;
    let mut operation = operation;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    tracing::info!(
                        "Operation succeeded on attempt {} after {} transient failures",
                        attempts,
                        attempts - 1
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                let Some(transient) = TransientError::from_source_error(&error) else {
                    // Permanent error - return immediately
                    return Err(error);
                };

                if attempts > config.max_retries {
                    tracing::warn!("Operation failed after {} attempts: {}", attempts, error);
                    return Err(SourceError::RetriesExhausted {
                        attempts,
                        last: Box::new(error),
                    });
                }

                let mut delay = config.delay_with_jitter(attempts);
                if let Some(requested) = transient.requested_delay() {
                    delay = delay.max(requested);
                }

                tracing::debug!(
                    "Transient error on attempt {}: {:?}, retrying in {:?}",
                    attempts,
                    transient,
                    delay
                );
                sleep(delay).await;
            }
        }
    }
}
