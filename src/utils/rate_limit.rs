//! Per-provider request gate.
//!
//! Each provider owns exactly one [`RateGate`]; adapters share it through an
//! `Arc`, so concurrent calls to one provider are spaced by its minimum
//! interval while calls to different providers never wait on each other.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::time::Duration;

use crate::models::SourceKind;

/// Longest wait between two requests to one provider
pub const MAX_INTERVAL: Duration = Duration::from_secs(3600);

/// Minimum-interval gate in front of one provider's HTTP calls
#[derive(Debug)]
pub struct RateGate {
    provider: SourceKind,
    interval: Duration,
    limiter: DefaultDirectRateLimiter,
}

impl RateGate {
    /// Gate allowing one request per `interval`
    pub fn new(provider: SourceKind, interval: Duration) -> Self {
        // Quota::with_period rejects zero; treat it as "practically unthrottled"
        let interval = interval.clamp(Duration::from_micros(1), MAX_INTERVAL);
        let quota = Quota::with_period(interval)
            .unwrap_or_else(|| Quota::per_second(nonzero!(1_000_000u32)))
            .allow_burst(nonzero!(1u32));

        Self {
            provider,
            interval,
            limiter: RateLimiter::direct(quota),
        }
    }

    /// Gate allowing `requests_per_second` requests per second
    pub fn per_second(provider: SourceKind, requests_per_second: f32) -> Self {
        let rps = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            requests_per_second
        } else {
            1.0
        };
        let interval = Duration::try_from_secs_f64(1.0 / rps as f64).unwrap_or(MAX_INTERVAL);
        Self::new(provider, interval)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the provider may be called again
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
        tracing::trace!("{} rate gate passed", self.provider);
    }
}
