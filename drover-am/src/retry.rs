//! Resolver retry policy
//!
//! Transient resolver failures are retried with a linearly increasing delay
//! (base interval x attempt number). Exhausting the attempt budget, or
//! hitting a non-transient infrastructure error, downgrades the record to
//! `Resolution::Unresolved` so the batch always makes forward progress
//! instead of blocking on one bad input. The distinction stays visible in
//! the logs even though the caller sees a single unresolved outcome.

use crate::resolver::{AddressResolver, Resolution};
use std::time::Duration;

/// Retry policy consumed by [`resolve_with_retry`]
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum resolver attempts per record (first call included)
    pub max_attempts: u32,
    /// Base backoff interval; delay before attempt N+1 is base x N
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Linear backoff: delay after the Nth failed attempt
    fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Resolve one raw address, absorbing resolver failures per policy
pub async fn resolve_with_retry(
    resolver: &dyn AddressResolver,
    policy: &RetryPolicy,
    raw_address: &str,
) -> Resolution {
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match resolver.resolve(raw_address).await {
            Ok(resolution) => return resolution,
            Err(err) if !err.is_transient() => {
                tracing::warn!(
                    raw = %raw_address,
                    error = %err,
                    "Resolver failed permanently; treating record as unresolvable"
                );
                return Resolution::Unresolved;
            }
            Err(err) if attempt >= policy.max_attempts => {
                tracing::warn!(
                    raw = %raw_address,
                    attempts = attempt,
                    error = %err,
                    "Resolver retries exhausted; treating record as unresolvable"
                );
                return Resolution::Unresolved;
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                tracing::debug!(
                    raw = %raw_address,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient resolver failure; backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
