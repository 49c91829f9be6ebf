//! Reconnect backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Deterministic part of the reconnect delay:
/// `min(base * 2^attempts, cap)` scaled by a jitter factor.
pub fn reconnect_delay(attempts: u32, base: Duration, cap: Duration, jitter: f64) -> Duration {
    let base_ms = base.as_millis() as u64;
    let cap_ms = cap.as_millis() as u64;
    let exponential = base_ms.saturating_mul(2u64.saturating_pow(attempts.min(20)));
    let clamped = exponential.min(cap_ms);
    let scaled = (clamped as f64 * jitter).round().max(0.0) as u64;
    Duration::from_millis(scaled)
}

/// Reconnect delay for the given attempt with ±10% random jitter, so
/// clients that dropped together do not retry in lockstep.
pub fn jittered_reconnect_delay(attempts: u32, base: Duration, cap: Duration) -> Duration {
    let jitter = rand::rng().random_range(0.9..=1.1);
    reconnect_delay(attempts, base, cap, jitter)
}
