//! Backoff computation for stage retries

use std::time::Duration;

use contracts::RetryPolicy;
use rand::Rng;

/// Delay before the attempt following `attempt` (1-based)
///
/// `initial * multiplier^(attempt-1)`, capped at `max_backoff_ms`, scaled
/// into `[50%, 100%]` when jitter is on, then raised to `retry_after_ms`
/// (still capped).
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32, retry_after_ms: Option<u64>) -> Duration {
    let mut rng = rand::rng();
    Duration::from_millis(jittered_delay_ms(policy, attempt, retry_after_ms, &mut rng))
}

fn base_delay_ms(policy: &RetryPolicy, attempt: u32) -> u64 {
    if attempt == 0 {
        return 0;
    }
    let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let scaled = policy.initial_backoff_ms as f64 * policy.multiplier.powi(exp);
    scaled.min(policy.max_backoff_ms as f64).max(0.0) as u64
}

fn jittered_delay_ms(
    policy: &RetryPolicy,
    attempt: u32,
    retry_after_ms: Option<u64>,
    rng: &mut impl Rng,
) -> u64 {
    let base = base_delay_ms(policy, attempt);
    let delay = if policy.jitter && base > 0 {
        let lower = base as f64 * 0.5;
        rng.random_range(lower..=base as f64).round() as u64
    } else {
        base
    };

    match retry_after_ms {
        Some(hint) => delay.max(hint).min(policy.max_backoff_ms),
        None => delay,
    }
}
