// Backoff between consumption attempts after a commit conflict
//
// - Exponential backoff from engine.retry_base_delay_ms
// - Capped at engine.retry_max_delay_ms
// - ±20% jitter so colliding writers do not retry in lockstep

use rand::Rng;
use std::time::Duration;
use tracing::debug;

use super::config::EngineConfig;

/// What to do after a conflicted attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Retry after this delay
    Retry(Duration),
    /// Surface the conflict to the caller
    GiveUp,
}

/// Delay before retry number `attempt` (zero-indexed)
pub fn calculate_retry_delay(attempt: u32, config: &EngineConfig) -> RetryDecision {
    if attempt >= config.conflict_retries {
        debug!(
            "Conflict retries ({}) exhausted, giving up",
            config.conflict_retries
        );
        return RetryDecision::GiveUp;
    }

    let delay_ms = config
        .retry_base_delay_ms
        .saturating_mul(2_u64.saturating_pow(attempt))
        .min(config.retry_max_delay_ms);

    let delay_ms = if delay_ms > 0 {
        let jitter = delay_ms / 5;
        let mut rng = rand::rng();
        let random_jitter = rng.random_range(0..=jitter);
        if rng.random_bool(0.5) {
            delay_ms.saturating_add(random_jitter)
        } else {
            delay_ms.saturating_sub(random_jitter)
        }
    } else {
        0
    };

    debug!("Conflict retry {} in {} ms", attempt, delay_ms);
    RetryDecision::Retry(Duration::from_millis(delay_ms))
}
