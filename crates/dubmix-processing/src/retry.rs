//! Backoff shared by the publish and catalog retry loops.

use std::time::Duration;

/// Upper bound on any single retry delay.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Exponential backoff: `base * 2^(attempt - 1)`, capped at [`MAX_RETRY_BACKOFF`].
/// `attempt` is 1-based (the delay after the first failure is `base`).
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent).min(MAX_RETRY_BACKOFF)
}
