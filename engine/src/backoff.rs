use rand::{Rng, RngCore};
use std::time::Duration;

/// Delay before the n-th conflict retry: the base delay scaled by the retry
/// count, with "equal jitter" so competing writers do not re-collide in
/// lockstep. The result lands in [scaled/2, scaled].
pub(crate) fn conflict_backoff(rng: &mut impl RngCore, base: Duration, retry: u32) -> Duration {
    let scaled_ms = (base.as_millis() as u64).saturating_mul(retry.max(1) as u64);
    if scaled_ms <= 1 {
        return Duration::from_millis(scaled_ms);
    }
    let half_ms = scaled_ms / 2;
    let jitter_ms = rng.gen_range(0..=half_ms);
    Duration::from_millis(half_ms.saturating_add(jitter_ms))
}
