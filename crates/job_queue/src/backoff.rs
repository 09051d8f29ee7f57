use std::time::Duration;

use rand::Rng;

/// Jittered exponential backoff, matching `memory-queue/backoff.go`'s
/// `defaultBackoff`: a 100ms base, doubling per retry, plus up to another
/// half of the unjittered delay.
pub fn default_backoff(retry: u32) -> Duration {
    let base = Duration::from_millis(100);
    let factor = 2f64.powi(retry.saturating_sub(1) as i32);
    let backoff = base.mul_f64(factor);
    let jitter_frac = 0.5 + 0.5 * rand::rng().random::<f64>();
    backoff + backoff.mul_f64(jitter_frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_with_retry_count() {
        let first = default_backoff(1);
        let third = default_backoff(3);
        assert!(third > first);
    }
}
