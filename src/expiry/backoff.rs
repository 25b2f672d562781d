//! Randomized announcement retry backoff.

use crate::core::config::BackoffConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Jittered, strictly non-decreasing backoff capped at a maximum.
///
/// The jitter source is seedable so retry schedules can be reproduced in
/// tests.
#[derive(Debug)]
pub struct Backoff {
    max: Duration,
    random_factor: f64,
    rng: StdRng,
}

impl Backoff {
    /// Create a backoff generator seeded from entropy.
    pub fn new(config: &BackoffConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Create a backoff generator with a fixed seed.
    pub fn with_seed(config: &BackoffConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &BackoffConfig, rng: StdRng) -> Self {
        Self {
            max: config.max(),
            random_factor: config.random_factor.max(0.0),
            rng,
        }
    }

    /// Compute the backoff following `current`.
    ///
    /// The result is `base + base * (0.5 + 0.5 * random_factor * rand)` with
    /// `base = min(current, max)` and `rand ∈ [0, 1)`; any result that would
    /// shrink below `current` or exceed the maximum collapses to the maximum.
    pub fn next(&mut self, current: Duration) -> Duration {
        let max_ms = self.max.as_millis();
        let current_ms = current.as_millis();
        let base_ms = current_ms.min(max_ms);

        let rand: f64 = self.rng.gen();
        let factor = 0.5 + 0.5 * self.random_factor * rand;
        let jitter_ms = (base_ms as f64 * factor) as u128;
        let result_ms = base_ms.saturating_add(jitter_ms);

        if result_ms < current_ms || result_ms > max_ms {
            self.max
        } else {
            Duration::from_millis(u64::try_from(result_ms).unwrap_or(u64::MAX))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(min_ms: u64, max_ms: u64, random_factor: f64) -> BackoffConfig {
        BackoffConfig {
            min_ms,
            max_ms,
            random_factor,
        }
    }

    #[test]
    fn grows_without_jitter() {
        let mut backoff = Backoff::with_seed(&config(1_000, 600_000, 0.0), 7);
        // factor is exactly 0.5 with random_factor 0
        assert_eq!(backoff.next(Duration::from_secs(1)), Duration::from_millis(1_500));
        assert_eq!(backoff.next(Duration::from_millis(1_500)), Duration::from_millis(2_250));
    }

    #[test]
    fn never_decreases_and_caps_at_max() {
        let mut backoff = Backoff::with_seed(&config(1_000, 60_000, 1.0), 42);
        let mut current = Duration::from_secs(1);
        for _ in 0..64 {
            let next = backoff.next(current);
            assert!(next >= current, "backoff shrank: {current:?} -> {next:?}");
            assert!(next <= Duration::from_secs(60));
            current = next;
        }
        assert_eq!(current, Duration::from_secs(60));
    }

    #[test]
    fn over_max_input_collapses_to_max() {
        let mut backoff = Backoff::with_seed(&config(1_000, 30_000, 1.0), 3);
        assert_eq!(backoff.next(Duration::from_secs(45)), Duration::from_secs(30));
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let cfg = config(1_000, 600_000, 1.0);
        let mut first = Backoff::with_seed(&cfg, 99);
        let mut second = Backoff::with_seed(&cfg, 99);
        let mut current = Duration::from_secs(1);
        for _ in 0..8 {
            let a = first.next(current);
            let b = second.next(current);
            assert_eq!(a, b);
            current = a;
        }
    }

    #[test]
    fn negative_random_factor_is_clamped() {
        let mut backoff = Backoff::with_seed(&config(1_000, 600_000, -5.0), 1);
        assert_eq!(backoff.next(Duration::from_secs(2)), Duration::from_secs(3));
    }
}
