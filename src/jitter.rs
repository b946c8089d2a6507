//! Jitter applied to retry delays to avoid synchronized retry storms.
//!
//! - `None`: deterministic delays, handy for tests.
//! - `Spread(ratio)`: uniform perturbation within `±ratio` of the delay, clamped at zero and
//!   rounded to whole milliseconds. Retry executors use [`DEFAULT_SPREAD`] (±10%).
//!
//! RNG: `rand`'s thread-local generator by default; inject a seeded RNG through
//! [`Jitter::apply_with_rng`] for reproducible tests.

use rand::{rng, Rng};
use std::time::Duration;

/// Spread used when jitter is switched on in a retry config.
pub const DEFAULT_SPREAD: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    /// Use the backoff delay as is.
    None,
    /// Perturb by up to `±ratio * delay`.
    Spread(f64),
}

impl Jitter {
    /// ±10% jitter.
    pub fn spread() -> Self {
        Jitter::Spread(DEFAULT_SPREAD)
    }

    /// `Spread` when `enabled`, otherwise `None`.
    pub fn enabled(enabled: bool) -> Self {
        if enabled {
            Self::spread()
        } else {
            Jitter::None
        }
    }

    pub fn apply(&self, delay: Duration) -> Duration {
        let mut rng = rng();
        self.apply_with_rng(delay, &mut rng)
    }

    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        match *self {
            Jitter::None => delay,
            Jitter::Spread(ratio) => {
                let ratio = if ratio.is_finite() { ratio.abs() } else { 0.0 };
                let millis = delay.as_millis() as f64;
                if millis == 0.0 || ratio == 0.0 {
                    return delay;
                }
                let offset = rng.random_range(-ratio..=ratio) * millis;
                Duration::from_millis((millis + offset).max(0.0).round() as u64)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn none_returns_exact_delay() {
        assert_eq!(Jitter::None.apply(Duration::from_millis(321)), Duration::from_millis(321));
    }

    #[test]
    fn spread_stays_within_ten_percent() {
        let jitter = Jitter::spread();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let jittered = jitter.apply_with_rng(Duration::from_millis(1000), &mut rng);
            assert!(jittered >= Duration::from_millis(900), "{:?}", jittered);
            assert!(jittered <= Duration::from_millis(1100), "{:?}", jittered);
        }
    }

    #[test]
    fn spread_actually_varies() {
        let jitter = Jitter::spread();
        let mut rng = StdRng::seed_from_u64(42);
        let samples: Vec<_> =
            (0..50).map(|_| jitter.apply_with_rng(Duration::from_secs(10), &mut rng)).collect();
        assert!(samples.iter().any(|d| *d != samples[0]));
    }

    #[test]
    fn zero_delay_stays_zero() {
        assert_eq!(Jitter::spread().apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn huge_ratio_clamps_at_zero() {
        let jitter = Jitter::Spread(5.0);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let jittered = jitter.apply_with_rng(Duration::from_millis(10), &mut rng);
            assert!(jittered <= Duration::from_millis(60));
        }
    }

    #[test]
    fn enabled_maps_flag() {
        assert_eq!(Jitter::enabled(false), Jitter::None);
        assert_eq!(Jitter::enabled(true), Jitter::Spread(DEFAULT_SPREAD));
    }
}
