//! Deterministic random number generation.
//!
//! One master RNG is seeded per simulation; every component that needs
//! randomness gets a forked handle whose seed is drawn deterministically
//! from its parent. Reruns with the same seed therefore reproduce the same
//! draws regardless of how many components exist or in which order they
//! consume randomness.

use rand::rngs::SmallRng;
use rand::{Rng, RngCore, SeedableRng};

/// Seedable, forkable RNG for simulation use.
#[derive(Debug, Clone)]
pub struct SimRng {
    inner: SmallRng,
    seed: u64,
}

impl SimRng {
    /// Creates an RNG from the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            inner: SmallRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Returns the seed this RNG was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Forks an independent child stream.
    ///
    /// The child's seed is drawn from this RNG, so a fixed fork order gives
    /// a fixed family of streams.
    pub fn fork(&mut self) -> SimRng {
        SimRng::new(self.inner.next_u64())
    }

    /// Generates a random `u64`.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    /// Generates a random `f64` in `[0.0, 1.0)`.
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        self.inner.r#gen::<f64>()
    }

    /// Returns `true` with the given probability.
    ///
    /// Out-of-range probabilities clamp: `p <= 0` never succeeds and
    /// `p >= 1` always does, without consuming a draw.
    #[inline]
    pub fn chance(&mut self, p: f64) -> bool {
        if p <= 0.0 {
            false
        } else if p >= 1.0 {
            true
        } else {
            self.next_f64() < p
        }
    }

    /// Generates a random `u64` in `[min, max)`.
    ///
    /// # Panics
    ///
    /// Panics if `min >= max`.
    #[inline]
    pub fn next_u64_range(&mut self, min: u64, max: u64) -> u64 {
        assert!(min < max, "empty range [{min}, {max})");
        self.inner.gen_range(min..max)
    }

    /// Generates a random `usize` in `[0, max)`.
    ///
    /// # Panics
    ///
    /// Panics if `max == 0`.
    #[inline]
    pub fn next_usize(&mut self, max: usize) -> usize {
        assert!(max > 0, "empty range [0, 0)");
        self.inner.gen_range(0..max)
    }
}
