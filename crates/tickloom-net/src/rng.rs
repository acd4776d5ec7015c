//! Seeded randomness for the simulated network's drop decisions.
//!
//! Mirrors the teacher's `SimRng` adapter: one seeded generator per
//! component, forkable so a single cluster seed can deterministically
//! seed every process's independent randomness stream.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A seeded, forkable PRNG. Same seed, same sequence of decisions — the
/// basis for the determinism property in `spec.md` §8 (property 6).
#[derive(Clone)]
pub struct SimRng {
    inner: ChaCha8Rng,
}

impl SimRng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Returns a probability draw in `[0.0, 1.0)`.
    pub fn next_f64(&mut self) -> f64 {
        (self.inner.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// True with probability `p` (clamped to `[0,1]`).
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p.clamp(0.0, 1.0)
    }

    /// Derives an independent child stream from this one — used to give
    /// each simulated process its own RNG without sharing mutable state.
    pub fn fork(&mut self) -> Self {
        let derived_seed = self.inner.next_u64();
        Self::new(derived_seed)
    }
}
