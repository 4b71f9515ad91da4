//! Process-wide uniform random source backing the per-generation draw pool.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::time::{SystemTime, UNIX_EPOCH};

pub struct RandomSource {
    rng: Pcg64,
}

impl RandomSource {
    pub fn new(seed: u64) -> Self {
        Self { rng: Pcg64::seed_from_u64(seed) }
    }

    /// Seeds from the wall clock.
    pub fn from_time() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self::new(nanos)
    }

    /// Fills `buf` with uniform floats in `[0, 1)`.
    pub fn fill(&mut self, buf: &mut [f32]) {
        for v in buf {
            *v = self.rng.random();
        }
    }

    /// Derives a seed for an auxiliary generator (e.g. destination picking).
    pub(crate) fn fork_seed(&mut self) -> u64 {
        self.rng.random()
    }
}
