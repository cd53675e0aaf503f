//! Seeded random number generation for bootstrap confidence bands.
//!
//! The pipeline must produce byte-identical output for identical input, so
//! every generator is created from an explicit seed. There is no
//! entropy-seeded constructor.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// ChaCha20 generator with a fixed seed.
#[derive(Clone, Debug)]
pub struct SecureRng {
    rng: ChaCha20Rng,
    seed: u64,
}

impl SecureRng {
    /// Create a generator from a seed.
    ///
    /// `seed_from_u64` expands the u64 to a full 256-bit ChaCha key.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Generator for replicate `index` of a run seeded with `seed`.
    pub fn for_replicate(seed: u64, index: usize) -> Self {
        Self::with_seed(seed.wrapping_add(index as u64))
    }

    /// Seed this generator was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generate a random f64 in [0, 1).
    pub fn f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Generate a random usize in the given range.
    pub fn usize(&mut self, range: std::ops::Range<usize>) -> usize {
        self.rng.gen_range(range)
    }

    /// Standard normal draw (Box-Muller).
    pub fn standard_normal(&mut self) -> f64 {
        // 1 - u keeps the log argument in (0, 1]
        let u1 = 1.0 - self.f64();
        let u2 = self.f64();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}
