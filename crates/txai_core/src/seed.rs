//! Deterministic random number generation.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// A seed for deterministic random number generation.
///
/// Every random choice in a run (loader shuffles, fold splits, counterfactual
/// draws, tie breaking in rankings) is drawn from a [`ChaCha8Rng`] built from
/// a `Seed`, so the same seed reproduces the same arrays.
///
/// # Example
///
/// ```rust
/// use txai_core::Seed;
/// use rand::Rng;
///
/// let mut a = Seed::new(42).to_rng();
/// let mut b = Seed::new(42).to_rng();
/// let x: f32 = a.gen();
/// let y: f32 = b.gen();
/// assert_eq!(x, y);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seed(u64);

impl Seed {
    /// Create a seed with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Draw a fresh seed from the operating system.
    ///
    /// Used when deterministic mode is switched off.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self(ChaCha8Rng::from_entropy().next_u64())
    }

    /// The underlying value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Build a ChaCha8 generator from this seed.
    #[must_use]
    pub fn to_rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.0)
    }

    /// Derive an independent seed for a named random stream.
    ///
    /// ```rust
    /// use txai_core::Seed;
    ///
    /// let master = Seed::new(42);
    /// assert_ne!(master.derive("shuffle"), master.derive("winit"));
    /// assert_eq!(master.derive("shuffle"), master.derive("shuffle"));
    /// ```
    #[must_use]
    pub fn derive(&self, key: &str) -> Self {
        // FNV-1a over the seed bytes then the key, stable across Rust releases.
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;

        let mut hash = OFFSET;
        for byte in self.0.to_le_bytes().iter().chain(key.as_bytes()) {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(PRIME);
        }
        Self(hash)
    }
}

impl Default for Seed {
    fn default() -> Self {
        Self::new(0)
    }
}

impl From<u64> for Seed {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<Seed> for u64 {
    fn from(seed: Seed) -> Self {
        seed.0
    }
}
