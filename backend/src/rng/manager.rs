//! Seeded random stream used by scenario generation and the random baseline
//!
//! # Determinism
//!
//! Same seed → same sequence of draws. Scenario generation, ambulance
//! spawning and the random policy each own a separate `RngManager`, so the
//! order in which they are called never changes what the others produce.

use rand::distributions::WeightedIndex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic random number generator
///
/// # Example
/// ```
/// use mci_simulator_core_rs::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let value = rng.next();
/// let range_value = rng.range(0, 100); // Some(v), v in [0, 100)
/// assert_eq!(rng.range(5, 5), None);
/// ```
#[derive(Debug, Clone)]
pub struct RngManager {
    seed: u64,
    rng: ChaCha8Rng,
}

impl RngManager {
    /// Create a new RNG with given seed
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Seed this stream was created with
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Independent stream derived from this stream's seed
    ///
    /// Derivation does not consume draws from `self`.
    pub fn derive(&self, stream: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(stream);
        Self {
            seed: self.seed,
            rng,
        }
    }

    /// Generate next random u64 value
    pub fn next(&mut self) -> u64 {
        self.rng.gen()
    }

    /// Generate random value in range [min, max); `None` if the range is empty
    pub fn range(&mut self, min: i64, max: i64) -> Option<i64> {
        if min >= max {
            return None;
        }
        Some(self.rng.gen_range(min..max))
    }

    /// Generate random value in range [min, max]; `None` if min > max
    pub fn range_inclusive(&mut self, min: i64, max: i64) -> Option<i64> {
        if min > max {
            return None;
        }
        Some(self.rng.gen_range(min..=max))
    }

    /// Generate random f64 in range [0.0, 1.0)
    ///
    /// # Example
    /// ```
    /// use mci_simulator_core_rs::RngManager;
    ///
    /// let mut rng = RngManager::new(12345);
    /// let probability = rng.next_f64();
    /// assert!(probability >= 0.0 && probability < 1.0);
    /// ```
    pub fn next_f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Uniform f64 in [low, high); returns `low` when the interval is empty
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        low + (high - low) * self.next_f64()
    }

    /// Gaussian sample via Box-Muller
    pub fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        // 1 - u keeps the log argument in (0, 1]
        let u1 = 1.0 - self.next_f64();
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }

    /// Index drawn from a categorical distribution
    ///
    /// Weights need not sum to one. Returns `None` for an empty or all-zero
    /// weight slice.
    pub fn choose_weighted(&mut self, weights: &[f64]) -> Option<usize> {
        // Negative and NaN weights count as zero
        let dist = WeightedIndex::<f64>::new(weights.iter().map(|w| w.max(0.0))).ok()?;
        Some(self.rng.sample(dist))
    }

    /// Uniform index into a collection of `len` items
    pub fn index(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(self.rng.gen_range(0..len))
    }
}
