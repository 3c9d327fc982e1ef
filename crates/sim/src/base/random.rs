//! Per-run random variates.
//!
//! Every simulation run owns exactly one [`RandomSource`]; nothing in here is
//! shared between runs, so runs can execute on any worker thread without
//! locking. Reproducibility across thread counts comes from seeding each run
//! from a seed stream drawn before the runs are launched (see
//! [`crate::simulation::batch`]).

use crate::errors::NumericalError;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp, Gamma, LogNormal};
use rand_xoshiro::Xoshiro256PlusPlus;

/// Largest accepted deviation of a probability vector's sum from 1.
pub const PROBABILITY_TOLERANCE: f64 = 1e-9;

/// Random-variate generator exclusively owned by one simulation run.
#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: Xoshiro256PlusPlus,
}

impl RandomSource {
    /// Deterministic source for a given seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }

    /// Source seeded from the thread-local entropy pool.
    pub fn from_entropy() -> Self {
        Self {
            rng: Xoshiro256PlusPlus::from_seed(rand::rng().random()),
        }
    }

    /// Uniform draw from `[0, 1)`.
    #[inline]
    pub fn uniform(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    /// Uniform index from `0..n`. `n` must be positive.
    #[inline]
    pub fn below(&mut self, n: usize) -> usize {
        self.rng.random_range(0..n)
    }

    /// Draw a fresh 64-bit seed, used to derive per-run sources.
    pub fn next_seed(&mut self) -> u64 {
        self.rng.random::<u64>()
    }

    /// Exponential waiting time with the given rate.
    ///
    /// A zero rate means the event never happens and yields `+inf`.
    pub fn exponential(&mut self, rate: f64) -> Result<f64, NumericalError> {
        if rate == 0.0 {
            return Ok(f64::INFINITY);
        }
        let dist = Exp::new(rate).map_err(|e| NumericalError::InvalidDistribution {
            distribution: "exponential",
            reason: format!("rate {rate}: {e}"),
        })?;
        Ok(dist.sample(&mut self.rng))
    }

    /// Gamma draw in the shape/rate parametrization (mean `shape / rate`).
    pub fn gamma(&mut self, shape: f64, rate: f64) -> Result<f64, NumericalError> {
        let dist = Gamma::new(shape, 1.0 / rate).map_err(|e| {
            NumericalError::InvalidDistribution {
                distribution: "gamma",
                reason: format!("shape {shape}, rate {rate}: {e}"),
            }
        })?;
        Ok(dist.sample(&mut self.rng))
    }

    /// Log-normal draw; `mu` and `sigma` parametrize the underlying normal.
    pub fn log_normal(&mut self, mu: f64, sigma: f64) -> Result<f64, NumericalError> {
        let dist = LogNormal::new(mu, sigma).map_err(|e| NumericalError::InvalidDistribution {
            distribution: "log-normal",
            reason: format!("mu {mu}, sigma {sigma}: {e}"),
        })?;
        Ok(dist.sample(&mut self.rng))
    }

    /// Sample an index from a probability vector.
    ///
    /// # Errors
    /// Fails if an entry is negative or the entries do not sum to 1 within
    /// [`PROBABILITY_TOLERANCE`].
    pub fn sample_discrete(&mut self, probabilities: &[f64]) -> Result<usize, NumericalError> {
        let mut sum = 0.0;
        for (index, &value) in probabilities.iter().enumerate() {
            if value < 0.0 {
                return Err(NumericalError::NegativeProbability { index, value });
            }
            sum += value;
        }
        if !((sum - 1.0).abs() <= PROBABILITY_TOLERANCE) {
            return Err(NumericalError::NotNormalized { sum });
        }

        let r = self.uniform();
        let mut cumulative = 0.0;
        for (i, &p) in probabilities.iter().enumerate() {
            cumulative += p;
            if cumulative > r {
                return Ok(i);
            }
        }

        // Roundoff left r just above the cumulative total: take the last
        // index that can actually be drawn.
        Ok(probabilities
            .iter()
            .rposition(|&p| p > 0.0)
            .unwrap_or(probabilities.len() - 1))
    }

    /// Randomly permute a slice in place.
    pub fn shuffle<T>(&mut self, values: &mut [T]) {
        values.shuffle(&mut self.rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = RandomSource::from_seed(7);
        let mut b = RandomSource::from_seed(7);
        for _ in 0..100 {
            assert_eq!(a.uniform().to_bits(), b.uniform().to_bits());
        }
    }

    #[test]
    fn test_exponential_zero_rate_is_infinite() {
        let mut rng = RandomSource::from_seed(1);
        assert!(rng.exponential(0.0).unwrap().is_infinite());
        assert!(rng.exponential(-1.0).is_err());
    }

    #[test]
    fn test_exponential_mean() {
        let mut rng = RandomSource::from_seed(2);
        let n = 20_000;
        let mean: f64 = (0..n).map(|_| rng.exponential(4.0).unwrap()).sum::<f64>() / n as f64;
        assert!((mean - 0.25).abs() < 0.01, "mean was {mean}");
    }

    #[test]
    fn test_gamma_mean_uses_rate() {
        let mut rng = RandomSource::from_seed(3);
        let n = 20_000;
        let mean: f64 = (0..n).map(|_| rng.gamma(2.0, 4.0).unwrap()).sum::<f64>() / n as f64;
        assert!((mean - 0.5).abs() < 0.02, "mean was {mean}");
        assert!(rng.gamma(-1.0, 1.0).is_err());
    }

    #[test]
    fn test_log_normal_positive() {
        let mut rng = RandomSource::from_seed(4);
        for _ in 0..1000 {
            assert!(rng.log_normal(0.0, 1.5).unwrap() > 0.0);
        }
    }

    #[test]
    fn test_sample_discrete_rejects_bad_vectors() {
        let mut rng = RandomSource::from_seed(5);
        assert!(matches!(
            rng.sample_discrete(&[0.5, 0.4]),
            Err(NumericalError::NotNormalized { .. })
        ));
        assert!(matches!(
            rng.sample_discrete(&[1.5, -0.5]),
            Err(NumericalError::NegativeProbability { index: 1, .. })
        ));
    }

    #[test]
    fn test_sample_discrete_never_picks_zero_weight() {
        let mut rng = RandomSource::from_seed(6);
        let probs = [0.0, 0.3, 0.0, 0.7];
        let mut counts = [0usize; 4];
        for _ in 0..10_000 {
            counts[rng.sample_discrete(&probs).unwrap()] += 1;
        }
        assert_eq!(counts[0], 0);
        assert_eq!(counts[2], 0);
        let frac = counts[3] as f64 / 10_000.0;
        assert!((frac - 0.7).abs() < 0.03);
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut rng = RandomSource::from_seed(8);
        let mut values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        rng.shuffle(&mut values);
        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(sorted, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }
}
