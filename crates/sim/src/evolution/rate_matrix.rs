//! Substitution-rate matrices from fitness vectors.
//!
//! Off-diagonal rates follow the fixation-probability formulation of
//! Yang & Nielsen (2008, eq. 3) with every non-selection term set to the
//! optional mutation-rate multiplier:
//!
//! ```text
//! d       = F[j] - F[i]
//! Q[i][j] = d / (1 - exp(-d)) * M[i][j]     (|d| > 1e-9)
//! Q[i][j] = M[i][j]                         (otherwise, the removable limit)
//! Q[i][i] = -sum_{j != i} Q[i][j]
//! ```
//!
//! Without a mutation matrix the stationary distribution has the closed form
//! `pi[i] ∝ exp(F[i])` (eq. 4). With one, `pi` solves `pi·Q = 0, Σpi = 1`,
//! which we rewrite as `pi·(Q + J) = 1` with `J` the all-ones matrix.

use crate::base::PROBABILITY_TOLERANCE;
use crate::errors::{ConfigError, NumericalError};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Fitness differences below this are treated as neutral.
pub const FITNESS_EPSILON: f64 = 1e-9;

/// How the raw rate matrix is scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum QNormalization {
    /// Scale so that `Σ -Q[i][i]·pi[i] = 1`; branch lengths are then expected
    /// substitutions per site.
    #[default]
    ConstantRate,
    /// Divide by `alphabet size - 1`; the expected rate is 1 only for a flat
    /// landscape.
    ConstantForFlat,
}

/// Pairwise mutation-rate multipliers `M[i][j]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRates(DMatrix<f64>);

impl MutationRates {
    /// Wrap a square matrix of non-negative, finite multipliers.
    pub fn new(matrix: DMatrix<f64>) -> Result<Self, ConfigError> {
        if !matrix.is_square() {
            return Err(ConfigError::InvalidParameter(format!(
                "mutation rate matrix must be square, got {}x{}",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        if let Some(bad) = matrix.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(ConfigError::InvalidParameter(format!(
                "mutation rate matrix entries must be finite and non-negative, found {bad}"
            )));
        }
        Ok(Self(matrix))
    }

    /// Build from row-major values of an `n x n` matrix.
    pub fn from_row_slice(n: usize, values: &[f64]) -> Result<Self, ConfigError> {
        if values.len() != n * n {
            return Err(ConfigError::InvalidParameter(format!(
                "mutation rate matrix needs {} values, got {}",
                n * n,
                values.len()
            )));
        }
        Self::new(DMatrix::from_row_slice(n, n, values))
    }

    /// Matrix dimension.
    pub fn size(&self) -> usize {
        self.0.nrows()
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.0[(i, j)]
    }
}

/// Q, pi and the expected substitution rate derived from one fitness vector.
#[derive(Debug, Clone, PartialEq)]
pub struct RateModel {
    pub q: DMatrix<f64>,
    pub pi: Vec<f64>,
    /// `Σ -Q[i][i]·pi[i]` after normalization.
    pub expected_rate: f64,
}

/// Relative fixation rate for a fitness difference `d = F[j] - F[i]`.
#[inline]
pub fn fixation_rate(d: f64) -> f64 {
    if d.abs() > FITNESS_EPSILON {
        d / (1.0 - (-d).exp())
    } else {
        1.0
    }
}

/// Raw generator matrix before normalization. Every row sums to zero.
pub fn unnormalized_q(fitness: &[f64], mutation: Option<&MutationRates>) -> DMatrix<f64> {
    let n = fitness.len();
    let mut q = DMatrix::zeros(n, n);
    for i in 0..n {
        let mut row_sum = 0.0;
        for j in 0..n {
            if i == j {
                continue;
            }
            let m = mutation.map_or(1.0, |m| m.get(i, j));
            let rate = fixation_rate(fitness[j] - fitness[i]) * m;
            q[(i, j)] = rate;
            row_sum += rate;
        }
        q[(i, i)] = -row_sum;
    }
    q
}

/// Closed-form stationary distribution `pi[i] ∝ exp(F[i])`.
pub fn pi_from_fitness(fitness: &[f64]) -> Vec<f64> {
    // Shift by the maximum so large fitness values do not overflow.
    let max = fitness.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = fitness.iter().map(|f| (f - max).exp()).collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Stationary distribution of a generator matrix via `pi·(Q + J) = 1`.
///
/// # Errors
/// [`NumericalError::SingularMatrix`] if the system has no unique solution,
/// and a probability error if the solution is not a distribution.
pub fn pi_from_q(q: &DMatrix<f64>) -> Result<Vec<f64>, NumericalError> {
    let n = q.nrows();
    let system = (q + DMatrix::from_element(n, n, 1.0)).transpose();
    let ones = DVector::from_element(n, 1.0);
    let solution = system.lu().solve(&ones).ok_or(NumericalError::SingularMatrix)?;

    let mut pi = Vec::with_capacity(n);
    for (index, &value) in solution.iter().enumerate() {
        if !value.is_finite() {
            return Err(NumericalError::SingularMatrix);
        }
        if value < -PROBABILITY_TOLERANCE {
            return Err(NumericalError::NegativeProbability { index, value });
        }
        pi.push(value.max(0.0));
    }

    let sum: f64 = pi.iter().sum();
    if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
        return Err(NumericalError::NotNormalized { sum });
    }
    Ok(pi.into_iter().map(|p| p / sum).collect())
}

/// `Σ -Q[i][i]·pi[i]`, the expected rate of leaving the current allele.
pub fn expected_rate(q: &DMatrix<f64>, pi: &[f64]) -> f64 {
    pi.iter()
        .enumerate()
        .map(|(i, p)| -q[(i, i)] * p)
        .sum()
}

/// Derive the normalized Q, its stationary distribution and expected rate.
pub fn build(
    fitness: &[f64],
    mutation: Option<&MutationRates>,
    normalization: QNormalization,
) -> Result<RateModel, NumericalError> {
    let mut q = unnormalized_q(fitness, mutation);

    // pi is invariant to scaling Q, so it is solved on the raw matrix.
    let pi = match mutation {
        Some(_) => pi_from_q(&q)?,
        None => pi_from_fitness(fitness),
    };

    let factor = match normalization {
        QNormalization::ConstantForFlat => fitness.len() as f64 - 1.0,
        QNormalization::ConstantRate => expected_rate(&q, &pi),
    };
    if factor > 0.0 {
        q /= factor;
    }
    let expected_rate = expected_rate(&q, &pi);

    Ok(RateModel {
        q,
        pi,
        expected_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn row_sums(q: &DMatrix<f64>) -> Vec<f64> {
        q.row_iter().map(|r| r.sum()).collect()
    }

    #[test]
    fn test_fixation_rate_limit() {
        assert_eq!(fixation_rate(0.0), 1.0);
        assert_eq!(fixation_rate(1e-12), 1.0);
        assert!((fixation_rate(1e-6) - 1.0).abs() < 1e-5);
        // Beneficial substitutions are faster than neutral ones
        assert!(fixation_rate(1.0) > 1.0);
        assert!(fixation_rate(-1.0) < 1.0);
    }

    #[test]
    fn test_flat_constant_for_flat() {
        for n in 2..=6 {
            let fitness = vec![1.0; n];
            let model = build(&fitness, None, QNormalization::ConstantForFlat).unwrap();
            for i in 0..n {
                for j in 0..n {
                    if i != j {
                        assert!((model.q[(i, j)] - 1.0 / (n as f64 - 1.0)).abs() < 1e-12);
                    }
                }
                assert!((model.pi[i] - 1.0 / n as f64).abs() < 1e-12);
            }
            assert!((model.expected_rate - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_constant_rate_is_one() {
        let fitness = [0.3, 1.7, -0.4, 2.2];
        let model = build(&fitness, None, QNormalization::ConstantRate).unwrap();
        assert!((model.expected_rate - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pi_paths_agree_without_mutation_bias() {
        let fitness = [0.5, -1.0, 2.0];
        let q = unnormalized_q(&fitness, None);
        let solved = pi_from_q(&q).unwrap();
        let closed = pi_from_fitness(&fitness);
        for (a, b) in solved.iter().zip(&closed) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_pi_with_mutation_bias_is_stationary() {
        let m = MutationRates::from_row_slice(3, &[0.0, 2.0, 1.0, 0.5, 0.0, 1.0, 1.0, 3.0, 0.0])
            .unwrap();
        let fitness = [0.2, 0.0, -0.3];
        let model = build(&fitness, Some(&m), QNormalization::ConstantRate).unwrap();
        let pi = DVector::from_vec(model.pi.clone()).transpose();
        let flux = pi * &model.q;
        for v in flux.iter() {
            assert!(v.abs() < 1e-9);
        }
        assert!((model.expected_rate - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_singular_system_is_reported() {
        // Two absorbing states: no unique stationary distribution.
        let m = MutationRates::from_row_slice(2, &[0.0, 0.0, 0.0, 0.0]).unwrap();
        let result = build(&[1.0, 1.0], Some(&m), QNormalization::ConstantRate);
        assert_eq!(result, Err(NumericalError::SingularMatrix));
    }

    #[test]
    fn test_mutation_rates_validation() {
        assert!(MutationRates::from_row_slice(2, &[0.0, 1.0, 1.0]).is_err());
        assert!(MutationRates::from_row_slice(2, &[0.0, -1.0, 1.0, 0.0]).is_err());
    }

    #[test]
    fn test_large_fitness_does_not_overflow() {
        let pi = pi_from_fitness(&[800.0, 799.0]);
        assert!(pi.iter().all(|p| p.is_finite()));
        assert!((pi.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_rows_sum_to_zero(fitness in prop::collection::vec(-5.0f64..5.0, 2..10)) {
            for rule in [QNormalization::ConstantRate, QNormalization::ConstantForFlat] {
                let model = build(&fitness, None, rule).unwrap();
                for s in row_sums(&model.q) {
                    prop_assert!(s.abs() < 1e-9);
                }
            }
        }

        #[test]
        fn prop_pi_is_distribution(
            fitness in prop::collection::vec(-3.0f64..3.0, 2..7),
            bias in prop::collection::vec(0.1f64..3.0, 36),
        ) {
            let n = fitness.len();
            let m = MutationRates::from_row_slice(n, &bias[..n * n]).unwrap();
            for mutation in [None, Some(&m)] {
                let model = build(&fitness, mutation, QNormalization::ConstantRate).unwrap();
                prop_assert!((model.pi.iter().sum::<f64>() - 1.0).abs() < 1e-9);
                prop_assert!(model.pi.iter().all(|&p| p >= 0.0));
                for s in row_sums(&model.q) {
                    prop_assert!(s.abs() < 1e-9);
                }
            }
        }
    }
}
