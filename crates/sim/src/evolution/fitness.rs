//! Fitness vector generation and update rules.

use crate::base::{Allele, RandomSource};
use crate::errors::{ConfigError, NumericalError, SimulationError};
use tracing::debug;

/// Where the initial fitness vector comes from, with its parameters resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum FitnessSource {
    /// Every allele has fitness 1.
    Flat,
    /// i.i.d. Gamma(shape, rate) per allele.
    Gamma { shape: f64, rate: f64 },
    /// i.i.d. log-normal with underlying N(0, sigma²) per allele.
    LogNormal { sigma: f64 },
    /// A caller-supplied vector (read from file).
    Fixed(Vec<f64>),
}

impl FitnessSource {
    /// Produce an initial fitness vector of length `n`.
    pub fn generate(&self, n: usize, rng: &mut RandomSource) -> Result<Vec<f64>, SimulationError> {
        match self {
            Self::Flat => Ok(flat(n)),
            Self::Gamma { shape, rate } => Ok(gamma(n, *shape, *rate, rng)?),
            Self::LogNormal { sigma } => Ok(log_normal(n, *sigma, rng)?),
            Self::Fixed(values) => {
                if values.len() != n {
                    return Err(SimulationError::FitnessLength {
                        expected: n,
                        actual: values.len(),
                    });
                }
                Ok(values.clone())
            }
        }
    }

    /// Whether fresh i.i.d. draws from this source are meaningful.
    pub fn supports_iid(&self) -> bool {
        matches!(self, Self::Gamma { .. } | Self::LogNormal { .. })
    }

    /// Overwrite `fitness` with fresh i.i.d. draws from the same family.
    ///
    /// # Errors
    /// Flat and fixed sources have no distribution to redraw from.
    pub fn redraw(&self, fitness: &mut [f64], rng: &mut RandomSource) -> Result<(), SimulationError> {
        match self {
            Self::Gamma { shape, rate } => {
                for f in fitness.iter_mut() {
                    *f = rng.gamma(*shape, *rate)?;
                }
                Ok(())
            }
            Self::LogNormal { sigma } => {
                for f in fitness.iter_mut() {
                    *f = rng.log_normal(0.0, *sigma)?;
                }
                Ok(())
            }
            Self::Flat | Self::Fixed(_) => Err(ConfigError::InvalidCombination(format!(
                "{} initial fitness is not compatible with the IID new fitness rule",
                self.name()
            ))
            .into()),
        }
    }

    /// Configuration name of the source.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Flat => "FLAT",
            Self::Gamma { .. } => "GAMMA",
            Self::LogNormal { .. } => "LOGNORM",
            Self::Fixed(_) => "FILE",
        }
    }
}

/// All-ones fitness vector.
pub fn flat(n: usize) -> Vec<f64> {
    vec![1.0; n]
}

/// i.i.d. Gamma(shape, rate) fitness values.
pub fn gamma(
    n: usize,
    shape: f64,
    rate: f64,
    rng: &mut RandomSource,
) -> Result<Vec<f64>, NumericalError> {
    (0..n).map(|_| rng.gamma(shape, rate)).collect()
}

/// i.i.d. log-normal fitness values with underlying N(0, sigma²).
pub fn log_normal(n: usize, sigma: f64, rng: &mut RandomSource) -> Result<Vec<f64>, NumericalError> {
    (0..n).map(|_| rng.log_normal(0.0, sigma)).collect()
}

/// Permute the existing fitness values in place.
pub fn shuffle(fitness: &mut [f64], rng: &mut RandomSource) {
    rng.shuffle(fitness);
}

/// Raise the fitness of the occupied allele by `interval * coefficient`.
///
/// Models a linear, age-dependent advantage of the allele that has been
/// resident for one change interval. Other alleles are left untouched.
pub fn allele_age_bump(
    fitness: &mut [f64],
    allele: Allele,
    interval: f64,
    coefficient: f64,
) -> Result<(), SimulationError> {
    let size = fitness.len();
    let slot = fitness
        .get_mut(allele as usize)
        .ok_or(SimulationError::AlleleOutOfRange { allele, size })?;
    let bump = interval * coefficient;
    *slot += bump;
    debug!(allele, bump, "increased fitness of the resident allele");
    Ok(())
}
