//! Sequence state with its per-site event rates.

use crate::base::{Allele, RandomSource, PROBABILITY_TOLERANCE};
use crate::errors::{NumericalError, SimulationError};
use crate::evolution::Landscape;

/// What happened at a sampled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A substitution at the given site
    Substitution(usize),
    /// A stochastic landscape change
    LandscapeChange,
}

/// A node's current sequence and the distribution of the next event.
///
/// `rates` has one slot per site holding that site's exit rate
/// `-Q[a][a]`, plus a final slot with the stochastic landscape-change rate.
/// It is normalized to sum to 1 whenever the raw total is positive;
/// `sum_rates` keeps the raw total, the rate of the next event of any kind.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceRates {
    sequence: Vec<Allele>,
    rates: Vec<f64>,
    sum_rates: f64,
}

impl SequenceRates {
    /// Build the rate vector for `sequence` under `landscape`.
    pub fn new(
        sequence: Vec<Allele>,
        landscape: &Landscape,
        change_rate: f64,
    ) -> Result<Self, NumericalError> {
        let mut rates = Self {
            rates: Vec::with_capacity(sequence.len() + 1),
            sequence,
            sum_rates: 0.0,
        };
        rates.recompute(landscape, change_rate)?;
        Ok(rates)
    }

    /// Draw a sequence i.i.d. from the landscape's stationary distribution.
    pub fn from_stationary(
        length: usize,
        landscape: &Landscape,
        change_rate: f64,
        rng: &mut RandomSource,
    ) -> Result<Self, NumericalError> {
        let sequence = (0..length)
            .map(|_| rng.sample_discrete(landscape.pi()).map(|a| a as Allele))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(sequence, landscape, change_rate)
    }

    /// Recompute every slot against `landscape`.
    ///
    /// # Errors
    /// Fails if the vector lost its shape or does not normalize.
    pub fn recompute(&mut self, landscape: &Landscape, change_rate: f64) -> Result<(), NumericalError> {
        self.rates.clear();
        self.rates
            .extend(self.sequence.iter().map(|&a| landscape.exit_rate(a)));
        self.rates.push(change_rate);

        self.sum_rates = self.rates.iter().sum();
        if self.sum_rates > 0.0 {
            for r in self.rates.iter_mut() {
                *r /= self.sum_rates;
            }
        }
        self.check()
    }

    fn check(&self) -> Result<(), NumericalError> {
        let expected = self.sequence.len() + 1;
        if self.rates.len() != expected {
            return Err(NumericalError::RateVectorShape {
                expected,
                actual: self.rates.len(),
            });
        }
        if self.sum_rates > 0.0 {
            let sum: f64 = self.rates.iter().sum();
            if !((sum - 1.0).abs() <= PROBABILITY_TOLERANCE) {
                return Err(NumericalError::NotNormalized { sum });
            }
        }
        Ok(())
    }

    /// Replace the allele at `site` with one drawn from the landscape and
    /// refresh the rates. Returns the new allele.
    pub fn substitute(
        &mut self,
        site: usize,
        landscape: &Landscape,
        change_rate: f64,
        rng: &mut RandomSource,
    ) -> Result<Allele, SimulationError> {
        let allele = landscape.pick_new_allele(self.sequence[site], rng)?;
        self.sequence[site] = allele;
        self.recompute(landscape, change_rate)?;
        Ok(allele)
    }

    /// Sample which event happens next.
    pub fn sample_event(&self, rng: &mut RandomSource) -> Result<Event, NumericalError> {
        let index = rng.sample_discrete(&self.rates)?;
        Ok(if index < self.sequence.len() {
            Event::Substitution(index)
        } else {
            Event::LandscapeChange
        })
    }

    pub fn sequence(&self) -> &[Allele] {
        &self.sequence
    }

    pub fn into_sequence(self) -> Vec<Allele> {
        self.sequence
    }

    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    /// Raw total rate of all events.
    pub fn sum_rates(&self) -> f64 {
        self.sum_rates
    }
}
