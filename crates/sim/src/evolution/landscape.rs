//! Fitness landscapes and how they change along a branch.
//!
//! A [`Landscape`] couples a fitness vector with the rate matrix and
//! stationary distribution derived from it. Branch walks hold landscapes
//! behind `Rc`:
//!
//! - Sibling branches start from the same `Rc` handle of their parent.
//! - The first change on a branch produces a private copy, so siblings never
//!   observe each other's changes. Later changes on that branch mutate the
//!   private copy in place.
//! - In shared mode every landscape memoizes its successor. The first branch
//!   that changes a given landscape materializes the successor; every other
//!   branch reaching a change from that landscape reuses the same instance.
//!
//! A run walks its tree on a single thread, which is what makes `Rc` and the
//! single-assignment `OnceCell` memo sound here.

use crate::base::{Allele, RandomSource};
use crate::errors::SimulationError;
use crate::evolution::fitness::{self, FitnessSource};
use crate::evolution::rate_matrix::{self, MutationRates, QNormalization};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

/// How a landscape change computes the new fitness vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum NewFitnessRule {
    /// Permute the existing fitness values.
    Shuffle,
    /// Redraw i.i.d. from the initial fitness distribution.
    Iid,
    /// Raise the fitness of the currently occupied allele.
    CurrentAlleleDependent,
    /// Use a vector supplied with the change.
    UserSet,
}

/// Everything a landscape needs to build and change itself.
///
/// This is a read-only view of the run's model; it is shared by all
/// landscapes of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct LandscapeRules {
    pub alphabet_size: usize,
    pub initial_fitness: FitnessSource,
    pub new_fitness_rule: NewFitnessRule,
    pub normalization: QNormalization,
    pub mutation_rates: Option<Arc<MutationRates>>,
    /// Length of one deterministic change interval, used by the
    /// allele-dependent rule.
    pub change_interval: f64,
    pub age_coefficient: f64,
    /// Sibling branches share post-change landscapes.
    pub shared: bool,
}

impl LandscapeRules {
    /// Rules for a landscape that only ever shuffles, with default scaling.
    pub fn new(alphabet_size: usize, initial_fitness: FitnessSource) -> Self {
        Self {
            alphabet_size,
            initial_fitness,
            new_fitness_rule: NewFitnessRule::Shuffle,
            normalization: QNormalization::default(),
            mutation_rates: None,
            change_interval: f64::INFINITY,
            age_coefficient: 0.0,
            shared: false,
        }
    }
}

/// Fitness vector with its derived Q, pi and expected substitution rate.
#[derive(Debug)]
pub struct Landscape {
    fitness: Vec<f64>,
    q: DMatrix<f64>,
    pi: Vec<f64>,
    expected_rate: f64,
    /// Memoized successor for shared mode.
    next: OnceCell<Rc<Landscape>>,
}

impl Clone for Landscape {
    /// Deep copy of fitness, Q and pi. The successor memo is not copied: a
    /// copy is a new landscape with its own future.
    fn clone(&self) -> Self {
        Self {
            fitness: self.fitness.clone(),
            q: self.q.clone(),
            pi: self.pi.clone(),
            expected_rate: self.expected_rate,
            next: OnceCell::new(),
        }
    }
}

impl Drop for Landscape {
    /// Unlink the successor chain iteratively. A shared run can memoize an
    /// arbitrarily long chain, and the default recursive drop would use one
    /// stack frame per link.
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(link) = next {
            match Rc::try_unwrap(link) {
                Ok(mut landscape) => next = landscape.next.take(),
                // Still held elsewhere; that holder drops the rest.
                Err(_) => break,
            }
        }
    }
}

impl Landscape {
    /// Build a landscape from scratch, drawing the initial fitness.
    pub fn create(rules: &LandscapeRules, rng: &mut RandomSource) -> Result<Self, SimulationError> {
        let fitness = rules.initial_fitness.generate(rules.alphabet_size, rng)?;
        debug!(?fitness, "initial fitness");
        Self::from_fitness(fitness, rules)
    }

    /// Wrap a caller-specified fitness vector.
    pub fn from_fitness(fitness: Vec<f64>, rules: &LandscapeRules) -> Result<Self, SimulationError> {
        if fitness.len() != rules.alphabet_size {
            return Err(SimulationError::FitnessLength {
                expected: rules.alphabet_size,
                actual: fitness.len(),
            });
        }
        let model = rate_matrix::build(
            &fitness,
            rules.mutation_rates.as_deref(),
            rules.normalization,
        )?;
        Ok(Self {
            fitness,
            q: model.q,
            pi: model.pi,
            expected_rate: model.expected_rate,
            next: OnceCell::new(),
        })
    }

    pub fn fitness(&self) -> &[f64] {
        &self.fitness
    }

    pub fn q(&self) -> &DMatrix<f64> {
        &self.q
    }

    #[inline]
    pub fn q_at(&self, i: Allele, j: Allele) -> f64 {
        self.q[(i as usize, j as usize)]
    }

    pub fn pi(&self) -> &[f64] {
        &self.pi
    }

    /// Cached `Σ -Q[i][i]·pi[i]`.
    pub fn expected_rate(&self) -> f64 {
        self.expected_rate
    }

    /// Rate of leaving `allele`, `-Q[allele][allele]`.
    #[inline]
    pub fn exit_rate(&self, allele: Allele) -> f64 {
        -self.q_at(allele, allele)
    }

    pub fn alphabet_size(&self) -> usize {
        self.fitness.len()
    }

    /// Whether a shared successor has been materialized.
    pub fn has_successor(&self) -> bool {
        self.next.get().is_some()
    }

    /// Change the fitness vector in place and rebuild Q and pi.
    ///
    /// `allele` is the currently occupied allele (first site), used by the
    /// allele-dependent rule; `new_fitness` is the vector for `USER_SET`.
    pub fn mutate(
        &mut self,
        allele: Allele,
        new_fitness: Option<&[f64]>,
        rules: &LandscapeRules,
        rng: &mut RandomSource,
    ) -> Result<(), SimulationError> {
        debug!(fitness = ?self.fitness, "old fitness");
        match rules.new_fitness_rule {
            NewFitnessRule::UserSet => {
                let values = new_fitness.ok_or(SimulationError::MissingUserFitness)?;
                if values.len() != self.fitness.len() {
                    return Err(SimulationError::FitnessLength {
                        expected: self.fitness.len(),
                        actual: values.len(),
                    });
                }
                self.fitness.copy_from_slice(values);
            }
            NewFitnessRule::Iid => rules.initial_fitness.redraw(&mut self.fitness, rng)?,
            NewFitnessRule::Shuffle => fitness::shuffle(&mut self.fitness, rng),
            NewFitnessRule::CurrentAlleleDependent => fitness::allele_age_bump(
                &mut self.fitness,
                allele,
                rules.change_interval,
                rules.age_coefficient,
            )?,
        }
        debug!(fitness = ?self.fitness, "new fitness");

        let model = rate_matrix::build(
            &self.fitness,
            rules.mutation_rates.as_deref(),
            rules.normalization,
        )?;
        self.q = model.q;
        self.pi = model.pi;
        self.expected_rate = model.expected_rate;
        Ok(())
    }

    /// The shared successor of this landscape, materialized on first use.
    pub fn successor(
        &self,
        allele: Allele,
        new_fitness: Option<&[f64]>,
        rules: &LandscapeRules,
        rng: &mut RandomSource,
    ) -> Result<Rc<Landscape>, SimulationError> {
        if let Some(next) = self.next.get() {
            debug!("reusing shared landscape generated on a parallel branch");
            return Ok(Rc::clone(next));
        }
        debug!("generating shared landscape on demand");
        let mut next = self.clone();
        next.mutate(allele, new_fitness, rules, rng)?;
        let next = Rc::new(next);
        // Single-threaded run: nobody can have filled the cell since `get`.
        let _ = self.next.set(Rc::clone(&next));
        Ok(next)
    }

    /// Sample the allele replacing `current` after a substitution.
    ///
    /// Targets are drawn proportionally to the off-diagonal row
    /// `Q[current][*]`, renormalized to its literal sum.
    pub fn pick_new_allele(
        &self,
        current: Allele,
        rng: &mut RandomSource,
    ) -> Result<Allele, SimulationError> {
        let size = self.alphabet_size();
        if current as usize >= size {
            return Err(SimulationError::AlleleOutOfRange {
                allele: current,
                size,
            });
        }
        let row = self.q.row(current as usize);
        let mut weights: Vec<f64> = row.iter().copied().collect();
        weights[current as usize] = 0.0;
        let total: f64 = weights.iter().sum();
        for w in weights.iter_mut() {
            *w /= total;
        }
        Ok(rng.sample_discrete(&weights)? as Allele)
    }
}

/// Apply one landscape change to a branch's landscape handle.
///
/// In shared mode the handle moves to the memoized successor. Otherwise the
/// first change on a branch (`first_on_branch`) swaps in a private, changed
/// copy and later changes mutate that copy in place.
pub fn change_landscape(
    current: &mut Rc<Landscape>,
    first_on_branch: bool,
    allele: Allele,
    new_fitness: Option<&[f64]>,
    rules: &LandscapeRules,
    rng: &mut RandomSource,
) -> Result<(), SimulationError> {
    if rules.shared {
        let next = current.successor(allele, new_fitness, rules, rng)?;
        *current = next;
    } else if first_on_branch {
        let mut private = Landscape::clone(current);
        private.mutate(allele, new_fitness, rules, rng)?;
        *current = Rc::new(private);
    } else {
        debug_assert_eq!(Rc::strong_count(current), 1);
        Rc::make_mut(current).mutate(allele, new_fitness, rules, rng)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(rule: NewFitnessRule) -> LandscapeRules {
        LandscapeRules {
            new_fitness_rule: rule,
            ..LandscapeRules::new(4, FitnessSource::Fixed(vec![0.1, 0.5, 0.9, 1.3]))
        }
    }

    #[test]
    fn test_create_flat() {
        let mut rng = RandomSource::from_seed(1);
        let rules = LandscapeRules::new(4, FitnessSource::Flat);
        let ls = Landscape::create(&rules, &mut rng).unwrap();
        assert_eq!(ls.fitness(), &[1.0; 4]);
        for p in ls.pi() {
            assert!((p - 0.25).abs() < 1e-12);
        }
        assert!((ls.expected_rate() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_fitness_checks_length() {
        let rules = LandscapeRules::new(4, FitnessSource::Flat);
        assert!(matches!(
            Landscape::from_fitness(vec![1.0, 2.0], &rules),
            Err(SimulationError::FitnessLength { .. })
        ));
    }

    #[test]
    fn test_clone_then_mutate_leaves_source_untouched() {
        let mut rng = RandomSource::from_seed(2);
        let rules = rules(NewFitnessRule::Shuffle);
        let source = Landscape::create(&rules, &mut rng).unwrap();
        let (fitness, q, pi) = (source.fitness().to_vec(), source.q().clone(), source.pi().to_vec());

        let mut copy = source.clone();
        for _ in 0..10 {
            copy.mutate(0, None, &rules, &mut rng).unwrap();
        }

        assert_eq!(source.fitness(), fitness.as_slice());
        assert_eq!(source.q(), &q);
        assert_eq!(source.pi(), pi.as_slice());
    }

    #[test]
    fn test_shuffle_keeps_values() {
        let mut rng = RandomSource::from_seed(3);
        let rules = rules(NewFitnessRule::Shuffle);
        let mut ls = Landscape::create(&rules, &mut rng).unwrap();
        ls.mutate(0, None, &rules, &mut rng).unwrap();
        let mut values = ls.fitness().to_vec();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(values, vec![0.1, 0.5, 0.9, 1.3]);
    }

    #[test]
    fn test_user_set_requires_vector() {
        let mut rng = RandomSource::from_seed(4);
        let rules = rules(NewFitnessRule::UserSet);
        let mut ls = Landscape::create(&rules, &mut rng).unwrap();
        assert_eq!(
            ls.mutate(0, None, &rules, &mut rng),
            Err(SimulationError::MissingUserFitness)
        );
        ls.mutate(0, Some(&[2.0, 0.0, 0.0, 0.0]), &rules, &mut rng).unwrap();
        assert_eq!(ls.fitness(), &[2.0, 0.0, 0.0, 0.0]);
        assert!(ls.pi()[0] > ls.pi()[1]);
    }

    #[test]
    fn test_iid_incompatible_with_fixed_source() {
        let mut rng = RandomSource::from_seed(5);
        let rules = rules(NewFitnessRule::Iid);
        let mut ls = Landscape::create(&rules, &mut rng).unwrap();
        assert!(matches!(
            ls.mutate(0, None, &rules, &mut rng),
            Err(SimulationError::Config(_))
        ));
    }

    #[test]
    fn test_allele_dependent_bump() {
        let mut rng = RandomSource::from_seed(6);
        let rules = LandscapeRules {
            change_interval: 0.5,
            age_coefficient: 2.0,
            ..rules(NewFitnessRule::CurrentAlleleDependent)
        };
        let mut ls = Landscape::create(&rules, &mut rng).unwrap();
        ls.mutate(2, None, &rules, &mut rng).unwrap();
        assert_eq!(ls.fitness(), &[0.1, 0.5, 1.9, 1.3]);
    }

    #[test]
    fn test_pick_new_allele_never_returns_current() {
        let mut rng = RandomSource::from_seed(7);
        let rules = rules(NewFitnessRule::Shuffle);
        let ls = Landscape::create(&rules, &mut rng).unwrap();
        for current in 0..4u8 {
            for _ in 0..500 {
                let next = ls.pick_new_allele(current, &mut rng).unwrap();
                assert_ne!(next, current);
                assert!(next < 4);
            }
        }
        assert!(ls.pick_new_allele(4, &mut rng).is_err());
    }

    #[test]
    fn test_shared_successor_is_memoized() {
        let mut rng = RandomSource::from_seed(8);
        let rules = LandscapeRules {
            shared: true,
            ..rules(NewFitnessRule::Shuffle)
        };
        let root = Rc::new(Landscape::create(&rules, &mut rng).unwrap());
        assert!(!root.has_successor());

        let mut left = Rc::clone(&root);
        let mut right = Rc::clone(&root);
        change_landscape(&mut left, true, 0, None, &rules, &mut rng).unwrap();
        change_landscape(&mut right, true, 3, None, &rules, &mut rng).unwrap();

        assert!(root.has_successor());
        assert!(Rc::ptr_eq(&left, &right));
        assert!(!Rc::ptr_eq(&left, &root));

        // The second change on each side also lands on one shared instance.
        change_landscape(&mut left, false, 0, None, &rules, &mut rng).unwrap();
        change_landscape(&mut right, false, 1, None, &rules, &mut rng).unwrap();
        assert!(Rc::ptr_eq(&left, &right));
    }

    #[test]
    fn test_long_shared_chain_drops() {
        let mut rng = RandomSource::from_seed(10);
        let rules = LandscapeRules {
            shared: true,
            ..LandscapeRules::new(2, FitnessSource::Fixed(vec![0.2, 0.7]))
        };
        let root = Rc::new(Landscape::create(&rules, &mut rng).unwrap());
        let mut current = Rc::clone(&root);
        for _ in 0..100_000 {
            change_landscape(&mut current, false, 0, None, &rules, &mut rng).unwrap();
        }
        assert!(root.has_successor());
        assert!(!current.has_successor());

        // Dropping the head must not recurse through every link; the tail
        // is still held and survives.
        drop(root);
        assert_eq!(Rc::strong_count(&current), 1);
        assert_eq!(current.alphabet_size(), 2);
    }

    #[test]
    fn test_private_change_does_not_leak_to_sibling() {
        let mut rng = RandomSource::from_seed(9);
        let rules = rules(NewFitnessRule::UserSet);
        let root = Rc::new(Landscape::create(&rules, &mut rng).unwrap());
        let mut left = Rc::clone(&root);
        let right = Rc::clone(&root);

        change_landscape(&mut left, true, 0, Some(&[3.0, 2.0, 1.0, 0.0]), &rules, &mut rng)
            .unwrap();
        assert!(!Rc::ptr_eq(&left, &root));
        assert!(Rc::ptr_eq(&right, &root));
        assert_eq!(right.fitness(), &[0.1, 0.5, 0.9, 1.3]);

        // Later changes on the same branch reuse the private instance.
        let before = Rc::as_ptr(&left);
        change_landscape(&mut left, false, 0, Some(&[0.0, 0.0, 0.0, 1.0]), &rules, &mut rng)
            .unwrap();
        assert_eq!(Rc::as_ptr(&left), before);
        assert_eq!(left.fitness(), &[0.0, 0.0, 0.0, 1.0]);
        assert_eq!(root.fitness(), &[0.1, 0.5, 0.9, 1.3]);
        assert!(!root.has_successor());
    }
}
