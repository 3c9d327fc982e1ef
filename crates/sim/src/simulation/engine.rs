//! Tree traversal for one simulation run.
//!
//! The engine walks the tree breadth-first. Every queued task carries the
//! state inherited from its parent branch:
//!
//! - the landscape handle (shared with siblings until one of them changes it),
//! - the countdown to the next deterministic landscape change,
//! - the sequence with its event rates.
//!
//! Each child branch starts from its own copy of the parent's sequence state,
//! so siblings evolve independently from the same ancestor. Substitutions and
//! stochastic landscape changes arrive as one Poisson process whose rate is
//! the sum of all per-site exit rates plus the landscape-change rate.

use crate::base::{Allele, RandomSource};
use crate::errors::SimulationError;
use crate::evolution::{change_landscape, Landscape};
use crate::simulation::model::{ChangeTiming, Model};
use crate::simulation::rates::{Event, SequenceRates};
use crate::simulation::schedule::ScheduledChange;
use crate::simulation::stats::SubstitutionStats;
use crate::simulation::tracker::ChangeTracker;
use crate::tree::{NodeId, Tree};
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::{debug, trace};

/// An interval change this close to the end of a branch is left to the next
/// branch.
pub const TIME_EPSILON: f64 = 1e-9;

/// Everything one run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    /// Final sequence per node, indexed by [`NodeId::index`]
    pub sequences: Vec<Vec<Allele>>,
    pub changes: ChangeTracker,
    pub stats: Option<SubstitutionStats>,
    pub substitutions: u64,
}

impl RunOutput {
    pub fn sequence(&self, node: NodeId) -> &[Allele] {
        &self.sequences[node.index()]
    }

    /// Landscape changes after the initial landscape.
    pub fn landscape_changes(&self) -> usize {
        self.changes.count().saturating_sub(1)
    }
}

/// Work item of the breadth-first walk.
struct BranchTask {
    node: NodeId,
    landscape: Rc<Landscape>,
    countdown: f64,
    rates: SequenceRates,
}

/// State of one in-flight branch walk.
pub struct BranchState {
    /// Landscape in effect; replaced or mutated on landscape changes
    pub landscape: Rc<Landscape>,
    /// Time to the next deterministic landscape change
    pub countdown: f64,
    pub rates: SequenceRates,
}

/// Simulates one run over a tree.
///
/// A run is single-threaded and owns its random source; many engines can
/// run in parallel over the same tree and model.
pub struct SimulationEngine<'a> {
    tree: &'a Tree,
    model: &'a Model,
    rng: RandomSource,
    tracker: ChangeTracker,
    stats: Option<SubstitutionStats>,
    substitutions: u64,
}

impl<'a> SimulationEngine<'a> {
    pub fn new(tree: &'a Tree, model: &'a Model, rng: RandomSource) -> Self {
        let stats = model
            .collect_stats()
            .then(|| SubstitutionStats::new(tree.len(), model.sequence_length()));
        Self {
            tree,
            model,
            rng,
            tracker: ChangeTracker::new(tree.len(), model.record_changes()),
            stats,
            substitutions: 0,
        }
    }

    /// Initial landscape and root state.
    ///
    /// The initial landscape is recorded as a change at time 0 on the root.
    pub fn root_state(&mut self) -> Result<BranchState, SimulationError> {
        let model = self.model;
        let landscape = Rc::new(Landscape::create(model.rules(), &mut self.rng)?);
        debug!(
            fitness = ?landscape.fitness(),
            pi = ?landscape.pi(),
            expected_rate = landscape.expected_rate(),
            "initial landscape"
        );
        self.tracker
            .record(self.tree.root(), 0.0, landscape.fitness());

        let change_rate = model.change_rate(&landscape);
        let rates = match model.root_sequence() {
            Some(sequence) => SequenceRates::new(sequence.to_vec(), &landscape, change_rate)?,
            None => SequenceRates::from_stationary(
                model.sequence_length(),
                &landscape,
                change_rate,
                &mut self.rng,
            )?,
        };
        let countdown = match model.timing() {
            ChangeTiming::FixedInterval { interval } => *interval,
            _ => f64::INFINITY,
        };
        Ok(BranchState {
            landscape,
            countdown,
            rates,
        })
    }

    /// Run the whole tree.
    pub fn run(mut self) -> Result<RunOutput, SimulationError> {
        let tree = self.tree;
        let root = tree.root();
        let state = self.root_state()?;

        let mut sequences = vec![Vec::new(); tree.len()];
        sequences[root.index()] = state.rates.sequence().to_vec();

        let mut queue = VecDeque::new();
        queue.push_back(BranchTask {
            node: root,
            landscape: state.landscape,
            countdown: state.countdown,
            rates: state.rates,
        });

        while let Some(task) = queue.pop_front() {
            for &child in tree.children(task.node) {
                let mut branch = BranchState {
                    landscape: Rc::clone(&task.landscape),
                    countdown: task.countdown,
                    rates: task.rates.clone(),
                };
                self.walk_branch(child, &mut branch)?;

                if tree.node(child).is_leaf() {
                    sequences[child.index()] = branch.rates.into_sequence();
                } else {
                    sequences[child.index()] = branch.rates.sequence().to_vec();
                    queue.push_back(BranchTask {
                        node: child,
                        landscape: branch.landscape,
                        countdown: branch.countdown,
                        rates: branch.rates,
                    });
                }
            }
        }

        Ok(RunOutput {
            sequences,
            changes: self.tracker,
            stats: self.stats,
            substitutions: self.substitutions,
        })
    }

    /// Simulate the branch leading to `child`, updating `state` in place.
    pub fn walk_branch(
        &mut self,
        child: NodeId,
        state: &mut BranchState,
    ) -> Result<(), SimulationError> {
        let model = self.model;
        let length = self.tree.branch_length(child);

        let scheduled: Option<&[ScheduledChange]> = match model.timing() {
            ChangeTiming::Scheduled(schedule) => Some(schedule.changes_on(child)),
            _ => None,
        };
        let mut next_scheduled = 0;
        if let Some(changes) = scheduled {
            state.countdown = changes.first().map_or(f64::INFINITY, |c| c.time);
        }

        let mut elapsed = 0.0;
        let mut changed_on_branch = false;
        while elapsed < length {
            let remaining = length - elapsed;
            let tau = self.rng.exponential(state.rates.sum_rates())?;

            let target = scheduled.and_then(|changes| changes.get(next_scheduled));
            // Scheduled times are absolute on the branch and always below its
            // length; the countdown only drives interval timing.
            let deterministic = match scheduled {
                Some(_) => target.is_some_and(|c| c.time < elapsed + tau),
                None => state.countdown < remaining - TIME_EPSILON && state.countdown < tau,
            };
            if deterministic {
                elapsed = target.map_or(elapsed + state.countdown, |c| c.time);
                let fitness = target.and_then(|c| c.fitness.as_deref());
                debug!(node = self.tree.name(child), time = elapsed, "deterministic landscape change");
                self.change_landscape(child, elapsed, !changed_on_branch, fitness, state)?;
                changed_on_branch = true;

                state.countdown = match scheduled {
                    Some(changes) => {
                        next_scheduled += 1;
                        changes
                            .get(next_scheduled)
                            .map_or(f64::INFINITY, |c| c.time - elapsed)
                    }
                    None => model.timing().interval(),
                };
            } else if tau < remaining {
                elapsed += tau;
                match state.rates.sample_event(&mut self.rng)? {
                    Event::Substitution(site) => {
                        let change_rate = model.change_rate(&state.landscape);
                        let allele = state.rates.substitute(
                            site,
                            &state.landscape,
                            change_rate,
                            &mut self.rng,
                        )?;
                        trace!(node = self.tree.name(child), site, allele, "substitution");
                        self.substitutions += 1;
                        if let Some(stats) = self.stats.as_mut() {
                            stats.register(child, site);
                        }
                    }
                    Event::LandscapeChange => {
                        debug!(node = self.tree.name(child), time = elapsed, "stochastic landscape change");
                        self.change_landscape(child, elapsed, !changed_on_branch, None, state)?;
                        changed_on_branch = true;
                    }
                }
                state.countdown -= tau;
            } else {
                state.countdown -= remaining;
                break;
            }
        }
        Ok(())
    }

    fn change_landscape(
        &mut self,
        child: NodeId,
        time: f64,
        first_on_branch: bool,
        fitness: Option<&[f64]>,
        state: &mut BranchState,
    ) -> Result<(), SimulationError> {
        let model = self.model;
        let allele = state.rates.sequence().first().copied().unwrap_or(0);
        change_landscape(
            &mut state.landscape,
            first_on_branch,
            allele,
            fitness,
            model.rules(),
            &mut self.rng,
        )?;
        let change_rate = model.change_rate(&state.landscape);
        state.rates.recompute(&state.landscape, change_rate)?;
        self.tracker.record(child, time, state.landscape.fitness());
        debug!(
            fitness = ?state.landscape.fitness(),
            pi = ?state.landscape.pi(),
            "new landscape"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::Alphabet;
    use crate::evolution::NewFitnessRule;
    use crate::simulation::configs::LandscapeChangeTiming;
    use crate::simulation::model::ModelBuilder;

    fn model(timing: LandscapeChangeTiming, parameter: f64, height: f64) -> Model {
        ModelBuilder::new()
            .alphabet(Alphabet::dna())
            .sequence_length(20)
            .new_fitness_rule(NewFitnessRule::Shuffle)
            .timing(timing, Some(parameter))
            .tree_height(height)
            .record_changes(true)
            .collect_stats(true)
            .build()
            .unwrap()
    }

    #[test]
    fn test_zero_length_branch_keeps_sequence() {
        let tree = Tree::from_newick("(A:0,B:0)R;").unwrap();
        let model = model(LandscapeChangeTiming::Stochastic, 5.0, 0.0);
        let mut engine = SimulationEngine::new(&tree, &model, RandomSource::from_seed(1));
        let mut state = engine.root_state().unwrap();
        let before = state.rates.sequence().to_vec();
        let countdown = state.countdown;
        engine.walk_branch(tree.find("A").unwrap(), &mut state).unwrap();
        assert_eq!(state.rates.sequence(), before.as_slice());
        assert_eq!(state.countdown, countdown);
    }

    #[test]
    fn test_run_fills_every_node() {
        let tree = Tree::from_newick("((A:0.3,B:0.2)X:0.4,C:0.9)R;").unwrap();
        let model = model(LandscapeChangeTiming::Stochastic, 1.0, tree.height());
        let engine = SimulationEngine::new(&tree, &model, RandomSource::from_seed(2));
        let output = engine.run().unwrap();
        for id in tree.ids() {
            assert_eq!(output.sequence(id).len(), 20);
        }
        let stats = output.stats.as_ref().unwrap();
        assert_eq!(stats.total(), output.substitutions);
        assert_eq!(output.changes.changes_on(tree.root()).len(), 1);
    }

    #[test]
    fn test_fixed_interval_countdown_carries_over() {
        // Interval 0.5 on a path of two 0.3 branches: one change, on the
        // second branch 0.2 after its start.
        let tree = Tree::from_newick("((A:0.3)X:0.3)R;").unwrap();
        let model = model(LandscapeChangeTiming::FixedIntervalLength, 0.5, tree.height());
        let output = SimulationEngine::new(&tree, &model, RandomSource::from_seed(3))
            .run()
            .unwrap();
        assert!(output.changes.changes_on(tree.find("X").unwrap()).is_empty());
        let on_a = output.changes.changes_on(tree.find("A").unwrap());
        assert_eq!(on_a.len(), 1);
        assert!((on_a[0].time - 0.2).abs() < 1e-12);
        assert_eq!(output.landscape_changes(), 1);
    }
}
