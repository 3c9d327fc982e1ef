//! Many independent runs on a worker pool.
//!
//! Runs share the tree and their model read-only and own everything else.
//! With a global seed, per-run seeds are drawn from one seed stream before
//! any run starts, so results do not depend on the number of workers or on
//! scheduling order.

use crate::base::RandomSource;
use crate::errors::{BatchError, RunError};
use crate::simulation::engine::{RunOutput, SimulationEngine};
use crate::simulation::model::Model;
use crate::simulation::stats::SubstitutionStats;
use crate::tree::{NodeId, Tree};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{error, info};

/// A batch of simulation runs.
///
/// With one model every run uses it; with several (variable landscapes)
/// there is exactly one run per model.
#[derive(Debug, Clone)]
pub struct Batch {
    tree: Arc<Tree>,
    models: Vec<Arc<Model>>,
    instances: usize,
    threads: usize,
    seed: Option<u64>,
}

impl Batch {
    pub fn new(tree: Arc<Tree>, models: Vec<Arc<Model>>) -> Result<Self, BatchError> {
        if models.is_empty() {
            return Err(BatchError::NoModels);
        }
        Ok(Self {
            tree,
            models,
            instances: 1,
            threads: 1,
            seed: None,
        })
    }

    /// Number of runs for a single model. Ignored with variable landscapes.
    pub fn instances(mut self, instances: usize) -> Self {
        self.instances = instances;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn variable_landscapes(&self) -> bool {
        self.models.len() > 1
    }

    pub fn num_runs(&self) -> usize {
        if self.variable_landscapes() {
            self.models.len()
        } else {
            self.instances
        }
    }

    /// The model used by run `run`.
    pub fn model_for(&self, run: usize) -> &Model {
        if self.variable_landscapes() {
            &*self.models[run]
        } else {
            &*self.models[0]
        }
    }

    /// Per-run seeds, drawn in run order from the global seed.
    pub fn run_seeds(&self) -> Option<Vec<u64>> {
        self.seed.map(|seed| {
            let mut stream = RandomSource::from_seed(seed);
            (0..self.num_runs()).map(|_| stream.next_seed()).collect()
        })
    }

    /// Execute every run.
    pub fn run(&self) -> Result<BatchOutput, BatchError> {
        self.run_with_progress(|_| {})
    }

    /// Execute every run, calling `on_finished` with the run index as each
    /// run completes.
    ///
    /// # Errors
    /// Only pool creation fails the batch. A failing run is logged and
    /// reported in its slot of the output.
    pub fn run_with_progress<F>(&self, on_finished: F) -> Result<BatchOutput, BatchError>
    where
        F: Fn(usize) + Sync,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()?;
        let seeds = self.run_seeds();
        let num_runs = self.num_runs();
        info!(runs = num_runs, threads = self.threads, "starting simulation batch");

        let runs: Vec<Result<RunOutput, RunError>> = pool.install(|| {
            (0..num_runs)
                .into_par_iter()
                .map(|run| {
                    let rng = match &seeds {
                        Some(seeds) => RandomSource::from_seed(seeds[run]),
                        None => RandomSource::from_entropy(),
                    };
                    let engine = SimulationEngine::new(&self.tree, self.model_for(run), rng);
                    let result = engine.run().map_err(|source| {
                        let err = RunError { run, source };
                        error!(error = %err, "simulation run failed");
                        err
                    });
                    on_finished(run);
                    result
                })
                .collect()
        });

        let failed = runs.iter().filter(|r| r.is_err()).count();
        info!(completed = num_runs - failed, failed, "simulation batch finished");
        Ok(BatchOutput { runs })
    }
}

/// Results of a batch, in run order.
#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub runs: Vec<Result<RunOutput, RunError>>,
}

impl BatchOutput {
    /// Successful runs with their run indices.
    pub fn successful(&self) -> impl Iterator<Item = (usize, &RunOutput)> + '_ {
        self.runs
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().ok().map(|out| (i, out)))
    }

    pub fn failures(&self) -> impl Iterator<Item = &RunError> + '_ {
        self.runs.iter().filter_map(|r| r.as_ref().err())
    }

    /// Per node, in tree order, the concatenated sequences of all successful
    /// runs, decoded with each run's alphabet.
    pub fn merged_sequences(&self, batch: &Batch) -> Vec<(String, String)> {
        let tree = batch.tree();
        tree.ids()
            .map(|id| {
                let merged: String = self
                    .successful()
                    .map(|(run, out)| batch.model_for(run).alphabet().decode(out.sequence(id)))
                    .collect();
                (tree.name(id).to_string(), merged)
            })
            .collect()
    }

    /// Per node, the change times of all successful runs joined by `"; "`.
    pub fn merged_change_times(&self, tree: &Tree) -> Vec<(String, String)> {
        self.merge_changes(tree, |out, id| out.changes.format_times(id))
    }

    /// Per node, the fitness snapshots of all successful runs joined by `"; "`.
    pub fn merged_fitnesses(&self, tree: &Tree) -> Vec<(String, String)> {
        self.merge_changes(tree, |out, id| out.changes.format_fitnesses(id))
    }

    fn merge_changes<F>(&self, tree: &Tree, format: F) -> Vec<(String, String)>
    where
        F: Fn(&RunOutput, NodeId) -> String,
    {
        tree.ids()
            .map(|id| {
                let parts: Vec<String> = self.successful().map(|(_, out)| format(out, id)).collect();
                (tree.name(id).to_string(), parts.join("; "))
            })
            .collect()
    }

    /// Substitution statistics of the successful runs that collected them,
    /// with sites laid out like [`merged_sequences`](Self::merged_sequences).
    pub fn combined_stats(&self) -> Option<SubstitutionStats> {
        let mut stats = self.successful().filter_map(|(_, out)| out.stats.as_ref());
        let mut combined = stats.next()?.clone();
        for s in stats {
            combined.merge(s);
        }
        Some(combined)
    }
}
