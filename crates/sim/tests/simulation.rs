//! End-to-end runs of the engine and the batch runner.

use selva_sim::base::{Alphabet, RandomSource};
use selva_sim::errors::InputError;
use selva_sim::evolution::NewFitnessRule;
use selva_sim::simulation::{
    Batch, BranchState, InitialFitness, LandscapeChangeTiming, Model, ModelBuilder, Schedule,
    Setup, SimulationEngine,
};
use selva_sim::tree::Tree;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use tempfile::tempdir;

const ULTRAMETRIC: &str = "((A:1,B:1)X:1,C:2)R;";

fn ten_symbols() -> Alphabet {
    Alphabet::new("ACDEFGHIKL").unwrap()
}

fn distinct_fitness() -> Vec<f64> {
    (0..10).map(|i| i as f64 * 0.3).collect()
}

fn shuffling(timing: LandscapeChangeTiming, parameter: f64, shared: bool, height: f64) -> Model {
    ModelBuilder::new()
        .alphabet(ten_symbols())
        .sequence_length(12)
        .initial_fitness(InitialFitness::File)
        .fitness_values(distinct_fitness())
        .new_fitness_rule(NewFitnessRule::Shuffle)
        .timing(timing, Some(parameter))
        .shared(shared)
        .tree_height(height)
        .record_changes(true)
        .build()
        .unwrap()
}

#[test]
fn test_same_seed_same_run() {
    let tree = Tree::from_newick("(A:1.0,B:1.0)R;").unwrap();
    let model = ModelBuilder::new()
        .alphabet(Alphabet::binary())
        .sequence_length(30)
        .initial_fitness(InitialFitness::Flat)
        .new_fitness_rule(NewFitnessRule::Shuffle)
        .timing(LandscapeChangeTiming::Stochastic, Some(0.0))
        .record_changes(true)
        .build()
        .unwrap();

    let first = SimulationEngine::new(&tree, &model, RandomSource::from_seed(11))
        .run()
        .unwrap();
    let second = SimulationEngine::new(&tree, &model, RandomSource::from_seed(11))
        .run()
        .unwrap();
    assert_eq!(first, second);
    // Rate zero: only the initial landscape
    assert_eq!(first.landscape_changes(), 0);
    assert_eq!(first.changes.format_times(tree.root()), "[0.0]");
}

#[test]
fn test_fixed_number_of_changes_along_every_path() {
    let tree = Tree::from_newick(ULTRAMETRIC).unwrap();
    let model = shuffling(LandscapeChangeTiming::FixedNumChanges, 2.0, false, tree.height());
    let output = SimulationEngine::new(&tree, &model, RandomSource::from_seed(5))
        .run()
        .unwrap();

    let times = |name: &str| -> Vec<f64> {
        output
            .changes
            .changes_on(tree.find(name).unwrap())
            .iter()
            .map(|c| c.time)
            .collect()
    };
    let close = |a: f64, b: f64| (a - b).abs() < 1e-9;

    let x = times("X");
    assert_eq!(x.len(), 1);
    assert!(close(x[0], 2.0 / 3.0));
    for leaf in ["A", "B"] {
        let t = times(leaf);
        assert_eq!(t.len(), 1, "changes on {leaf}: {t:?}");
        assert!(close(t[0], 1.0 / 3.0));
    }
    let c = times("C");
    assert_eq!(c.len(), 2);
    assert!(close(c[0], 2.0 / 3.0));
    assert!(close(c[1], 4.0 / 3.0));
    assert_eq!(output.landscape_changes(), 5);
}

#[test]
fn test_zero_length_branches_copy_the_parent() {
    let tree = Tree::from_newick("((A:0,B:0)X:0.4,C:0)R;").unwrap();
    let model = ModelBuilder::new()
        .alphabet(Alphabet::dna())
        .sequence_length(50)
        .timing(LandscapeChangeTiming::Stochastic, Some(2.0))
        .build()
        .unwrap();
    let output = SimulationEngine::new(&tree, &model, RandomSource::from_seed(8))
        .run()
        .unwrap();
    let x = output.sequence(tree.find("X").unwrap());
    assert_eq!(output.sequence(tree.find("A").unwrap()), x);
    assert_eq!(output.sequence(tree.find("B").unwrap()), x);
    assert_eq!(
        output.sequence(tree.find("C").unwrap()),
        output.sequence(tree.root())
    );
}

#[test]
fn test_shared_landscapes_are_identical_on_siblings() {
    let tree = Tree::from_newick("(A:1,B:1)R;").unwrap();
    let model = shuffling(LandscapeChangeTiming::FixedIntervalLength, 0.5, true, 1.0);
    let output = SimulationEngine::new(&tree, &model, RandomSource::from_seed(21))
        .run()
        .unwrap();
    let on_a = output.changes.changes_on(tree.find("A").unwrap());
    let on_b = output.changes.changes_on(tree.find("B").unwrap());
    assert_eq!(on_a.len(), 1);
    assert_eq!(on_a, on_b);
}

#[test]
fn test_private_landscapes_differ_on_siblings() {
    let tree = Tree::from_newick("(A:1,B:1)R;").unwrap();
    let model = shuffling(LandscapeChangeTiming::FixedIntervalLength, 0.5, false, 1.0);
    let output = SimulationEngine::new(&tree, &model, RandomSource::from_seed(21))
        .run()
        .unwrap();
    let on_a = output.changes.changes_on(tree.find("A").unwrap());
    let on_b = output.changes.changes_on(tree.find("B").unwrap());
    assert_eq!(on_a.len(), 1);
    assert_eq!(on_a[0].time, on_b[0].time);
    assert_ne!(on_a[0].fitness, on_b[0].fitness);
}

#[test]
fn test_shared_stochastic_first_change_is_common() {
    let tree = Tree::from_newick("(A:1,B:1)R;").unwrap();
    let model = shuffling(LandscapeChangeTiming::Stochastic, 20.0, true, 1.0);
    let output = SimulationEngine::new(&tree, &model, RandomSource::from_seed(4))
        .run()
        .unwrap();
    let on_a = output.changes.changes_on(tree.find("A").unwrap());
    let on_b = output.changes.changes_on(tree.find("B").unwrap());
    // Twenty expected changes per branch: both branches change.
    assert!(!on_a.is_empty());
    assert!(!on_b.is_empty());
    assert_eq!(on_a[0].fitness, on_b[0].fitness);
    assert_ne!(on_a[0].fitness, distinct_fitness());
}

/// Walk both branches of a two-leaf star from the same root state.
fn walk_siblings(model: &Model, seed: u64) -> (BranchState, BranchState, BranchState) {
    let tree = Tree::from_newick("(A:1,B:1)R;").unwrap();
    let mut engine = SimulationEngine::new(&tree, model, RandomSource::from_seed(seed));
    let root = engine.root_state().unwrap();
    let fork = |state: &BranchState| BranchState {
        landscape: Rc::clone(&state.landscape),
        countdown: state.countdown,
        rates: state.rates.clone(),
    };
    let mut a = fork(&root);
    let mut b = fork(&root);
    engine.walk_branch(tree.find("A").unwrap(), &mut a).unwrap();
    engine.walk_branch(tree.find("B").unwrap(), &mut b).unwrap();
    (root, a, b)
}

#[test]
fn test_shared_siblings_reference_the_same_landscape() {
    let model = shuffling(LandscapeChangeTiming::FixedIntervalLength, 0.3, true, 1.0);
    let (root, a, b) = walk_siblings(&model, 17);
    assert!(root.landscape.has_successor());
    assert!(!Rc::ptr_eq(&a.landscape, &root.landscape));
    assert!(Rc::ptr_eq(&a.landscape, &b.landscape));
}

#[test]
fn test_sharing_and_timing_combinations() {
    let timings = [
        (LandscapeChangeTiming::FixedIntervalLength, 0.3),
        (LandscapeChangeTiming::Stochastic, 30.0),
    ];
    for shared in [true, false] {
        for (timing, parameter) in timings {
            let model = shuffling(timing, parameter, shared, 1.0);
            let (root, a, b) = walk_siblings(&model, 29);
            let root_fitness = distinct_fitness();
            assert_eq!(root.landscape.fitness(), root_fitness.as_slice());

            for branch in [&a, &b] {
                if Rc::ptr_eq(&branch.landscape, &root.landscape) {
                    continue;
                }
                if shared {
                    // Successors hang off the root landscape's memo chain.
                    assert!(root.landscape.has_successor());
                    assert!(Rc::strong_count(&branch.landscape) >= 2);
                } else {
                    assert!(!root.landscape.has_successor());
                    assert_eq!(Rc::strong_count(&branch.landscape), 1);
                }
            }
            let either_changed = !Rc::ptr_eq(&a.landscape, &root.landscape)
                || !Rc::ptr_eq(&b.landscape, &root.landscape);
            if !shared && either_changed {
                assert!(!Rc::ptr_eq(&a.landscape, &b.landscape));
            }
            if shared && timing == LandscapeChangeTiming::FixedIntervalLength {
                assert!(Rc::ptr_eq(&a.landscape, &b.landscape));
            }
        }
    }
}

#[test]
fn test_user_set_schedule() {
    let tree = Tree::from_newick("(A:1,B:1)R;").unwrap();
    let schedule = Schedule::parse(
        "A 0.3 0 1 2 3\nA 0.6 3 2 1 0\n",
        Path::new("schedule.txt"),
        &tree,
        4,
    )
    .unwrap();
    let model = ModelBuilder::new()
        .alphabet(Alphabet::dna())
        .sequence_length(5)
        .new_fitness_rule(NewFitnessRule::UserSet)
        .timing(LandscapeChangeTiming::SpecifiedBranchAndTime, None)
        .schedule(schedule)
        .record_changes(true)
        .build()
        .unwrap();
    let output = SimulationEngine::new(&tree, &model, RandomSource::from_seed(2))
        .run()
        .unwrap();

    let a = tree.find("A").unwrap();
    assert_eq!(output.changes.format_times(a), "[0.3, 0.6]");
    assert_eq!(
        output.changes.format_fitnesses(a),
        "{[0.0, 1.0, 2.0, 3.0]:[3.0, 2.0, 1.0, 0.0]}"
    );
    assert!(output.changes.changes_on(tree.find("B").unwrap()).is_empty());
}

#[test]
fn test_scheduled_change_at_branch_end_fires() {
    let tree = Tree::from_newick("(A:1,B:1)R;").unwrap();
    let schedule = Schedule::parse(
        "A 0.9999999995 0 1 2 3\nB 0.5 3 2 1 0\n",
        Path::new("schedule.txt"),
        &tree,
        4,
    )
    .unwrap();
    let model = ModelBuilder::new()
        .alphabet(Alphabet::dna())
        .sequence_length(5)
        .new_fitness_rule(NewFitnessRule::UserSet)
        .timing(LandscapeChangeTiming::SpecifiedBranchAndTime, None)
        .schedule(schedule)
        .record_changes(true)
        .build()
        .unwrap();
    let output = SimulationEngine::new(&tree, &model, RandomSource::from_seed(6))
        .run()
        .unwrap();

    let on_a = output.changes.changes_on(tree.find("A").unwrap());
    assert_eq!(on_a.len(), 1);
    assert_eq!(on_a[0].time, 0.9999999995);
    assert_eq!(on_a[0].fitness, vec![0.0, 1.0, 2.0, 3.0]);
    assert_eq!(output.changes.changes_on(tree.find("B").unwrap()).len(), 1);
}

#[test]
fn test_batch_independent_of_thread_count() {
    let tree = Arc::new(Tree::from_newick(ULTRAMETRIC).unwrap());
    let model = Arc::new(shuffling(LandscapeChangeTiming::Stochastic, 1.5, false, 2.0));

    let single = Batch::new(Arc::clone(&tree), vec![Arc::clone(&model)])
        .unwrap()
        .instances(6)
        .threads(1)
        .seed(Some(123));
    let many = single.clone().threads(8);

    let a = single.run().unwrap();
    let b = many.run().unwrap();
    assert_eq!(a.merged_sequences(&single), b.merged_sequences(&many));
    assert_eq!(a.merged_fitnesses(&tree), b.merged_fitnesses(&tree));
    assert_eq!(a.runs, b.runs);
}

#[test]
fn test_variable_landscapes_run_once_per_model() {
    let tree = Arc::new(Tree::from_newick("(A:0.2,B:0.3)R;").unwrap());
    let short = ModelBuilder::new()
        .alphabet(Alphabet::dna())
        .sequence_length(3)
        .build()
        .unwrap();
    let long = ModelBuilder::new()
        .alphabet(Alphabet::binary())
        .sequence_length(7)
        .build()
        .unwrap();
    let batch = Batch::new(tree, vec![Arc::new(short), Arc::new(long)])
        .unwrap()
        .instances(50)
        .seed(Some(1));
    assert_eq!(batch.num_runs(), 2);

    let output = batch.run().unwrap();
    let merged = output.merged_sequences(&batch);
    for (_, sequence) in &merged {
        assert_eq!(sequence.len(), 10);
        assert!(sequence[3..].chars().all(|c| c == '0' || c == '1'));
    }
}

#[test]
fn test_setup_rejects_unknown_keyword() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("tree.nwk"), "(A:1,B:1)R;").unwrap();
    let config = dir.path().join("config.json");
    fs::write(
        &config,
        r#"{
            "global": { "alphabet": "01", "tree_file": "tree.nwk" },
            "landscapes": [
                {
                    "length": 4,
                    "initial_fitness": "UNIFORM",
                    "new_fitness_rule": "SHUFFLE",
                    "landscape_change_timing": "STOCHASTIC"
                }
            ]
        }"#,
    )
    .unwrap();

    let err = Setup::load(&config).unwrap_err();
    assert!(matches!(err, InputError::Json { .. }));
    assert!(err.to_string().contains("UNIFORM"));
}

#[test]
fn test_setup_rejects_iid_with_flat() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("tree.nwk"), "(A:1,B:1)R;").unwrap();
    let config = dir.path().join("config.json");
    fs::write(
        &config,
        r#"{
            "global": { "alphabet": "01", "tree_file": "tree.nwk" },
            "landscapes": [
                {
                    "length": 4,
                    "initial_fitness": "FLAT",
                    "new_fitness_rule": "IID",
                    "landscape_change_timing": "STOCHASTIC",
                    "landscape_change_parameter": 1.0
                }
            ]
        }"#,
    )
    .unwrap();

    assert!(matches!(Setup::load(&config), Err(InputError::Config(_))));
}

#[test]
fn test_variable_landscape_stats_follow_merged_sites() {
    let tree = Arc::new(Tree::from_newick("(A:2,B:3)R;").unwrap());
    let section = |length| {
        Arc::new(
            ModelBuilder::new()
                .alphabet(Alphabet::dna())
                .sequence_length(length)
                .collect_stats(true)
                .build()
                .unwrap(),
        )
    };
    let batch = Batch::new(Arc::clone(&tree), vec![section(2), section(50)])
        .unwrap()
        .seed(Some(3));
    let output = batch.run().unwrap();

    let stats = output.combined_stats().unwrap();
    let substitutions: u64 = output.successful().map(|(_, out)| out.substitutions).sum();
    assert_eq!(stats.runs(), 2);
    assert_eq!(stats.sequence_length(), 52);
    assert_eq!(stats.per_site().len(), 52);
    assert_eq!(stats.total(), substitutions);
    assert_eq!(stats.per_site().iter().sum::<u64>(), substitutions);
}
