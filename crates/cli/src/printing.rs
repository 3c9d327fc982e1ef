use selva_sim::simulation::Setup;

pub fn print_parameters(setup: &Setup) {
    let global = &setup.config.global;
    let tree = &setup.tree;

    println!("\n📋 Simulation Configuration");
    println!(
        "  • Alphabet: {} ({} symbols)",
        setup.alphabet,
        setup.alphabet.len()
    );
    println!(
        "  • Tree: {} ({} nodes, {} leaves, height {})",
        global.tree_file.display(),
        tree.len(),
        tree.leaves().count(),
        tree.height()
    );
    if setup.models.len() > 1 {
        println!(
            "  • Runs: {} (one per landscape section)",
            setup.models.len()
        );
    } else {
        println!("  • Runs: {} [num_instances]", global.num_instances);
    }
    println!("  • Threads: {} [--threads]", global.num_threads);
    if let Some(seed) = global.seed {
        println!("  • Random Seed: {seed} [--seed]");
    } else {
        println!("  • Random Seed: Random [--seed]");
    }
    if let Some(path) = &global.root_sequence_file {
        println!("  • Root Sequence: {}", path.display());
    } else {
        println!("  • Root Sequence: drawn from the stationary distribution");
    }

    for (i, model) in setup.models.iter().enumerate() {
        println!("\n🏔️  Landscape {}", i + 1);
        println!("{model}");
    }
    println!();
}
