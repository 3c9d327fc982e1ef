use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use selva_sim::simulation::loader::load_configuration;
use selva_sim::simulation::Setup;
use std::fs;
use tracing::warn;

use crate::args::RunArgs;
use crate::defaults;
use crate::printing::print_parameters;
use crate::utils::{init_logging, write_fasta};

pub fn run_simulation(args: &RunArgs) -> Result<()> {
    println!("🌿 Selva - Running Simulation");
    println!("============================================\n");

    let mut config = load_configuration(&args.config)
        .with_context(|| format!("Failed to load configuration {}", args.config.display()))?;
    init_logging(config.global.debug);

    if let Some(threads) = args.threads {
        config.global.num_threads = threads;
    }
    if let Some(seed) = args.seed {
        config.global.seed = Some(seed);
    }

    let setup = Setup::from_configuration(config).context("Invalid configuration")?;
    print_parameters(&setup);

    let batch = setup.batch().context("Failed to set up the batch")?;
    let num_runs = batch.num_runs();
    println!("Running {num_runs} simulation(s)...");

    let pb = if args.no_progress {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(num_runs as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {per_sec}",
                )
                .context("Invalid progress bar template")?
                .progress_chars("#>-"),
        );
        pb
    };
    let output = batch
        .run_with_progress(|_| pb.inc(1))
        .context("Failed to run the simulation batch")?;
    pb.finish_with_message("Done");

    let failed = output.failures().count();
    for failure in output.failures() {
        warn!(error = %failure, "run dropped from the merged output");
    }
    if failed == num_runs {
        anyhow::bail!("All {num_runs} runs failed");
    }

    println!("\n✓ Simulation complete!");
    println!("  Successful runs: {}", num_runs - failed);
    if failed > 0 {
        println!("  ⚠️  Failed runs: {failed}");
    }
    for (run, result) in output.successful() {
        println!(
            "  Run {}: {} substitutions, {} landscape changes",
            run + 1,
            result.substitutions,
            result.landscape_changes()
        );
    }

    let dir = &args.output_dir;
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let sequences = dir.join(defaults::SEQUENCES_FILE);
    write_fasta(&sequences, &output.merged_sequences(&batch))?;
    println!("\n💾 Sequences written to {}", sequences.display());

    if setup.config.global.print_landscape_info {
        let times = dir.join(defaults::CHANGE_TIMES_FILE);
        write_fasta(&times, &output.merged_change_times(&setup.tree))?;
        let fitnesses = dir.join(defaults::FITNESSES_FILE);
        write_fasta(&fitnesses, &output.merged_fitnesses(&setup.tree))?;
        println!("💾 Landscape changes written to {}", times.display());
        println!("💾 Landscape fitnesses written to {}", fitnesses.display());
    }

    if let Some(stats) = output.combined_stats() {
        let path = dir.join(defaults::STATS_FILE);
        fs::write(&path, stats.report(&setup.tree))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("📊 Substitution statistics written to {}", path.display());
    }

    Ok(())
}
