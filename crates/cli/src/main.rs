mod args;
mod commands;
mod defaults;
mod printing;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use args::RunArgs;
use commands::{run, tree, validate};

/// Selva: sequence evolution on a phylogeny under a changing fitness landscape
///
/// Sequences evolve along every branch of a tree with substitution rates
/// derived from a per-allele fitness landscape, and the landscape itself
/// changes along the branches.
#[derive(Parser, Debug)]
#[command(name = "selva")]
#[command(author, version, about = "Simulates sequence evolution under changing fitness landscapes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a batch of simulations and write the merged output.
    Run(RunArgs),

    /// Check a configuration and the files it refers to.
    ///
    /// Prints the resolved parameters without simulating anything.
    Validate {
        /// Configuration file (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Show the nodes of a Newick tree.
    Tree {
        /// Newick tree file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            run::run_simulation(&args)?;
        }
        Commands::Validate { config } => {
            validate::validate_configuration(&config)?;
        }
        Commands::Tree { file } => {
            utils::init_logging(false);
            tree::show_tree(&file)?;
        }
    }

    Ok(())
}
