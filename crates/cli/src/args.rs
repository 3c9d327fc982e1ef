use clap::Args;
use std::path::PathBuf;

use crate::defaults;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Configuration file (JSON)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Directory for the merged output files
    #[arg(short, long, default_value = defaults::OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Override the number of worker threads
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Override the global random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}
