//! Default output locations and file names.

pub const OUTPUT_DIR: &str = ".";

pub const SEQUENCES_FILE: &str = "allnodes.merged.fasta";
pub const CHANGE_TIMES_FILE: &str = "changetimes.merged.fasta";
pub const FITNESSES_FILE: &str = "fitnesses.merged.fasta";
pub const STATS_FILE: &str = "substitution_stats.tsv";
