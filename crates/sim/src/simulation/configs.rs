//! Configuration file model.
//!
//! A configuration is a JSON document with one `global` section and one or
//! more `landscapes` sections:
//!
//! ```json
//! {
//!   "global": { "alphabet": "ACGT", "tree_file": "tree.nwk", "num_instances": 10, "seed": 7 },
//!   "landscapes": [
//!     {
//!       "length": 100,
//!       "initial_fitness": "GAMMA",
//!       "gamma_alpha": 2.0,
//!       "gamma_beta": 2.0,
//!       "new_fitness_rule": "IID",
//!       "landscape_change_timing": "STOCHASTIC",
//!       "landscape_change_parameter": 0.5
//!     }
//!   ]
//! }
//! ```
//!
//! These types only mirror the file. Cross-parameter validation and file
//! loading happen when the configuration is resolved into a
//! [`Model`](crate::simulation::Model).

use crate::errors::ConfigError;
use crate::evolution::{NewFitnessRule, QNormalization};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The master configuration struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    pub global: GlobalConfig,
    pub landscapes: Vec<LandscapeConfig>,
}

/// Settings shared by every run of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Allele symbols, in index order
    pub alphabet: String,
    /// Newick tree file
    pub tree_file: PathBuf,
    /// Number of independent runs (ignored with several landscapes)
    #[serde(default = "default_one")]
    pub num_instances: usize,
    /// Worker threads
    #[serde(default = "default_one")]
    pub num_threads: usize,
    /// Global seed; runs are reproducible when set
    #[serde(default)]
    pub seed: Option<u64>,
    /// Record landscape changes for reporting
    #[serde(default)]
    pub print_landscape_info: bool,
    /// Count substitutions per branch and site
    #[serde(default)]
    pub collect_stats: bool,
    /// Verbose landscape logging
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub q_normalization: QNormalization,
    /// Multiply the stochastic change rate by the landscape's expected
    /// substitution rate
    #[serde(default)]
    pub scale_landscape_change_to_substitution_rate: bool,
    #[serde(default)]
    pub mutation_rate_matrix_file: Option<PathBuf>,
    #[serde(default)]
    pub root_sequence_file: Option<PathBuf>,
}

/// One landscape section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LandscapeConfig {
    /// Number of sites
    pub length: usize,
    pub initial_fitness: InitialFitness,
    pub new_fitness_rule: NewFitnessRule,
    pub landscape_change_timing: LandscapeChangeTiming,
    /// Rate, interval length or number of changes, depending on the timing
    #[serde(default)]
    pub landscape_change_parameter: Option<f64>,
    #[serde(default)]
    pub change_branch_and_time_file: Option<PathBuf>,
    #[serde(default)]
    pub shared_landscape: bool,
    /// Log-normal sigma
    #[serde(default)]
    pub sigma: Option<f64>,
    /// Gamma shape
    #[serde(default)]
    pub gamma_alpha: Option<f64>,
    /// Gamma rate
    #[serde(default)]
    pub gamma_beta: Option<f64>,
    #[serde(default)]
    pub fitness_file: Option<PathBuf>,
    #[serde(default)]
    pub age_dependence_coefficient: Option<f64>,
}

fn default_one() -> usize {
    1
}

/// Where the initial fitness vector comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum InitialFitness {
    File,
    Flat,
    Lognorm,
    Gamma,
}

/// When landscape changes happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum LandscapeChangeTiming {
    /// Poisson process with the configured rate
    Stochastic,
    /// Every `landscape_change_parameter` time units
    FixedIntervalLength,
    /// `landscape_change_parameter` evenly spaced changes along the tree height
    FixedNumChanges,
    /// At the times listed in the schedule file
    SpecifiedBranchAndTime,
}

/// Match a configuration keyword against the accepted values.
pub(crate) fn parse_keyword<T: Copy>(
    parameter: &str,
    value: &str,
    accepted: &[(&str, T)],
) -> Result<T, ConfigError> {
    accepted
        .iter()
        .find(|(name, _)| *name == value)
        .map(|(_, v)| *v)
        .ok_or_else(|| ConfigError::UnrecognizedValue {
            parameter: parameter.to_string(),
            value: value.to_string(),
        })
}

impl InitialFitness {
    const KEYWORDS: [(&'static str, Self); 4] = [
        ("FILE", Self::File),
        ("FLAT", Self::Flat),
        ("LOGNORM", Self::Lognorm),
        ("GAMMA", Self::Gamma),
    ];
}

impl TryFrom<String> for InitialFitness {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_keyword("initial_fitness", &value, &Self::KEYWORDS)
    }
}

impl fmt::Display for InitialFitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = Self::KEYWORDS
            .iter()
            .find(|(_, v)| v == self)
            .map_or("?", |(n, _)| *n);
        f.write_str(name)
    }
}

impl LandscapeChangeTiming {
    const KEYWORDS: [(&'static str, Self); 4] = [
        ("STOCHASTIC", Self::Stochastic),
        ("FIXED_INTERVAL_LENGTH", Self::FixedIntervalLength),
        ("FIXED_NUM_CHANGES", Self::FixedNumChanges),
        ("SPECIFIED_BRANCH_AND_TIME", Self::SpecifiedBranchAndTime),
    ];

    pub fn is_deterministic(self) -> bool {
        !matches!(self, Self::Stochastic)
    }
}

impl TryFrom<String> for LandscapeChangeTiming {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_keyword("landscape_change_timing", &value, &Self::KEYWORDS)
    }
}

impl fmt::Display for LandscapeChangeTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = Self::KEYWORDS
            .iter()
            .find(|(_, v)| v == self)
            .map_or("?", |(n, _)| *n);
        f.write_str(name)
    }
}

impl TryFrom<String> for NewFitnessRule {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_keyword(
            "new_fitness_rule",
            &value,
            &[
                ("SHUFFLE", Self::Shuffle),
                ("IID", Self::Iid),
                ("CURRENT_ALLELE_DEPENDENT", Self::CurrentAlleleDependent),
                ("USER_SET", Self::UserSet),
            ],
        )
    }
}

impl TryFrom<String> for QNormalization {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_keyword(
            "q_normalization",
            &value,
            &[
                ("CONSTANT_RATE", Self::ConstantRate),
                ("CONSTANT_FOR_FLAT", Self::ConstantForFlat),
            ],
        )
    }
}

impl Configuration {
    /// Parse a configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Make every relative file path relative to `base` instead of the
    /// working directory.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.global.tree_file);
        if let Some(path) = self.global.mutation_rate_matrix_file.as_mut() {
            resolve(path);
        }
        if let Some(path) = self.global.root_sequence_file.as_mut() {
            resolve(path);
        }
        for landscape in &mut self.landscapes {
            if let Some(path) = landscape.fitness_file.as_mut() {
                resolve(path);
            }
            if let Some(path) = landscape.change_branch_and_time_file.as_mut() {
                resolve(path);
            }
        }
    }

    /// Several landscape sections mean one run per section.
    pub fn variable_landscapes(&self) -> bool {
        self.landscapes.len() > 1
    }
}
