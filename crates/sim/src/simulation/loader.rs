//! Reading configuration and input files.
//!
//! All files are read once, before any run starts. Every failure here is
//! fatal for the whole batch.

use crate::base::{Allele, Alphabet};
use crate::errors::{BatchError, ConfigError, InputError};
use crate::evolution::MutationRates;
use crate::simulation::batch::Batch;
use crate::simulation::configs::{Configuration, InitialFitness, LandscapeChangeTiming};
use crate::simulation::model::{Model, ModelBuilder};
use crate::simulation::schedule::Schedule;
use crate::tree::Tree;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a batch needs, loaded and validated.
#[derive(Debug, Clone)]
pub struct Setup {
    pub config: Configuration,
    pub tree: Arc<Tree>,
    pub alphabet: Alphabet,
    /// One model per landscape section
    pub models: Vec<Arc<Model>>,
}

impl Setup {
    /// Load a configuration file and every file it refers to.
    ///
    /// Relative paths in the configuration are taken relative to the
    /// configuration file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InputError> {
        let config = load_configuration(path)?;
        Self::from_configuration(config)
    }

    /// Validate a configuration and load the files it refers to.
    pub fn from_configuration(config: Configuration) -> Result<Self, InputError> {
        let global = &config.global;
        if config.landscapes.is_empty() {
            return Err(ConfigError::MissingParameter("landscapes".into()).into());
        }
        if global.num_instances == 0 {
            return Err(ConfigError::InvalidParameter("num_instances must be at least 1".into()).into());
        }
        if global.num_threads == 0 {
            return Err(ConfigError::InvalidParameter("num_threads must be at least 1".into()).into());
        }

        let alphabet = Alphabet::new(&global.alphabet)?;
        let n = alphabet.len();
        let tree = load_tree(&global.tree_file)?;
        info!(nodes = tree.len(), height = tree.height(), "loaded tree");

        let mutation_rates = global
            .mutation_rate_matrix_file
            .as_deref()
            .map(|path| read_mutation_matrix(path, n))
            .transpose()?;

        let roots = match &global.root_sequence_file {
            Some(path) => {
                let lengths: Vec<usize> = config.landscapes.iter().map(|l| l.length).collect();
                let root = read_root_sequence(path, &alphabet)?;
                Some(split_root(root, &lengths, path)?)
            }
            None => None,
        };

        let mut models = Vec::with_capacity(config.landscapes.len());
        for (index, section) in config.landscapes.iter().enumerate() {
            let mut builder = ModelBuilder::new()
                .alphabet(alphabet.clone())
                .sequence_length(section.length)
                .initial_fitness(section.initial_fitness)
                .sigma(section.sigma)
                .gamma(section.gamma_alpha, section.gamma_beta)
                .new_fitness_rule(section.new_fitness_rule)
                .timing(
                    section.landscape_change_timing,
                    section.landscape_change_parameter,
                )
                .shared(section.shared_landscape)
                .age_coefficient(section.age_dependence_coefficient)
                .normalization(global.q_normalization)
                .scale_change_rate(global.scale_landscape_change_to_substitution_rate)
                .tree_height(tree.height())
                .record_changes(global.print_landscape_info)
                .collect_stats(global.collect_stats);

            if section.initial_fitness == InitialFitness::File {
                if let Some(path) = &section.fitness_file {
                    builder = builder.fitness_values(read_fitness_file(path, n)?);
                }
            }
            if section.landscape_change_timing == LandscapeChangeTiming::SpecifiedBranchAndTime {
                if let Some(path) = &section.change_branch_and_time_file {
                    builder = builder.schedule(load_schedule(path, &tree, n)?);
                }
            }
            if let Some(rates) = &mutation_rates {
                builder = builder.mutation_rates(rates.clone());
            }
            if let Some(roots) = &roots {
                builder = builder.root_sequence(roots[index].clone());
            }

            let model = builder.build().map_err(|e| match e {
                ConfigError::InvalidParameter(reason) if config.variable_landscapes() => {
                    ConfigError::InvalidParameter(format!("landscape {index}: {reason}"))
                }
                e => e,
            })?;
            models.push(Arc::new(model));
        }

        Ok(Self {
            tree: Arc::new(tree),
            alphabet,
            models,
            config,
        })
    }

    /// A batch set up with the configured instances, threads and seed.
    pub fn batch(&self) -> Result<Batch, BatchError> {
        let global = &self.config.global;
        Ok(Batch::new(Arc::clone(&self.tree), self.models.clone())?
            .instances(global.num_instances)
            .threads(global.num_threads)
            .seed(global.seed))
    }
}

fn read(path: &Path) -> Result<String, InputError> {
    fs::read_to_string(path).map_err(|e| InputError::io(path, e))
}

/// Read a JSON configuration and resolve its paths.
pub fn load_configuration(path: impl AsRef<Path>) -> Result<Configuration, InputError> {
    let path = path.as_ref();
    let text = read(path)?;
    let mut config = Configuration::from_json(&text).map_err(|source| InputError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(dir) = path.parent() {
        config.resolve_paths(dir);
    }
    Ok(config)
}

/// Read a Newick tree file.
pub fn load_tree(path: impl AsRef<Path>) -> Result<Tree, InputError> {
    Ok(Tree::from_newick(&read(path.as_ref())?)?)
}

fn parse_numbers(text: &str, path: &Path) -> Result<Vec<f64>, InputError> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .flat_map(str::split_whitespace)
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| InputError::parse(path, format!("'{token}' is not a number")))
        })
        .collect()
}

/// Read a fitness vector: whitespace-separated numbers, one per allele.
pub fn read_fitness_file(path: impl AsRef<Path>, alphabet_size: usize) -> Result<Vec<f64>, InputError> {
    let path = path.as_ref();
    let values = parse_numbers(&read(path)?, path)?;
    if values.len() != alphabet_size {
        return Err(InputError::parse(
            path,
            format!("expected {alphabet_size} fitness values, found {}", values.len()),
        ));
    }
    Ok(values)
}

/// Read an `n x n` mutation-rate matrix, one row per line.
pub fn read_mutation_matrix(path: impl AsRef<Path>, n: usize) -> Result<MutationRates, InputError> {
    let path = path.as_ref();
    let text = read(path)?;
    let rows: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();
    if rows.len() != n {
        return Err(InputError::parse(
            path,
            format!("expected {n} matrix rows, found {}", rows.len()),
        ));
    }
    let mut values = Vec::with_capacity(n * n);
    for (i, row) in rows.iter().enumerate() {
        let row_values = parse_numbers(row, path)?;
        if row_values.len() != n {
            return Err(InputError::parse(
                path,
                format!("row {} has {} values, expected {n}", i + 1, row_values.len()),
            ));
        }
        values.extend(row_values);
    }
    Ok(MutationRates::from_row_slice(n, &values)?)
}

/// Read a root sequence from FASTA (first record) or plain text.
pub fn read_root_sequence(path: impl AsRef<Path>, alphabet: &Alphabet) -> Result<Vec<Allele>, InputError> {
    let path = path.as_ref();
    let text = read(path)?;

    let mut sequence = String::new();
    let mut records = 0;
    for line in text.lines().map(str::trim) {
        if line.starts_with('>') {
            records += 1;
            if records > 1 {
                break;
            }
        } else {
            sequence.extend(line.chars().filter(|c| !c.is_whitespace()));
        }
    }
    if sequence.is_empty() {
        return Err(InputError::parse(path, "no sequence found"));
    }
    alphabet.encode(&sequence).map_err(|c| {
        InputError::parse(path, format!("symbol '{c}' is not in the alphabet '{alphabet}'"))
    })
}

/// Read a landscape change schedule.
pub fn load_schedule(path: impl AsRef<Path>, tree: &Tree, alphabet_size: usize) -> Result<Schedule, InputError> {
    let path = path.as_ref();
    Schedule::parse(&read(path)?, path, tree, alphabet_size)
}

/// Cut the root sequence into consecutive per-landscape slices.
fn split_root(root: Vec<Allele>, lengths: &[usize], path: &Path) -> Result<Vec<Vec<Allele>>, InputError> {
    let total: usize = lengths.iter().sum();
    if root.len() < total {
        return Err(InputError::parse(
            path,
            format!("root sequence has {} sites, the landscapes need {total}", root.len()),
        ));
    }
    if root.len() > total {
        warn!(extra = root.len() - total, "ignoring trailing root sequence sites");
    }
    let mut start = 0;
    Ok(lengths
        .iter()
        .map(|&len| {
            let slice = root[start..start + len].to_vec();
            start += len;
            slice
        })
        .collect())
}
