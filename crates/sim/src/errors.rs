//! Error types for the simulation core.
//!
//! Errors fall into four families that decide how far a failure propagates:
//! configuration and input errors stop the whole batch before any run starts,
//! numerical and simulation errors abandon only the run that raised them.

use std::path::PathBuf;
use thiserror::Error;

/// Invalid or incomplete configuration, detected before any run starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A required parameter is missing
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    /// A parameter has a value that is not one of the accepted options
    #[error("Unrecognized value '{value}' for parameter {parameter}")]
    UnrecognizedValue { parameter: String, value: String },

    /// Two or more parameters cannot be used together
    #[error("Invalid parameter combination: {0}")]
    InvalidCombination(String),

    /// A parameter is out of its valid range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Numerical failures in rate-matrix algebra or probability handling.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NumericalError {
    /// A probability vector does not sum to one
    #[error("Probability vector does not add up to 1 (sum = {sum})")]
    NotNormalized { sum: f64 },

    /// A probability vector contains a negative entry
    #[error("Negative probability {value} at index {index}")]
    NegativeProbability { index: usize, value: f64 },

    /// The linear system for the stationary distribution has no unique solution
    #[error("Singular system while solving for the stationary distribution")]
    SingularMatrix,

    /// Distribution parameters rejected by the sampler
    #[error("Invalid {distribution} parameters: {reason}")]
    InvalidDistribution {
        distribution: &'static str,
        reason: String,
    },

    /// The rate vector lost its `sequence length + 1` shape
    #[error("Rate vector has {actual} entries, expected {expected}")]
    RateVectorShape { expected: usize, actual: usize },
}

/// Errors raised while one run walks its tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Numerical(#[from] NumericalError),

    /// A landscape change needed a caller-supplied fitness vector that was not given
    #[error("New fitness rule is USER_SET but no fitness vector was supplied")]
    MissingUserFitness,

    /// A fitness vector does not match the alphabet
    #[error("Fitness vector has {actual} entries, expected {expected}")]
    FitnessLength { expected: usize, actual: usize },

    /// An allele index outside the alphabet
    #[error("Allele index {allele} out of range for alphabet of size {size}")]
    AlleleOutOfRange { allele: u8, size: usize },
}

/// Errors from reading and parsing input files.
#[derive(Debug, Error)]
pub enum InputError {
    /// The file could not be opened or read
    #[error("Cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file content is malformed
    #[error("Malformed input in {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    /// The configuration file is not valid JSON for the expected layout
    #[error("Invalid configuration file {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl InputError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from building or parsing a phylogenetic tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeError {
    /// Newick syntax error at a byte offset
    #[error("Newick syntax error at position {position}: {reason}")]
    Syntax { position: usize, reason: String },

    /// Two nodes carry the same name
    #[error("Duplicate node name '{0}'")]
    DuplicateName(String),

    /// A branch length is negative or not a finite number
    #[error("Invalid branch length {length} for node '{name}'")]
    InvalidLength { name: String, length: f64 },

    /// The tree has no nodes
    #[error("Empty tree")]
    Empty,
}

/// Error of one run in a batch, tagged with the run index.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Run {run} abandoned: {source}")]
pub struct RunError {
    pub run: usize,
    #[source]
    pub source: SimulationError,
}

/// Errors that stop a whole batch from being launched.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The worker pool could not be created
    #[error("Cannot start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// A batch needs at least one landscape model
    #[error("No landscape sections configured")]
    NoModels,
}
