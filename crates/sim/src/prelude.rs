//! Commonly used imports for convenience.
//!
//! # Example
//!
//! ```
//! use selva_sim::prelude::*;
//!
//! let tree = Tree::from_newick("(A:0.1,B:0.2)R;").unwrap();
//! let model = ModelBuilder::new()
//!     .alphabet(Alphabet::dna())
//!     .sequence_length(10)
//!     .build()
//!     .unwrap();
//! let output = SimulationEngine::new(&tree, &model, RandomSource::from_seed(1))
//!     .run()
//!     .unwrap();
//! assert_eq!(output.sequence(tree.root()).len(), 10);
//! ```

pub use crate::base::{Allele, Alphabet, RandomSource};
pub use crate::errors::{
    BatchError, ConfigError, InputError, NumericalError, RunError, SimulationError, TreeError,
};
pub use crate::evolution::{FitnessSource, Landscape, LandscapeRules, NewFitnessRule, QNormalization};
pub use crate::simulation::{
    Batch, BatchOutput, Configuration, LandscapeChangeTiming, Model, ModelBuilder, RunOutput,
    Setup, SimulationEngine,
};
pub use crate::tree::{NodeId, Tree};
