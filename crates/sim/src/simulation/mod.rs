//! Simulation setup, the per-run engine and batch execution.
//!
//! The usual flow is configuration file, then [`Setup`], then [`Batch`],
//! then [`BatchOutput`]:
//!
//! - `Setup`: loads the configuration and every input file, validates them
//!   and builds one [`Model`] per landscape section.
//! - `Batch`: runs many independent simulations on a worker pool.
//! - `SimulationEngine`: a single run over the tree.
//! - `BatchOutput`: per-run results plus the merged reporting formats.

pub mod batch;
pub mod configs;
pub mod engine;
pub mod loader;
pub mod model;
pub mod rates;
pub mod schedule;
pub mod stats;
pub mod tracker;

pub use batch::{Batch, BatchOutput};
pub use configs::{
    Configuration, GlobalConfig, InitialFitness, LandscapeChangeTiming, LandscapeConfig,
};
pub use engine::{BranchState, RunOutput, SimulationEngine, TIME_EPSILON};
pub use loader::Setup;
pub use model::{ChangeTiming, Model, ModelBuilder};
pub use rates::{Event, SequenceRates};
pub use schedule::{Schedule, ScheduledChange};
pub use stats::{BranchStats, SubstitutionStats};
pub use tracker::{ChangeRecord, ChangeTracker};
