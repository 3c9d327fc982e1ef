//! # Simulation Crate
//!
//! The `sim` crate simulates sequence evolution along a phylogenetic tree
//! under a fitness landscape that may itself change over time. It includes
//! modules for alphabets and random sources, rate matrices and landscapes,
//! Newick trees, and the simulation engine with its batch runner.

pub mod base;
pub mod errors;
pub mod evolution;
pub mod prelude;
pub mod simulation;
pub mod tree;

pub use base::{Allele, Alphabet, RandomSource};
pub use tree::{NodeId, Tree};
