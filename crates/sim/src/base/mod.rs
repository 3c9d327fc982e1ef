//! Base types shared by every other module.
//!
//! This module provides the allele alphabet and the per-run random source.

mod alphabet;
pub mod random;

pub use alphabet::{Allele, Alphabet};
pub use random::{RandomSource, PROBABILITY_TOLERANCE};
