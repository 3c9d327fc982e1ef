//! Fitness landscapes and the substitution process they drive.
//!
//! - **Rate matrices**: fitness vector to generator matrix Q and stationary
//!   distribution pi
//! - **Fitness**: initial fitness draws and the change rules
//! - **Landscapes**: fitness plus derived Q/pi, changed along branches

pub mod fitness;
pub mod landscape;
pub mod rate_matrix;

pub use fitness::FitnessSource;
pub use landscape::{change_landscape, Landscape, LandscapeRules, NewFitnessRule};
pub use rate_matrix::{MutationRates, QNormalization, RateModel};
