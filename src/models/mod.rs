//! Emission-line model building blocks.
//!
//! - `params`: the flat parameter vector with free / tied entries
//! - `model`: Gaussian components, composite models and fit templates

pub mod model;
pub mod params;

pub use model::*;
pub use params::*;
