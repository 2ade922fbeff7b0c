//! Mathematical utilities: line measurements, least squares, and the
//! Levenberg–Marquardt minimizer.

pub mod lm;
pub mod measure;
pub mod ols;

pub use lm::*;
pub use measure::*;
pub use ols::*;
