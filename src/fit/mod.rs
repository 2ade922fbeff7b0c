//! Emission-line fitting.
//!
//! Responsibilities:
//!
//! - build and fit the model of each complex architecture (`lines`, `fitter`)
//! - decide on broad Balmer components (`broad`)
//! - carry [SII] kinematics into the Balmer fits (`template`)
//! - select the best architecture per complex (`selection`)

pub mod broad;
pub mod fitter;
pub mod lines;
pub mod selection;
pub mod template;

pub use broad::*;
pub use fitter::*;
pub use selection::*;
pub use template::*;
