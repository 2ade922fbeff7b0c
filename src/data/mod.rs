//! Input preparation: Monte-Carlo flux resampling and synthetic spectra.

pub mod sample;

pub use sample::*;
