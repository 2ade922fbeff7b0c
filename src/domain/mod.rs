//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - line complexes, named components and their rest wavelengths (`Complex`, `LineId`)
//! - fit architectures and the diagnostic flag vocabulary (`Architecture`, `FitFlags`)
//! - spectra, fitting windows and run configuration (`Spectrum`, `FitConfig`)

pub mod types;

pub use types::*;
