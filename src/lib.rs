//! `emline-fit` library crate.
//!
//! Multi-component Gaussian fitting of optical emission-line complexes
//! (Hβ, [OIII], [NII]+Hα, [SII]) with Monte-Carlo parameter errors.
//!
//! The binary (`emfit`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the pipeline can be driven from other tools (catalog builders, notebooks)

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
