//! Command-line parsing for the emission-line fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "emfit", version, about = "Emission-line Gaussian fitter (Hβ, [OIII], [NII]+Hα, [SII])")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit one spectrum, print the summary and optionally plot/export.
    Fit(FitArgs),
    /// Fit every spectrum of a targets file and write a flat catalog.
    Batch(BatchArgs),
    /// Generate a synthetic spectrum with known lines and fit it.
    Synth(SynthArgs),
}

/// Options shared by every fitting command.
#[derive(Debug, Args, Clone)]
pub struct CommonArgs {
    /// Monte-Carlo resampling iterations per target.
    #[arg(short = 'n', long, default_value_t = 100)]
    pub iterations: usize,

    /// Base seed for the resampling noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Allowed Balmer width excursion around the [SII] template (percent).
    #[arg(long, default_value_t = 60.0)]
    pub frac_temp: f64,

    /// Fit without a flat continuum term.
    #[arg(long)]
    pub no_continuum: bool,

    /// Optimizer iteration cap.
    #[arg(long = "max-iter", default_value_t = 1000)]
    pub max_iter: usize,
}

/// Plot options.
#[derive(Debug, Args, Clone)]
pub struct PlotArgs {
    /// Render ASCII plots of each complex.
    #[arg(long)]
    pub plot: bool,

    /// Also draw the individual Gaussians.
    #[arg(long)]
    pub components: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 72)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 16)]
    pub height: usize,
}

#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Spectrum JSON file (one target).
    #[arg(short, long, value_name = "JSON")]
    pub input: PathBuf,

    /// Write the record (flat parameters + rebuilt models) to JSON.
    #[arg(short, long, value_name = "JSON")]
    pub output: Option<PathBuf>,

    /// Print the per-component table.
    #[arg(long)]
    pub table: bool,

    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub plot: PlotArgs,
}

#[derive(Debug, Parser, Clone)]
pub struct BatchArgs {
    /// Targets JSON file (array of spectra).
    #[arg(short, long, value_name = "JSON")]
    pub input: PathBuf,

    /// Catalog JSON output (array of flat records).
    #[arg(short, long, value_name = "JSON")]
    pub output: PathBuf,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Parser, Clone)]
pub struct SynthArgs {
    /// Seed for the synthetic spectrum noise.
    #[arg(long = "spectrum-seed", default_value_t = 1)]
    pub spectrum_seed: u64,

    /// Per-pixel noise of the synthetic spectrum.
    #[arg(long, default_value_t = 0.05)]
    pub noise: f64,

    /// Save the generated spectrum as JSON.
    #[arg(long, value_name = "JSON")]
    pub save: Option<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub plot: PlotArgs,
}
