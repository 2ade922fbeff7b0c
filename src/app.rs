//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - loads spectra (or generates a synthetic one)
//! - runs the fit pipeline
//! - prints summaries/plots
//! - writes optional exports

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{BatchArgs, Command, CommonArgs, FitArgs, PlotArgs, SynthArgs};
use crate::data::{SyntheticSpec, generate_synthetic};
use crate::domain::{FitConfig, TargetSpectrum};
use crate::error::AppError;
use crate::plot::PlotConfig;

pub mod pipeline;

/// Entry point for the `emfit` binary.
pub fn run() -> Result<(), AppError> {
    init_logging();
    let cli = crate::cli::Cli::parse_from(std::env::args());

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Batch(args) => handle_batch(args),
        Command::Synth(args) => handle_synth(args),
    }
}

/// Log to stderr; `RUST_LOG` overrides the default `warn` level.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A second init (tests, embedding) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args.common);
    let target = crate::io::read_spectrum_json(&args.input)?;
    let run = fit_and_report(&target, &config, args.table, &args.plot)?;

    if let Some(path) = &args.output {
        crate::io::write_record_json(path, &run.record, &config)?;
    }
    Ok(())
}

fn handle_batch(args: BatchArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args.common);
    let targets = crate::io::read_targets_json(&args.input)?;
    tracing::info!(targets = targets.len(), iterations = config.n_iterations, "fitting catalog");

    let (runs, skipped) = pipeline::fit_catalog(&targets, &config);
    if runs.is_empty() {
        return Err(AppError::new(3, "No target could be fitted."));
    }

    let records: Vec<_> = runs.into_iter().map(|r| r.record).collect();
    println!("{}", crate::report::format_catalog_summary(&records, &skipped));
    crate::io::write_catalog_json(&args.output, &records)?;
    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args.common);
    let spec = SyntheticSpec {
        noise_sigma: args.noise,
        ..SyntheticSpec::default()
    };
    let target = generate_synthetic(&spec, args.spectrum_seed)?;

    if let Some(path) = &args.save {
        crate::io::write_spectrum_json(path, &target)?;
    }
    fit_and_report(&target, &config, true, &args.plot)?;
    Ok(())
}

fn fit_and_report(
    target: &TargetSpectrum,
    config: &FitConfig,
    table: bool,
    plot: &PlotArgs,
) -> Result<pipeline::TargetRun, AppError> {
    let run = pipeline::fit_emline_spectrum(target, config)?;

    println!("{}", crate::report::format_run_summary(&run.record, config));
    if table {
        println!("{}", crate::report::format_component_table(&run.record));
    }
    if plot.plot {
        let plot_config = plot_config_from_args(plot);
        print!(
            "{}",
            crate::plot::render_record_plots(&run.spectrum, &run.record, &config.windows, &plot_config)
        );
    }
    Ok(run)
}

pub fn fit_config_from_args(args: &CommonArgs) -> FitConfig {
    FitConfig {
        fit_continuum: !args.no_continuum,
        frac_temp: args.frac_temp,
        n_iterations: args.iterations,
        seed: args.seed,
        max_iterations: args.max_iter,
        ..FitConfig::default()
    }
}

pub fn plot_config_from_args(args: &PlotArgs) -> PlotConfig {
    PlotConfig {
        width: args.width,
        height: args.height,
        components: args.components,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_follows_flags() {
        let cli = crate::cli::Cli::parse_from(["emfit", "synth", "--no-continuum", "--frac-temp", "30", "-n", "5"]);
        let Command::Synth(args) = cli.command else {
            panic!("expected synth");
        };
        let config = fit_config_from_args(&args.common);
        assert!(!config.fit_continuum);
        assert_eq!(config.frac_temp, 30.0);
        assert_eq!(config.n_iterations, 5);
        assert_eq!(config.windows, FitConfig::default().windows);
        assert!(config.validate().is_ok());
    }
}
