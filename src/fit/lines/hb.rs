//! Hβ with optional outflow and broad components.
//!
//! Widths come from the [SII] template:
//! - free: each width ranges over ±`frac_temp` % of the template dispersion
//! - fixed: each width is pinned to the template's velocity width, only
//!   amplitudes and means are fitted
//!
//! The broad component always has an independent width.

use crate::domain::{Architecture, FitConfig, Kinematics, LineId, SpectralWindow, WidthMode};
use crate::error::FitError;
use crate::fit::fitter::{FitResult, new_template};
use crate::fit::lines::{BalmerLines, fit_with_broad};
use crate::fit::template::{KinematicTemplate, band_width};
use crate::models::{ModelTemplate, ParamDef, Width};

const NARROW_MIN_STD: f64 = 0.5;
const BROAD_MIN_STD: f64 = 1.0;

pub fn fit_free_one_component(
    window: &SpectralWindow,
    template: &KinematicTemplate,
    config: &FitConfig,
) -> Result<FitResult, FitError> {
    fit(window, template, Kinematics::OneComponent, WidthMode::Free, config)
}

pub fn fit_free_two_components(
    window: &SpectralWindow,
    template: &KinematicTemplate,
    config: &FitConfig,
) -> Result<FitResult, FitError> {
    fit(window, template, Kinematics::TwoComponent, WidthMode::Free, config)
}

pub fn fit_fixed_one_component(
    window: &SpectralWindow,
    template: &KinematicTemplate,
    config: &FitConfig,
) -> Result<FitResult, FitError> {
    fit(window, template, Kinematics::OneComponent, WidthMode::Fixed, config)
}

pub fn fit_fixed_two_components(
    window: &SpectralWindow,
    template: &KinematicTemplate,
    config: &FitConfig,
) -> Result<FitResult, FitError> {
    fit(window, template, Kinematics::TwoComponent, WidthMode::Fixed, config)
}

/// Fit one Hβ architecture (no-broad and broad variants, best kept).
pub fn fit(
    window: &SpectralWindow,
    template: &KinematicTemplate,
    kinematics: Kinematics,
    width: WidthMode,
    config: &FitConfig,
) -> Result<FitResult, FitError> {
    let outflow_ratio = match kinematics {
        Kinematics::OneComponent => None,
        Kinematics::TwoComponent => Some(template.outflow_ratio().ok_or_else(|| {
            FitError::InvalidConfig("two-component Hβ fit needs an outflow in the kinematic template".into())
        })?),
    };
    let amp = window.peak_flux(None);
    let architecture = Architecture::Hb {
        kinematics,
        width,
        broad: false,
    };
    let lines = BalmerLines {
        narrow: LineId::HbN,
        outflow: outflow_ratio.map(|_| LineId::HbOut),
        broad: LineId::HbB,
    };

    fit_with_broad(window, architecture, lines, config, |broad| {
        let mut t = new_template(config)?;
        let rest = LineId::HbN.rest_wavelength();
        let two = outflow_ratio.is_some();

        let (narrow_amp, narrow_width) = match width {
            WidthMode::Free => {
                let amp = if two { amp / 2.0 } else { amp };
                let w = band_width(template.narrow_sigma_kms(), rest, config.frac_temp, NARROW_MIN_STD);
                (amp, w)
            }
            WidthMode::Fixed => (
                amp,
                Width::Template {
                    stddev_over_mean: template.narrow_ratio(),
                },
            ),
        };
        add_line(&mut t, LineId::HbN, narrow_amp, narrow_width)?;

        if let Some(ratio) = outflow_ratio {
            let (out_amp, out_width) = match width {
                WidthMode::Free => {
                    let sigma = template.outflow_sigma_kms().unwrap_or(template.narrow_sigma_kms());
                    (amp / 4.0, band_width(sigma, rest, config.frac_temp, NARROW_MIN_STD))
                }
                WidthMode::Fixed => (amp / 3.0, Width::Template { stddev_over_mean: ratio }),
            };
            add_line(&mut t, LineId::HbOut, out_amp, out_width)?;
        }

        if broad {
            let (broad_amp, broad_std) = match width {
                WidthMode::Free => (amp / 3.0, 3.0),
                WidthMode::Fixed => (amp / 4.0, 4.0),
            };
            add_line(&mut t, LineId::HbB, broad_amp, Width::at_least(broad_std, BROAD_MIN_STD))?;
        }
        Ok(t)
    })
}

fn add_line(t: &mut ModelTemplate, line: LineId, amp: f64, width: Width) -> Result<(), FitError> {
    t.add_gaussian(
        line,
        ParamDef::at_least(amp, 0.0),
        ParamDef::free(line.rest_wavelength()),
        width,
    )?;
    Ok(())
}
