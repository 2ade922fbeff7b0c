//! [NII]λλ6548,6583 + Hα.
//!
//! The [NII] doublet is always tied (6583 = 2.96 × 6548, fixed separation) and
//! takes its velocity width straight from the [SII] template. Hα narrow and
//! outflow widths follow the template band (free) or the template itself
//! (fixed). An independent broad Hα can be added on top.

use crate::domain::{
    Architecture, FitConfig, Kinematics, LineId, NII_DOUBLET_OFFSET, NII_DOUBLET_RATIO, SpectralWindow, WidthMode,
};
use crate::error::FitError;
use crate::fit::fitter::{FitResult, new_template};
use crate::fit::lines::{BalmerLines, fit_with_broad};
use crate::fit::template::{KinematicTemplate, band_width};
use crate::models::{ModelTemplate, ParamDef, Tie, Width};

const NARROW_MIN_STD: f64 = 0.85;
const BROAD_MIN_STD: f64 = 1.5;

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

/// Fit one [NII]+Hα architecture (no-broad and broad variants, best kept).
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
            FitError::InvalidConfig("two-component [NII]+Hα fit needs an outflow in the kinematic template".into())
        })?),
    };
    let amp_nii = window.peak_flux(Some((6548.0, 6550.0)));
    let amp_ha = window.peak_flux(Some((6550.0, 6575.0)));
    let architecture = Architecture::NiiHa {
        kinematics,
        width,
        broad: false,
    };
    let lines = BalmerLines {
        narrow: LineId::HaN,
        outflow: outflow_ratio.map(|_| LineId::HaOut),
        broad: LineId::HaB,
    };
    let halve = !(kinematics == Kinematics::OneComponent && width == WidthMode::Fixed);
    let narrow_scale = if halve { 0.5 } else { 1.0 };

    fit_with_broad(window, architecture, lines, config, |broad| {
        let mut t = new_template(config)?;
        let ha_rest = LineId::HaN.rest_wavelength();

        add_nii_pair(
            &mut t,
            [LineId::Nii6548, LineId::Nii6583],
            amp_nii * narrow_scale,
            template.narrow_ratio(),
        )?;
        if let Some(ratio) = outflow_ratio {
            add_nii_pair(&mut t, [LineId::Nii6548Out, LineId::Nii6583Out], amp_nii / 4.0, ratio)?;
        }

        let narrow_width = match width {
            WidthMode::Free => band_width(template.narrow_sigma_kms(), ha_rest, config.frac_temp, NARROW_MIN_STD),
            WidthMode::Fixed => Width::Template {
                stddev_over_mean: template.narrow_ratio(),
            },
        };
        add_line(&mut t, LineId::HaN, amp_ha * narrow_scale, narrow_width)?;

        if let Some(ratio) = outflow_ratio {
            let out_width = match width {
                WidthMode::Free => {
                    let sigma = template.outflow_sigma_kms().unwrap_or(template.narrow_sigma_kms());
                    band_width(sigma, ha_rest, config.frac_temp, NARROW_MIN_STD)
                }
                WidthMode::Fixed => Width::Template { stddev_over_mean: ratio },
            };
            add_line(&mut t, LineId::HaOut, amp_ha / 3.0, out_width)?;
        }

        if broad {
            let (broad_amp, broad_std) = match kinematics {
                Kinematics::OneComponent => (amp_ha / 5.0, 6.0),
                Kinematics::TwoComponent => (amp_ha / 3.0, 4.0),
            };
            add_line(&mut t, LineId::HaB, broad_amp, Width::at_least(broad_std, BROAD_MIN_STD))?;
        }
        Ok(t)
    })
}

/// 6548 with free amplitude and mean, 6583 fully tied; both at the template velocity width.
fn add_nii_pair(
    t: &mut ModelTemplate,
    lines: [LineId; 2],
    amp_6548: f64,
    stddev_over_mean: f64,
) -> Result<(), FitError> {
    let weak = t.add_gaussian(
        lines[0],
        ParamDef::at_least(amp_6548, 0.0),
        ParamDef::free(lines[0].rest_wavelength()),
        Width::Template { stddev_over_mean },
    )?;
    t.add_gaussian(
        lines[1],
        ParamDef::tied(Tie::Scale {
            source: weak.amplitude,
            factor: NII_DOUBLET_RATIO,
        }),
        ParamDef::tied(Tie::Offset {
            source: weak.mean,
            delta: NII_DOUBLET_OFFSET,
        }),
        Width::Template { stddev_over_mean },
    )?;
    Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Complex, FWHM_PER_SIGMA, FitFlag};
    use crate::fit::lines::test_support::{gaussian_sum, jitter, window_from};
    use crate::math::velspace_to_lamspace;
    use crate::models::Gaussian;

    fn template(sigma_kms: f64) -> KinematicTemplate {
        let mean = LineId::Sii6716.rest_wavelength();
        KinematicTemplate {
            narrow: Gaussian {
                amplitude: 1.0,
                mean,
                stddev: velspace_to_lamspace(sigma_kms, mean),
            },
            outflow: None,
        }
    }

    fn narrow_lines(t: &KinematicTemplate, amp_6548: f64, amp_ha: f64) -> Vec<Gaussian> {
        let at = |amplitude: f64, mean: f64| Gaussian {
            amplitude,
            mean,
            stddev: t.narrow_ratio() * mean,
        };
        let m6548 = LineId::Nii6548.rest_wavelength();
        vec![
            at(amp_6548, m6548),
            at(amp_6548 * NII_DOUBLET_RATIO, m6548 + NII_DOUBLET_OFFSET),
            at(amp_ha, LineId::HaN.rest_wavelength()),
        ]
    }

    #[test]
    fn nii_ties_hold_and_dof_matches_table() {
        let t = template(80.0);
        let lines = narrow_lines(&t, 1.5, 9.0);
        let window = window_from(Complex::NiiHa, 6500.0, 6625.0, 0.8, |x| {
            0.4 + gaussian_sum(&lines, x) + jitter(x)
        });
        let fit = fit_fixed_one_component(&window, &t, &FitConfig::default()).unwrap();

        assert_eq!(fit.dof, 5);
        let a = fit.model.component(LineId::Nii6548).unwrap();
        let b = fit.model.component(LineId::Nii6583).unwrap();
        assert!((b.amplitude - NII_DOUBLET_RATIO * a.amplitude).abs() < 1e-9);
        assert!((b.mean - a.mean - NII_DOUBLET_OFFSET).abs() < 1e-9);
        assert!((b.stddev / b.mean - t.narrow_ratio()).abs() < 1e-12);
        let ha = fit.model.component(LineId::HaN).unwrap();
        assert!((ha.amplitude - 9.0).abs() < 0.05);
    }

    #[test]
    fn broad_with_250_kms_fwhm_is_rejected() {
        let t = template(80.0);
        let mut lines = narrow_lines(&t, 1.0, 6.0);
        let ha = LineId::HaN.rest_wavelength();
        lines.push(Gaussian {
            amplitude: 4.0,
            mean: ha,
            stddev: velspace_to_lamspace(250.0 / FWHM_PER_SIGMA, ha),
        });
        let window = window_from(Complex::NiiHa, 6500.0, 6625.0, 0.8, |x| 0.4 + gaussian_sum(&lines, x));
        let fit = fit_fixed_one_component(&window, &t, &FitConfig::default()).unwrap();

        assert!(!fit.architecture.has_broad());
        assert!(fit.flags.contains(FitFlag::BroadFwhmBelowFloor));
    }

    #[test]
    fn broad_above_floor_is_accepted() {
        let t = template(80.0);
        let mut lines = narrow_lines(&t, 1.0, 6.0);
        let ha = LineId::HaN.rest_wavelength();
        lines.push(Gaussian {
            amplitude: 3.0,
            mean: ha + 2.0,
            stddev: velspace_to_lamspace(1200.0, ha),
        });
        let window = window_from(Complex::NiiHa, 6500.0, 6625.0, 0.8, |x| 0.4 + gaussian_sum(&lines, x));
        let fit = fit_fixed_one_component(&window, &t, &FitConfig::default()).unwrap();

        assert!(fit.architecture.has_broad());
        assert_eq!(fit.dof, 8);
        assert!(fit.flags.contains(FitFlag::FixedOneComponent));
    }
}
