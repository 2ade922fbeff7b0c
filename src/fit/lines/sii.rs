//! [SII]λλ6716,6731 doublet.
//!
//! 6731 is tied to 6716: mean offset by the rest separation, same velocity
//! width. In the two-component model the outflow pair mirrors those ties and
//! the outflow 6731/6716 amplitude ratio follows the narrow pair's ratio.

use crate::domain::{Architecture, FitConfig, Kinematics, LineId, SII_DOUBLET_OFFSET, SpectralWindow};
use crate::error::FitError;
use crate::fit::fitter::{FitResult, fit_template, new_template};
use crate::models::{ModelTemplate, ParamDef, Slot, Tie, Width};

const NARROW_STD: f64 = 2.9;
const NARROW_MIN_STD: f64 = 0.8;
const OUTFLOW_STD: f64 = 4.0;
const OUTFLOW_MIN_STD: f64 = 1.6;

pub fn fit_one_component(window: &SpectralWindow, config: &FitConfig) -> Result<FitResult, FitError> {
    let amp = window.peak_flux(None);
    let mut t = new_template(config)?;
    add_pair(&mut t, [LineId::Sii6716, LineId::Sii6731], amp, amp, NARROW_STD, NARROW_MIN_STD, None)?;
    fit_template(
        &t,
        window,
        Architecture::Sii {
            kinematics: Kinematics::OneComponent,
        },
        config,
    )
}

pub fn fit_two_components(window: &SpectralWindow, config: &FitConfig) -> Result<FitResult, FitError> {
    let amp = window.peak_flux(None);
    let mut t = new_template(config)?;
    let narrow = add_pair(
        &mut t,
        [LineId::Sii6716, LineId::Sii6731],
        amp / 3.0,
        amp / 3.0,
        NARROW_STD,
        NARROW_MIN_STD,
        None,
    )?;
    add_pair(
        &mut t,
        [LineId::Sii6716Out, LineId::Sii6731Out],
        amp / 6.0,
        amp / 6.0,
        OUTFLOW_STD,
        OUTFLOW_MIN_STD,
        Some(narrow),
    )?;
    fit_template(
        &t,
        window,
        Architecture::Sii {
            kinematics: Kinematics::TwoComponent,
        },
        config,
    )
}

/// Add a 6716/6731 pair. With `ratio_from`, the weak amplitude copies that pair's ratio.
fn add_pair(
    t: &mut ModelTemplate,
    lines: [LineId; 2],
    amp_strong: f64,
    amp_weak: f64,
    std: f64,
    min_std: f64,
    ratio_from: Option<(Slot, Slot)>,
) -> Result<(Slot, Slot), FitError> {
    let strong = t.add_gaussian(
        lines[0],
        ParamDef::at_least(amp_strong, 0.0),
        ParamDef::free(lines[0].rest_wavelength()),
        Width::at_least(std, min_std),
    )?;
    let weak_amp = match ratio_from {
        Some((s6716, s6731)) => ParamDef::tied(Tie::Ratio {
            num: s6731.amplitude,
            den: s6716.amplitude,
            base: strong.amplitude,
        }),
        None => ParamDef::at_least(amp_weak, 0.0),
    };
    let weak = t.add_gaussian(
        lines[1],
        weak_amp,
        ParamDef::tied(Tie::Offset {
            source: strong.mean,
            delta: SII_DOUBLET_OFFSET,
        }),
        Width::MatchedTo(strong),
    )?;
    Ok((strong, weak))
}
