//! [OIII]λλ4959,5007 doublet.
//!
//! 5007 is tied to 4959 by the rest separation, the theoretical 2.98 amplitude
//! ratio and a common velocity width; outflow pairs carry the same ties.

use crate::domain::{
    Architecture, FitConfig, Kinematics, LineId, OIII_DOUBLET_OFFSET, OIII_DOUBLET_RATIO, SpectralWindow,
};
use crate::error::FitError;
use crate::fit::fitter::{FitResult, fit_template, new_template};
use crate::models::{ModelTemplate, ParamDef, Slot, Tie, Width};

const NARROW_STD: f64 = 1.0;
const NARROW_MIN_STD: f64 = 0.6;
const OUTFLOW_STD: f64 = 6.0;
const OUTFLOW_MIN_STD: f64 = 1.2;

fn peak_4959(window: &SpectralWindow) -> f64 {
    window.peak_flux(Some((4959.0, 4961.0)))
}

pub fn fit_one_component(window: &SpectralWindow, config: &FitConfig) -> Result<FitResult, FitError> {
    let amp = peak_4959(window);
    let mut t = new_template(config)?;
    add_pair(&mut t, [LineId::Oiii4959, LineId::Oiii5007], amp, NARROW_STD, NARROW_MIN_STD)?;
    fit_template(
        &t,
        window,
        Architecture::Oiii {
            kinematics: Kinematics::OneComponent,
        },
        config,
    )
}

pub fn fit_two_components(window: &SpectralWindow, config: &FitConfig) -> Result<FitResult, FitError> {
    let amp = peak_4959(window);
    let mut t = new_template(config)?;
    add_pair(&mut t, [LineId::Oiii4959, LineId::Oiii5007], amp / 2.0, NARROW_STD, NARROW_MIN_STD)?;
    add_pair(
        &mut t,
        [LineId::Oiii4959Out, LineId::Oiii5007Out],
        amp / 4.0,
        OUTFLOW_STD,
        OUTFLOW_MIN_STD,
    )?;
    fit_template(
        &t,
        window,
        Architecture::Oiii {
            kinematics: Kinematics::TwoComponent,
        },
        config,
    )
}

fn add_pair(
    t: &mut ModelTemplate,
    lines: [LineId; 2],
    amp_4959: f64,
    std: f64,
    min_std: f64,
) -> Result<(Slot, Slot), FitError> {
    let weak = t.add_gaussian(
        lines[0],
        ParamDef::at_least(amp_4959, 0.0),
        ParamDef::free(lines[0].rest_wavelength()),
        Width::at_least(std, min_std),
    )?;
    let strong = t.add_gaussian(
        lines[1],
        ParamDef::tied(Tie::Scale {
            source: weak.amplitude,
            factor: OIII_DOUBLET_RATIO,
        }),
        ParamDef::tied(Tie::Offset {
            source: weak.mean,
            delta: OIII_DOUBLET_OFFSET,
        }),
        Width::MatchedTo(weak),
    )?;
    Ok((weak, strong))
}
