//! Per-complex model builders.
//!
//! [SII] and [OIII] are fitted blind. Hβ and [NII]+Hα take their widths from the
//! [SII] kinematic template and are always fitted twice, with and without a broad
//! Balmer component; [`fit_with_broad`] runs both and applies the acceptance test.

pub mod hb;
pub mod nii_ha;
pub mod oiii;
pub mod sii;

use crate::domain::{Architecture, FitConfig, LineId, SpectralWindow};
use crate::error::FitError;
use crate::fit::broad::{BroadCriteria, choose_broad};
use crate::fit::fitter::{FitResult, fit_template};
use crate::models::ModelTemplate;

/// Balmer components of one architecture.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BalmerLines {
    pub narrow: LineId,
    pub outflow: Option<LineId>,
    pub broad: LineId,
}

/// Fit `architecture` without and with the broad component and keep the accepted one.
///
/// `build(broad)` returns the parameterized model; a failed no-broad fit is an
/// error, a failed broad fit just leaves the no-broad model in place.
pub(crate) fn fit_with_broad<F>(
    window: &SpectralWindow,
    architecture: Architecture,
    lines: BalmerLines,
    config: &FitConfig,
    build: F,
) -> Result<FitResult, FitError>
where
    F: Fn(bool) -> Result<ModelTemplate, FitError>,
{
    let no_broad = fit_template(&build(false)?, window, with_broad(architecture, false), config)?;
    let broad = build(true).and_then(|t| fit_template(&t, window, with_broad(architecture, true), config));
    let criteria = BroadCriteria::for_complex(architecture.complex(), config);
    Ok(choose_broad(no_broad, broad, lines.narrow, lines.outflow, lines.broad, &criteria))
}

fn with_broad(architecture: Architecture, broad: bool) -> Architecture {
    match architecture {
        Architecture::Hb { kinematics, width, .. } => Architecture::Hb { kinematics, width, broad },
        Architecture::NiiHa { kinematics, width, .. } => Architecture::NiiHa { kinematics, width, broad },
        other => other,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::domain::{Complex, SpectralWindow};
    use crate::models::Gaussian;

    /// Deterministic, uncorrelated jitter in (-0.05, 0.05) standing in for
    /// noise, so model comparisons never divide by a zero reduced chi-square.
    pub fn jitter(x: f64) -> f64 {
        0.05 * ((x * 12.9898).sin() * 43758.5453).fract()
    }

    pub fn gaussian_sum(lines: &[Gaussian], x: f64) -> f64 {
        lines.iter().map(|g| g.evaluate(x)).sum()
    }

    /// Noise-free window sampled every `step` Å over `[start, end]`, unit inverse variance.
    pub fn window_from(complex: Complex, start: f64, end: f64, step: f64, f: impl Fn(f64) -> f64) -> SpectralWindow {
        let n = ((end - start) / step).floor() as usize + 1;
        let wavelength: Vec<f64> = (0..n).map(|i| start + i as f64 * step).collect();
        let flux = wavelength.iter().map(|&x| f(x)).collect();
        SpectralWindow {
            complex,
            ivar: vec![1.0; n],
            wavelength,
            flux,
        }
    }
}
