//! [SII] kinematic template handed to the Hβ and [NII]+Hα fitters.

use crate::domain::{Kinematics, LineId};
use crate::fit::fitter::FitResult;
use crate::math::{lamspace_to_velspace, velspace_to_lamspace};
use crate::models::{Gaussian, Width};

/// Dispersion assumed when no usable [SII] fit exists (km/s).
pub const FALLBACK_SIGMA_KMS: f64 = 130.0;

/// Width reference taken from the chosen [SII] model (the 6716 line).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinematicTemplate {
    pub narrow: Gaussian,
    pub outflow: Option<Gaussian>,
}

impl KinematicTemplate {
    /// Extract the template from a [SII] fit; `None` if the widths are unusable.
    pub fn from_fit(fit: &FitResult) -> Option<Self> {
        let usable = |g: &Gaussian| g.mean > 0.0 && g.stddev > 0.0 && g.stddev.is_finite();
        let narrow = fit.model.component(LineId::Sii6716).copied().filter(usable)?;
        let outflow = match fit.architecture.kinematics() {
            Kinematics::OneComponent => None,
            Kinematics::TwoComponent => Some(fit.model.component(LineId::Sii6716Out).copied().filter(usable)?),
        };
        Some(Self { narrow, outflow })
    }

    /// One-component template at the [SII]6716 rest wavelength.
    pub fn fallback() -> Self {
        let mean = LineId::Sii6716.rest_wavelength();
        Self {
            narrow: Gaussian {
                amplitude: 0.0,
                mean,
                stddev: velspace_to_lamspace(FALLBACK_SIGMA_KMS, mean),
            },
            outflow: None,
        }
    }

    pub fn kinematics(&self) -> Kinematics {
        if self.outflow.is_some() {
            Kinematics::TwoComponent
        } else {
            Kinematics::OneComponent
        }
    }

    /// Same template without its outflow component.
    pub fn narrow_only(&self) -> Self {
        Self {
            narrow: self.narrow,
            outflow: None,
        }
    }

    pub fn narrow_sigma_kms(&self) -> f64 {
        lamspace_to_velspace(self.narrow.stddev, self.narrow.mean)
    }

    pub fn outflow_sigma_kms(&self) -> Option<f64> {
        self.outflow.map(|g| lamspace_to_velspace(g.stddev, g.mean))
    }

    /// `stddev / mean` of the narrow component (constant velocity width).
    pub fn narrow_ratio(&self) -> f64 {
        self.narrow.stddev / self.narrow.mean
    }

    pub fn outflow_ratio(&self) -> Option<f64> {
        self.outflow.map(|g| g.stddev / g.mean)
    }
}

/// Width bounds around a template dispersion, converted at `rest` (Å).
///
/// Returns `(initial, lower, upper)` stddevs for a band of ±`frac_temp` percent.
pub fn width_band(sigma_kms: f64, rest: f64, frac_temp: f64) -> (f64, f64, f64) {
    let frac = frac_temp / 100.0;
    (
        velspace_to_lamspace(sigma_kms, rest),
        velspace_to_lamspace(sigma_kms * (1.0 - frac), rest),
        velspace_to_lamspace(sigma_kms * (1.0 + frac), rest),
    )
}

/// Free width over the template band, the lower edge held at `floor` Å.
pub fn band_width(sigma_kms: f64, rest: f64, frac_temp: f64, floor: f64) -> Width {
    let (init, lower, upper) = width_band(sigma_kms, rest, frac_temp);
    let lower = lower.max(floor);
    let upper = upper.max(lower);
    Width::Free {
        value: init.clamp(lower, upper),
        lower,
        upper,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_template_is_130_kms() {
        let t = KinematicTemplate::fallback();
        assert!((t.narrow_sigma_kms() - FALLBACK_SIGMA_KMS).abs() < 1e-9);
        assert_eq!(t.kinematics(), Kinematics::OneComponent);
    }

    #[test]
    fn width_band_spans_frac_temp() {
        let (init, lo, hi) = width_band(100.0, 4862.683, 60.0);
        assert!((lo / init - 0.4).abs() < 1e-12);
        assert!((hi / init - 1.6).abs() < 1e-12);
        assert!((lamspace_to_velspace(init, 4862.683) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn band_width_respects_floor() {
        let Width::Free { value, lower, upper } = band_width(20.0, 4862.683, 60.0, 0.5) else {
            panic!("expected a free width");
        };
        assert_eq!(lower, 0.5);
        assert!(upper >= lower);
        assert!(value >= lower && value <= upper);
    }
}
