//! Low-level fitting routine for a single architecture.
//!
//! Given:
//! - a complex's spectral window (wavelength, flux, inverse variance)
//! - a parameterized model (`ModelTemplate`) whose free-parameter count matches
//!   the architecture's degrees of freedom
//!
//! we run a weighted Levenberg–Marquardt fit (residuals scaled by `sqrt(ivar)`),
//! build the concrete model and compute its reduced chi-square.

use serde::{Deserialize, Serialize};

use crate::domain::{Architecture, FitConfig, FitFlag, FitFlags, FitStatus, LineId, SpectralWindow};
use crate::error::FitError;
use crate::math::{LeastSquaresProblem, LmConfig, calculate_red_chi2, lamspace_to_velspace, minimize};
use crate::models::{CompositeModel, ModelTemplate};

/// Fit output for a single architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub architecture: Architecture,
    pub model: CompositeModel,
    pub rchi2: f64,
    pub dof: usize,
    pub flags: FitFlags,
    pub status: FitStatus,
    pub iterations: usize,
}

impl FitResult {
    /// Velocity dispersion (km/s) of a component, if present.
    pub fn sigma_kms(&self, line: LineId) -> Option<f64> {
        self.model
            .component(line)
            .map(|g| lamspace_to_velspace(g.stddev, g.mean))
    }

    pub fn converged(&self) -> bool {
        self.status == FitStatus::Converged
    }
}

/// Empty template with the continuum term when the configuration asks for it.
pub fn new_template(config: &FitConfig) -> Result<ModelTemplate, FitError> {
    let template = ModelTemplate::new();
    if config.fit_continuum {
        template.with_continuum(0.0)
    } else {
        Ok(template)
    }
}

/// Fractional reduced chi-square improvement of `candidate` over `base`.
///
/// NaN when `base` is not a positive finite number, so every threshold
/// comparison on it is false.
pub fn relative_improvement(base: f64, candidate: f64) -> f64 {
    if !(base.is_finite() && base > 0.0 && candidate.is_finite()) {
        return f64::NAN;
    }
    (base - candidate) / base
}

struct WindowProblem<'a> {
    template: &'a ModelTemplate,
    window: &'a SpectralWindow,
    weights: Vec<f64>,
}

impl LeastSquaresProblem for WindowProblem<'_> {
    fn n_residuals(&self) -> usize {
        self.window.len()
    }

    fn residuals(&self, free: &[f64], out: &mut [f64]) {
        let full = self.template.graph().expand(free);
        self.template.evaluate_full(&full, &self.window.wavelength, out);
        for i in 0..out.len() {
            out[i] = (self.window.flux[i] - out[i]) * self.weights[i];
        }
    }
}

/// Fit `template` to `window` and score it with the architecture's degrees of freedom.
pub fn fit_template(
    template: &ModelTemplate,
    window: &SpectralWindow,
    architecture: Architecture,
    config: &FitConfig,
) -> Result<FitResult, FitError> {
    let complex = architecture.complex();
    let mut lines = template.lines();
    let mut expected = architecture.components();
    lines.sort();
    expected.sort();
    if lines != expected {
        return Err(FitError::InvalidConfig(format!(
            "template lines {lines:?} do not match {architecture:?}"
        )));
    }
    if window.is_empty() {
        return Err(FitError::DegenerateWindow {
            complex: complex.tag().to_string(),
            reason: "no pixels in the fitting window".into(),
        });
    }
    if window.ivar.iter().all(|&w| w <= 0.0) {
        return Err(FitError::DegenerateWindow {
            complex: complex.tag().to_string(),
            reason: "no pixel has positive inverse variance".into(),
        });
    }

    let dof = architecture.dof(config.fit_continuum);
    debug_assert_eq!(dof, template.n_free(), "{architecture:?}");
    if window.len() <= dof {
        return Err(FitError::UndefinedReducedChiSquare {
            n_points: window.len(),
            n_free: dof,
        });
    }

    let problem = WindowProblem {
        template,
        window,
        weights: window.ivar.iter().map(|w| w.max(0.0).sqrt()).collect(),
    };
    let lm = LmConfig {
        max_iterations: config.max_iterations,
        ..LmConfig::default()
    };
    let graph = template.graph();
    let res = minimize(&problem, &graph.initial_free(), &graph.free_bounds(), &lm);

    let model = template.build(&res.params);
    let predicted = model.evaluate_many(&window.wavelength);
    let rchi2 = calculate_red_chi2(&window.flux, &predicted, &window.ivar, dof)?;

    let mut flags = FitFlags::empty();
    if let Some(flag) = architecture.strategy_flag() {
        flags.insert(flag);
    }
    let status = if res.converged() {
        FitStatus::Converged
    } else {
        tracing::warn!(
            complex = complex.tag(),
            architecture = %architecture.display_name(),
            iterations = res.iterations,
            termination = ?res.termination,
            "fit did not converge; keeping best-effort parameters"
        );
        flags.insert(FitFlag::NonConverged);
        FitStatus::NonConverged
    };

    tracing::debug!(
        complex = complex.tag(),
        architecture = %architecture.display_name(),
        rchi2,
        iterations = res.iterations,
        "fit finished"
    );

    Ok(FitResult {
        architecture,
        model,
        rchi2,
        dof,
        flags,
        status,
        iterations: res.iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Complex, Kinematics};
    use crate::models::{ParamDef, Width};

    fn single_line_window(n: usize) -> SpectralWindow {
        let wavelength: Vec<f64> = (0..n).map(|i| 6690.0 + i as f64 * 0.8).collect();
        let flux = wavelength
            .iter()
            .map(|&w| {
                let z: f64 = (w - 6718.294) / 2.5;
                1.0 + 8.0 * (-0.5 * z * z).exp()
            })
            .collect();
        SpectralWindow {
            complex: Complex::Sii,
            ivar: vec![1.0; n],
            wavelength,
            flux,
        }
    }

    fn one_line_template(config: &FitConfig) -> ModelTemplate {
        let mut t = new_template(config).unwrap();
        let s = t
            .add_gaussian(
                LineId::Sii6716,
                ParamDef::at_least(5.0, 0.0),
                ParamDef::free(6718.0),
                Width::at_least(2.9, 0.8),
            )
            .unwrap();
        t.add_gaussian(
            LineId::Sii6731,
            ParamDef::at_least(0.0, 0.0),
            ParamDef::tied(crate::models::Tie::Offset { source: s.mean, delta: 14.379 }),
            Width::MatchedTo(s),
        )
        .unwrap();
        t
    }

    #[test]
    fn fit_template_recovers_line_and_scores_it() {
        let config = FitConfig::default();
        let window = single_line_window(90);
        let arch = Architecture::Sii {
            kinematics: Kinematics::OneComponent,
        };
        let fit = fit_template(&one_line_template(&config), &window, arch, &config).unwrap();

        assert_eq!(fit.dof, 5);
        assert!(fit.converged());
        assert!(fit.rchi2 < 1e-12, "rchi2={}", fit.rchi2);
        let g = fit.model.component(LineId::Sii6716).unwrap();
        assert!((g.amplitude - 8.0).abs() < 1e-5);
        assert!((g.stddev - 2.5).abs() < 1e-5);
        assert!((fit.model.continuum.unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn too_few_points_is_an_error_not_nan() {
        let config = FitConfig::default();
        let window = single_line_window(5);
        let arch = Architecture::Sii {
            kinematics: Kinematics::OneComponent,
        };
        let err = fit_template(&one_line_template(&config), &window, arch, &config).unwrap_err();
        assert_eq!(err, FitError::UndefinedReducedChiSquare { n_points: 5, n_free: 5 });
    }

    #[test]
    fn template_must_carry_the_architecture_components() {
        let config = FitConfig::default();
        let window = single_line_window(90);
        let arch = Architecture::Sii {
            kinematics: Kinematics::TwoComponent,
        };
        let err = fit_template(&one_line_template(&config), &window, arch, &config).unwrap_err();
        assert!(matches!(err, FitError::InvalidConfig(_)));
    }

    #[test]
    fn zero_weight_window_is_degenerate() {
        let config = FitConfig::default();
        let mut window = single_line_window(40);
        window.ivar = vec![0.0; 40];
        let arch = Architecture::Sii {
            kinematics: Kinematics::OneComponent,
        };
        let err = fit_template(&one_line_template(&config), &window, arch, &config).unwrap_err();
        assert!(matches!(err, FitError::DegenerateWindow { .. }));
    }

    #[test]
    fn relative_improvement_is_nan_for_degenerate_base() {
        assert!((relative_improvement(2.0, 1.5) - 0.25).abs() < 1e-12);
        assert!(relative_improvement(0.0, 0.0).is_nan());
        assert!(!(relative_improvement(0.0, 0.0) >= 0.2));
    }
}
