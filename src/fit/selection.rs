//! Best-fit selection across the four complexes.
//!
//! One forward pass per spectrum:
//! 1. [SII]: one vs two components; the winner becomes the kinematic template
//! 2. [OIII]: one vs two components, independently
//! 3. Hβ: kinematics follow [SII]; fixed-width vs free-width variants
//! 4. [NII]+Hα: same dispatch as Hβ
//!
//! Two components are kept only if all of:
//! - reduced chi-square improves by at least the threshold (default 20 %)
//! - the outflow is wider than the narrow component
//! - the narrow component is at least the dispersion floor (default 40 km/s)
//!
//! Failures fall back to the simpler architecture. A lone two-component fit
//! must still pass the width and convergence checks; a complex with no usable
//! fit is reported as `None`.

use crate::domain::{
    Complex, FitConfig, FitFlag, FitFlags, Kinematics, LineId, SpectralWindow, Spectrum, WidthMode, WindowSet,
};
use crate::error::FitError;
use crate::fit::fitter::{FitResult, relative_improvement};
use crate::fit::lines::{hb, nii_ha, oiii, sii};
use crate::fit::template::KinematicTemplate;

/// The four complex windows of one spectrum.
#[derive(Debug, Clone)]
pub struct ComplexWindows {
    pub hb: SpectralWindow,
    pub oiii: SpectralWindow,
    pub nii_ha: SpectralWindow,
    pub sii: SpectralWindow,
}

impl ComplexWindows {
    pub fn from_spectrum(spectrum: &Spectrum, windows: &WindowSet) -> Self {
        Self {
            hb: spectrum.window(Complex::Hb, windows.hb),
            oiii: spectrum.window(Complex::Oiii, windows.oiii),
            nii_ha: spectrum.window(Complex::NiiHa, windows.nii_ha),
            sii: spectrum.window(Complex::Sii, windows.sii),
        }
    }
}

/// [SII]/[OIII] component counts pinned from the original-spectrum fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PinnedKinematics {
    pub sii: Option<Kinematics>,
    pub oiii: Option<Kinematics>,
}

impl PinnedKinematics {
    pub fn from_fits(fits: &SpectrumFits) -> Self {
        Self {
            sii: fits.sii.as_ref().map(|f| f.architecture.kinematics()),
            oiii: fits.oiii.as_ref().map(|f| f.architecture.kinematics()),
        }
    }
}

/// Chosen model per complex for one spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFits {
    pub hb: Option<FitResult>,
    pub oiii: Option<FitResult>,
    pub nii_ha: Option<FitResult>,
    pub sii: Option<FitResult>,
    /// Template the Balmer fits were constrained against.
    pub template: KinematicTemplate,
}

impl SpectrumFits {
    pub fn get(&self, complex: Complex) -> Option<&FitResult> {
        match complex {
            Complex::Hb => self.hb.as_ref(),
            Complex::Oiii => self.oiii.as_ref(),
            Complex::NiiHa => self.nii_ha.as_ref(),
            Complex::Sii => self.sii.as_ref(),
        }
    }
}

/// Run the full selection on one spectrum.
///
/// With `pinned`, [SII] and [OIII] are fitted directly with the given component
/// counts instead of being selected.
pub fn find_bestfit(windows: &ComplexWindows, config: &FitConfig, pinned: Option<PinnedKinematics>) -> SpectrumFits {
    let pinned = pinned.unwrap_or_default();

    let sii = settle(Complex::Sii, find_sii_best_fit(&windows.sii, config, pinned.sii));
    let template = sii
        .as_ref()
        .and_then(KinematicTemplate::from_fit)
        .unwrap_or_else(|| {
            tracing::debug!(
                sigma_kms = crate::fit::template::FALLBACK_SIGMA_KMS,
                "no usable [SII] template; using fallback"
            );
            KinematicTemplate::fallback()
        });

    let oiii = settle(Complex::Oiii, find_oiii_best_fit(&windows.oiii, config, pinned.oiii));
    let mut hb = settle(Complex::Hb, find_hb_best_fit(&windows.hb, &template, config));
    let mut nii_ha = settle(Complex::NiiHa, find_nii_ha_best_fit(&windows.nii_ha, &template, config));

    if let (Some(hb), Some(ha)) = (&mut hb, &mut nii_ha) {
        check_balmer_widths(hb, ha, config.frac_temp);
    }

    SpectrumFits {
        hb,
        oiii,
        nii_ha,
        sii,
        template,
    }
}

fn settle(complex: Complex, fit: Result<FitResult, FitError>) -> Option<FitResult> {
    match fit {
        Ok(fit) => Some(fit),
        Err(err) => {
            tracing::warn!(complex = complex.tag(), error = %err, "no usable fit for complex");
            None
        }
    }
}

/// Flag both Balmer fits when their narrow dispersions differ by more than `frac_temp` percent.
fn check_balmer_widths(hb: &mut FitResult, ha: &mut FitResult, frac_temp: f64) -> bool {
    let (Some(s_hb), Some(s_ha)) = (hb.sigma_kms(LineId::HbN), ha.sigma_kms(LineId::HaN)) else {
        return false;
    };
    if s_ha <= 0.0 || ((s_hb - s_ha) / s_ha).abs() <= frac_temp / 100.0 {
        return false;
    }
    tracing::warn!(sigma_hb = s_hb, sigma_ha = s_ha, frac_temp, "Hβ and Hα narrow widths disagree");
    hb.flags.insert(FitFlag::BalmerWidthMismatch);
    ha.flags.insert(FitFlag::BalmerWidthMismatch);
    true
}

pub fn find_sii_best_fit(
    window: &SpectralWindow,
    config: &FitConfig,
    pinned: Option<Kinematics>,
) -> Result<FitResult, FitError> {
    match pinned {
        Some(Kinematics::OneComponent) => sii::fit_one_component(window, config),
        Some(Kinematics::TwoComponent) => sii::fit_two_components(window, config),
        None => select_components(
            sii::fit_one_component(window, config),
            sii::fit_two_components(window, config),
            LineId::Sii6716,
            LineId::Sii6716Out,
            config,
        ),
    }
}

pub fn find_oiii_best_fit(
    window: &SpectralWindow,
    config: &FitConfig,
    pinned: Option<Kinematics>,
) -> Result<FitResult, FitError> {
    match pinned {
        Some(Kinematics::OneComponent) => oiii::fit_one_component(window, config),
        Some(Kinematics::TwoComponent) => oiii::fit_two_components(window, config),
        None => select_components(
            oiii::fit_one_component(window, config),
            oiii::fit_two_components(window, config),
            LineId::Oiii4959,
            LineId::Oiii4959Out,
            config,
        ),
    }
}

pub fn find_hb_best_fit(
    window: &SpectralWindow,
    template: &KinematicTemplate,
    config: &FitConfig,
) -> Result<FitResult, FitError> {
    select_balmer(Complex::Hb, template, config, |t, width| {
        hb::fit(window, t, t.kinematics(), width, config)
    })
}

pub fn find_nii_ha_best_fit(
    window: &SpectralWindow,
    template: &KinematicTemplate,
    config: &FitConfig,
) -> Result<FitResult, FitError> {
    select_balmer(Complex::NiiHa, template, config, |t, width| {
        nii_ha::fit(window, t, t.kinematics(), width, config)
    })
}

/// Outcome of the one- vs two-component test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentDecision {
    pub accept_two: bool,
    pub flags: FitFlags,
}

/// Pure two-component acceptance predicate (dispersions in km/s).
pub fn component_decision(improvement: f64, sigma_narrow: f64, sigma_outflow: f64, config: &FitConfig) -> ComponentDecision {
    let mut flags = FitFlags::empty();
    let improved = improvement >= config.improvement_threshold;
    if improved {
        flags.insert(FitFlag::OutflowImproved);
    }
    let ordered = sigma_outflow > sigma_narrow;
    if !ordered {
        flags.insert(FitFlag::OutflowNarrowerThanNarrow);
    }
    let narrow_ok = sigma_narrow >= config.min_narrow_sigma_kms;
    if !narrow_ok {
        flags.insert(FitFlag::NarrowBelowFloor);
    }
    ComponentDecision {
        accept_two: improved && ordered && narrow_ok,
        flags,
    }
}

/// Choose between the one- and two-component fits of [SII] or [OIII].
pub fn select_components(
    one: Result<FitResult, FitError>,
    two: Result<FitResult, FitError>,
    narrow: LineId,
    outflow: LineId,
    config: &FitConfig,
) -> Result<FitResult, FitError> {
    let (one, two) = match (one, two) {
        (Ok(one), Ok(two)) => (one, two),
        (Ok(one), Err(err)) => {
            tracing::debug!(line = narrow.name(), error = %err, "two-component fit failed");
            return Ok(one);
        }
        (Err(err), Ok(two)) => {
            tracing::debug!(line = narrow.name(), error = %err, "one-component fit failed");
            return accept_without_baseline(two, err, narrow, outflow, config);
        }
        (Err(err), Err(_)) => return Err(err),
    };

    let improvement = relative_improvement(one.rchi2, two.rchi2);
    let sigma_narrow = two.sigma_kms(narrow).unwrap_or(0.0);
    let sigma_outflow = two.sigma_kms(outflow).unwrap_or(0.0);
    let decision = component_decision(improvement, sigma_narrow, sigma_outflow, config);
    let accept = decision.accept_two && two.converged();

    tracing::debug!(
        line = narrow.name(),
        improvement,
        sigma_narrow,
        sigma_outflow,
        accept,
        "two-component decision"
    );

    let mut chosen = if accept { two } else { one };
    chosen.flags = chosen.flags.union(decision.flags);
    Ok(chosen)
}

/// Two-component fit with no one-component rchi2 to compare against.
///
/// The improvement test is waived; ordering, floor and convergence still apply.
fn accept_without_baseline(
    mut two: FitResult,
    err: FitError,
    narrow: LineId,
    outflow: LineId,
    config: &FitConfig,
) -> Result<FitResult, FitError> {
    let sigma_narrow = two.sigma_kms(narrow).unwrap_or(0.0);
    let sigma_outflow = two.sigma_kms(outflow).unwrap_or(0.0);
    let mut decision = component_decision(f64::INFINITY, sigma_narrow, sigma_outflow, config);
    decision.flags.remove(FitFlag::OutflowImproved);
    if !(decision.accept_two && two.converged()) {
        tracing::debug!(line = narrow.name(), sigma_narrow, sigma_outflow, "lone two-component fit rejected");
        return Err(err);
    }
    two.flags = two.flags.union(decision.flags);
    Ok(two)
}

/// Fixed- vs free-width dispatch shared by Hβ and [NII]+Hα.
///
/// A two-component template that yields no fit at all is retried with its
/// narrow component only.
fn select_balmer<F>(
    complex: Complex,
    template: &KinematicTemplate,
    config: &FitConfig,
    fit: F,
) -> Result<FitResult, FitError>
where
    F: Fn(&KinematicTemplate, WidthMode) -> Result<FitResult, FitError>,
{
    let attempt = |t: &KinematicTemplate| {
        choose_width(
            fit(t, WidthMode::Fixed),
            fit(t, WidthMode::Free),
            config.improvement_threshold,
        )
    };
    match attempt(template) {
        Ok(chosen) => Ok(chosen),
        Err(err) if template.outflow.is_some() => {
            tracing::debug!(
                complex = complex.tag(),
                error = %err,
                "two-component fits failed; retrying with the narrow template"
            );
            attempt(&template.narrow_only())
        }
        Err(err) => Err(err),
    }
}

/// Keep the free-width fit only if it converged and beats the fixed one by the threshold.
pub fn choose_width(
    fixed: Result<FitResult, FitError>,
    free: Result<FitResult, FitError>,
    threshold: f64,
) -> Result<FitResult, FitError> {
    match (fixed, free) {
        (Ok(fixed), Ok(free)) => {
            let improvement = relative_improvement(fixed.rchi2, free.rchi2);
            let better = improvement >= threshold || (!fixed.converged() && free.converged());
            if better && free.converged() { Ok(free) } else { Ok(fixed) }
        }
        (Ok(fixed), Err(_)) => Ok(fixed),
        (Err(err), Ok(free)) => {
            if free.converged() {
                Ok(free)
            } else {
                Err(err)
            }
        }
        (Err(err), Err(_)) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Architecture, FitStatus, SII_DOUBLET_OFFSET};
    use crate::fit::lines::test_support::jitter;
    use crate::math::velspace_to_lamspace;
    use crate::models::{CompositeModel, Gaussian};

    fn spectrum(f: impl Fn(f64) -> f64) -> Spectrum {
        let wavelength: Vec<f64> = (0..4000).map(|i| 4700.0 + i as f64 * 0.8).filter(|&w| w <= 6850.0).collect();
        let flux = wavelength.iter().map(|&x| f(x)).collect();
        let n = wavelength.len();
        Spectrum::new(wavelength, flux, vec![1.0; n]).unwrap()
    }

    fn at_kms(amplitude: f64, mean: f64, sigma_kms: f64) -> Gaussian {
        Gaussian {
            amplitude,
            mean,
            stddev: velspace_to_lamspace(sigma_kms, mean),
        }
    }

    fn sii_two_component_lines() -> Vec<Gaussian> {
        let m16 = LineId::Sii6716.rest_wavelength();
        let out16 = m16 - 3.0;
        // 6731/6716 ratio 0.75 in both pairs.
        vec![
            at_kms(8.0, m16, 100.0),
            at_kms(6.0, m16 + SII_DOUBLET_OFFSET, 100.0),
            at_kms(3.0, out16, 300.0),
            at_kms(2.25, out16 + SII_DOUBLET_OFFSET, 300.0),
        ]
    }

    #[test]
    fn zero_noise_sii_outflow_is_recovered() {
        let lines = sii_two_component_lines();
        let s = spectrum(|x| 1.0 + lines.iter().map(|g| g.evaluate(x)).sum::<f64>());
        let windows = ComplexWindows::from_spectrum(&s, &WindowSet::FIT);
        let fit = find_sii_best_fit(&windows.sii, &FitConfig::default(), None).unwrap();

        assert_eq!(fit.architecture.kinematics(), Kinematics::TwoComponent);
        assert!(fit.flags.contains(FitFlag::OutflowImproved));
        assert!(fit.rchi2 < 1e-6, "rchi2={}", fit.rchi2);
        assert!((fit.sigma_kms(LineId::Sii6716).unwrap() - 100.0).abs() < 0.5);
        assert!((fit.sigma_kms(LineId::Sii6716Out).unwrap() - 300.0).abs() < 1.5);
        let out = fit.model.component(LineId::Sii6716Out).unwrap();
        assert!((out.mean - (LineId::Sii6716.rest_wavelength() - 3.0)).abs() < 0.05);
    }

    #[test]
    fn flat_spectrum_has_no_lines_outflows_or_broad() {
        let s = spectrum(|x| 1.0 + jitter(x));
        let windows = ComplexWindows::from_spectrum(&s, &WindowSet::FIT);
        let fits = find_bestfit(&windows, &FitConfig::default(), None);

        for complex in Complex::ALL {
            let Some(fit) = fits.get(complex) else {
                panic!("{complex:?} has no fit");
            };
            assert_eq!(fit.architecture.kinematics(), Kinematics::OneComponent, "{complex:?}");
            assert!(!fit.architecture.has_broad(), "{complex:?}");
            for c in &fit.model.components {
                assert!(c.profile.amplitude < 0.1, "{complex:?} {:?} amp={}", c.line, c.profile.amplitude);
            }
        }
    }

    #[test]
    fn pinned_kinematics_skip_selection() {
        let s = spectrum(|x| 1.0 + jitter(x));
        let windows = ComplexWindows::from_spectrum(&s, &WindowSet::FIT);
        let pinned = PinnedKinematics {
            sii: Some(Kinematics::TwoComponent),
            oiii: Some(Kinematics::TwoComponent),
        };
        let fits = find_bestfit(&windows, &FitConfig::default(), Some(pinned));
        assert_eq!(
            fits.sii.as_ref().map(|f| f.architecture.kinematics()),
            Some(Kinematics::TwoComponent)
        );
        assert_eq!(
            fits.oiii.as_ref().map(|f| f.architecture.kinematics()),
            Some(Kinematics::TwoComponent)
        );
    }

    #[test]
    fn component_decision_requires_every_condition() {
        let config = FitConfig::default();
        assert!(component_decision(0.5, 80.0, 250.0, &config).accept_two);

        let d = component_decision(0.1, 80.0, 250.0, &config);
        assert!(!d.accept_two);
        assert!(!d.flags.contains(FitFlag::OutflowImproved));

        let d = component_decision(0.5, 250.0, 80.0, &config);
        assert!(d.flags.contains(FitFlag::OutflowNarrowerThanNarrow));
        assert!(!d.accept_two);

        let d = component_decision(0.5, 30.0, 250.0, &config);
        assert!(d.flags.contains(FitFlag::NarrowBelowFloor));
        assert!(!d.accept_two);

        assert!(!component_decision(f64::NAN, 80.0, 250.0, &config).accept_two);
    }

    fn stub(width: WidthMode, rchi2: f64, status: FitStatus) -> FitResult {
        FitResult {
            architecture: Architecture::Hb {
                kinematics: Kinematics::OneComponent,
                width,
                broad: false,
            },
            model: CompositeModel::default(),
            rchi2,
            dof: 3,
            flags: FitFlags::empty(),
            status,
            iterations: 1,
        }
    }

    #[test]
    fn free_width_needs_real_improvement() {
        let pick = |fixed: FitResult, free: FitResult| {
            match choose_width(Ok(fixed), Ok(free), 0.2).unwrap().architecture {
                Architecture::Hb { width, .. } => width,
                _ => unreachable!(),
            }
        };
        let conv = FitStatus::Converged;
        assert_eq!(pick(stub(WidthMode::Fixed, 1.0, conv), stub(WidthMode::Free, 0.9, conv)), WidthMode::Fixed);
        assert_eq!(pick(stub(WidthMode::Fixed, 1.0, conv), stub(WidthMode::Free, 0.7, conv)), WidthMode::Free);
        assert_eq!(
            pick(stub(WidthMode::Fixed, 1.0, conv), stub(WidthMode::Free, 0.1, FitStatus::NonConverged)),
            WidthMode::Fixed
        );
        assert_eq!(
            pick(stub(WidthMode::Fixed, 1.0, FitStatus::NonConverged), stub(WidthMode::Free, 0.95, conv)),
            WidthMode::Free
        );

        let err = FitError::InvalidConfig("x".into());
        assert!(choose_width(Err(err.clone()), Err(err), 0.2).is_err());
    }

    #[test]
    fn lone_free_width_fit_must_converge() {
        let err = FitError::InvalidConfig("fixed".into());
        let chosen = choose_width(Err(err.clone()), Ok(stub(WidthMode::Free, 0.8, FitStatus::Converged)), 0.2);
        assert!(chosen.unwrap().converged());

        let chosen = choose_width(Err(err.clone()), Ok(stub(WidthMode::Free, 0.8, FitStatus::NonConverged)), 0.2);
        assert_eq!(chosen.unwrap_err(), err);
    }

    fn sii_pair_stub(sigma_narrow: f64, sigma_outflow: f64, status: FitStatus) -> FitResult {
        let m16 = LineId::Sii6716.rest_wavelength();
        let m31 = LineId::Sii6731.rest_wavelength();
        let component = |line, profile| crate::models::Component { line, profile };
        FitResult {
            architecture: Architecture::Sii {
                kinematics: Kinematics::TwoComponent,
            },
            model: CompositeModel {
                continuum: Some(1.0),
                components: vec![
                    component(LineId::Sii6716, at_kms(8.0, m16, sigma_narrow)),
                    component(LineId::Sii6731, at_kms(6.0, m31, sigma_narrow)),
                    component(LineId::Sii6716Out, at_kms(3.0, m16 - 3.0, sigma_outflow)),
                    component(LineId::Sii6731Out, at_kms(2.25, m31 - 3.0, sigma_outflow)),
                ],
            },
            rchi2: 1.1,
            dof: 9,
            flags: FitFlags::empty(),
            status,
            iterations: 12,
        }
    }

    #[test]
    fn lone_two_component_fit_still_needs_ordered_widths() {
        let config = FitConfig::default();
        let failed = || Err(FitError::InvalidConfig("one-component".into()));
        let select = |two: FitResult| select_components(failed(), Ok(two), LineId::Sii6716, LineId::Sii6716Out, &config);

        let fit = select(sii_pair_stub(80.0, 250.0, FitStatus::Converged)).unwrap();
        assert_eq!(fit.architecture.kinematics(), Kinematics::TwoComponent);
        assert!(!fit.flags.contains(FitFlag::OutflowImproved));
        assert!(!fit.flags.contains(FitFlag::OutflowNarrowerThanNarrow));

        assert!(select(sii_pair_stub(250.0, 80.0, FitStatus::Converged)).is_err());
        assert!(select(sii_pair_stub(20.0, 250.0, FitStatus::Converged)).is_err());
        assert!(select(sii_pair_stub(80.0, 250.0, FitStatus::NonConverged)).is_err());
    }

    fn balmer_stub(line: LineId, sigma_kms: f64) -> FitResult {
        let mean = line.rest_wavelength();
        let mut fit = stub(WidthMode::Free, 1.0, FitStatus::Converged);
        fit.model.components.push(crate::models::Component {
            line,
            profile: at_kms(5.0, mean, sigma_kms),
        });
        fit
    }

    #[test]
    fn disagreeing_balmer_widths_are_flagged() {
        let mut hb = balmer_stub(LineId::HbN, 80.0);
        let mut ha = balmer_stub(LineId::HaN, 300.0);
        assert!(check_balmer_widths(&mut hb, &mut ha, 60.0));
        assert!(hb.flags.contains(FitFlag::BalmerWidthMismatch));
        assert!(ha.flags.contains(FitFlag::BalmerWidthMismatch));

        let mut hb = balmer_stub(LineId::HbN, 100.0);
        let mut ha = balmer_stub(LineId::HaN, 110.0);
        assert!(!check_balmer_widths(&mut hb, &mut ha, 60.0));
        assert!(!hb.flags.contains(FitFlag::BalmerWidthMismatch));
        assert!(!ha.flags.contains(FitFlag::BalmerWidthMismatch));
    }
}
