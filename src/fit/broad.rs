//! Broad Balmer component acceptance.
//!
//! Every Hβ / Hα architecture is fitted with and without an extra broad
//! Gaussian. The broad model is kept only if all of:
//!
//! - reduced chi-square improves by at least the threshold (default 20 %)
//! - broad dispersion exceeds the narrow dispersion
//! - narrow dispersion is at least the floor (default 40 km/s)
//! - Hα only: broad FWHM (`2.355 σ`) is at least the floor (default 300 km/s)
//!
//! In two-component models the fitted "broad" Gaussian can settle narrower than
//! the outflow; the two profiles are swapped first so the broader one is always
//! labeled broad.

use crate::domain::{Complex, FWHM_PER_SIGMA, FitConfig, FitFlag, FitFlags, LineId};
use crate::error::FitError;
use crate::fit::fitter::{FitResult, relative_improvement};

/// Acceptance thresholds for one complex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BroadCriteria {
    pub improvement_threshold: f64,
    pub min_narrow_sigma_kms: f64,
    /// Hα only.
    pub min_broad_fwhm_kms: Option<f64>,
    /// Flag raised when the narrow dispersion is below the floor.
    pub narrow_floor_flag: FitFlag,
}

impl BroadCriteria {
    pub fn for_complex(complex: Complex, config: &FitConfig) -> Self {
        let (fwhm, flag) = match complex {
            Complex::NiiHa => (Some(config.min_broad_fwhm_kms), FitFlag::HaNarrowBelowFloor),
            _ => (None, FitFlag::HbNarrowBelowFloor),
        };
        Self {
            improvement_threshold: config.improvement_threshold,
            min_narrow_sigma_kms: config.min_narrow_sigma_kms,
            min_broad_fwhm_kms: fwhm,
            narrow_floor_flag: flag,
        }
    }
}

/// Outcome of the acceptance test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BroadDecision {
    pub accept: bool,
    pub flags: FitFlags,
}

/// Pure acceptance predicate.
///
/// `improvement` is the fractional reduced chi-square decrease
/// `(rchi2_no_broad - rchi2_broad) / rchi2_no_broad`.
pub fn broad_decision(
    improvement: f64,
    sigma_narrow: f64,
    sigma_broad: f64,
    criteria: &BroadCriteria,
) -> BroadDecision {
    let mut flags = FitFlags::empty();

    let improved = improvement >= criteria.improvement_threshold;
    if improved {
        flags.insert(FitFlag::BroadImproved);
    }
    let ordered = sigma_broad > sigma_narrow;
    if !ordered {
        flags.insert(FitFlag::BroadNarrowerThanNarrow);
    }
    let narrow_ok = sigma_narrow >= criteria.min_narrow_sigma_kms;
    if !narrow_ok {
        flags.insert(criteria.narrow_floor_flag);
    }
    let fwhm_ok = match criteria.min_broad_fwhm_kms {
        Some(floor) => FWHM_PER_SIGMA * sigma_broad >= floor,
        None => true,
    };
    if !fwhm_ok {
        flags.insert(FitFlag::BroadFwhmBelowFloor);
    }

    BroadDecision {
        accept: improved && ordered && narrow_ok && fwhm_ok,
        flags,
    }
}

/// Choose between the no-broad fit and the broad fit of the same architecture.
///
/// `outflow` names the outflow component of two-component architectures.
pub fn choose_broad(
    no_broad: FitResult,
    broad: Result<FitResult, FitError>,
    narrow: LineId,
    outflow: Option<LineId>,
    broad_line: LineId,
    criteria: &BroadCriteria,
) -> FitResult {
    let mut broad = match broad {
        Ok(fit) => fit,
        Err(err) => {
            tracing::debug!(line = broad_line.name(), error = %err, "broad fit failed; keeping no-broad model");
            return no_broad;
        }
    };

    let mut flags = FitFlags::empty();
    if let Some(outflow) = outflow {
        let sigma_out = broad.sigma_kms(outflow).unwrap_or(0.0);
        let sigma_b = broad.sigma_kms(broad_line).unwrap_or(0.0);
        if sigma_b < sigma_out && broad.model.swap_profiles(outflow, broad_line) {
            flags.insert(FitFlag::OutflowBroadSwapped);
        }
    }

    let improvement = relative_improvement(no_broad.rchi2, broad.rchi2);
    let sigma_narrow = broad.sigma_kms(narrow).unwrap_or(0.0);
    let sigma_broad = broad.sigma_kms(broad_line).unwrap_or(0.0);
    let decision = broad_decision(improvement, sigma_narrow, sigma_broad, criteria);
    let accept = decision.accept && broad.converged();

    tracing::debug!(
        line = broad_line.name(),
        improvement,
        sigma_narrow,
        sigma_broad,
        accept,
        "broad component decision"
    );

    let mut chosen = if accept {
        broad.flags = broad.flags.union(no_broad.flags);
        broad
    } else {
        no_broad
    };
    chosen.flags = chosen.flags.union(flags).union(decision.flags);
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Architecture, FitStatus, Kinematics, WidthMode};
    use crate::math::velspace_to_lamspace;
    use crate::models::{Component, CompositeModel, Gaussian};

    fn ha_criteria() -> BroadCriteria {
        BroadCriteria::for_complex(Complex::NiiHa, &FitConfig::default())
    }

    #[test]
    fn acceptance_flips_at_the_threshold() {
        let c = ha_criteria();
        let below = broad_decision(0.199, 80.0, 1500.0, &c);
        let above = broad_decision(0.201, 80.0, 1500.0, &c);
        assert!(!below.accept);
        assert!(above.accept);
        assert!(above.flags.contains(FitFlag::BroadImproved));
        assert!(!below.flags.contains(FitFlag::BroadImproved));
    }

    #[test]
    fn acceptance_is_monotonic_in_improvement() {
        let c = ha_criteria();
        let mut seen_accept = false;
        for i in 0..=100 {
            let d = broad_decision(i as f64 / 100.0, 80.0, 1500.0, &c);
            if seen_accept {
                assert!(d.accept, "decision regressed at {i}%");
            }
            seen_accept |= d.accept;
        }
        assert!(seen_accept);
    }

    #[test]
    fn narrow_broad_and_low_narrow_are_rejected() {
        let c = ha_criteria();
        let d = broad_decision(0.9, 200.0, 150.0, &c);
        assert!(!d.accept);
        assert!(d.flags.contains(FitFlag::BroadNarrowerThanNarrow));

        let d = broad_decision(0.9, 30.0, 1500.0, &c);
        assert!(!d.accept);
        assert!(d.flags.contains(FitFlag::HaNarrowBelowFloor));
    }

    #[test]
    fn ha_fwhm_floor_rejects_250_kms() {
        let c = ha_criteria();
        let sigma = 250.0 / FWHM_PER_SIGMA;
        let d = broad_decision(0.99, 50.0, sigma, &c);
        assert!(!d.accept);
        assert!(d.flags.contains(FitFlag::BroadFwhmBelowFloor));

        // Hβ has no FWHM floor.
        let hb = BroadCriteria::for_complex(Complex::Hb, &FitConfig::default());
        assert!(broad_decision(0.99, 50.0, sigma, &hb).accept);
    }

    fn hb_fit(components: &[(LineId, f64)], rchi2: f64, broad: bool) -> FitResult {
        let mean = 4862.683;
        FitResult {
            architecture: Architecture::Hb {
                kinematics: Kinematics::TwoComponent,
                width: WidthMode::Free,
                broad,
            },
            model: CompositeModel {
                continuum: Some(0.0),
                components: components
                    .iter()
                    .map(|&(line, sigma)| Component {
                        line,
                        profile: Gaussian {
                            amplitude: 1.0,
                            mean,
                            stddev: velspace_to_lamspace(sigma, mean),
                        },
                    })
                    .collect(),
            },
            rchi2,
            dof: 7,
            flags: FitFlags::empty(),
            status: FitStatus::Converged,
            iterations: 1,
        }
    }

    #[test]
    fn outflow_and_broad_swap_before_evaluation() {
        let no_broad = hb_fit(&[(LineId::HbN, 80.0), (LineId::HbOut, 200.0)], 2.0, false);
        let broad = hb_fit(
            &[(LineId::HbN, 80.0), (LineId::HbOut, 900.0), (LineId::HbB, 150.0)],
            1.0,
            true,
        );
        let criteria = BroadCriteria::for_complex(Complex::Hb, &FitConfig::default());
        let chosen = choose_broad(no_broad, Ok(broad), LineId::HbN, Some(LineId::HbOut), LineId::HbB, &criteria);

        assert!(chosen.architecture.has_broad());
        assert!(chosen.flags.contains(FitFlag::OutflowBroadSwapped));
        assert!((chosen.sigma_kms(LineId::HbB).unwrap() - 900.0).abs() < 1e-6);
        assert!((chosen.sigma_kms(LineId::HbOut).unwrap() - 150.0).abs() < 1e-6);
    }

    #[test]
    fn non_converged_broad_fit_is_never_accepted() {
        let no_broad = hb_fit(&[(LineId::HbN, 80.0)], 2.0, false);
        let mut broad = hb_fit(&[(LineId::HbN, 80.0), (LineId::HbB, 900.0)], 0.5, true);
        broad.status = FitStatus::NonConverged;
        let criteria = BroadCriteria::for_complex(Complex::Hb, &FitConfig::default());
        let chosen = choose_broad(no_broad, Ok(broad), LineId::HbN, None, LineId::HbB, &criteria);
        assert!(!chosen.architecture.has_broad());
    }
}
