//! Shared fit pipeline used by every CLI subcommand.
//!
//! Per target:
//! validate -> select on the original spectrum -> Monte-Carlo resampling
//! (parallel, kinematics pinned) -> aggregate -> reconcile -> final rchi2
//!
//! The CLI layer only formats what comes out of here.

use rayon::prelude::*;

use crate::data::{iteration_seed, resample_spectrum, resolution_matrix};
use crate::domain::{Complex, FitConfig, LineId, Spectrum, TargetSpectrum};
use crate::error::FitError;
use crate::fit::selection::{ComplexWindows, PinnedKinematics, SpectrumFits, find_bestfit};
use crate::math::compute_noise_emline;
use crate::report::{
    ComplexIteration, TargetRecord, compute_final_rchi2, get_bestfit_parameters, percent_detected,
    reconcile_narrow_outflow,
};

/// All computed outputs of fitting one target.
#[derive(Debug, Clone)]
pub struct TargetRun {
    pub record: TargetRecord,
    /// Validated input spectrum (for plotting).
    pub spectrum: Spectrum,
    /// Selection on the original, un-resampled spectrum.
    pub original: SpectrumFits,
}

/// Fit one target end to end.
///
/// Only malformed input (or an invalid configuration) is returned as an error;
/// fitting problems end up as flags and empty components in the record.
pub fn fit_emline_spectrum(target: &TargetSpectrum, config: &FitConfig) -> Result<TargetRun, FitError> {
    config.validate()?;
    let spectrum = Spectrum::new(target.wavelength.clone(), target.flux.clone(), target.ivar.clone())?;
    let resolution = target
        .resolution
        .as_ref()
        .map(|rows| resolution_matrix(rows, spectrum.len()))
        .transpose()?;

    let original = find_bestfit(&ComplexWindows::from_spectrum(&spectrum, &config.windows), config, None);
    let pinned = PinnedKinematics::from_fits(&original);
    tracing::debug!(
        target = %target.target_id,
        hb = ?original.hb.as_ref().map(|f| f.architecture),
        oiii = ?original.oiii.as_ref().map(|f| f.architecture),
        nii_ha = ?original.nii_ha.as_ref().map(|f| f.architecture),
        sii = ?original.sii.as_ref().map(|f| f.architecture),
        "original spectrum selection"
    );

    let iterations: Vec<SpectrumFits> = if config.n_iterations == 0 {
        vec![original.clone()]
    } else {
        (0..config.n_iterations)
            .into_par_iter()
            .map(|i| {
                let seed = iteration_seed(config.seed, &target.target_id, i);
                let noisy = resample_spectrum(&spectrum, resolution.as_ref(), seed)?;
                let windows = ComplexWindows::from_spectrum(&noisy, &config.windows);
                Ok(find_bestfit(&windows, config, Some(pinned)))
            })
            .collect::<Result<_, FitError>>()?
    };

    let record = aggregate_target(target, &spectrum, &original, &iterations, config);
    tracing::info!(
        target = %target.target_id,
        iterations = iterations.len(),
        percent_hb_b = record.percent_hb_b,
        percent_ha_b = record.percent_ha_b,
        "target fitted"
    );

    Ok(TargetRun {
        record,
        spectrum,
        original,
    })
}

fn aggregate_target(
    target: &TargetSpectrum,
    spectrum: &Spectrum,
    original: &SpectrumFits,
    iterations: &[SpectrumFits],
    config: &FitConfig,
) -> TargetRecord {
    let per_complex = |complex: Complex| -> Vec<ComplexIteration> {
        iterations
            .iter()
            .map(|fits| ComplexIteration::from_fit(complex, fits.get(complex)))
            .collect()
    };

    let mut complexes = Vec::with_capacity(Complex::ALL.len());
    let mut percent_hb_b = 0.0;
    let mut percent_ha_b = 0.0;

    for complex in Complex::ALL {
        let its = per_complex(complex);
        let mut agg = get_bestfit_parameters(&its, complex.lines(), complex);
        let swapped = reconcile_narrow_outflow(&mut agg);
        if swapped > 0 {
            tracing::debug!(complex = complex.tag(), swapped, "moved detected outflow into narrow slot");
        }

        if let Some(fit) = original.get(complex) {
            agg.architecture = Some(fit.architecture);
            agg.flags = fit.flags;
        }
        agg.noise = compute_noise_emline(&spectrum.wavelength, &spectrum.flux, config.noise_windows.get(complex));
        agg.rchi2 = compute_final_rchi2(&agg, spectrum, config.windows.get(complex));

        match complex {
            Complex::Hb => percent_hb_b = percent_detected(&its, LineId::HbB),
            Complex::NiiHa => percent_ha_b = percent_detected(&its, LineId::HaB),
            _ => {}
        }
        complexes.push(agg);
    }

    TargetRecord {
        target_id: target.target_id.clone(),
        redshift: target.redshift,
        complexes,
        percent_hb_b,
        percent_ha_b,
        n_iterations: config.n_iterations,
    }
}

/// Fit many targets in parallel.
///
/// Malformed targets are logged and returned as `(target_id, reason)` instead
/// of aborting the batch. Output order follows input order.
pub fn fit_catalog(targets: &[TargetSpectrum], config: &FitConfig) -> (Vec<TargetRun>, Vec<(String, String)>) {
    let results: Vec<(String, Result<TargetRun, FitError>)> = targets
        .par_iter()
        .map(|t| (t.target_id.clone(), fit_emline_spectrum(t, config)))
        .collect();

    let mut runs = Vec::new();
    let mut skipped = Vec::new();
    for (id, result) in results {
        match result {
            Ok(run) => runs.push(run),
            Err(err) => {
                tracing::warn!(target = %id, error = %err, "skipping target");
                skipped.push((id, err.to_string()));
            }
        }
    }
    (runs, skipped)
}
