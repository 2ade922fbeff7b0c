//! Measurements derived from Gaussian fits.
//!
//! - width conversions between wavelength and velocity space
//! - integrated line flux
//! - reduced chi-square
//! - sideband noise
//!
//! The error-propagating variants add relative errors in quadrature, which is
//! the usual first-order propagation for a product or ratio.

use crate::domain::{SPEED_OF_LIGHT_KMS, WindowBounds};
use crate::error::FitError;

/// Velocity dispersion (km/s) of a Gaussian with wavelength-space `stddev` at `mean`.
///
/// Returns 0 when `mean` is 0.
pub fn lamspace_to_velspace(stddev: f64, mean: f64) -> f64 {
    if mean == 0.0 {
        return 0.0;
    }
    stddev / mean * SPEED_OF_LIGHT_KMS
}

/// [`lamspace_to_velspace`] with 1-σ error propagation.
pub fn lamspace_to_velspace_err(stddev: f64, mean: f64, stddev_err: f64, mean_err: f64) -> (f64, f64) {
    let sigma = lamspace_to_velspace(stddev, mean);
    if sigma == 0.0 || stddev == 0.0 {
        return (sigma, 0.0);
    }
    let rel = ((stddev_err / stddev).powi(2) + (mean_err / mean).powi(2)).sqrt();
    (sigma, sigma.abs() * rel)
}

/// Wavelength-space stddev of a Gaussian with dispersion `sigma_kms` at `mean`.
pub fn velspace_to_lamspace(sigma_kms: f64, mean: f64) -> f64 {
    sigma_kms * mean / SPEED_OF_LIGHT_KMS
}

/// Integrated flux of a Gaussian: `amplitude * stddev * sqrt(2π)`.
pub fn compute_emline_flux(amplitude: f64, stddev: f64) -> f64 {
    amplitude * stddev * (2.0 * std::f64::consts::PI).sqrt()
}

/// [`compute_emline_flux`] with 1-σ error propagation.
pub fn compute_emline_flux_err(amplitude: f64, stddev: f64, amplitude_err: f64, stddev_err: f64) -> (f64, f64) {
    let flux = compute_emline_flux(amplitude, stddev);
    if amplitude == 0.0 || stddev == 0.0 {
        return (flux, 0.0);
    }
    let rel = ((amplitude_err / amplitude).powi(2) + (stddev_err / stddev).powi(2)).sqrt();
    (flux, flux.abs() * rel)
}

/// Reduced chi-square: `Σ (observed - model)² · ivar / (n_points - n_free)`.
///
/// Fails when the denominator is not positive or the arrays differ in length.
pub fn calculate_red_chi2(observed: &[f64], model: &[f64], ivar: &[f64], n_free: usize) -> Result<f64, FitError> {
    let n_points = observed.len();
    if model.len() != n_points || ivar.len() != n_points {
        return Err(FitError::MalformedInput(format!(
            "reduced chi-square inputs differ in length: {n_points}, {}, {}",
            model.len(),
            ivar.len()
        )));
    }
    if n_points <= n_free {
        return Err(FitError::UndefinedReducedChiSquare { n_points, n_free });
    }

    let chi2: f64 = observed
        .iter()
        .zip(model)
        .zip(ivar)
        .map(|((o, m), w)| (o - m).powi(2) * w)
        .sum();
    Ok(chi2 / (n_points - n_free) as f64)
}

/// RMS of the flux inside a line-free sideband.
///
/// Returns `None` when fewer than two finite pixels fall inside the band.
pub fn compute_noise_emline(wavelength: &[f64], flux: &[f64], band: WindowBounds) -> Option<f64> {
    let values: Vec<f64> = wavelength
        .iter()
        .zip(flux)
        .filter(|(w, f)| **w >= band.lower && **w <= band.upper && f.is_finite())
        .map(|(_, f)| *f)
        .collect();
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(var.sqrt())
}

/// Mean and population standard deviation.
pub fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, var.sqrt()))
}
