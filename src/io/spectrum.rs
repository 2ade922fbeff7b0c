//! Read input spectra (JSON).
//!
//! A spectrum file holds one `TargetSpectrum` object; a targets file holds an
//! array of them. Arrays are validated per target later, so one bad target does
//! not reject the whole file.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::domain::TargetSpectrum;
use crate::error::AppError;

/// Read a single-target spectrum file.
pub fn read_spectrum_json(path: &Path) -> Result<TargetSpectrum, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open spectrum JSON '{}': {e}", path.display())))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| AppError::new(2, format!("Invalid spectrum JSON: {e}")))
}

/// Read a multi-target file (JSON array of spectra).
pub fn read_targets_json(path: &Path) -> Result<Vec<TargetSpectrum>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open targets JSON '{}': {e}", path.display())))?;
    let targets: Vec<TargetSpectrum> = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::new(2, format!("Invalid targets JSON: {e}")))?;
    if targets.is_empty() {
        return Err(AppError::new(3, "Targets file contains no spectra."));
    }
    Ok(targets)
}

/// Write a spectrum (used by `emfit synth --save`).
pub fn write_spectrum_json(path: &Path, spectrum: &TargetSpectrum) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create spectrum JSON '{}': {e}", path.display())))?;
    serde_json::to_writer(file, spectrum).map_err(|e| AppError::new(2, format!("Failed to write spectrum JSON: {e}")))
}
