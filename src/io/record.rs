//! Read/write fit record JSON files.
//!
//! A record file is the portable representation of one target's result:
//! - the flat `{line}_{quantity}` parameter mapping
//! - the configuration it was produced with
//! - the four rebuilt models (for re-plotting without refitting)
//!
//! A catalog file is a JSON array of flat mappings, one per target.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Complex, FitConfig};
use crate::error::AppError;
use crate::models::CompositeModel;
use crate::report::TargetRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFile {
    pub tool: String,
    pub config: FitConfig,
    pub params: BTreeMap<String, Value>,
    pub models: BTreeMap<Complex, CompositeModel>,
}

impl RecordFile {
    pub fn new(record: &TargetRecord, config: &FitConfig) -> Self {
        Self {
            tool: "emfit".to_string(),
            config: config.clone(),
            params: record.to_flat(),
            models: record.rebuild_models().into_iter().collect(),
        }
    }
}

/// Write a record JSON file.
pub fn write_record_json(path: &Path, record: &TargetRecord, config: &FitConfig) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create record JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, &RecordFile::new(record, config))
        .map_err(|e| AppError::new(2, format!("Failed to write record JSON: {e}")))?;
    Ok(())
}

/// Read a record JSON file.
pub fn read_record_json(path: &Path) -> Result<RecordFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open record JSON '{}': {e}", path.display())))?;
    let record: RecordFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::new(2, format!("Invalid record JSON: {e}")))?;
    Ok(record)
}

/// Write the flat records of a batch run.
pub fn write_catalog_json(path: &Path, records: &[TargetRecord]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create catalog JSON '{}': {e}", path.display())))?;
    let rows: Vec<BTreeMap<String, Value>> = records.iter().map(TargetRecord::to_flat).collect();
    serde_json::to_writer_pretty(file, &rows).map_err(|e| AppError::new(2, format!("Failed to write catalog JSON: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LineId;
    use crate::report::{AggregatedComponent, ComplexAggregate, Estimate};
    use crate::domain::FitFlags;

    fn record() -> TargetRecord {
        let mut hb = AggregatedComponent::zero(LineId::HbN);
        hb.modeled = true;
        hb.amplitude = Estimate::new(3.0, 0.2);
        hb.mean = Estimate::new(4862.7, 0.05);
        hb.std = Estimate::new(1.5, 0.1);
        hb.flux = Estimate::new(11.28, 0.9);
        TargetRecord {
            target_id: "t".into(),
            redshift: 0.02,
            complexes: vec![ComplexAggregate {
                complex: Complex::Hb,
                components: vec![hb, AggregatedComponent::zero(LineId::HbB)],
                continuum: Estimate::new(0.7, 0.01),
                dof: Some(4),
                rchi2: Some(0.98),
                noise: Some(0.05),
                architecture: None,
                flags: FitFlags::empty(),
            }],
            percent_hb_b: 0.0,
            percent_ha_b: 0.0,
            n_iterations: 10,
        }
    }

    #[test]
    fn record_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.json");
        write_record_json(&path, &record(), &FitConfig::default()).unwrap();

        let back = read_record_json(&path).unwrap();
        assert_eq!(back.tool, "emfit");
        assert_eq!(back.params["hb_n_amplitude"], serde_json::json!(3.0));
        let model = &back.models[&Complex::Hb];
        assert_eq!(model.components.len(), 1);
        assert_eq!(model.components[0].line, LineId::HbN);
    }

    #[test]
    fn catalog_is_an_array_of_flat_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        write_catalog_json(&path, &[record(), record()]).unwrap();

        let rows: Vec<BTreeMap<String, Value>> =
            serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["hb_rchi2"], serde_json::json!(0.98));
    }
}
