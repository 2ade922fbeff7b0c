//! Formatted terminal output.
//!
//! Formatting lives here so:
//! - the fitting and aggregation code stays clean and testable
//! - output changes are localized

use crate::domain::{Complex, FitConfig};
use crate::report::params::{ComplexAggregate, TargetRecord};

/// Full per-target summary: configuration, chosen architectures and the component table.
pub fn format_run_summary(record: &TargetRecord, config: &FitConfig) -> String {
    let mut out = String::new();

    out.push_str("=== emfit - emission-line fit ===\n");
    out.push_str(&format!("Target: {} | z={:.5}\n", record.target_id, record.redshift));
    out.push_str(&format!(
        "Iterations: {} | seed={} | continuum={} | frac_temp={:.0}%\n",
        record.n_iterations,
        config.seed,
        if config.fit_continuum { "on" } else { "off" },
        config.frac_temp,
    ));

    out.push_str("\nChosen models:\n");
    for agg in &record.complexes {
        out.push_str(&format_complex_line(agg));
        out.push('\n');
    }
    out.push_str(&format!(
        "Broad detection: Hβ {:.0}% | Hα {:.0}%\n",
        record.percent_hb_b, record.percent_ha_b
    ));

    out.push_str("\nComponents:\n");
    out.push_str(&format_component_table(record));
    out
}

fn format_complex_line(agg: &ComplexAggregate) -> String {
    let arch = agg
        .architecture
        .map(|a| a.display_name())
        .unwrap_or_else(|| "no fit".to_string());
    let flags: Vec<String> = agg.flags.bits().iter().map(|b| b.to_string()).collect();
    format!(
        "- {:<9} {:<26} rchi2={:<8} noise={:<8} flags=[{}]",
        agg.complex.display_name(),
        arch,
        fmt_opt(agg.rchi2),
        fmt_opt(agg.noise),
        flags.join(","),
    )
    .trim_end()
    .to_string()
}

/// Table of every modeled component with Monte-Carlo errors.
pub fn format_component_table(record: &TargetRecord) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<13} {:>10} {:>9} {:>10} {:>8} {:>9} {:>8} {:>11} {:>10}\n",
            "line", "amplitude", "err", "mean", "err", "sigma", "err", "flux", "err"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<13} {:-<10} {:-<9} {:-<10} {:-<8} {:-<9} {:-<8} {:-<11} {:-<10}\n",
            "", "", "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for complex in Complex::ALL {
        let Some(agg) = record.complex(complex) else {
            continue;
        };
        for c in agg.components.iter().filter(|c| c.modeled) {
            out.push_str(
                format!(
                    "{:<13} {:>10.4} {:>9.4} {:>10.3} {:>8.3} {:>9.1} {:>8.1} {:>11.4} {:>10.4}\n",
                    c.line.name(),
                    c.amplitude.value,
                    c.amplitude.err,
                    c.mean.value,
                    c.mean.err,
                    c.sigma.value,
                    c.sigma.err,
                    c.flux.value,
                    c.flux.err,
                )
                .trim_end(),
            );
            out.push('\n');
        }
    }
    out
}

/// One line per target for batch runs, plus skipped targets.
pub fn format_catalog_summary(records: &[TargetRecord], skipped: &[(String, String)]) -> String {
    let mut out = String::new();
    out.push_str(&format!("Fitted {} target(s), skipped {}\n", records.len(), skipped.len()));
    for r in records {
        let rchi2: Vec<String> = Complex::ALL
            .iter()
            .map(|&c| format!("{}={}", c.tag(), fmt_opt(r.complex(c).and_then(|a| a.rchi2))))
            .collect();
        out.push_str(&format!("- {:<20} {}\n", r.target_id, rchi2.join(" ")));
    }
    for (id, reason) in skipped {
        out.push_str(&format!("  (skipped {id}) {reason}\n"));
    }
    out
}

fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{v:.3}"),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Architecture, FitFlag, FitFlags, Kinematics, LineId};
    use crate::report::params::{AggregatedComponent, Estimate};

    fn record() -> TargetRecord {
        let mut narrow = AggregatedComponent::zero(LineId::Sii6716);
        narrow.modeled = true;
        narrow.amplitude = Estimate::new(2.5, 0.1);
        narrow.mean = Estimate::new(6718.3, 0.02);
        narrow.sigma = Estimate::new(95.0, 3.0);
        narrow.flux = Estimate::new(14.0, 0.8);
        TargetRecord {
            target_id: "39627652594993452".into(),
            redshift: 0.0712,
            complexes: vec![ComplexAggregate {
                complex: Complex::Sii,
                components: vec![narrow, AggregatedComponent::zero(LineId::Sii6716Out)],
                continuum: Estimate::new(1.0, 0.01),
                dof: Some(5),
                rchi2: Some(1.02),
                noise: None,
                architecture: Some(Architecture::Sii {
                    kinematics: Kinematics::OneComponent,
                }),
                flags: FitFlags::empty().with(FitFlag::NarrowBelowFloor),
            }],
            percent_hb_b: 0.0,
            percent_ha_b: 12.0,
            n_iterations: 100,
        }
    }

    #[test]
    fn summary_lists_chosen_models_and_modeled_components() {
        let s = format_run_summary(&record(), &FitConfig::default());
        assert!(s.contains("Target: 39627652594993452 | z=0.07120"));
        assert!(s.contains("- [SII]     one-component"));
        assert!(s.contains("rchi2=1.020"));
        assert!(s.contains("flags=[13]"));
        assert!(s.contains("Hα 12%"));
        assert!(s.contains("sii6716"));
        assert!(!s.contains("sii6716_out"));
        assert!(s.lines().all(|l| l == l.trim_end()));
    }

    #[test]
    fn catalog_summary_reports_skips() {
        let s = format_catalog_summary(&[record()], &[("bad".into(), "empty spectrum".into())]);
        assert!(s.starts_with("Fitted 1 target(s), skipped 1\n"));
        assert!(s.contains("sii=1.020"));
        assert!(s.contains("hb=-"));
        assert!(s.contains("(skipped bad) empty spectrum"));
    }
}
