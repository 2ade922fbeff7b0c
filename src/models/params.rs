//! Parameter constraint graph.
//!
//! A model's parameters live in one flat vector. Each entry is either free
//! (optimized, with box bounds) or tied: a pure function of entries declared
//! before it. Ties therefore form a DAG by construction and are recomputed in
//! declaration order on every expansion, so a tied value always reflects the
//! current free values.

use crate::error::FitError;

/// A deterministic relation between a tied parameter and earlier parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tie {
    /// `p = p[source] + delta` (fixed wavelength offset).
    Offset { source: usize, delta: f64 },
    /// `p = factor * p[source]` (fixed flux ratio, or width pinned to an external template).
    Scale { source: usize, factor: f64 },
    /// `p = p[num] / p[den] * p[base]` (ratio carried over from another pair).
    Ratio { num: usize, den: usize, base: usize },
    /// `p = p[ref_std] * p[own_mean] / p[ref_mean]` (same velocity width as another line).
    MatchedWidth { own_mean: usize, ref_mean: usize, ref_std: usize },
}

impl Tie {
    fn sources(&self) -> Vec<usize> {
        match *self {
            Tie::Offset { source, .. } | Tie::Scale { source, .. } => vec![source],
            Tie::Ratio { num, den, base } => vec![num, den, base],
            Tie::MatchedWidth { own_mean, ref_mean, ref_std } => vec![own_mean, ref_mean, ref_std],
        }
    }

    fn evaluate(&self, p: &[f64]) -> f64 {
        match *self {
            Tie::Offset { source, delta } => p[source] + delta,
            Tie::Scale { source, factor } => factor * p[source],
            Tie::Ratio { num, den, base } => {
                if p[den] == 0.0 {
                    0.0
                } else {
                    p[num] / p[den] * p[base]
                }
            }
            Tie::MatchedWidth { own_mean, ref_mean, ref_std } => {
                if p[ref_mean] == 0.0 {
                    p[ref_std]
                } else {
                    p[ref_std] * p[own_mean] / p[ref_mean]
                }
            }
        }
    }
}

/// How one parameter is determined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamDef {
    Free { value: f64, lower: f64, upper: f64 },
    Tied(Tie),
}

impl ParamDef {
    /// Unbounded free parameter.
    pub fn free(value: f64) -> Self {
        ParamDef::Free {
            value,
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    /// Free parameter with a lower bound only.
    pub fn at_least(value: f64, lower: f64) -> Self {
        ParamDef::Free {
            value,
            lower,
            upper: f64::INFINITY,
        }
    }

    pub fn bounded(value: f64, lower: f64, upper: f64) -> Self {
        ParamDef::Free { value, lower, upper }
    }

    pub fn tied(tie: Tie) -> Self {
        ParamDef::Tied(tie)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Param {
    name: String,
    def: ParamDef,
}

/// Flat parameter vector with free/tied bookkeeping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamGraph {
    params: Vec<Param>,
}

impl ParamGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter and return its index.
    ///
    /// Tied parameters may only reference parameters that already exist.
    pub fn push(&mut self, name: impl Into<String>, def: ParamDef) -> Result<usize, FitError> {
        let name = name.into();
        let idx = self.params.len();
        match def {
            ParamDef::Free { value, lower, upper } => {
                if lower.is_nan() || upper.is_nan() || lower > upper {
                    return Err(FitError::InvalidTie {
                        param: name,
                        reason: format!("empty bounds [{lower}, {upper}]"),
                    });
                }
                if !value.is_finite() {
                    return Err(FitError::InvalidTie {
                        param: name,
                        reason: format!("non-finite initial value {value}"),
                    });
                }
            }
            ParamDef::Tied(tie) => {
                if let Some(bad) = tie.sources().into_iter().find(|&s| s >= idx) {
                    return Err(FitError::InvalidTie {
                        param: name,
                        reason: format!("references parameter #{bad} which is not declared yet"),
                    });
                }
                if let Tie::Offset { delta: f, .. } | Tie::Scale { factor: f, .. } = tie {
                    if !f.is_finite() {
                        return Err(FitError::InvalidTie {
                            param: name,
                            reason: format!("non-finite constant {f}"),
                        });
                    }
                }
            }
        }
        self.params.push(Param { name, def });
        Ok(idx)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn name(&self, idx: usize) -> Option<&str> {
        self.params.get(idx).map(|p| p.name.as_str())
    }

    /// Number of free parameters (the model's degrees of freedom).
    pub fn n_free(&self) -> usize {
        self.params
            .iter()
            .filter(|p| matches!(p.def, ParamDef::Free { .. }))
            .count()
    }

    /// Initial values of the free parameters, in declaration order.
    pub fn initial_free(&self) -> Vec<f64> {
        self.params
            .iter()
            .filter_map(|p| match p.def {
                ParamDef::Free { value, .. } => Some(value),
                ParamDef::Tied(_) => None,
            })
            .collect()
    }

    /// Bounds of the free parameters, in declaration order.
    pub fn free_bounds(&self) -> Vec<(f64, f64)> {
        self.params
            .iter()
            .filter_map(|p| match p.def {
                ParamDef::Free { lower, upper, .. } => Some((lower, upper)),
                ParamDef::Tied(_) => None,
            })
            .collect()
    }

    /// Full parameter vector for the given free values, ties applied in order.
    pub fn expand(&self, free: &[f64]) -> Vec<f64> {
        let mut full = vec![0.0; self.params.len()];
        self.expand_into(free, &mut full);
        full
    }

    /// Allocation-free [`ParamGraph::expand`].
    pub fn expand_into(&self, free: &[f64], full: &mut [f64]) {
        let mut k = 0;
        for (i, p) in self.params.iter().enumerate() {
            full[i] = match p.def {
                ParamDef::Free { .. } => {
                    let v = free[k];
                    k += 1;
                    v
                }
                ParamDef::Tied(tie) => tie.evaluate(full),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_follow_free_values() {
        let mut g = ParamGraph::new();
        let amp = g.push("a.amp", ParamDef::at_least(1.0, 0.0)).unwrap();
        let mean = g.push("a.mean", ParamDef::free(4960.0)).unwrap();
        let std = g.push("a.std", ParamDef::at_least(1.0, 0.6)).unwrap();
        g.push("b.amp", ParamDef::tied(Tie::Scale { source: amp, factor: 2.98 }))
            .unwrap();
        let b_mean = g
            .push("b.mean", ParamDef::tied(Tie::Offset { source: mean, delta: 47.934 }))
            .unwrap();
        g.push(
            "b.std",
            ParamDef::tied(Tie::MatchedWidth { own_mean: b_mean, ref_mean: mean, ref_std: std }),
        )
        .unwrap();

        assert_eq!(g.n_free(), 3);
        let full = g.expand(&[2.0, 4961.0, 1.5]);
        assert!((full[3] - 5.96).abs() < 1e-12);
        assert!((full[4] - 5008.934).abs() < 1e-9);
        assert!((full[5] - 1.5 * 5008.934 / 4961.0).abs() < 1e-12);
    }

    #[test]
    fn forward_references_are_rejected() {
        let mut g = ParamGraph::new();
        g.push("x", ParamDef::free(1.0)).unwrap();
        let err = g
            .push("y", ParamDef::tied(Tie::Offset { source: 1, delta: 0.0 }))
            .unwrap_err();
        assert!(matches!(err, FitError::InvalidTie { .. }));
    }

    #[test]
    fn ratio_tie_is_zero_when_denominator_is_zero() {
        let mut g = ParamGraph::new();
        let a = g.push("a", ParamDef::free(0.0)).unwrap();
        let b = g.push("b", ParamDef::free(1.0)).unwrap();
        let c = g.push("c", ParamDef::free(1.0)).unwrap();
        g.push("d", ParamDef::tied(Tie::Ratio { num: b, den: a, base: c }))
            .unwrap();
        assert_eq!(g.expand(&[0.0, 2.0, 3.0])[3], 0.0);
        assert_eq!(g.expand(&[1.0, 2.0, 3.0])[3], 6.0);
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let mut g = ParamGraph::new();
        assert!(g.push("s", ParamDef::bounded(1.0, 2.0, 1.0)).is_err());
    }
}
