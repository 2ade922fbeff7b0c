//! Composite emission-line models.
//!
//! The fitter relies on two primitive operations:
//! - build a parameterized model (`ModelTemplate`): named Gaussian slots over a
//!   [`ParamGraph`], plus an optional flat continuum
//! - evaluate a concrete model (`CompositeModel`) at arbitrary wavelengths
//!   (for residuals and plots)

use serde::{Deserialize, Serialize};

use crate::domain::LineId;
use crate::error::FitError;
use crate::models::params::{ParamDef, ParamGraph, Tie};

/// A single Gaussian line profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gaussian {
    pub amplitude: f64,
    pub mean: f64,
    pub stddev: f64,
}

impl Gaussian {
    pub fn evaluate(&self, x: f64) -> f64 {
        if self.stddev == 0.0 {
            return 0.0;
        }
        let z = (x - self.mean) / self.stddev;
        self.amplitude * (-0.5 * z * z).exp()
    }
}

/// One named component of a composite model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub line: LineId,
    #[serde(flatten)]
    pub profile: Gaussian,
}

/// Flat continuum plus named Gaussians.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompositeModel {
    /// `None` when the architecture has no continuum term.
    pub continuum: Option<f64>,
    pub components: Vec<Component>,
}

impl CompositeModel {
    pub fn evaluate(&self, x: f64) -> f64 {
        self.continuum.unwrap_or(0.0) + self.components.iter().map(|c| c.profile.evaluate(x)).sum::<f64>()
    }

    pub fn evaluate_many(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.evaluate(x)).collect()
    }

    pub fn component(&self, line: LineId) -> Option<&Gaussian> {
        self.components.iter().find(|c| c.line == line).map(|c| &c.profile)
    }

    /// Exchange the profiles held by two named components.
    ///
    /// Returns `false` (and leaves the model untouched) if either is absent.
    pub fn swap_profiles(&mut self, a: LineId, b: LineId) -> bool {
        let ia = self.components.iter().position(|c| c.line == a);
        let ib = self.components.iter().position(|c| c.line == b);
        let (Some(ia), Some(ib)) = (ia, ib) else {
            return false;
        };
        let pa = self.components[ia].profile;
        self.components[ia].profile = self.components[ib].profile;
        self.components[ib].profile = pa;
        true
    }
}

/// Parameter indices of one Gaussian slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub line: LineId,
    pub amplitude: usize,
    pub mean: usize,
    pub stddev: usize,
}

/// Width specification for a new slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Width {
    /// Independent width with bounds.
    Free { value: f64, lower: f64, upper: f64 },
    /// Same velocity width as another slot.
    MatchedTo(Slot),
    /// Velocity width pinned to an external template, `stddev / mean` of the template.
    Template { stddev_over_mean: f64 },
}

impl Width {
    pub fn at_least(value: f64, lower: f64) -> Self {
        Width::Free {
            value,
            lower,
            upper: f64::INFINITY,
        }
    }
}

/// A parameterized composite model ready for fitting.
#[derive(Debug, Clone, Default)]
pub struct ModelTemplate {
    graph: ParamGraph,
    continuum: Option<usize>,
    slots: Vec<Slot>,
}

impl ModelTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a free, unbounded flat continuum.
    pub fn with_continuum(mut self, initial: f64) -> Result<Self, FitError> {
        let idx = self.graph.push("continuum", ParamDef::free(initial))?;
        self.continuum = Some(idx);
        Ok(self)
    }

    /// Add a named Gaussian; the width may depend on the slot's own mean.
    pub fn add_gaussian(
        &mut self,
        line: LineId,
        amplitude: ParamDef,
        mean: ParamDef,
        width: Width,
    ) -> Result<Slot, FitError> {
        let name = line.name();
        let amplitude = self.graph.push(format!("{name}.amplitude"), amplitude)?;
        let mean = self.graph.push(format!("{name}.mean"), mean)?;
        let std_def = match width {
            Width::Free { value, lower, upper } => ParamDef::bounded(value, lower, upper),
            Width::MatchedTo(reference) => ParamDef::tied(Tie::MatchedWidth {
                own_mean: mean,
                ref_mean: reference.mean,
                ref_std: reference.stddev,
            }),
            Width::Template { stddev_over_mean } => ParamDef::tied(Tie::Scale {
                source: mean,
                factor: stddev_over_mean,
            }),
        };
        let stddev = self.graph.push(format!("{name}.stddev"), std_def)?;

        let slot = Slot {
            line,
            amplitude,
            mean,
            stddev,
        };
        self.slots.push(slot);
        Ok(slot)
    }

    pub fn graph(&self) -> &ParamGraph {
        &self.graph
    }

    pub fn n_free(&self) -> usize {
        self.graph.n_free()
    }

    /// Lines of the slots, in declaration order.
    pub fn lines(&self) -> Vec<LineId> {
        self.slots.iter().map(|s| s.line).collect()
    }

    pub fn slot(&self, line: LineId) -> Option<Slot> {
        self.slots.iter().copied().find(|s| s.line == line)
    }

    /// Evaluate at `xs` from a full (expanded) parameter vector.
    pub fn evaluate_full(&self, full: &[f64], xs: &[f64], out: &mut [f64]) {
        let base = self.continuum.map(|i| full[i]).unwrap_or(0.0);
        for (o, &x) in out.iter_mut().zip(xs) {
            let mut y = base;
            for s in &self.slots {
                let g = Gaussian {
                    amplitude: full[s.amplitude],
                    mean: full[s.mean],
                    stddev: full[s.stddev],
                };
                y += g.evaluate(x);
            }
            *o = y;
        }
    }

    /// Concrete model for the given free values.
    pub fn build(&self, free: &[f64]) -> CompositeModel {
        let full = self.graph.expand(free);
        CompositeModel {
            continuum: self.continuum.map(|i| full[i]),
            components: self
                .slots
                .iter()
                .map(|s| Component {
                    line: s.line,
                    profile: Gaussian {
                        amplitude: full[s.amplitude],
                        mean: full[s.mean],
                        stddev: full[s.stddev],
                    },
                })
                .collect(),
        }
    }
}
