//! Bounded Levenberg–Marquardt minimizer.
//!
//! Minimizes `Σ r_i(p)²` for a residual vector supplied by a
//! [`LeastSquaresProblem`]. Each iteration:
//!
//! 1. builds a central-difference Jacobian (one-sided at active bounds)
//! 2. solves the damped linear step with [`solve_least_squares`]
//! 3. projects the trial point onto the box bounds
//! 4. accepts the step if the cost decreased, otherwise raises the damping
//!
//! The loop stops on a zero residual, a small relative cost decrease, a small
//! step, a stall (no damping level reduces the cost) or the iteration cap.

use nalgebra::{DMatrix, DVector};

use crate::math::ols::{damped_system, solve_least_squares};

/// Residual provider for [`minimize`].
pub trait LeastSquaresProblem {
    fn n_residuals(&self) -> usize;

    /// Write `r(params)` into `out` (length `n_residuals()`).
    fn residuals(&self, params: &[f64], out: &mut [f64]);
}

#[derive(Debug, Clone)]
pub struct LmConfig {
    pub max_iterations: usize,
    /// Relative cost-decrease tolerance.
    pub ftol: f64,
    /// Relative step tolerance.
    pub xtol: f64,
    pub initial_lambda: f64,
    pub lambda_up: f64,
    pub lambda_down: f64,
    /// Damping above this level means no productive step exists.
    pub lambda_max: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            ftol: 1e-10,
            xtol: 1e-10,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
            lambda_max: 1e16,
        }
    }
}

/// Why the minimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    ZeroResidual,
    CostTolerance,
    StepTolerance,
    /// No damping level produced a decrease: a (possibly bound-constrained) minimum.
    Stalled,
    /// The linear step could not be solved at any damping level.
    Singular,
    IterationCap,
    /// The cost was not finite at the starting point.
    NonFiniteStart,
}

impl Termination {
    pub fn converged(self) -> bool {
        matches!(
            self,
            Termination::ZeroResidual
                | Termination::CostTolerance
                | Termination::StepTolerance
                | Termination::Stalled
        )
    }
}

#[derive(Debug, Clone)]
pub struct LmResult {
    pub params: Vec<f64>,
    pub cost: f64,
    pub iterations: usize,
    pub termination: Termination,
}

impl LmResult {
    pub fn converged(&self) -> bool {
        self.termination.converged()
    }
}

const ZERO_COST: f64 = 1e-30;

/// Minimize the sum of squared residuals within `bounds` (`(lower, upper)` per parameter).
pub fn minimize<P: LeastSquaresProblem>(
    problem: &P,
    initial: &[f64],
    bounds: &[(f64, f64)],
    config: &LmConfig,
) -> LmResult {
    let n = initial.len();
    let m = problem.n_residuals();

    let mut p: Vec<f64> = initial.to_vec();
    project(&mut p, bounds);

    let mut r = vec![0.0; m];
    problem.residuals(&p, &mut r);
    let mut cost = sum_sq(&r);

    if !cost.is_finite() {
        return LmResult {
            params: p,
            cost,
            iterations: 0,
            termination: Termination::NonFiniteStart,
        };
    }
    if n == 0 || cost <= ZERO_COST {
        let termination = if cost <= ZERO_COST {
            Termination::ZeroResidual
        } else {
            Termination::StepTolerance
        };
        return LmResult {
            params: p,
            cost,
            iterations: 0,
            termination,
        };
    }

    let mut lambda = config.initial_lambda;
    let mut trial = vec![0.0; n];
    let mut r_trial = vec![0.0; m];

    for iteration in 1..=config.max_iterations {
        let jac = jacobian(problem, &p, bounds, m);
        let scale = column_scale(&jac);
        let r_vec = DVector::from_column_slice(&r);

        loop {
            let (a, b) = damped_system(&jac, &r_vec, lambda, &scale);
            let Some(step) = solve_least_squares(&a, &b) else {
                lambda *= config.lambda_up;
                if lambda > config.lambda_max {
                    return LmResult {
                        params: p,
                        cost,
                        iterations: iteration,
                        termination: Termination::Singular,
                    };
                }
                continue;
            };

            for j in 0..n {
                trial[j] = p[j] + step[j];
            }
            project(&mut trial, bounds);
            problem.residuals(&trial, &mut r_trial);
            let trial_cost = sum_sq(&r_trial);

            if trial_cost.is_finite() && trial_cost < cost {
                let small_step = p
                    .iter()
                    .zip(&trial)
                    .all(|(old, new)| (new - old).abs() <= config.xtol * (old.abs() + config.xtol));
                let small_cost = cost - trial_cost <= config.ftol * cost;

                p.copy_from_slice(&trial);
                r.copy_from_slice(&r_trial);
                cost = trial_cost;
                lambda = (lambda * config.lambda_down).max(1e-15);

                let termination = if cost <= ZERO_COST {
                    Some(Termination::ZeroResidual)
                } else if small_cost {
                    Some(Termination::CostTolerance)
                } else if small_step {
                    Some(Termination::StepTolerance)
                } else {
                    None
                };
                if let Some(termination) = termination {
                    return LmResult {
                        params: p,
                        cost,
                        iterations: iteration,
                        termination,
                    };
                }
                break;
            }

            lambda *= config.lambda_up;
            if lambda > config.lambda_max {
                return LmResult {
                    params: p,
                    cost,
                    iterations: iteration,
                    termination: Termination::Stalled,
                };
            }
        }
    }

    LmResult {
        params: p,
        cost,
        iterations: config.max_iterations,
        termination: Termination::IterationCap,
    }
}

fn sum_sq(r: &[f64]) -> f64 {
    r.iter().map(|v| v * v).sum()
}

fn project(p: &mut [f64], bounds: &[(f64, f64)]) {
    for (v, &(lo, hi)) in p.iter_mut().zip(bounds) {
        *v = v.clamp(lo, hi);
    }
}

/// Finite-difference Jacobian of the residuals (m x n).
fn jacobian<P: LeastSquaresProblem>(problem: &P, p: &[f64], bounds: &[(f64, f64)], m: usize) -> DMatrix<f64> {
    let n = p.len();
    let mut jac = DMatrix::zeros(m, n);
    let mut work = p.to_vec();
    let mut r_plus = vec![0.0; m];
    let mut r_minus = vec![0.0; m];

    for j in 0..n {
        let (lo, hi) = bounds.get(j).copied().unwrap_or((f64::NEG_INFINITY, f64::INFINITY));
        let h = 1e-6 * p[j].abs().max(1.0);
        let can_up = p[j] + h <= hi;
        let can_down = p[j] - h >= lo;

        let (up, down) = match (can_up, can_down) {
            (true, true) => (p[j] + h, p[j] - h),
            (true, false) => (p[j] + h, p[j]),
            (false, true) => (p[j], p[j] - h),
            // Degenerate box narrower than the step; leave the column at zero.
            (false, false) => continue,
        };

        work[j] = up;
        problem.residuals(&work, &mut r_plus);
        work[j] = down;
        problem.residuals(&work, &mut r_minus);
        work[j] = p[j];

        let denom = up - down;
        for i in 0..m {
            jac[(i, j)] = (r_plus[i] - r_minus[i]) / denom;
        }
    }
    jac
}

/// Marquardt scaling: column norms of the Jacobian, floored.
fn column_scale(jac: &DMatrix<f64>) -> Vec<f64> {
    jac.column_iter().map(|c| c.norm().max(1e-12)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct GaussianData {
        x: Vec<f64>,
        y: Vec<f64>,
    }

    impl LeastSquaresProblem for GaussianData {
        fn n_residuals(&self) -> usize {
            self.x.len()
        }

        fn residuals(&self, p: &[f64], out: &mut [f64]) {
            for (i, (&x, &y)) in self.x.iter().zip(&self.y).enumerate() {
                let z = (x - p[1]) / p[2];
                out[i] = y - p[0] * (-0.5 * z * z).exp();
            }
        }
    }

    fn gaussian_data(amp: f64, mean: f64, std: f64) -> GaussianData {
        let x: Vec<f64> = (0..200).map(|i| 6700.0 + i as f64 * 0.4).collect();
        let y = x
            .iter()
            .map(|&x| {
                let z = (x - mean) / std;
                amp * (-0.5 * z * z).exp()
            })
            .collect();
        GaussianData { x, y }
    }

    #[test]
    fn recovers_noiseless_gaussian() {
        let data = gaussian_data(12.0, 6740.0, 3.0);
        let bounds = [(0.0, f64::INFINITY), (f64::NEG_INFINITY, f64::INFINITY), (0.5, f64::INFINITY)];
        let res = minimize(&data, &[8.0, 6738.0, 2.0], &bounds, &LmConfig::default());

        assert!(res.converged(), "{:?}", res.termination);
        assert!((res.params[0] - 12.0).abs() < 1e-6);
        assert!((res.params[1] - 6740.0).abs() < 1e-6);
        assert!((res.params[2] - 3.0).abs() < 1e-6);
        assert!(res.cost < 1e-12);
    }

    #[test]
    fn respects_lower_bound() {
        // True width is below the bound; the fit must sit on the bound.
        let data = gaussian_data(5.0, 6740.0, 0.3);
        let bounds = [(0.0, f64::INFINITY), (f64::NEG_INFINITY, f64::INFINITY), (0.8, f64::INFINITY)];
        let res = minimize(&data, &[5.0, 6740.0, 2.0], &bounds, &LmConfig::default());

        assert!(res.params[2] >= 0.8);
        assert!((res.params[2] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn iteration_cap_is_reported() {
        let data = gaussian_data(12.0, 6740.0, 3.0);
        let bounds = [(0.0, f64::INFINITY), (f64::NEG_INFINITY, f64::INFINITY), (0.5, f64::INFINITY)];
        let config = LmConfig {
            max_iterations: 1,
            ..LmConfig::default()
        };
        let res = minimize(&data, &[1.0, 6720.0, 8.0], &bounds, &config);
        assert_eq!(res.termination, Termination::IterationCap);
        assert!(!res.converged());
    }

    #[test]
    fn zero_parameter_problem_returns_immediately() {
        let data = gaussian_data(1.0, 6740.0, 3.0);
        struct Empty<'a>(&'a GaussianData);
        impl LeastSquaresProblem for Empty<'_> {
            fn n_residuals(&self) -> usize {
                self.0.x.len()
            }
            fn residuals(&self, _p: &[f64], out: &mut [f64]) {
                out.copy_from_slice(&self.0.y);
            }
        }
        let res = minimize(&Empty(&data), &[], &[], &LmConfig::default());
        assert_eq!(res.iterations, 0);
        assert!(res.params.is_empty());
    }
}
