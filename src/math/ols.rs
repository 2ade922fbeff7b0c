//! Linear least squares solver.
//!
//! Each Levenberg–Marquardt step solves a small linear problem of the form:
//!
//! ```text
//! minimize ‖J δ + r‖² + λ ‖D δ‖²
//! ```
//!
//! which we write as one stacked ordinary least squares problem
//! `[J; sqrt(λ) D] δ = [-r; 0]` and hand to [`solve_least_squares`].
//!
//! Implementation choices:
//! - SVD handles the tall (rows > columns) system without forming `JᵀJ`, so
//!   the conditioning is that of `J`, not its square.
//! - Nalgebra's `QR::solve` is intended for square systems and will panic for
//!   non-square matrices.
//! - The parameter dimension is tiny (≤ 14 free parameters), so SVD cost is negligible.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Stack a Jacobian with a scaled diagonal damping block.
///
/// Returns `[J; sqrt(λ) diag(d)]` and `[-r; 0]`.
pub fn damped_system(
    jacobian: &DMatrix<f64>,
    residuals: &DVector<f64>,
    lambda: f64,
    scale: &[f64],
) -> (DMatrix<f64>, DVector<f64>) {
    let (m, n) = jacobian.shape();
    let mut a = DMatrix::zeros(m + n, n);
    a.view_mut((0, 0), (m, n)).copy_from(jacobian);
    let root = lambda.max(0.0).sqrt();
    for (j, d) in scale.iter().enumerate().take(n) {
        a[(m + j, j)] = root * d;
    }

    let mut b = DVector::zeros(m + n);
    for i in 0..m {
        b[i] = -residuals[i];
    }
    (a, b)
}
