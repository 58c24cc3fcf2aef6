//! Least-squares solving for the autoregressive regressions.

use nalgebra::{DMatrix, DVector};

/// Solve `min ||X b - y||^2` using SVD.
///
/// Returns `None` if no tolerance yields a finite solution.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    if x.nrows() == 0 || x.ncols() == 0 || x.nrows() != y.len() {
        return None;
    }
    let svd = x.clone().svd(true, true);

    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Build `(X, y)` from row vectors, then solve.
pub fn regress(rows: &[Vec<f64>], targets: &[f64]) -> Option<Vec<f64>> {
    let ncols = rows.first()?.len();
    if rows.len() != targets.len() || rows.len() < ncols {
        return None;
    }
    let x = DMatrix::from_fn(rows.len(), ncols, |i, j| rows[i][j]);
    let y = DVector::from_column_slice(targets);
    solve_least_squares(&x, &y).map(|b| b.iter().copied().collect())
}
