//! Stage 2: fit the propensity model over the pooled table.
//!
//! A binary logistic regression of `origin` on the covariate set, fit by
//! Newton-Raphson on standardized covariates. The fit is a pure function of
//! the pooled table: identical input yields an identical score vector.

use log::debug;
use ndarray::{Array1, Array2};

use crate::error::{EnrichError, PreconditionViolation};
use crate::matching::ORIGIN_COLUMN;
use crate::models::Table;

const MAX_ITERATIONS: usize = 100;
const CONVERGENCE_TOL: f64 = 1e-10;
// Pivots below this are treated as a singular system (perfect separation
// or collinear covariates).
const SINGULAR_PIVOT_TOL: f64 = 1e-12;

#[derive(Debug)]
pub struct PropensityFit {
    /// One fitted probability per pooled row, in [0, 1].
    pub scores: Vec<f64>,
    pub iterations: usize,
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Fit the model and return one propensity score per row of `pooled`.
///
/// Degenerate inputs are fatal: a single origin class, a zero-variance
/// covariate, or any covariate cell that is missing or non-numeric.
pub fn estimate(pooled: &Table, covariates: &[String]) -> Result<PropensityFit, EnrichError> {
    let n = pooled.n_rows();
    let origin = pooled.numeric_column("pooled", ORIGIN_COLUMN)?;

    let treated = origin.iter().filter(|&&v| v == 1.0).count();
    if treated == 0 || treated == n {
        return Err(PreconditionViolation::SingleOriginClass.into());
    }

    // Design matrix: intercept column plus one standardized column per
    // covariate. Standardization conditions the Newton step; the fitted
    // probabilities are unchanged by it.
    let d = covariates.len();
    let mut x = Array2::<f64>::zeros((n, d + 1));
    x.column_mut(0).fill(1.0);
    for (j, name) in covariates.iter().enumerate() {
        let col = pooled.numeric_column("pooled", name)?;
        let mean = col.iter().sum::<f64>() / n as f64;
        let var = col.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
        if var == 0.0 {
            return Err(PreconditionViolation::ZeroVarianceCovariate {
                column: name.clone(),
            }
            .into());
        }
        let std = var.sqrt();
        for (i, v) in col.iter().enumerate() {
            x[[i, j + 1]] = (v - mean) / std;
        }
    }

    let y = Array1::from_vec(origin);
    let mut w = Array1::<f64>::zeros(d + 1);
    let mut last_step = f64::INFINITY;

    for iteration in 1..=MAX_ITERATIONS {
        let p = x.dot(&w).mapv(sigmoid);

        // Newton step: solve (X^T S X) dw = X^T (y - p), S = diag(p(1-p)).
        let s = p.mapv(|v| v * (1.0 - v));
        let mut xs = x.clone();
        for (mut row, &si) in xs.rows_mut().into_iter().zip(s.iter()) {
            row *= si;
        }
        let hessian = x.t().dot(&xs);
        let gradient = x.t().dot(&(&y - &p));

        let step = solve(&hessian, &gradient).ok_or_else(|| EnrichError::SingularSystem {
            reason: "Hessian is not invertible; check for separation or collinear covariates"
                .to_string(),
        })?;

        last_step = step.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        w += &step;

        if last_step < CONVERGENCE_TOL {
            debug!(
                "Propensity model converged after {} iterations (step {:e})",
                iteration, last_step
            );
            let scores = x.dot(&w).mapv(sigmoid).to_vec();
            return Ok(PropensityFit {
                scores,
                iterations: iteration,
            });
        }
    }

    Err(EnrichError::EstimationFailure {
        iterations: MAX_ITERATIONS,
        last_step,
    })
}

/// Solve `a * x = b` by Gaussian elimination with partial pivoting.
/// The system is (d+1)-dimensional with d the covariate count, so a dense
/// direct solve is the right tool.
fn solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    let mut a = a.clone();
    let mut b = b.clone();

    for col in 0..n {
        let mut pivot = col;
        for row in col + 1..n {
            if a[[row, col]].abs() > a[[pivot, col]].abs() {
                pivot = row;
            }
        }
        if !a[[pivot, col]].is_finite() || a[[pivot, col]].abs() < SINGULAR_PIVOT_TOL {
            return None;
        }
        if pivot != col {
            for c in 0..n {
                let tmp = a[[col, c]];
                a[[col, c]] = a[[pivot, c]];
                a[[pivot, c]] = tmp;
            }
            b.swap(col, pivot);
        }
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            for c in col..n {
                a[[row, c]] -= factor * a[[col, c]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let mut acc = b[row];
        for c in row + 1..n {
            acc -= a[[row, c]] * x[c];
        }
        x[row] = acc / a[[row, row]];
    }
    Some(x)
}
