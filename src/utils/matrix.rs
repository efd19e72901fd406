//! Matrix utility functions.

use crate::solvers::PimError;
use faer::{Col, Mat};

/// Solve the square system `A x = b` via QR.
///
/// Returns `SingularMatrix` when a diagonal entry of `R` is at or below
/// `rank_tolerance` times the largest one.
pub fn solve_square(a: &Mat<f64>, b: &Col<f64>, rank_tolerance: f64) -> Result<Col<f64>, PimError> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(PimError::DimensionMismatch {
            what: "square system columns",
            expected: n,
            got: a.ncols(),
        });
    }
    if b.nrows() != n {
        return Err(PimError::DimensionMismatch {
            what: "right-hand side length",
            expected: n,
            got: b.nrows(),
        });
    }

    let qr = a.qr();
    let q = qr.compute_Q();
    let r = qr.R().to_owned();
    check_triangular(&r, rank_tolerance)?;

    let qtb = q.transpose() * b;
    Ok(back_substitute(&r, &qtb))
}

/// Invert a square matrix via QR, column by column.
pub fn invert(a: &Mat<f64>, rank_tolerance: f64) -> Result<Mat<f64>, PimError> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(PimError::DimensionMismatch {
            what: "square matrix columns",
            expected: n,
            got: a.ncols(),
        });
    }

    let qr = a.qr();
    let q = qr.compute_Q();
    let r = qr.R().to_owned();
    check_triangular(&r, rank_tolerance)?;

    let mut inverse = Mat::zeros(n, n);
    for col in 0..n {
        let mut e = Col::zeros(n);
        e[col] = 1.0;
        let qte = q.transpose() * e;
        let sol = back_substitute(&r, &qte);
        for i in 0..n {
            inverse[(i, col)] = sol[i];
        }
    }

    Ok(inverse)
}

/// Replace `a` by `(a + aᵀ) / 2`.
pub fn symmetrize(a: &mut Mat<f64>) {
    let n = a.nrows().min(a.ncols());
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (a[(i, j)] + a[(j, i)]);
            a[(i, j)] = avg;
            a[(j, i)] = avg;
        }
    }
}

/// `a b aᵀ` for square `a` and `b` of the same size.
pub fn congruence(a: &Mat<f64>, b: &Mat<f64>) -> Mat<f64> {
    a * b * a.transpose()
}

/// `x xᵀ` added into `out`.
pub(crate) fn add_outer(out: &mut Mat<f64>, x: &Col<f64>, scale: f64) {
    let p = x.nrows();
    for j in 0..p {
        let xj = scale * x[j];
        if xj == 0.0 {
            continue;
        }
        for k in 0..p {
            out[(j, k)] += xj * x[k];
        }
    }
}

fn check_triangular(r: &Mat<f64>, rank_tolerance: f64) -> Result<(), PimError> {
    let n = r.nrows().min(r.ncols());
    let max_diag = (0..n).map(|i| r[(i, i)].abs()).fold(0.0_f64, f64::max);
    if n > 0 && !(max_diag > 0.0) {
        return Err(PimError::SingularMatrix);
    }
    for i in 0..n {
        let d = r[(i, i)].abs();
        if !d.is_finite() || d <= rank_tolerance * max_diag {
            return Err(PimError::SingularMatrix);
        }
    }
    Ok(())
}

fn back_substitute(r: &Mat<f64>, rhs: &Col<f64>) -> Col<f64> {
    let n = r.ncols();
    let mut sol = Col::zeros(n);
    for i in (0..n).rev() {
        let mut sum = rhs[i];
        for j in (i + 1)..n {
            sum -= r[(i, j)] * sol[j];
        }
        sol[i] = sum / r[(i, i)];
    }
    sol
}
