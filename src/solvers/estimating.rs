//! PIM estimating equations.
//!
//! With design rows `x_r`, pseudo-responses `y_r` and link inverse `g⁻¹`:
//!
//! ```text
//! U(β) = Σ_r x_r (y_r − g⁻¹(x_rᵀβ))
//! B(β) = Σ_r w_r x_r x_rᵀ,   w_r = dμ/dη at x_rᵀβ
//! ```
//!
//! so that `∂U/∂β = −B(β)`. Sums run over fixed-size row blocks in parallel
//! and are then added in block order, which keeps the result independent of
//! the number of worker threads.

use crate::core::PimLink;
use crate::solvers::traits::{residual_norm, EstimatingSystem, PimError};
use crate::utils::{add_outer, solve_square};
use faer::{Col, Mat};
use rayon::prelude::*;
use std::ops::Range;

/// Rows per parallel reduction block.
pub const REDUCTION_BLOCK: usize = 1024;

/// Split `0..n` into consecutive blocks of `REDUCTION_BLOCK` rows.
pub(crate) fn row_blocks(n: usize) -> Vec<Range<usize>> {
    (0..n.div_ceil(REDUCTION_BLOCK))
        .map(|b| b * REDUCTION_BLOCK..((b + 1) * REDUCTION_BLOCK).min(n))
        .collect()
}

/// Estimating equations of a PIM over a materialized design.
#[derive(Debug, Clone, Copy)]
pub struct EstimatingEquations<'a> {
    x: &'a Mat<f64>,
    y: &'a Col<f64>,
    link: PimLink,
}

impl<'a> EstimatingEquations<'a> {
    pub fn new(x: &'a Mat<f64>, y: &'a Col<f64>, link: PimLink) -> Result<Self, PimError> {
        if x.nrows() != y.nrows() {
            return Err(PimError::DimensionMismatch {
                what: "design rows vs response length",
                expected: x.nrows(),
                got: y.nrows(),
            });
        }
        Ok(Self { x, y, link })
    }

    pub fn link(&self) -> PimLink {
        self.link
    }

    /// `x_rᵀβ` for row `r`.
    #[inline]
    fn eta(&self, r: usize, beta: &Col<f64>) -> f64 {
        let mut eta = 0.0;
        for j in 0..self.x.ncols() {
            eta += self.x[(r, j)] * beta[j];
        }
        eta
    }

    /// Linear predictor `Xβ`.
    pub fn linear_predictor(&self, beta: &Col<f64>) -> Col<f64> {
        Col::from_fn(self.x.nrows(), |r| self.eta(r, beta))
    }

    /// Fitted probabilistic indices `g⁻¹(Xβ)`.
    pub fn fitted(&self, beta: &Col<f64>) -> Col<f64> {
        Col::from_fn(self.x.nrows(), |r| self.link.link_inverse(self.eta(r, beta)))
    }

    /// Per-row score contribution `x_r (y_r − μ_r)` added into `out`.
    pub(crate) fn add_row_score(&self, r: usize, beta: &Col<f64>, out: &mut Col<f64>) {
        let resid = self.y[r] - self.link.link_inverse(self.eta(r, beta));
        for j in 0..self.x.ncols() {
            out[j] += self.x[(r, j)] * resid;
        }
    }

    /// Per-row information contribution `w_r x_r x_rᵀ` added into `out`.
    pub(crate) fn add_row_information(&self, r: usize, beta: &Col<f64>, out: &mut Mat<f64>) {
        let w = self.link.link_inverse_derivative(self.eta(r, beta));
        let row = Col::from_fn(self.x.ncols(), |j| self.x[(r, j)]);
        add_outer(out, &row, w);
    }

    /// `U(β)` restricted to `rows`.
    pub fn score_rows(&self, beta: &Col<f64>, rows: Range<usize>) -> Col<f64> {
        let mut u = Col::zeros(self.x.ncols());
        for r in rows {
            self.add_row_score(r, beta, &mut u);
        }
        u
    }

    /// `B(β)` restricted to `rows`.
    pub fn information_rows(&self, beta: &Col<f64>, rows: Range<usize>) -> Mat<f64> {
        let p = self.x.ncols();
        let mut b = Mat::zeros(p, p);
        for r in rows {
            self.add_row_information(r, beta, &mut b);
        }
        b
    }

    /// `U(β)` over all rows.
    pub fn score(&self, beta: &Col<f64>) -> Col<f64> {
        let partials: Vec<Col<f64>> = row_blocks(self.x.nrows())
            .into_par_iter()
            .map(|rows| self.score_rows(beta, rows))
            .collect();

        let mut u = Col::zeros(self.x.ncols());
        for part in &partials {
            for j in 0..u.nrows() {
                u[j] += part[j];
            }
        }
        u
    }

    /// `B(β)` over all rows.
    pub fn information(&self, beta: &Col<f64>) -> Mat<f64> {
        let p = self.x.ncols();
        let partials: Vec<Mat<f64>> = row_blocks(self.x.nrows())
            .into_par_iter()
            .map(|rows| self.information_rows(beta, rows))
            .collect();

        let mut b = Mat::zeros(p, p);
        for part in &partials {
            for j in 0..p {
                for k in 0..p {
                    b[(j, k)] += part[(j, k)];
                }
            }
        }
        b
    }

    /// Closed-form solution for the identity link.
    ///
    /// With `g⁻¹(η) = η`, `U(β) = Xᵀy − XᵀXβ`, so `β = (XᵀX)⁻¹Xᵀy`.
    pub fn solve_linear(&self, rank_tolerance: f64) -> Result<Col<f64>, PimError> {
        let zero = Col::zeros(self.x.ncols());
        let xty = self.score(&zero);
        let xtx = self.information(&zero);
        solve_square(&xtx, &xty, rank_tolerance)
    }
}

impl EstimatingSystem for EstimatingEquations<'_> {
    fn dimension(&self) -> usize {
        self.x.ncols()
    }

    fn scale(&self) -> f64 {
        self.x.nrows() as f64
    }

    fn residual(&self, beta: &Col<f64>) -> Col<f64> {
        self.score(beta)
    }

    fn jacobian(&self, beta: &Col<f64>) -> Mat<f64> {
        let b = self.information(beta);
        Mat::from_fn(b.nrows(), b.ncols(), |i, j| -b[(i, j)])
    }
}

/// A trial point accepted by [`backtrack`].
#[derive(Debug, Clone)]
pub(crate) struct LineSearch {
    pub beta: Col<f64>,
    pub residual: Col<f64>,
    pub norm: f64,
    /// Whether the accepted point lowered the residual norm.
    pub improved: bool,
}

const MAX_HALVINGS: usize = 30;

/// Step from `beta` along `step`, halving the step until the residual norm
/// drops below `current_norm`. If no halving helps, `beta` itself is returned
/// with `improved = false`.
pub(crate) fn backtrack(
    system: &dyn EstimatingSystem,
    beta: &Col<f64>,
    step: &Col<f64>,
    current_norm: f64,
) -> LineSearch {
    let p = beta.nrows();
    let mut t = 1.0;

    for _ in 0..=MAX_HALVINGS {
        let trial = Col::from_fn(p, |i| beta[i] + t * step[i]);
        let residual = system.residual(&trial);
        let norm = residual_norm(&residual, system.scale());
        if norm < current_norm {
            return LineSearch {
                beta: trial,
                residual,
                norm,
                improved: true,
            };
        }
        t *= 0.5;
    }

    LineSearch {
        beta: beta.clone(),
        residual: system.residual(beta),
        norm: current_norm,
        improved: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn design(n: usize) -> (Mat<f64>, Col<f64>) {
        let x = Mat::from_fn(n, 2, |i, j| {
            if j == 0 {
                1.0
            } else {
                (i as f64 * 0.37).sin()
            }
        });
        let y = Col::from_fn(n, |i| if (i * 7) % 3 == 0 { 1.0 } else { 0.0 });
        (x, y)
    }

    #[test]
    fn test_row_blocks() {
        assert!(row_blocks(0).is_empty());
        let blocks = row_blocks(2 * REDUCTION_BLOCK + 5);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[2], 2 * REDUCTION_BLOCK..2 * REDUCTION_BLOCK + 5);
    }

    #[test]
    fn test_score_matches_direct_sum() {
        let (x, y) = design(2500);
        let eq = EstimatingEquations::new(&x, &y, PimLink::Logit).unwrap();
        let beta = Col::from_fn(2, |i| [0.2, -0.4][i]);

        let u = eq.score(&beta);
        let direct = eq.score_rows(&beta, 0..2500);
        for j in 0..2 {
            assert_relative_eq!(u[j], direct[j], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_jacobian_matches_finite_difference() {
        let (x, y) = design(200);
        let eq = EstimatingEquations::new(&x, &y, PimLink::Probit).unwrap();
        let beta = Col::from_fn(2, |i| [0.1, 0.3][i]);
        let jac = eq.jacobian(&beta);

        let h = 1e-6;
        for k in 0..2 {
            let mut plus = beta.clone();
            let mut minus = beta.clone();
            plus[k] += h;
            minus[k] -= h;
            let up = eq.residual(&plus);
            let um = eq.residual(&minus);
            for j in 0..2 {
                let fd = (up[j] - um[j]) / (2.0 * h);
                assert_relative_eq!(jac[(j, k)], fd, epsilon = 1e-4, max_relative = 1e-5);
            }
        }
    }

    #[test]
    fn test_solve_linear_zeroes_score() {
        let (x, y) = design(300);
        let eq = EstimatingEquations::new(&x, &y, PimLink::Identity).unwrap();
        let beta = eq.solve_linear(1e-10).unwrap();
        let u = eq.score(&beta);
        for j in 0..2 {
            assert!(u[j].abs() < 1e-8);
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let x = Mat::zeros(3, 1);
        let y = Col::zeros(4);
        assert!(matches!(
            EstimatingEquations::new(&x, &y, PimLink::Logit),
            Err(PimError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_backtrack_improves() {
        let (x, y) = design(100);
        let eq = EstimatingEquations::new(&x, &y, PimLink::Logit).unwrap();
        let beta = Col::zeros(2);
        let u = eq.residual(&beta);
        let norm = residual_norm(&u, eq.scale());

        let step = solve_square(&eq.information(&beta), &u, 1e-12).unwrap();
        let ls = backtrack(&eq, &beta, &step, norm);
        assert!(ls.improved);
        assert!(ls.norm < norm);
    }
}
