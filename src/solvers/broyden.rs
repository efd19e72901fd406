//! Broyden quasi-Newton root finder.
//!
//! Starts from the inverse of the analytic Jacobian at the start point and
//! applies rank-one secant updates (Sherman-Morrison form) afterwards. When a
//! step fails to lower the residual norm the iterate is kept and the inverse
//! Jacobian is recomputed analytically there.

use crate::solvers::estimating::backtrack;
use crate::solvers::traits::{
    residual_norm, EstimatingSystem, PimError, RootFinder, SolverControl, SolverOutput,
};
use crate::utils::invert;
use faer::{Col, Mat};

#[derive(Debug, Clone, Copy, Default)]
pub struct BroydenSolver;

impl RootFinder for BroydenSolver {
    fn name(&self) -> &'static str {
        "broyden"
    }

    fn solve(
        &self,
        system: &dyn EstimatingSystem,
        control: &SolverControl,
    ) -> Result<SolverOutput, PimError> {
        let p = system.dimension();
        if control.start.nrows() != p {
            return Err(PimError::DimensionMismatch {
                what: "start vector length",
                expected: p,
                got: control.start.nrows(),
            });
        }

        let mut beta = control.start.clone();
        let mut u = system.residual(&beta);
        let mut norm = residual_norm(&u, system.scale());

        if norm < control.tolerance {
            return Ok(SolverOutput {
                coefficients: beta,
                iterations: 0,
                residual_norm: norm,
            });
        }

        let mut h = invert(&system.jacobian(&beta), control.rank_tolerance)?;

        for iter in 1..=control.max_iterations {
            let hu = &h * &u;
            let step = Col::from_fn(p, |i| -hu[i]);

            let ls = backtrack(system, &beta, &step, norm);
            if !ls.improved {
                log::debug!(
                    "broyden iteration {}: no decrease from max |U/N| = {:e}, jacobian reset",
                    iter,
                    norm
                );
                h = invert(&system.jacobian(&beta), control.rank_tolerance)?;
                continue;
            }

            let s = Col::from_fn(p, |i| ls.beta[i] - beta[i]);
            let d = Col::from_fn(p, |i| ls.residual[i] - u[i]);
            beta = ls.beta;
            u = ls.residual;
            norm = ls.norm;

            log::debug!("broyden iteration {}: max |U/N| = {:e}", iter, norm);

            if norm < control.tolerance {
                log::info!("broyden converged after {} iterations", iter);
                return Ok(SolverOutput {
                    coefficients: beta,
                    iterations: iter,
                    residual_norm: norm,
                });
            }

            secant_update(&mut h, &s, &d);
        }

        Err(PimError::Convergence {
            iterations: control.max_iterations,
            last_iterate: beta.iter().copied().collect(),
            residual_norm: norm,
        })
    }
}

/// Good Broyden update of the inverse Jacobian:
/// `H ← H + (s − H d) sᵀH / (sᵀ H d)`.
fn secant_update(h: &mut Mat<f64>, s: &Col<f64>, d: &Col<f64>) {
    let p = s.nrows();
    let hd = &*h * d;
    let denom: f64 = (0..p).map(|i| s[i] * hd[i]).sum();
    if !denom.is_finite() || denom.abs() < f64::EPSILON {
        return;
    }

    let sth = Col::from_fn(p, |j| (0..p).map(|i| s[i] * h[(i, j)]).sum::<f64>());
    for i in 0..p {
        let coef = (s[i] - hd[i]) / denom;
        for j in 0..p {
            h[(i, j)] += coef * sth[j];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// U(β) = (a₀ − β₀ − β₁², a₁ − β₁ − 0.5 β₀β₁)
    struct Coupled {
        a: [f64; 2],
    }

    impl EstimatingSystem for Coupled {
        fn dimension(&self) -> usize {
            2
        }

        fn scale(&self) -> f64 {
            1.0
        }

        fn residual(&self, b: &Col<f64>) -> Col<f64> {
            let r = [
                self.a[0] - b[0] - b[1] * b[1],
                self.a[1] - b[1] - 0.5 * b[0] * b[1],
            ];
            Col::from_fn(2, |i| r[i])
        }

        fn jacobian(&self, b: &Col<f64>) -> Mat<f64> {
            let j = [[-1.0, -2.0 * b[1]], [-0.5 * b[1], -1.0 - 0.5 * b[0]]];
            Mat::from_fn(2, 2, |r, c| j[r][c])
        }
    }

    fn control(max_iterations: usize) -> SolverControl {
        SolverControl {
            start: Col::zeros(2),
            max_iterations,
            tolerance: 1e-11,
            rank_tolerance: 1e-14,
        }
    }

    #[test]
    fn test_broyden_solves_coupled_system() {
        // Root at β = (1, 1): a₀ = 2, a₁ = 1.5
        let system = Coupled { a: [2.0, 1.5] };
        let out = BroydenSolver.solve(&system, &control(200)).unwrap();
        assert!((out.coefficients[0] - 1.0).abs() < 1e-8);
        assert!((out.coefficients[1] - 1.0).abs() < 1e-8);
        assert!(out.residual_norm < 1e-11);
    }

    #[test]
    fn test_broyden_reports_budget_exhaustion() {
        let system = Coupled { a: [2.0, 1.5] };
        assert!(matches!(
            BroydenSolver.solve(&system, &control(1)),
            Err(PimError::Convergence { iterations: 1, .. })
        ));
    }

    #[test]
    fn test_broyden_keeps_iterate_when_step_fails() {
        // Jacobian of the wrong sign: every step increases |U|
        struct WrongSign;

        impl EstimatingSystem for WrongSign {
            fn dimension(&self) -> usize {
                1
            }

            fn scale(&self) -> f64 {
                1.0
            }

            fn residual(&self, b: &Col<f64>) -> Col<f64> {
                Col::from_fn(1, |_| b[0] - 3.0)
            }

            fn jacobian(&self, _b: &Col<f64>) -> Mat<f64> {
                Mat::from_fn(1, 1, |_, _| -1.0)
            }
        }

        let start = SolverControl {
            start: Col::zeros(1),
            ..control(4)
        };
        match BroydenSolver.solve(&WrongSign, &start) {
            Err(PimError::Convergence {
                iterations,
                last_iterate,
                residual_norm,
            }) => {
                assert_eq!(iterations, 4);
                assert_eq!(last_iterate, vec![0.0]);
                assert_eq!(residual_norm, 3.0);
            }
            other => panic!("expected convergence error, got {:?}", other),
        }
    }

    #[test]
    fn test_secant_update_satisfies_secant_condition() {
        let mut h = Mat::from_fn(2, 2, |i, j| if i == j { 1.0 } else { 0.0 });
        let s = Col::from_fn(2, |i| [0.5, -0.25][i]);
        let d = Col::from_fn(2, |i| [1.0, 0.5][i]);
        secant_update(&mut h, &s, &d);

        let hd = &h * &d;
        for i in 0..2 {
            assert!((hd[i] - s[i]).abs() < 1e-12);
        }
    }
}
