//! Newton-Raphson root finder with backtracking.

use crate::solvers::estimating::backtrack;
use crate::solvers::traits::{
    residual_norm, EstimatingSystem, PimError, RootFinder, SolverControl, SolverOutput,
};
use crate::utils::solve_square;
use faer::Col;

/// Full Newton steps using the analytic Jacobian at every iterate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewtonSolver;

impl RootFinder for NewtonSolver {
    fn name(&self) -> &'static str {
        "newton"
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

        for iter in 1..=control.max_iterations {
            let jacobian = system.jacobian(&beta);
            let neg_u = Col::from_fn(p, |i| -u[i]);
            let step = solve_square(&jacobian, &neg_u, control.rank_tolerance)?;

            let ls = backtrack(system, &beta, &step, norm);
            if !ls.improved {
                // the next step would be identical
                log::debug!(
                    "newton iteration {}: no decrease from max |U/N| = {:e}",
                    iter,
                    norm
                );
                return Err(PimError::Convergence {
                    iterations: iter,
                    last_iterate: beta.iter().copied().collect(),
                    residual_norm: norm,
                });
            }
            beta = ls.beta;
            u = ls.residual;
            norm = ls.norm;

            log::debug!("newton iteration {}: max |U/N| = {:e}", iter, norm);

            if norm < control.tolerance {
                log::info!("newton converged after {} iterations", iter);
                return Ok(SolverOutput {
                    coefficients: beta,
                    iterations: iter,
                    residual_norm: norm,
                });
            }
        }

        Err(PimError::Convergence {
            iterations: control.max_iterations,
            last_iterate: beta.iter().copied().collect(),
            residual_norm: norm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::Mat;

    /// U(β) = a − β³ elementwise.
    struct Cubic {
        target: Vec<f64>,
    }

    impl EstimatingSystem for Cubic {
        fn dimension(&self) -> usize {
            self.target.len()
        }

        fn scale(&self) -> f64 {
            1.0
        }

        fn residual(&self, beta: &Col<f64>) -> Col<f64> {
            Col::from_fn(self.target.len(), |i| self.target[i] - beta[i].powi(3))
        }

        fn jacobian(&self, beta: &Col<f64>) -> Mat<f64> {
            let p = self.target.len();
            Mat::from_fn(p, p, |i, j| if i == j { -3.0 * beta[i].powi(2) } else { 0.0 })
        }
    }

    fn control(start: Vec<f64>, max_iterations: usize) -> SolverControl {
        SolverControl {
            start: Col::from_fn(start.len(), |i| start[i]),
            max_iterations,
            tolerance: 1e-12,
            rank_tolerance: 1e-14,
        }
    }

    #[test]
    fn test_newton_finds_cube_root() {
        let system = Cubic {
            target: vec![8.0, 27.0],
        };
        let out = NewtonSolver.solve(&system, &control(vec![1.0, 1.0], 100)).unwrap();
        assert!((out.coefficients[0] - 2.0).abs() < 1e-8);
        assert!((out.coefficients[1] - 3.0).abs() < 1e-8);
        assert!(out.iterations > 0);
    }

    #[test]
    fn test_newton_reports_budget_exhaustion() {
        let system = Cubic {
            target: vec![1000.0],
        };
        let result = NewtonSolver.solve(&system, &control(vec![1.0], 1));
        match result {
            Err(PimError::Convergence {
                iterations,
                last_iterate,
                ..
            }) => {
                assert_eq!(iterations, 1);
                assert_eq!(last_iterate.len(), 1);
            }
            other => panic!("expected convergence error, got {:?}", other),
        }
    }

    #[test]
    fn test_newton_singular_jacobian() {
        let system = Cubic { target: vec![1.0] };
        let result = NewtonSolver.solve(&system, &control(vec![0.0], 10));
        assert!(matches!(result, Err(PimError::SingularMatrix)));
    }

    /// U(β) = β − 3 with a Jacobian of the wrong sign, so no step helps.
    struct WrongSign;

    impl EstimatingSystem for WrongSign {
        fn dimension(&self) -> usize {
            1
        }

        fn scale(&self) -> f64 {
            1.0
        }

        fn residual(&self, beta: &Col<f64>) -> Col<f64> {
            Col::from_fn(1, |_| beta[0] - 3.0)
        }

        fn jacobian(&self, _beta: &Col<f64>) -> Mat<f64> {
            Mat::from_fn(1, 1, |_, _| -1.0)
        }
    }

    #[test]
    fn test_newton_keeps_iterate_when_step_fails() {
        let result = NewtonSolver.solve(&WrongSign, &control(vec![0.0], 10));
        match result {
            Err(PimError::Convergence {
                iterations,
                last_iterate,
                residual_norm,
            }) => {
                assert_eq!(iterations, 1);
                assert_eq!(last_iterate, vec![0.0]);
                assert_eq!(residual_norm, 3.0);
            }
            other => panic!("expected convergence error, got {:?}", other),
        }
    }

    #[test]
    fn test_start_already_at_root() {
        let system = Cubic { target: vec![8.0] };
        let out = NewtonSolver.solve(&system, &control(vec![2.0], 10)).unwrap();
        assert_eq!(out.iterations, 0);
    }
}
