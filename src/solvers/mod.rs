//! Estimating-equation solvers and the PIM estimator.

mod broyden;
mod estimating;
mod newton;
mod pim;
mod traits;

pub use broyden::BroydenSolver;
pub use estimating::{EstimatingEquations, REDUCTION_BLOCK};
pub use newton::NewtonSolver;
pub use pim::{FittedPim, PimRegressor, PimRegressorBuilder};
pub use traits::{EstimatingSystem, PimError, RootFinder, SolverControl, SolverOutput};
