//! Error type and root-finding interface shared by the PIM solvers.

use crate::core::{NaError, OptionsError};
use crate::formula::{ModelMode, SpecError};
use faer::{Col, Mat};
use thiserror::Error;

/// Errors that can occur while fitting a probabilistic index model.
#[derive(Debug, Error)]
pub enum PimError {
    #[error("invalid model specification: {0}")]
    InvalidSpec(#[from] SpecError),

    #[error("missing values in variable '{variable}': {rows} rows contain NA (na.fail)")]
    MissingData { variable: String, rows: usize },

    #[error("model type '{0}' is not supported for probabilistic index models")]
    UnsupportedModel(ModelMode),

    #[error("dimension mismatch in {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error(
        "estimating equations did not converge after {iterations} iterations \
         (max |U/N| = {residual_norm:e})"
    )]
    Convergence {
        iterations: usize,
        last_iterate: Vec<f64>,
        residual_norm: f64,
    },

    #[error("matrix is singular or nearly singular")]
    SingularMatrix,

    #[error("invalid options: {0}")]
    InvalidOptions(#[from] OptionsError),
}

impl From<NaError> for PimError {
    fn from(err: NaError) -> Self {
        match err {
            NaError::NaValuesPresent { variable, n_na } => PimError::MissingData {
                variable,
                rows: n_na,
            },
            NaError::AllNa => PimError::InvalidSpec(SpecError::TooFewObservations { n: 0 }),
        }
    }
}

/// Iteration controls passed to a root finder.
#[derive(Debug, Clone)]
pub struct SolverControl {
    /// Starting coefficients.
    pub start: Col<f64>,
    pub max_iterations: usize,
    /// Convergence threshold on `max |U(β)| / N`.
    pub tolerance: f64,
    /// Relative pivot threshold below which a Jacobian counts as singular.
    pub rank_tolerance: f64,
}

/// Outcome of a successful root search.
#[derive(Debug, Clone)]
pub struct SolverOutput {
    pub coefficients: Col<f64>,
    pub iterations: usize,
    /// Final `max |U(β)| / N`.
    pub residual_norm: f64,
}

/// A system of estimating equations `U(β) = 0`.
///
/// `residual` returns `U(β)` and `jacobian` its derivative `∂U/∂β`.
/// `scale` is the number of rows the sums run over and normalizes the
/// convergence criterion.
pub trait EstimatingSystem: Sync {
    fn dimension(&self) -> usize;

    fn scale(&self) -> f64;

    fn residual(&self, beta: &Col<f64>) -> Col<f64>;

    fn jacobian(&self, beta: &Col<f64>) -> Mat<f64>;
}

/// An iterative root finder for an [`EstimatingSystem`].
pub trait RootFinder {
    fn name(&self) -> &'static str;

    fn solve(
        &self,
        system: &dyn EstimatingSystem,
        control: &SolverControl,
    ) -> Result<SolverOutput, PimError>;
}

/// `max_i |u_i| / scale`, infinite when any entry is not finite.
pub(crate) fn residual_norm(u: &Col<f64>, scale: f64) -> f64 {
    let mut norm = 0.0_f64;
    for &v in u.iter() {
        if !v.is_finite() {
            return f64::INFINITY;
        }
        norm = norm.max(v.abs());
    }
    norm / scale.max(1.0)
}
