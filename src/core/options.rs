//! PIM fitting options and configuration.

use crate::core::{Comparison, NaAction, PimLink};
use crate::formula::ModelMode;
use crate::inference::VarianceMethod;
use thiserror::Error;

/// Root-finding backend for non-linear links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverBackend {
    /// Broyden quasi-Newton updates (default).
    #[default]
    Broyden,
    /// Full Newton-Raphson with the analytic Jacobian every iteration.
    Newton,
}

/// Configuration options for PIM fitting.
#[derive(Debug, Clone)]
pub struct PimOptions {
    /// Link function (default: logit).
    pub link: PimLink,
    /// Which observation pairs are compared (default: unique).
    pub comparison: Comparison,
    /// How plain terms are rewritten (default: difference).
    pub model: ModelMode,
    /// Missing value policy (default: omit).
    pub na_action: NaAction,
    /// Keep the design matrix and response in the fitted model (default: false).
    pub keep_data: bool,
    /// Root-finding backend for logit/probit links.
    pub solver: SolverBackend,
    /// Covariance estimator (default: sandwich).
    pub variance: VarianceMethod,
    /// Starting coefficients; zeros when `None`.
    pub start: Option<Vec<f64>>,
    /// Maximum iterations for iterative solvers.
    pub max_iterations: usize,
    /// Convergence tolerance on the largest absolute mean estimating equation.
    pub tolerance: f64,
    /// Rank tolerance for QR decomposition.
    pub rank_tolerance: f64,
    /// Number of pairs evaluated per design-matrix batch.
    pub batch_size: usize,
    /// Confidence level for confidence intervals (default: 0.95).
    pub confidence_level: f64,
}

impl Default for PimOptions {
    fn default() -> Self {
        Self {
            link: PimLink::Logit,
            comparison: Comparison::Unique,
            model: ModelMode::Difference,
            na_action: NaAction::Omit,
            keep_data: false,
            solver: SolverBackend::Broyden,
            variance: VarianceMethod::Sandwich,
            start: None,
            max_iterations: 100,
            tolerance: 1e-8,
            rank_tolerance: 1e-10,
            batch_size: 4096,
            confidence_level: 0.95,
        }
    }
}

/// Errors that can occur when validating PIM options.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptionsError {
    #[error("confidence_level must be in (0, 1), got {0}")]
    InvalidConfidenceLevel(f64),
    #[error("tolerance must be positive, got {0}")]
    InvalidTolerance(f64),
    #[error("rank_tolerance must be non-negative, got {0}")]
    InvalidRankTolerance(f64),
    #[error("max_iterations must be at least 1, got {0}")]
    InvalidMaxIterations(usize),
    #[error("batch_size must be at least 1, got {0}")]
    InvalidBatchSize(usize),
    #[error("start values must be finite")]
    NonFiniteStart,
    #[error("start has {got} values but the model has {expected} coefficients")]
    StartLengthMismatch { expected: usize, got: usize },
}

impl PimOptions {
    /// Create a new builder for PIM options.
    pub fn builder() -> PimOptionsBuilder {
        PimOptionsBuilder::default()
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.confidence_level <= 0.0 || self.confidence_level >= 1.0 {
            return Err(OptionsError::InvalidConfidenceLevel(self.confidence_level));
        }
        if !(self.tolerance > 0.0) {
            return Err(OptionsError::InvalidTolerance(self.tolerance));
        }
        if !(self.rank_tolerance >= 0.0) {
            return Err(OptionsError::InvalidRankTolerance(self.rank_tolerance));
        }
        if self.max_iterations < 1 {
            return Err(OptionsError::InvalidMaxIterations(self.max_iterations));
        }
        if self.batch_size < 1 {
            return Err(OptionsError::InvalidBatchSize(self.batch_size));
        }
        if let Some(start) = &self.start {
            if start.iter().any(|v| !v.is_finite()) {
                return Err(OptionsError::NonFiniteStart);
            }
        }
        Ok(())
    }
}

/// Builder for `PimOptions`.
#[derive(Debug, Clone, Default)]
pub struct PimOptionsBuilder {
    options: PimOptions,
}

impl PimOptionsBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the link function.
    pub fn link(mut self, link: PimLink) -> Self {
        self.options.link = link;
        self
    }

    /// Set the comparison policy.
    pub fn comparison(mut self, comparison: Comparison) -> Self {
        self.options.comparison = comparison;
        self
    }

    /// Set the model mode.
    pub fn model(mut self, model: ModelMode) -> Self {
        self.options.model = model;
        self
    }

    /// Set the missing value policy.
    pub fn na_action(mut self, action: NaAction) -> Self {
        self.options.na_action = action;
        self
    }

    /// Set whether the design matrix and response are kept after fitting.
    pub fn keep_data(mut self, keep: bool) -> Self {
        self.options.keep_data = keep;
        self
    }

    /// Set the root-finding backend.
    pub fn solver(mut self, solver: SolverBackend) -> Self {
        self.options.solver = solver;
        self
    }

    /// Set the covariance estimator.
    pub fn variance(mut self, method: VarianceMethod) -> Self {
        self.options.variance = method;
        self
    }

    /// Set the starting coefficients.
    pub fn start(mut self, start: Vec<f64>) -> Self {
        self.options.start = Some(start);
        self
    }

    /// Set the maximum iterations for iterative solvers.
    pub fn max_iterations(mut self, max_iter: usize) -> Self {
        self.options.max_iterations = max_iter;
        self
    }

    /// Set the convergence tolerance.
    pub fn tolerance(mut self, tol: f64) -> Self {
        self.options.tolerance = tol;
        self
    }

    /// Set the rank tolerance for QR decomposition.
    pub fn rank_tolerance(mut self, tol: f64) -> Self {
        self.options.rank_tolerance = tol;
        self
    }

    /// Set the number of pairs evaluated per batch.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.options.batch_size = size;
        self
    }

    /// Set the confidence level for confidence intervals.
    pub fn confidence_level(mut self, level: f64) -> Self {
        self.options.confidence_level = level;
        self
    }

    /// Build and validate the options.
    pub fn build(self) -> Result<PimOptions, OptionsError> {
        self.options.validate()?;
        Ok(self.options)
    }

    /// Build the options without validation.
    pub fn build_unchecked(self) -> PimOptions {
        self.options
    }
}
