//! Probabilistic index model estimator.
//!
//! A PIM models the probability that one observation's outcome is smaller
//! than another's as a function of both observations' covariates:
//!
//! ```text
//! P(Y_i ≼ Y_j | X_i, X_j) = g⁻¹(Z_ijᵀβ)
//! ```
//!
//! where `P(a ≼ b) = P(a < b) + ½ P(a = b)` and `Z_ij` is built from the
//! covariates of the pair `(i, j)`.
//!
//! # Example
//!
//! ```rust,ignore
//! use pim::prelude::*;
//!
//! let fitted = PimRegressor::builder()
//!     .link(PimLink::Logit)
//!     .comparison(Comparison::Unique)
//!     .build()
//!     .fit("y ~ x + z", &data)?;
//!
//! println!("{:?}", fitted.coefficient_names());
//! let se = fitted.std_errors();
//! ```

use crate::core::{
    Comparison, Dataset, NaAction, NaHandler, NaInfo, OptionsError, PimLink, PimOptions,
    PimOptionsBuilder, Poset, PredictionResult, PredictionType, SolverBackend,
};
use crate::design::{DesignBuilder, PseudoEnvironment};
use crate::formula::{CompiledSpec, ModelMode};
use crate::inference::{CoefficientInference, VarianceEstimator, VarianceInput, VarianceMethod};
use crate::solvers::broyden::BroydenSolver;
use crate::solvers::estimating::EstimatingEquations;
use crate::solvers::newton::NewtonSolver;
use crate::solvers::traits::{
    residual_norm, EstimatingSystem, PimError, RootFinder, SolverControl, SolverOutput,
};
use faer::{Col, Mat};
use std::sync::Arc;

/// Probabilistic index model estimator.
#[derive(Debug, Clone)]
pub struct PimRegressor {
    options: PimOptions,
    variance_estimator: Option<Arc<dyn VarianceEstimator>>,
}

impl PimRegressor {
    /// Create a new regressor with the given options.
    pub fn new(options: PimOptions) -> Self {
        Self {
            options,
            variance_estimator: None,
        }
    }

    /// Create a builder.
    pub fn builder() -> PimRegressorBuilder {
        PimRegressorBuilder::default()
    }

    pub fn options(&self) -> &PimOptions {
        &self.options
    }

    fn estimator(&self) -> &dyn VarianceEstimator {
        match &self.variance_estimator {
            Some(custom) => custom.as_ref(),
            None => &self.options.variance,
        }
    }

    /// Fit the model `formula` to `data`.
    ///
    /// Validation runs in a fixed order before any matrix is built: options,
    /// formula, variable names, missing values, then the comparison pairs.
    pub fn fit(&self, formula: &str, data: &Dataset) -> Result<FittedPim, PimError> {
        let opts = &self.options;
        opts.validate()?;

        let spec = CompiledSpec::compile(formula, opts.model)?;
        let variables = spec.variables();
        CompiledSpec::check_variables(&variables, data)?;

        let na = NaHandler::process(data, &variables, opts.na_action)?;
        let comparison = opts.comparison.remap(&na.na_info)?;
        let poset = Poset::build(na.data.n_rows(), &comparison)?;

        let env = PseudoEnvironment::new(&na.data, &poset)?;
        let (x, y) = DesignBuilder::new(&spec, &env).materialize(opts.batch_size)?;

        let non_finite = y.iter().any(|v| !v.is_finite())
            || (0..x.ncols()).any(|j| (0..x.nrows()).any(|i| !x[(i, j)].is_finite()));
        if non_finite {
            log::warn!("design matrix or pseudo-response contains non-finite values");
        }

        let p = spec.n_terms();
        let start = match &opts.start {
            Some(start) if start.len() != p => {
                return Err(OptionsError::StartLengthMismatch {
                    expected: p,
                    got: start.len(),
                }
                .into())
            }
            Some(start) => Col::from_fn(p, |i| start[i]),
            None => Col::zeros(p),
        };

        log::debug!(
            "fitting {} PIM with {} link: {} observations, {} pairs, {} terms",
            spec.model,
            opts.link,
            poset.n_observations(),
            poset.len(),
            p
        );

        let eq = EstimatingEquations::new(&x, &y, opts.link)?;
        let solution = self.solve(&eq, start)?;
        let fitted_values = eq.fitted(&solution.coefficients);

        let vcov = self.estimator().estimate(&VarianceInput {
            x: &x,
            y: &y,
            coefficients: &solution.coefficients,
            fitted: &fitted_values,
            poset: &poset,
            n_observations: poset.n_observations(),
            link: opts.link,
            rank_tolerance: opts.rank_tolerance,
        })?;

        let (design_matrix, response) = if opts.keep_data {
            (x, y)
        } else {
            (Mat::zeros(0, p), Col::zeros(0))
        };

        Ok(FittedPim {
            coefficient_names: spec.term_names(),
            coefficients: solution.coefficients,
            vcov,
            fitted_values,
            link: opts.link,
            model: spec.model,
            n_observations: poset.n_observations(),
            spec: Arc::new(spec),
            poset: Arc::new(poset),
            na_info: na.na_info,
            design_matrix,
            response,
            iterations: solution.iterations,
            residual_norm: solution.residual_norm,
            variance_method: self.estimator().name(),
            confidence_level: opts.confidence_level,
            batch_size: opts.batch_size,
        })
    }

    fn solve(&self, eq: &EstimatingEquations<'_>, start: Col<f64>) -> Result<SolverOutput, PimError> {
        let opts = &self.options;

        if opts.link.is_linear() {
            let coefficients = eq.solve_linear(opts.rank_tolerance)?;
            let norm = residual_norm(&eq.residual(&coefficients), eq.scale());
            log::debug!("identity link solved in closed form, max |U/N| = {:e}", norm);
            return Ok(SolverOutput {
                coefficients,
                iterations: 0,
                residual_norm: norm,
            });
        }

        let control = SolverControl {
            start,
            max_iterations: opts.max_iterations,
            tolerance: opts.tolerance,
            rank_tolerance: opts.rank_tolerance,
        };
        let finder: &dyn RootFinder = match opts.solver {
            SolverBackend::Broyden => &BroydenSolver,
            SolverBackend::Newton => &NewtonSolver,
        };
        finder.solve(eq, &control)
    }
}

/// Builder for `PimRegressor`.
#[derive(Debug, Clone, Default)]
pub struct PimRegressorBuilder {
    options_builder: PimOptionsBuilder,
    variance_estimator: Option<Arc<dyn VarianceEstimator>>,
}

impl PimRegressorBuilder {
    /// Set the link function.
    pub fn link(mut self, link: PimLink) -> Self {
        self.options_builder = self.options_builder.link(link);
        self
    }

    /// Set which observation pairs are compared.
    pub fn comparison(mut self, comparison: Comparison) -> Self {
        self.options_builder = self.options_builder.comparison(comparison);
        self
    }

    /// Set how plain terms are rewritten.
    pub fn model(mut self, model: ModelMode) -> Self {
        self.options_builder = self.options_builder.model(model);
        self
    }

    /// Set the missing value policy.
    pub fn na_action(mut self, action: NaAction) -> Self {
        self.options_builder = self.options_builder.na_action(action);
        self
    }

    /// Keep the design matrix and response in the fitted model.
    pub fn keep_data(mut self, keep: bool) -> Self {
        self.options_builder = self.options_builder.keep_data(keep);
        self
    }

    /// Set the root-finding backend.
    pub fn solver(mut self, solver: SolverBackend) -> Self {
        self.options_builder = self.options_builder.solver(solver);
        self
    }

    /// Select a built-in covariance estimator.
    pub fn variance(mut self, method: VarianceMethod) -> Self {
        self.options_builder = self.options_builder.variance(method);
        self
    }

    /// Use a custom covariance estimator instead of the built-in ones.
    pub fn variance_estimator(mut self, estimator: impl VarianceEstimator + 'static) -> Self {
        self.variance_estimator = Some(Arc::new(estimator));
        self
    }

    /// Set the starting coefficients.
    pub fn start(mut self, start: Vec<f64>) -> Self {
        self.options_builder = self.options_builder.start(start);
        self
    }

    /// Set the maximum number of solver iterations.
    pub fn max_iterations(mut self, max_iter: usize) -> Self {
        self.options_builder = self.options_builder.max_iterations(max_iter);
        self
    }

    /// Set the convergence tolerance.
    pub fn tolerance(mut self, tol: f64) -> Self {
        self.options_builder = self.options_builder.tolerance(tol);
        self
    }

    /// Set the rank tolerance used when inverting.
    pub fn rank_tolerance(mut self, tol: f64) -> Self {
        self.options_builder = self.options_builder.rank_tolerance(tol);
        self
    }

    /// Set the number of pairs per design batch.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.options_builder = self.options_builder.batch_size(size);
        self
    }

    /// Set the confidence level for intervals.
    pub fn confidence_level(mut self, level: f64) -> Self {
        self.options_builder = self.options_builder.confidence_level(level);
        self
    }

    /// Build the regressor. Options are validated when fitting.
    pub fn build(self) -> PimRegressor {
        PimRegressor {
            options: self.options_builder.build_unchecked(),
            variance_estimator: self.variance_estimator,
        }
    }
}

/// A fitted probabilistic index model.
///
/// The design matrix and response are dropped after fitting unless the
/// regressor was built with `keep_data(true)`; [`FittedPim::reconstruct`]
/// rebuilds them from the stored model and poset.
#[derive(Debug, Clone)]
pub struct FittedPim {
    coefficients: Col<f64>,
    coefficient_names: Vec<String>,
    vcov: Mat<f64>,
    fitted_values: Col<f64>,
    link: PimLink,
    model: ModelMode,
    n_observations: usize,
    spec: Arc<CompiledSpec>,
    poset: Arc<Poset>,
    na_info: NaInfo,
    design_matrix: Mat<f64>,
    response: Col<f64>,
    iterations: usize,
    residual_norm: f64,
    variance_method: &'static str,
    confidence_level: f64,
    batch_size: usize,
}

impl FittedPim {
    pub fn coefficients(&self) -> &Col<f64> {
        &self.coefficients
    }

    /// Term names in coefficient order.
    pub fn coefficient_names(&self) -> &[String] {
        &self.coefficient_names
    }

    /// Coefficient of the term called `name`.
    pub fn coefficient(&self, name: &str) -> Option<f64> {
        self.coefficient_names
            .iter()
            .position(|n| n == name)
            .map(|j| self.coefficients[j])
    }

    /// Covariance matrix of the coefficients.
    pub fn vcov(&self) -> &Mat<f64> {
        &self.vcov
    }

    /// Fitted probabilistic indices, one per pair.
    pub fn fitted_values(&self) -> &Col<f64> {
        &self.fitted_values
    }

    pub fn link(&self) -> PimLink {
        self.link
    }

    /// Model mode after marker detection.
    pub fn model(&self) -> ModelMode {
        self.model
    }

    /// Observations used in the fit (after NA handling).
    pub fn n_observations(&self) -> usize {
        self.n_observations
    }

    /// Number of pseudo-observations.
    pub fn n_pairs(&self) -> usize {
        self.poset.len()
    }

    pub fn spec(&self) -> &Arc<CompiledSpec> {
        &self.spec
    }

    pub fn poset(&self) -> &Arc<Poset> {
        &self.poset
    }

    /// Rows dropped or kept by NA handling.
    pub fn na_info(&self) -> &NaInfo {
        &self.na_info
    }

    /// Design matrix, `0 × p` unless kept.
    pub fn design_matrix(&self) -> &Mat<f64> {
        &self.design_matrix
    }

    /// Pseudo-response, empty unless kept.
    pub fn response(&self) -> &Col<f64> {
        &self.response
    }

    pub fn has_data(&self) -> bool {
        self.design_matrix.nrows() == self.poset.len()
    }

    /// Solver iterations; 0 for the closed-form identity fit.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// A returned model always solved its estimating equations.
    pub fn converged(&self) -> bool {
        true
    }

    /// `max |U(β)| / N` at the solution.
    pub fn residual_norm(&self) -> f64 {
        self.residual_norm
    }

    /// Name of the covariance estimator used.
    pub fn variance_method(&self) -> &'static str {
        self.variance_method
    }

    pub fn confidence_level(&self) -> f64 {
        self.confidence_level
    }

    /// Rebuild the design matrix and response from `data`, which must be
    /// the dataset the model was fitted on.
    pub fn reconstruct(&self, data: &Dataset) -> Result<(Mat<f64>, Col<f64>), PimError> {
        if data.n_rows() != self.na_info.n_original {
            return Err(PimError::DimensionMismatch {
                what: "dataset rows vs fitted observations",
                expected: self.na_info.n_original,
                got: data.n_rows(),
            });
        }
        let clean = if self.na_info.has_removed() {
            data.select_rows(&self.na_info.kept_indices)
        } else {
            data.clone()
        };
        let env = PseudoEnvironment::new(&clean, &self.poset)?;
        DesignBuilder::new(&self.spec, &env).materialize(self.batch_size)
    }

    pub fn std_errors(&self) -> Col<f64> {
        CoefficientInference::standard_errors(&self.vcov)
    }

    /// Wald statistics `β / SE`.
    pub fn z_values(&self) -> Col<f64> {
        CoefficientInference::z_statistics(&self.coefficients, &self.std_errors())
    }

    /// Two-sided normal p-values.
    pub fn p_values(&self) -> Col<f64> {
        CoefficientInference::p_values(&self.z_values())
    }

    /// Wald confidence intervals at `level`.
    pub fn confint(&self, level: f64) -> Result<(Col<f64>, Col<f64>), PimError> {
        if !(level > 0.0 && level < 1.0) {
            return Err(OptionsError::InvalidConfidenceLevel(level).into());
        }
        Ok(CoefficientInference::confidence_intervals(
            &self.coefficients,
            &self.std_errors(),
            level,
        ))
    }

    /// Predict the probabilistic index for pairs of rows in `data`.
    ///
    /// Pairs are enumerated from `comparison` over the rows of `data` in the
    /// usual order. Missing predictor values yield NaN predictions. Intervals
    /// use the fitted confidence level; on the response scale they are the
    /// link-scale interval mapped through `g⁻¹`.
    pub fn predict(
        &self,
        data: &Dataset,
        comparison: &Comparison,
        prediction_type: PredictionType,
    ) -> Result<PredictionResult, PimError> {
        CompiledSpec::check_variables(&self.spec.predictor_variables(), data)?;
        let poset = Poset::build(data.n_rows(), comparison)?;
        let env = PseudoEnvironment::new(data, &poset)?;
        let x = DesignBuilder::new(&self.spec, &env).materialize_predictors(self.batch_size)?;

        let n = x.nrows();
        let p = x.ncols();
        let eta = &x * &self.coefficients;
        let se_eta = Col::from_fn(n, |r| {
            let mut var = 0.0;
            for j in 0..p {
                for k in 0..p {
                    var += x[(r, j)] * self.vcov[(j, k)] * x[(r, k)];
                }
            }
            var.max(0.0).sqrt()
        });
        let z = CoefficientInference::critical_value(self.confidence_level);

        let result = match prediction_type {
            PredictionType::Link => PredictionResult::with_intervals(
                eta.clone(),
                Col::from_fn(n, |r| eta[r] - z * se_eta[r]),
                Col::from_fn(n, |r| eta[r] + z * se_eta[r]),
                se_eta,
            ),
            PredictionType::Response => {
                let link = self.link;
                PredictionResult::with_intervals(
                    Col::from_fn(n, |r| link.link_inverse(eta[r])),
                    Col::from_fn(n, |r| link.link_inverse(eta[r] - z * se_eta[r])),
                    Col::from_fn(n, |r| link.link_inverse(eta[r] + z * se_eta[r])),
                    Col::from_fn(n, |r| link.link_inverse_derivative(eta[r]).abs() * se_eta[r]),
                )
            }
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn small_data() -> Dataset {
        Dataset::from_columns([
            ("x", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            ("y", vec![2.0, 1.0, 4.0, 3.0, 6.0, 5.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_fit_identity_difference_model() {
        let fitted = PimRegressor::builder()
            .link(PimLink::Identity)
            .build()
            .fit("y ~ x", &small_data())
            .unwrap();

        assert_eq!(fitted.coefficient_names(), &["x".to_string()]);
        assert_eq!(fitted.n_observations(), 6);
        assert_eq!(fitted.n_pairs(), 15);
        assert_eq!(fitted.iterations(), 0);
        assert!(fitted.converged());
        assert!(fitted.residual_norm() < 1e-10);
        assert!(fitted.coefficient("x").is_some());
        assert!(fitted.coefficient("z").is_none());
    }

    #[test]
    fn test_data_dropped_by_default() {
        let fitted = PimRegressor::builder()
            .build()
            .fit("y ~ x", &small_data())
            .unwrap();
        assert_eq!(fitted.design_matrix().nrows(), 0);
        assert_eq!(fitted.design_matrix().ncols(), 1);
        assert_eq!(fitted.response().nrows(), 0);
        assert!(!fitted.has_data());
        assert_eq!(fitted.fitted_values().nrows(), 15);
    }

    #[test]
    fn test_invalid_options_rejected_at_fit() {
        let result = PimRegressor::builder()
            .tolerance(-1.0)
            .build()
            .fit("y ~ x", &small_data());
        assert!(matches!(result, Err(PimError::InvalidOptions(_))));
    }

    #[test]
    fn test_start_length_checked() {
        let result = PimRegressor::builder()
            .start(vec![0.0, 0.0])
            .build()
            .fit("y ~ x", &small_data());
        assert!(matches!(
            result,
            Err(PimError::InvalidOptions(OptionsError::StartLengthMismatch {
                expected: 1,
                got: 2
            }))
        ));
    }

    #[test]
    fn test_regular_mode_unsupported() {
        let result = PimRegressor::builder()
            .model(ModelMode::Regular)
            .build()
            .fit("y ~ x", &small_data());
        assert!(matches!(
            result,
            Err(PimError::UnsupportedModel(ModelMode::Regular))
        ));
    }

    #[test]
    fn test_predict_link_and_response() {
        let fitted = PimRegressor::builder()
            .build()
            .fit("y ~ x", &small_data())
            .unwrap();
        let new = Dataset::from_columns([("x", vec![0.0, 1.0])]).unwrap();

        let link = fitted
            .predict(&new, &Comparison::Unique, PredictionType::Link)
            .unwrap();
        assert_eq!(link.len(), 1);
        assert_relative_eq!(link.fit[0], fitted.coefficients()[0], epsilon = 1e-12);
        assert!(link.lower[0] <= link.fit[0] && link.fit[0] <= link.upper[0]);

        let resp = fitted
            .predict(&new, &Comparison::Unique, PredictionType::Response)
            .unwrap();
        assert_relative_eq!(
            resp.fit[0],
            PimLink::Logit.link_inverse(link.fit[0]),
            epsilon = 1e-12
        );
        assert!(resp.lower[0] <= resp.fit[0] && resp.fit[0] <= resp.upper[0]);
    }

    #[test]
    fn test_confint_level_validated() {
        let fitted = PimRegressor::builder()
            .build()
            .fit("y ~ x", &small_data())
            .unwrap();
        assert!(fitted.confint(0.9).is_ok());
        assert!(matches!(
            fitted.confint(0.0),
            Err(PimError::InvalidOptions(OptionsError::InvalidConfidenceLevel(_)))
        ));
    }
}
