//! Probabilistic index models (PIMs).
//!
//! A PIM is a semiparametric regression model for pairs of observations. Its
//! response is the probabilistic index `P(Y_i ≼ Y_j)`, linked to covariates
//! of both members of the pair. This crate enumerates the compared pairs,
//! compiles a formula that may address the left and right member of each
//! pair, solves the estimating equations and estimates a covariance matrix
//! that accounts for pairs sharing observations.
//!
//! # Example
//!
//! ```
//! use pim::prelude::*;
//!
//! let data = Dataset::new()
//!     .with_column("x", vec![0.5, 1.0, 1.7, 2.4, 3.1, 3.3, 4.0, 4.8])?
//!     .with_column("y", vec![1.2, 0.7, 2.5, 1.9, 3.6, 2.8, 4.4, 3.9])?;
//!
//! let fitted = PimRegressor::builder()
//!     .link(PimLink::Logit)
//!     .comparison(Comparison::Unique)
//!     .build()
//!     .fit("y ~ x", &data)?;
//!
//! assert_eq!(fitted.coefficient_names(), &["x".to_string()]);
//! assert!(fitted.coefficient("x").unwrap() > 0.0);
//! # Ok::<(), pim::PimError>(())
//! ```
//!
//! Formulas follow the usual `response ~ terms` syntax. `L(e)` and `R(e)`
//! evaluate `e` for the left and right member of a pair, `PO(a, b)` is the
//! comparison indicator and `P(a, b)` its signed version. Using any of these
//! switches the model to [`ModelMode::Customized`]:
//!
//! ```text
//! PO(L(y), R(y)) ~ I(R(x) - L(x)) + R(z)
//! ```

pub mod core;
pub mod design;
pub mod formula;
pub mod inference;
pub mod solvers;
pub mod utils;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{
        Comparison, Dataset, NaAction, NaError, NaHandler, NaInfo, OptionsError, PimLink,
        PimOptions, PimOptionsBuilder, Poset, PredictionResult, PredictionType, SolverBackend,
    };
    pub use crate::design::{DesignBuilder, PseudoEnvironment};
    pub use crate::formula::{CompiledSpec, Expr, ModelMode, SpecError};
    pub use crate::inference::{
        SandwichVariance, ScoreVariance, VarianceEstimator, VarianceInput, VarianceMethod,
    };
    pub use crate::solvers::{FittedPim, PimError, PimRegressor, PimRegressorBuilder};
}

pub use crate::core::{
    Comparison, Dataset, NaAction, PimLink, PimOptions, PimOptionsBuilder, Poset,
    PredictionResult, PredictionType, SolverBackend,
};
pub use crate::formula::{CompiledSpec, ModelMode, SpecError};
pub use crate::inference::{VarianceEstimator, VarianceMethod};
pub use crate::solvers::{FittedPim, PimError, PimRegressor, PimRegressorBuilder};
