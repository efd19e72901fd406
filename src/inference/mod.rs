//! Statistical inference (covariance estimation, standard errors, p-values,
//! confidence intervals).

mod coefficient;
mod variance;

pub use coefficient::CoefficientInference;
pub use variance::{
    SandwichVariance, ScoreVariance, VarianceEstimator, VarianceInput, VarianceMethod,
};
