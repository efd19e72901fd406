//! Coefficient inference calculations.
//!
//! PIM estimators are asymptotically normal, so all tests and intervals use
//! the standard normal distribution.

use faer::{Col, Mat};
use statrs::distribution::{ContinuousCDF, Normal};

/// Computes inference statistics for PIM coefficients.
pub struct CoefficientInference;

impl CoefficientInference {
    /// SE(β_j) = sqrt(V_jj). Negative or non-finite variances give NaN.
    pub fn standard_errors(vcov: &Mat<f64>) -> Col<f64> {
        Col::from_fn(vcov.nrows(), |j| {
            let var = vcov[(j, j)];
            if var.is_finite() && var >= 0.0 {
                var.sqrt()
            } else {
                f64::NAN
            }
        })
    }

    /// z_j = β_j / SE(β_j)
    pub fn z_statistics(coefficients: &Col<f64>, std_errors: &Col<f64>) -> Col<f64> {
        Col::from_fn(coefficients.nrows(), |j| {
            if std_errors[j].is_nan() || std_errors[j] == 0.0 {
                f64::NAN
            } else {
                coefficients[j] / std_errors[j]
            }
        })
    }

    /// Two-sided p-values, p_j = 2 P(Z > |z_j|).
    pub fn p_values(z_statistics: &Col<f64>) -> Col<f64> {
        let normal = match Normal::new(0.0, 1.0) {
            Ok(d) => d,
            Err(_) => return Col::from_fn(z_statistics.nrows(), |_| f64::NAN),
        };
        Col::from_fn(z_statistics.nrows(), |j| {
            let z = z_statistics[j];
            if z.is_nan() {
                f64::NAN
            } else {
                2.0 * normal.sf(z.abs())
            }
        })
    }

    /// Two-sided standard normal critical value for `confidence_level`.
    pub fn critical_value(confidence_level: f64) -> f64 {
        if !(confidence_level > 0.0 && confidence_level < 1.0) {
            return f64::NAN;
        }
        Normal::new(0.0, 1.0)
            .map(|d| d.inverse_cdf(1.0 - (1.0 - confidence_level) / 2.0))
            .unwrap_or(f64::NAN)
    }

    /// CI_j = β_j ± z_{α/2} SE(β_j)
    pub fn confidence_intervals(
        coefficients: &Col<f64>,
        std_errors: &Col<f64>,
        confidence_level: f64,
    ) -> (Col<f64>, Col<f64>) {
        let z_crit = Self::critical_value(confidence_level);
        let n = coefficients.nrows();
        let margin = |j: usize| z_crit * std_errors[j];
        (
            Col::from_fn(n, |j| coefficients[j] - margin(j)),
            Col::from_fn(n, |j| coefficients[j] + margin(j)),
        )
    }
}
