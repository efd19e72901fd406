//! Prediction types for fitted PIMs.

use faer::Col;

/// Scale on which predictions are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PredictionType {
    /// Linear predictor η = xᵀβ.
    Link,
    /// Probabilistic index g⁻¹(η).
    #[default]
    Response,
}

/// Result of prediction with confidence intervals.
#[derive(Debug, Clone)]
pub struct PredictionResult {
    /// Point predictions, one per comparison pair.
    pub fit: Col<f64>,
    /// Lower bounds of the interval.
    pub lower: Col<f64>,
    /// Upper bounds of the interval.
    pub upper: Col<f64>,
    /// Standard errors on the requested scale.
    pub se: Col<f64>,
}

impl PredictionResult {
    /// Create a new prediction result with intervals.
    pub fn with_intervals(fit: Col<f64>, lower: Col<f64>, upper: Col<f64>, se: Col<f64>) -> Self {
        Self {
            fit,
            lower,
            upper,
            se,
        }
    }

    /// Number of predictions.
    pub fn len(&self) -> usize {
        self.fit.nrows()
    }

    /// Returns true if there are no predictions.
    pub fn is_empty(&self) -> bool {
        self.fit.nrows() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_result_len() {
        let fit = Col::from_fn(3, |i| i as f64);
        let result = PredictionResult::with_intervals(
            fit.clone(),
            Col::zeros(3),
            Col::zeros(3),
            Col::zeros(3),
        );
        assert_eq!(result.len(), 3);
        assert!(!result.is_empty());
    }

    #[test]
    fn test_prediction_type_default() {
        assert_eq!(PredictionType::default(), PredictionType::Response);
    }
}
