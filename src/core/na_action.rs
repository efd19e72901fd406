//! NA (missing value) handling for PIM fitting.
//!
//! Missing values are resolved on the original observations, before any
//! comparison pair is formed. Two policies exist:
//! - `Omit`: drop observations with NA in any model variable
//! - `Fail`: return an error if any model variable contains NA
//!
//! Dropping observations up front means a comparison pair is either fully
//! observed or never built.
//!
//! # Example
//!
//! ```
//! use pim::core::{Dataset, NaAction, NaHandler};
//!
//! let data = Dataset::new()
//!     .with_column("x", vec![1.0, f64::NAN, 3.0, 4.0])?
//!     .with_column("y", vec![0.5, 1.0, f64::NAN, 2.0])?;
//!
//! let vars = vec!["x".to_string(), "y".to_string()];
//! let result = NaHandler::process(&data, &vars, NaAction::Omit).unwrap();
//! assert_eq!(result.data.n_rows(), 2); // Rows 0 and 3 kept
//! # Ok::<(), pim::formula::SpecError>(())
//! ```

use crate::core::Dataset;
use thiserror::Error;

/// Action to take when missing values (NA/NaN) are encountered.
///
/// Mirrors R's `na.action` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NaAction {
    /// Remove observations containing NA values before pairs are built.
    ///
    /// Equivalent to R's `na.omit`.
    #[default]
    Omit,

    /// Return an error if any NA values are present.
    ///
    /// Equivalent to R's `na.fail`.
    Fail,
}

/// Error when NA values cannot be handled.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NaError {
    /// NA values found in input data when using `NaAction::Fail`.
    #[error("NA values found in variable '{variable}' (na.fail): {n_na} rows contain missing values")]
    NaValuesPresent { variable: String, n_na: usize },

    /// All observations were removed due to NA values.
    #[error("all observations contain NA values")]
    AllNa,
}

/// Information about NA handling applied to data.
#[derive(Debug, Clone, PartialEq)]
pub struct NaInfo {
    /// Original number of observations before NA removal.
    pub n_original: usize,

    /// Number of observations after NA removal.
    pub n_clean: usize,

    /// Indices of original rows that were kept, in order.
    pub kept_indices: Vec<usize>,

    /// Number of rows removed due to NA.
    pub n_removed: usize,

    /// The NA action that was applied.
    pub action: NaAction,
}

impl NaInfo {
    /// Check if any rows were removed.
    pub fn has_removed(&self) -> bool {
        self.n_removed > 0
    }

    /// Create NaInfo for data with no NA values.
    pub fn no_na(n_observations: usize, action: NaAction) -> Self {
        Self {
            n_original: n_observations,
            n_clean: n_observations,
            kept_indices: (0..n_observations).collect(),
            n_removed: 0,
            action,
        }
    }

    /// Map an original row index to its index in the cleaned data.
    pub fn clean_index(&self, original: usize) -> Option<usize> {
        self.kept_indices.binary_search(&original).ok()
    }
}

/// Result of NA preprocessing.
#[derive(Debug, Clone)]
pub struct NaResult {
    /// Cleaned dataset (rows with NA removed).
    pub data: Dataset,

    /// Information about the NA handling applied.
    pub na_info: NaInfo,
}

/// Handler for missing value processing.
pub struct NaHandler;

impl NaHandler {
    /// Process `data` according to `action`, looking only at `variables`.
    ///
    /// Variables that are not columns of `data` are ignored here; they are
    /// reported by the formula compiler.
    ///
    /// # Errors
    ///
    /// - `NaError::NaValuesPresent` if `action` is `Fail` and NA values exist
    /// - `NaError::AllNa` if all rows contain NA values
    pub fn process(
        data: &Dataset,
        variables: &[String],
        action: NaAction,
    ) -> Result<NaResult, NaError> {
        let n_samples = data.n_rows();

        match action {
            NaAction::Fail => {
                for variable in variables {
                    let n_na = data
                        .column(variable)
                        .map(Self::count_na)
                        .unwrap_or(0);
                    if n_na > 0 {
                        return Err(NaError::NaValuesPresent {
                            variable: variable.clone(),
                            n_na,
                        });
                    }
                }
                Ok(NaResult {
                    data: data.clone(),
                    na_info: NaInfo::no_na(n_samples, action),
                })
            }

            NaAction::Omit => {
                let na_mask = Self::find_na_rows(data, variables);
                let n_na = na_mask.iter().filter(|&&v| v).count();

                if n_na == 0 {
                    return Ok(NaResult {
                        data: data.clone(),
                        na_info: NaInfo::no_na(n_samples, action),
                    });
                }

                if n_na == n_samples {
                    return Err(NaError::AllNa);
                }

                let kept_indices: Vec<usize> = na_mask
                    .iter()
                    .enumerate()
                    .filter_map(|(i, &had_na)| if !had_na { Some(i) } else { None })
                    .collect();

                log::debug!(
                    "na.omit removed {} of {} observations before building comparisons",
                    n_na,
                    n_samples
                );

                Ok(NaResult {
                    data: data.select_rows(&kept_indices),
                    na_info: NaInfo {
                        n_original: n_samples,
                        n_clean: kept_indices.len(),
                        kept_indices,
                        n_removed: n_na,
                        action,
                    },
                })
            }
        }
    }

    /// Find rows containing NA values in any of `variables`.
    fn find_na_rows(data: &Dataset, variables: &[String]) -> Vec<bool> {
        let columns: Vec<&[f64]> = variables.iter().filter_map(|v| data.column(v)).collect();

        (0..data.n_rows())
            .map(|i| columns.iter().any(|col| col[i].is_nan()))
            .collect()
    }

    /// Count NA values in a column.
    pub fn count_na(values: &[f64]) -> usize {
        values.iter().filter(|x| x.is_nan()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn create_test_data_with_na() -> Dataset {
        // Row 2: NA in x
        // Row 3: NA in y
        // Row 4: NA in w (not a model variable)
        Dataset::from_columns([
            ("x", vec![0.0, 1.0, f64::NAN, 3.0, 4.0]),
            ("y", vec![0.0, 10.0, 20.0, f64::NAN, 40.0]),
            ("w", vec![1.0, 1.0, 1.0, 1.0, f64::NAN]),
        ])
        .unwrap()
    }

    #[test]
    fn test_na_omit() {
        let data = create_test_data_with_na();
        let result = NaHandler::process(&data, &vars(&["x", "y"]), NaAction::Omit).unwrap();

        // Should keep rows 0, 1, 4 (remove rows 2 and 3)
        assert_eq!(result.data.n_rows(), 3);
        assert_eq!(result.na_info.n_removed, 2);
        assert_eq!(result.na_info.kept_indices, vec![0, 1, 4]);
        assert_eq!(result.data.column("y"), Some(&[0.0, 10.0, 40.0][..]));
        assert!(result.na_info.has_removed());
    }

    #[test]
    fn test_na_omit_ignores_unused_columns() {
        let data = create_test_data_with_na();
        let result = NaHandler::process(&data, &vars(&["x"]), NaAction::Omit).unwrap();
        assert_eq!(result.na_info.kept_indices, vec![0, 1, 3, 4]);
    }

    #[test]
    fn test_na_fail() {
        let data = create_test_data_with_na();
        let result = NaHandler::process(&data, &vars(&["x", "y"]), NaAction::Fail);

        assert!(matches!(
            result,
            Err(NaError::NaValuesPresent { ref variable, n_na: 1 }) if variable == "x"
        ));
    }

    #[test]
    fn test_na_fail_no_na() {
        let data = create_test_data_with_na().select_rows(&[0, 1]);
        let result = NaHandler::process(&data, &vars(&["x", "y", "w"]), NaAction::Fail).unwrap();

        assert_eq!(result.data.n_rows(), 2);
        assert_eq!(result.na_info.n_removed, 0);
    }

    #[test]
    fn test_all_na() {
        let data = Dataset::from_columns([("x", vec![f64::NAN; 3])]).unwrap();
        let result = NaHandler::process(&data, &vars(&["x"]), NaAction::Omit);

        assert!(matches!(result, Err(NaError::AllNa)));
    }

    #[test]
    fn test_clean_index() {
        let data = create_test_data_with_na();
        let result = NaHandler::process(&data, &vars(&["x", "y"]), NaAction::Omit).unwrap();
        assert_eq!(result.na_info.clean_index(0), Some(0));
        assert_eq!(result.na_info.clean_index(4), Some(2));
        assert_eq!(result.na_info.clean_index(2), None);
    }

    #[test]
    fn test_na_info_no_na() {
        let info = NaInfo::no_na(10, NaAction::Omit);
        assert_eq!(info.n_original, 10);
        assert_eq!(info.n_clean, 10);
        assert_eq!(info.n_removed, 0);
        assert!(!info.has_removed());
    }

    #[test]
    fn test_na_action_default() {
        assert_eq!(NaAction::default(), NaAction::Omit);
    }
}
