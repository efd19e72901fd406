//! Tabular input data.
//!
//! A [`Dataset`] is a set of equally long, named numeric columns. Missing
//! values are stored as `f64::NAN`.
//!
//! # Example
//!
//! ```
//! use pim::core::Dataset;
//!
//! let data = Dataset::new()
//!     .with_column("x", vec![1.0, 2.0, 3.0])?
//!     .with_column("y", vec![2.0, 5.0, 9.0])?;
//! assert_eq!(data.n_rows(), 3);
//! assert_eq!(data.column("y"), Some(&[2.0, 5.0, 9.0][..]));
//! # Ok::<(), pim::formula::SpecError>(())
//! ```

use crate::formula::SpecError;

/// Named numeric columns of equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    n_rows: usize,
}

impl Dataset {
    /// Create an empty dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dataset from `(name, values)` pairs.
    pub fn from_columns<I, S, V>(columns: I) -> Result<Self, SpecError>
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Vec<f64>>,
    {
        let mut data = Dataset::new();
        for (name, values) in columns {
            data.push_column(name, values)?;
        }
        Ok(data)
    }

    /// Add a column, consuming and returning the dataset.
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        values: impl Into<Vec<f64>>,
    ) -> Result<Self, SpecError> {
        self.push_column(name, values)?;
        Ok(self)
    }

    /// Add a column in place.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        values: impl Into<Vec<f64>>,
    ) -> Result<(), SpecError> {
        let name = name.into();
        let values = values.into();

        if self.has_column(&name) {
            return Err(SpecError::DuplicateColumn { name });
        }
        if !self.columns.is_empty() && values.len() != self.n_rows {
            return Err(SpecError::RaggedColumn {
                name,
                expected: self.n_rows,
                got: values.len(),
            });
        }

        self.n_rows = values.len();
        self.names.push(name);
        self.columns.push(values);
        Ok(())
    }

    /// Number of rows (observations).
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// Column names in insertion order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Values of column `name`.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|j| self.columns[j].as_slice())
    }

    /// New dataset holding only `rows`, in the given order.
    ///
    /// # Panics
    ///
    /// Panics if any index is out of range.
    pub fn select_rows(&self, rows: &[usize]) -> Dataset {
        Dataset {
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|col| rows.iter().map(|&i| col[i]).collect())
                .collect(),
            n_rows: rows.len(),
        }
    }
}
