//! Design matrix and pseudo-response construction.
//!
//! Rows follow the poset order. Evaluation runs over contiguous blocks of
//! pairs so the temporary term vectors never exceed `batch_size` values each.

use crate::design::PseudoEnvironment;
use crate::formula::CompiledSpec;
use crate::solvers::PimError;
use faer::{Col, Mat};
use std::ops::Range;

/// Design rows and response values for a contiguous range of pairs.
#[derive(Debug, Clone)]
pub struct DesignBlock {
    /// Poset rows covered by this block.
    pub rows: Range<usize>,
    /// `rows.len() × p` slice of the design matrix.
    pub x: Mat<f64>,
    /// Pseudo-response for the same rows.
    pub y: Col<f64>,
}

/// Evaluates a compiled model over a pseudo-environment.
#[derive(Debug, Clone, Copy)]
pub struct DesignBuilder<'a> {
    spec: &'a CompiledSpec,
    env: &'a PseudoEnvironment<'a>,
}

impl<'a> DesignBuilder<'a> {
    pub fn new(spec: &'a CompiledSpec, env: &'a PseudoEnvironment<'a>) -> Self {
        Self { spec, env }
    }

    /// Number of design rows (pairs).
    pub fn n_rows(&self) -> usize {
        self.env.len()
    }

    /// Number of design columns.
    pub fn n_cols(&self) -> usize {
        self.spec.n_terms()
    }

    /// Design rows and response for the pairs in `rows`.
    pub fn block(&self, rows: Range<usize>) -> Result<DesignBlock, PimError> {
        let x = self.predictor_block(rows.clone())?;
        let response = self.env.evaluate_rows(&self.spec.response.expr, rows.clone())?;
        let y = Col::from_fn(response.len(), |i| response[i]);
        Ok(DesignBlock { rows, x, y })
    }

    /// Design rows only, for data without a response.
    pub fn predictor_block(&self, rows: Range<usize>) -> Result<Mat<f64>, PimError> {
        let n = rows.len();
        let mut x = Mat::zeros(n, self.n_cols());
        for (j, term) in self.spec.terms.iter().enumerate() {
            let values = self.env.evaluate_rows(&term.expr, rows.clone())?;
            if values.len() != n {
                return Err(PimError::DimensionMismatch {
                    what: "term values vs block rows",
                    expected: n,
                    got: values.len(),
                });
            }
            for (i, v) in values.into_iter().enumerate() {
                x[(i, j)] = v;
            }
        }
        Ok(x)
    }

    /// Iterate over the design in blocks of at most `batch_size` rows.
    pub fn batches(&self, batch_size: usize) -> DesignBatches<'a> {
        DesignBatches {
            builder: *self,
            next: 0,
            batch_size: batch_size.max(1),
        }
    }

    /// The full design matrix and response, assembled block by block.
    ///
    /// Batching bounds only the per-term temporaries; the result holds all
    /// N × p values, so peak memory is O(N·p).
    pub fn materialize(&self, batch_size: usize) -> Result<(Mat<f64>, Col<f64>), PimError> {
        let n = self.n_rows();
        let p = self.n_cols();
        let mut x = Mat::zeros(n, p);
        let mut y = Col::zeros(n);
        let mut filled = 0;

        for block in self.batches(batch_size) {
            let block = block?;
            for (bi, i) in block.rows.clone().enumerate() {
                for j in 0..p {
                    x[(i, j)] = block.x[(bi, j)];
                }
                y[i] = block.y[bi];
            }
            filled += block.rows.len();
        }

        if filled != n {
            return Err(PimError::DimensionMismatch {
                what: "design rows vs poset length",
                expected: n,
                got: filled,
            });
        }
        Ok((x, y))
    }

    /// The full design matrix without the response.
    pub fn materialize_predictors(&self, batch_size: usize) -> Result<Mat<f64>, PimError> {
        let n = self.n_rows();
        let mut x = Mat::zeros(n, self.n_cols());
        let batch_size = batch_size.max(1);
        let mut start = 0;
        while start < n {
            let end = (start + batch_size).min(n);
            let block = self.predictor_block(start..end)?;
            for i in 0..block.nrows() {
                for j in 0..block.ncols() {
                    x[(start + i, j)] = block[(i, j)];
                }
            }
            start = end;
        }
        Ok(x)
    }
}

/// Iterator returned by [`DesignBuilder::batches`].
#[derive(Debug, Clone)]
pub struct DesignBatches<'a> {
    builder: DesignBuilder<'a>,
    next: usize,
    batch_size: usize,
}

impl Iterator for DesignBatches<'_> {
    type Item = Result<DesignBlock, PimError>;

    fn next(&mut self) -> Option<Self::Item> {
        let n = self.builder.n_rows();
        if self.next >= n {
            return None;
        }
        let end = (self.next + self.batch_size).min(n);
        let rows = self.next..end;
        self.next = end;
        Some(self.builder.block(rows))
    }
}
