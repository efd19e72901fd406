//! Left/right value frames over a poset.
//!
//! For a variable `x` and pair `k = (i, j)`, the left frame holds `x[i]` and
//! the right frame holds `x[j]`. Expressions are evaluated over a contiguous
//! range of pairs so that large posets can be processed in batches.

use crate::core::{Dataset, Poset};
use crate::formula::{Expr, Side, SpecError};
use crate::solvers::PimError;
use std::ops::Range;

/// Comparison indicator: 1 if `a < b`, 0 if `a > b`, 0.5 on ties.
///
/// NaN in either argument gives NaN.
#[inline]
pub fn probabilistic_index(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a < b {
        1.0
    } else if a > b {
        0.0
    } else {
        0.5
    }
}

/// Signed comparison indicator: 1 if `a < b`, -1 if `a > b`, 0 on ties.
///
/// NaN in either argument gives NaN.
#[inline]
pub fn signed_index(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a < b {
        1.0
    } else if a > b {
        -1.0
    } else {
        0.0
    }
}

/// A dataset seen through a poset.
#[derive(Debug, Clone, Copy)]
pub struct PseudoEnvironment<'a> {
    data: &'a Dataset,
    poset: &'a Poset,
}

impl<'a> PseudoEnvironment<'a> {
    /// Bind `data` to `poset`.
    ///
    /// Fails with `DimensionMismatch` if the poset was built for a different
    /// number of observations.
    pub fn new(data: &'a Dataset, poset: &'a Poset) -> Result<Self, PimError> {
        if data.n_rows() != poset.n_observations() {
            return Err(PimError::DimensionMismatch {
                what: "dataset rows vs poset observations",
                expected: poset.n_observations(),
                got: data.n_rows(),
            });
        }
        Ok(Self { data, poset })
    }

    /// Number of pseudo-observations.
    pub fn len(&self) -> usize {
        self.poset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poset.is_empty()
    }

    pub fn poset(&self) -> &'a Poset {
        self.poset
    }

    pub fn data(&self) -> &'a Dataset {
        self.data
    }

    /// Values of `variable` on one side of every pair.
    pub fn frame(&self, variable: &str, side: Side) -> Result<Vec<f64>, PimError> {
        self.gather(variable, side, 0..self.len())
    }

    /// Left and right values of `variable` for every pair.
    pub fn frames(&self, variable: &str) -> Result<(Vec<f64>, Vec<f64>), PimError> {
        Ok((
            self.frame(variable, Side::Left)?,
            self.frame(variable, Side::Right)?,
        ))
    }

    /// Evaluate `expr` for every pair.
    pub fn evaluate(&self, expr: &Expr) -> Result<Vec<f64>, PimError> {
        self.evaluate_rows(expr, 0..self.len())
    }

    /// Evaluate `expr` for the pairs in `rows`.
    ///
    /// The result has one value per pair in `rows`.
    pub fn evaluate_rows(&self, expr: &Expr, rows: Range<usize>) -> Result<Vec<f64>, PimError> {
        if rows.end > self.len() || rows.start > rows.end {
            return Err(PimError::DimensionMismatch {
                what: "requested pair rows vs poset length",
                expected: self.len(),
                got: rows.end,
            });
        }
        let values = self.eval(expr, None, &rows)?;
        check_len(&values, rows.len())?;
        Ok(values)
    }

    fn gather(&self, variable: &str, side: Side, rows: Range<usize>) -> Result<Vec<f64>, PimError> {
        let column = self
            .data
            .column(variable)
            .ok_or_else(|| SpecError::UnknownVariable {
                variable: variable.to_string(),
                available: self.data.names().to_vec(),
            })?;
        let index = match side {
            Side::Left => &self.poset.left()[rows],
            Side::Right => &self.poset.right()[rows],
        };
        Ok(index.iter().map(|&i| column[i]).collect())
    }

    fn eval(&self, expr: &Expr, side: Option<Side>, rows: &Range<usize>) -> Result<Vec<f64>, PimError> {
        let n = rows.len();
        match expr {
            Expr::Variable(name) => match side {
                Some(side) => self.gather(name, side, rows.clone()),
                None => Err(SpecError::UnwrappedVariable {
                    variable: name.clone(),
                    term: expr.to_string(),
                }
                .into()),
            },
            Expr::Number(v) => Ok(vec![*v; n]),
            Expr::Negate(inner) => {
                let mut values = self.eval(inner, side, rows)?;
                values.iter_mut().for_each(|v| *v = -*v);
                Ok(values)
            }
            Expr::Binary { op, lhs, rhs } => {
                let a = self.eval(lhs, side, rows)?;
                let b = self.eval(rhs, side, rows)?;
                zip_with(&a, &b, |x, y| op.apply(x, y))
            }
            Expr::Function { func, arg } => {
                let mut values = self.eval(arg, side, rows)?;
                values.iter_mut().for_each(|v| *v = func.apply(*v));
                Ok(values)
            }
            Expr::Left(inner) => self.eval(inner, Some(Side::Left), rows),
            Expr::Right(inner) => self.eval(inner, Some(Side::Right), rows),
            Expr::Compare(a, b) => {
                let a = self.eval(a, side, rows)?;
                let b = self.eval(b, side, rows)?;
                zip_with(&a, &b, probabilistic_index)
            }
            Expr::SignedCompare(a, b) => {
                let a = self.eval(a, side, rows)?;
                let b = self.eval(b, side, rows)?;
                zip_with(&a, &b, signed_index)
            }
            Expr::Literal(inner) => self.eval(inner, side, rows),
        }
    }
}

fn zip_with(a: &[f64], b: &[f64], f: impl Fn(f64, f64) -> f64) -> Result<Vec<f64>, PimError> {
    check_len(b, a.len())?;
    Ok(a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect())
}

fn check_len(values: &[f64], expected: usize) -> Result<(), PimError> {
    if values.len() != expected {
        return Err(PimError::DimensionMismatch {
            what: "term values vs pair rows",
            expected,
            got: values.len(),
        });
    }
    Ok(())
}
