//! Cluster-aware covariance of PIM coefficients.
//!
//! Pseudo-observations sharing an original observation are dependent, so
//! both estimators aggregate row scores per observation before forming
//! outer products. For observation `k`,
//!
//! ```text
//! S_k = Σ_{r touches k} x_r (y_r − μ_r)
//! B   = Σ_r w_r x_r x_rᵀ,    w_r = dμ/dη
//! ```
//!
//! - sandwich: `V = B⁻¹ (Σ_k S_k S_kᵀ) B⁻¹`
//! - score:    `V = Σ_k Δ_k Δ_kᵀ` with `Δ_k = (B − B_k)⁻¹ S_k`, where
//!   `B_k` is the information of the rows touching `k`
//!
//! Results are symmetrized before they are returned.

use crate::core::{PimLink, Poset};
use crate::solvers::{EstimatingEquations, PimError};
use crate::utils::{add_outer, congruence, invert, symmetrize};
use faer::{Col, Mat};
use rayon::prelude::*;
use std::fmt;

/// Everything a covariance estimator may need from a fit.
#[derive(Debug, Clone, Copy)]
pub struct VarianceInput<'a> {
    /// Design matrix, one row per pair.
    pub x: &'a Mat<f64>,
    /// Pseudo-responses.
    pub y: &'a Col<f64>,
    pub coefficients: &'a Col<f64>,
    /// `g⁻¹(Xβ)`.
    pub fitted: &'a Col<f64>,
    pub poset: &'a Poset,
    /// Number of original observations.
    pub n_observations: usize,
    pub link: PimLink,
    /// Relative pivot threshold for the inversions.
    pub rank_tolerance: f64,
}

impl VarianceInput<'_> {
    fn check(&self) -> Result<(), PimError> {
        let n = self.x.nrows();
        let p = self.x.ncols();
        for (what, got, expected) in [
            ("response length vs design rows", self.y.nrows(), n),
            ("fitted length vs design rows", self.fitted.nrows(), n),
            ("poset length vs design rows", self.poset.len(), n),
            ("coefficients vs design columns", self.coefficients.nrows(), p),
            (
                "poset observations vs sample size",
                self.poset.n_observations(),
                self.n_observations,
            ),
        ] {
            if got != expected {
                return Err(PimError::DimensionMismatch {
                    what,
                    expected,
                    got,
                });
            }
        }
        Ok(())
    }

    fn equations(&self) -> Result<EstimatingEquations<'_>, PimError> {
        EstimatingEquations::new(self.x, self.y, self.link)
    }

    /// `S_k` for every observation, in observation order.
    fn observation_scores(&self, rows_by_obs: &[Vec<usize>]) -> Vec<Col<f64>> {
        let p = self.x.ncols();
        rows_by_obs
            .par_iter()
            .map(|rows| {
                let mut s = Col::zeros(p);
                for &r in rows {
                    let resid = self.y[r] - self.fitted[r];
                    for j in 0..p {
                        s[j] += self.x[(r, j)] * resid;
                    }
                }
                s
            })
            .collect()
    }
}

/// A covariance estimator for fitted PIM coefficients.
pub trait VarianceEstimator: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Return the `p × p` covariance matrix of the coefficients.
    fn estimate(&self, input: &VarianceInput<'_>) -> Result<Mat<f64>, PimError>;
}

/// Sandwich estimator with observation-level clustering of the scores.
#[derive(Debug, Clone, Copy, Default)]
pub struct SandwichVariance;

impl VarianceEstimator for SandwichVariance {
    fn name(&self) -> &'static str {
        "sandwich"
    }

    fn estimate(&self, input: &VarianceInput<'_>) -> Result<Mat<f64>, PimError> {
        input.check()?;
        let p = input.x.ncols();
        let eq = input.equations()?;

        let bread = eq.information(input.coefficients);
        let bread_inv = invert(&bread, input.rank_tolerance)?;

        let scores = input.observation_scores(&input.poset.rows_by_observation());
        let mut meat = Mat::zeros(p, p);
        for s in &scores {
            add_outer(&mut meat, s, 1.0);
        }

        let mut v = congruence(&bread_inv, &meat);
        symmetrize(&mut v);
        Ok(v)
    }
}

/// One-step leave-one-observation-out perturbation estimator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreVariance;

impl VarianceEstimator for ScoreVariance {
    fn name(&self) -> &'static str {
        "score"
    }

    fn estimate(&self, input: &VarianceInput<'_>) -> Result<Mat<f64>, PimError> {
        input.check()?;
        let p = input.x.ncols();
        let eq = input.equations()?;
        let beta = input.coefficients;

        let bread = eq.information(beta);
        let bread_inv = invert(&bread, input.rank_tolerance)?;

        let rows_by_obs = input.poset.rows_by_observation();
        let scores = input.observation_scores(&rows_by_obs);

        let shifts: Vec<(Col<f64>, bool)> = rows_by_obs
            .par_iter()
            .zip(scores.par_iter())
            .map(|(rows, s)| {
                let mut reduced = bread.clone();
                let mut local = Mat::zeros(p, p);
                for &r in rows {
                    eq.add_row_information(r, beta, &mut local);
                }
                for i in 0..p {
                    for j in 0..p {
                        reduced[(i, j)] -= local[(i, j)];
                    }
                }
                match invert(&reduced, input.rank_tolerance) {
                    Ok(inv) => (&inv * s, false),
                    Err(_) => (&bread_inv * s, true),
                }
            })
            .collect();

        let n_fallback = shifts.iter().filter(|(_, fell_back)| *fell_back).count();
        if n_fallback > 0 {
            log::warn!(
                "score variance: information without {} of {} observations is singular; \
                 used the full information for those",
                n_fallback,
                shifts.len()
            );
        }

        let mut v = Mat::zeros(p, p);
        for (delta, _) in &shifts {
            add_outer(&mut v, delta, 1.0);
        }
        symmetrize(&mut v);
        Ok(v)
    }
}

/// Built-in covariance estimators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VarianceMethod {
    #[default]
    Sandwich,
    Score,
}

impl VarianceEstimator for VarianceMethod {
    fn name(&self) -> &'static str {
        match self {
            VarianceMethod::Sandwich => SandwichVariance.name(),
            VarianceMethod::Score => ScoreVariance.name(),
        }
    }

    fn estimate(&self, input: &VarianceInput<'_>) -> Result<Mat<f64>, PimError> {
        match self {
            VarianceMethod::Sandwich => SandwichVariance.estimate(input),
            VarianceMethod::Score => ScoreVariance.estimate(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Comparison;

    struct Fixture {
        x: Mat<f64>,
        y: Col<f64>,
        beta: Col<f64>,
        fitted: Col<f64>,
        poset: Poset,
    }

    fn fixture() -> Fixture {
        let n = 12;
        let z: Vec<f64> = (0..n).map(|i| ((i * 5) % 7) as f64 + 0.1 * i as f64).collect();
        let resp: Vec<f64> = (0..n).map(|i| z[i] + ((i * 3) % 4) as f64).collect();
        let poset = Poset::build(n, &Comparison::Unique).unwrap();

        let rows = poset.len();
        let x = Mat::from_fn(rows, 1, |r, _| {
            let (i, j) = poset.pair(r);
            z[j] - z[i]
        });
        let y = Col::from_fn(rows, |r| {
            let (i, j) = poset.pair(r);
            crate::design::probabilistic_index(resp[i], resp[j])
        });
        let beta = Col::from_fn(1, |_| 0.4);
        let fitted = EstimatingEquations::new(&x, &y, PimLink::Logit)
            .unwrap()
            .fitted(&beta);
        Fixture {
            x,
            y,
            beta,
            fitted,
            poset,
        }
    }

    fn input(f: &Fixture) -> VarianceInput<'_> {
        VarianceInput {
            x: &f.x,
            y: &f.y,
            coefficients: &f.beta,
            fitted: &f.fitted,
            poset: &f.poset,
            n_observations: f.poset.n_observations(),
            link: PimLink::Logit,
            rank_tolerance: 1e-12,
        }
    }

    #[test]
    fn test_sandwich_positive() {
        let f = fixture();
        let v = SandwichVariance.estimate(&input(&f)).unwrap();
        assert_eq!(v.nrows(), 1);
        assert!(v[(0, 0)] > 0.0);
    }

    #[test]
    fn test_score_positive() {
        let f = fixture();
        let v = ScoreVariance.estimate(&input(&f)).unwrap();
        assert!(v[(0, 0)] > 0.0);
    }

    #[test]
    fn test_method_delegates() {
        let f = fixture();
        let a = VarianceMethod::Sandwich.estimate(&input(&f)).unwrap();
        let b = SandwichVariance.estimate(&input(&f)).unwrap();
        assert_eq!(a[(0, 0)], b[(0, 0)]);
        assert_eq!(VarianceMethod::Score.name(), "score");
        assert_eq!(VarianceMethod::default(), VarianceMethod::Sandwich);
    }

    #[test]
    fn test_dimension_check() {
        let f = fixture();
        let short = Col::zeros(3);
        let mut bad = input(&f);
        bad.fitted = &short;
        assert!(matches!(
            SandwichVariance.estimate(&bad),
            Err(PimError::DimensionMismatch { .. })
        ));
    }
}
