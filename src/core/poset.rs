//! Comparison pairs (the poset) of a probabilistic index model.
//!
//! Every pseudo-observation of a PIM compares a left observation `i` with a
//! right observation `j`. A [`Poset`] stores those pairs in a fixed order;
//! design-matrix row `k` always belongs to pair `k`.

use crate::core::NaInfo;
use crate::formula::SpecError;

/// Which pairs of observations are compared.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Comparison {
    /// Every pair `(i, j)` with `i < j`, `n(n-1)/2` pairs.
    #[default]
    Unique,
    /// Every ordered pair `(i, j)` with `i != j`, `n(n-1)` pairs.
    All,
    /// Caller-supplied pairs, kept as given (no deduplication).
    Pairs(Vec<(usize, usize)>),
}

impl Comparison {
    /// Validate explicit pairs against `n` observations.
    pub fn validate(&self, n: usize) -> Result<(), SpecError> {
        if let Comparison::Pairs(pairs) = self {
            for (position, &(left, right)) in pairs.iter().enumerate() {
                if left >= n || right >= n {
                    return Err(SpecError::PairOutOfRange {
                        position,
                        left,
                        right,
                        n,
                    });
                }
                if left == right {
                    return Err(SpecError::SelfComparison {
                        position,
                        index: left,
                    });
                }
            }
        }
        Ok(())
    }

    /// Translate explicit pairs from original row indices to the rows kept
    /// after NA handling. Pairs touching a removed row are dropped whole.
    pub fn remap(&self, na_info: &NaInfo) -> Result<Comparison, SpecError> {
        self.validate(na_info.n_original)?;

        match self {
            Comparison::Pairs(pairs) if na_info.has_removed() => {
                let kept: Vec<(usize, usize)> = pairs
                    .iter()
                    .filter_map(|&(i, j)| Some((na_info.clean_index(i)?, na_info.clean_index(j)?)))
                    .collect();

                if kept.len() < pairs.len() {
                    log::debug!(
                        "dropped {} comparison pairs touching observations with missing values",
                        pairs.len() - kept.len()
                    );
                }
                Ok(Comparison::Pairs(kept))
            }
            other => Ok(other.clone()),
        }
    }
}

/// Ordered list of comparison pairs over `n_observations` observations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poset {
    left: Vec<usize>,
    right: Vec<usize>,
    n_observations: usize,
}

impl Poset {
    /// Enumerate the pairs for `n` observations under `comparison`.
    ///
    /// Generated pairs come out in row-major order; explicit pairs keep the
    /// order they were given in.
    ///
    /// # Errors
    ///
    /// - `SpecError::TooFewObservations` if `n < 2`
    /// - `SpecError::PairOutOfRange` / `SpecError::SelfComparison` for bad explicit pairs
    /// - `SpecError::EmptyPoset` if an explicit list is empty
    pub fn build(n: usize, comparison: &Comparison) -> Result<Poset, SpecError> {
        if n < 2 {
            return Err(SpecError::TooFewObservations { n });
        }

        let (left, right) = match comparison {
            Comparison::Unique => {
                let size = n * (n - 1) / 2;
                let mut left = Vec::with_capacity(size);
                let mut right = Vec::with_capacity(size);
                for i in 0..n {
                    for j in (i + 1)..n {
                        left.push(i);
                        right.push(j);
                    }
                }
                (left, right)
            }
            Comparison::All => {
                let size = n * (n - 1);
                let mut left = Vec::with_capacity(size);
                let mut right = Vec::with_capacity(size);
                for i in 0..n {
                    for j in (0..n).filter(|&j| j != i) {
                        left.push(i);
                        right.push(j);
                    }
                }
                (left, right)
            }
            Comparison::Pairs(pairs) => {
                comparison.validate(n)?;
                if pairs.is_empty() {
                    return Err(SpecError::EmptyPoset);
                }
                pairs.iter().copied().unzip()
            }
        };

        Ok(Poset {
            left,
            right,
            n_observations: n,
        })
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Number of observations the indices refer to.
    pub fn n_observations(&self) -> usize {
        self.n_observations
    }

    /// Left member index of every pair.
    pub fn left(&self) -> &[usize] {
        &self.left
    }

    /// Right member index of every pair.
    pub fn right(&self) -> &[usize] {
        &self.right
    }

    /// Pair `k` as `(left, right)`.
    pub fn pair(&self, k: usize) -> (usize, usize) {
        (self.left[k], self.right[k])
    }

    /// Iterate over all pairs in order.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.left.iter().copied().zip(self.right.iter().copied())
    }

    /// For each observation, the pair rows it takes part in.
    ///
    /// A pair listed twice appears twice; a row is listed once per member.
    pub fn rows_by_observation(&self) -> Vec<Vec<usize>> {
        let mut rows = vec![Vec::new(); self.n_observations];
        for (k, (i, j)) in self.pairs().enumerate() {
            rows[i].push(k);
            rows[j].push(k);
        }
        rows
    }
}
