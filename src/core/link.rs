//! Link functions for probabilistic index models.
//!
//! A PIM relates the probabilistic index `P(Y_i ≼ Y_j | X_i, X_j)` to a linear
//! predictor through a monotone link. Only the inverse link and its
//! derivative enter the estimating equations, so those are what this module
//! exposes.

use statrs::function::erf::erf;
use std::f64::consts::{FRAC_1_SQRT_2, PI};
use std::fmt;

/// Link function of a probabilistic index model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PimLink {
    /// Logit link (default): μ = 1 / (1 + exp(-η))
    #[default]
    Logit,
    /// Probit link: μ = Φ(η) where Φ is the standard normal CDF
    Probit,
    /// Identity link: μ = η
    Identity,
}

impl PimLink {
    /// Short identifier used in term labels and log messages.
    pub fn name(&self) -> &'static str {
        match self {
            PimLink::Logit => "logit",
            PimLink::Probit => "probit",
            PimLink::Identity => "identity",
        }
    }

    /// Whether the estimating equations are linear in β for this link.
    pub fn is_linear(&self) -> bool {
        matches!(self, PimLink::Identity)
    }

    /// Compute the inverse link function g⁻¹(η) = μ.
    #[inline]
    pub fn link_inverse(&self, eta: f64) -> f64 {
        match self {
            PimLink::Logit => {
                // Numerically stable for large |η|
                if eta >= 0.0 {
                    1.0 / (1.0 + (-eta).exp())
                } else {
                    let e = eta.exp();
                    e / (1.0 + e)
                }
            }
            PimLink::Probit => standard_normal_cdf(eta),
            PimLink::Identity => eta,
        }
    }

    /// Compute derivative of inverse link function dμ/dη.
    #[inline]
    pub fn link_inverse_derivative(&self, eta: f64) -> f64 {
        match self {
            PimLink::Logit => {
                // μ(1-μ)
                let mu = self.link_inverse(eta);
                mu * (1.0 - mu)
            }
            PimLink::Probit => standard_normal_pdf(eta),
            PimLink::Identity => 1.0,
        }
    }
}

impl fmt::Display for PimLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Standard normal CDF Φ(x).
#[inline]
fn standard_normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x * FRAC_1_SQRT_2))
}

/// Standard normal PDF φ(x) = exp(-x²/2) / √(2π)
#[inline]
fn standard_normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}
