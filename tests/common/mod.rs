//! Common test utilities and data generators.
#![allow(dead_code)]

use pim::Dataset;

/// Install a test logger once; repeated calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Simple deterministic "random" source for reproducibility.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Uniform on (0, 1).
    pub fn uniform(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (((self.0 >> 11) as f64) + 0.5) / ((1u64 << 53) as f64)
    }

    /// Uniform on (lo, hi).
    pub fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.uniform()
    }

    /// Standard Gumbel draw. The difference of two independent draws is
    /// standard logistic.
    pub fn gumbel(&mut self) -> f64 {
        -(-self.uniform().ln()).ln()
    }

    /// Standard normal draw (Box-Muller).
    pub fn normal(&mut self) -> f64 {
        let u1 = self.uniform();
        let u2 = self.uniform();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

/// Data following a logit PIM exactly: `y = beta * x + e` with Gumbel `e`,
/// so `P(y_i < y_j) = logistic(beta * (x_j - x_i))`.
pub fn generate_logit_pim_data(n: usize, beta: f64, seed: u64) -> Dataset {
    let mut rng = Lcg::new(seed);
    let x: Vec<f64> = (0..n).map(|_| rng.range(-2.0, 2.0)).collect();
    let y: Vec<f64> = x.iter().map(|&xi| beta * xi + rng.gumbel()).collect();
    Dataset::from_columns([("x", x), ("y", y)]).expect("valid columns")
}

/// Two predictors and a continuous response with normal noise.
pub fn generate_two_predictor_data(n: usize, seed: u64) -> Dataset {
    let mut rng = Lcg::new(seed);
    let x: Vec<f64> = (0..n).map(|_| rng.range(0.0, 4.0)).collect();
    let z: Vec<f64> = (0..n).map(|_| rng.range(-1.0, 1.0)).collect();
    let y: Vec<f64> = (0..n)
        .map(|i| 0.8 * x[i] - 0.5 * z[i] + rng.normal())
        .collect();
    Dataset::from_columns([("x", x), ("z", z), ("y", y)]).expect("valid columns")
}
