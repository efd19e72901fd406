//! Pseudo-observation design: paired value frames and the design matrix.

mod builder;
mod environment;

pub use builder::{DesignBatches, DesignBlock, DesignBuilder};
pub use environment::{probabilistic_index, signed_index, PseudoEnvironment};
