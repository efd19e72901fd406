//! Shared linear algebra helpers.

mod matrix;

pub use matrix::{congruence, invert, solve_square, symmetrize};
pub(crate) use matrix::add_outer;
