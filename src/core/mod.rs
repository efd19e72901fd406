//! Core types for probabilistic index models.

mod dataset;
mod link;
mod na_action;
mod options;
mod poset;
mod prediction;

pub use dataset::Dataset;
pub use link::PimLink;
pub use na_action::{NaAction, NaError, NaHandler, NaInfo, NaResult};
pub use options::{OptionsError, PimOptions, PimOptionsBuilder, SolverBackend};
pub use poset::{Comparison, Poset};
pub use prediction::{PredictionResult, PredictionType};
