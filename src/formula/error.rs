//! Errors raised while parsing and validating a model specification.

use thiserror::Error;

/// Structural problems with a model formula, its variables, the dataset
/// layout or the comparison pairs.
///
/// All of these are detected before any numeric work is done.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpecError {
    /// Syntax error in the formula string.
    #[error("syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    /// The formula references a variable that is not a dataset column.
    #[error("variable '{variable}' not found in dataset; available variables: {available:?}")]
    UnknownVariable {
        variable: String,
        available: Vec<String>,
    },

    /// A customized-model term uses a variable outside `L()`/`R()`.
    #[error("variable '{variable}' in term '{term}' must be wrapped in L() or R()")]
    UnwrappedVariable { variable: String, term: String },

    /// Function name that the formula language does not know.
    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    /// Function called with the wrong number of arguments.
    #[error("function '{function}' expects {expected} argument(s), got {got}")]
    Arity {
        function: String,
        expected: &'static str,
        got: usize,
    },

    /// The response cannot be turned into a pairwise comparison.
    #[error("invalid response '{response}': {message}")]
    InvalidResponse { response: String, message: String },

    /// The formula has neither predictor terms nor an intercept.
    #[error("model has no predictor terms")]
    EmptyModel,

    /// Too few observations to form any comparison.
    #[error("at least 2 observations are needed to build comparisons, got {n}")]
    TooFewObservations { n: usize },

    /// An explicit comparison pair points outside the dataset.
    #[error("pair {position} ({left}, {right}) is out of range for {n} observations")]
    PairOutOfRange {
        position: usize,
        left: usize,
        right: usize,
        n: usize,
    },

    /// An explicit comparison pair compares an observation with itself.
    #[error("pair {position} compares observation {index} with itself")]
    SelfComparison { position: usize, index: usize },

    /// No comparison pairs remain.
    #[error("no comparison pairs remain after missing-value handling")]
    EmptyPoset,

    /// Two dataset columns share a name.
    #[error("duplicate column '{name}'")]
    DuplicateColumn { name: String },

    /// A dataset column has a different length than the others.
    #[error("column '{name}' has {got} rows, expected {expected}")]
    RaggedColumn {
        name: String,
        expected: usize,
        got: usize,
    },
}

impl SpecError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        SpecError::Syntax {
            position,
            message: message.into(),
        }
    }
}
