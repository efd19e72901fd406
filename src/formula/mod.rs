//! Model formulas: parsing, the typed term tree and model-mode compilation.

mod ast;
mod compiler;
mod error;
mod parser;

pub use ast::{BinaryOp, Expr, FrameUsage, MathFn, Side};
pub use compiler::{CompiledSpec, CompiledTerm, ModelMode, INTERCEPT};
pub use error::SpecError;
pub use parser::{FormulaParser, ParsedFormula, ParsedTerm};
