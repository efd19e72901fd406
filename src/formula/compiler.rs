//! Model-mode rewriting of parsed formulas into compiled specifications.

use crate::core::Dataset;
use crate::formula::ast::{BinaryOp, Expr, FrameUsage};
use crate::formula::error::SpecError;
use crate::formula::parser::{FormulaParser, ParsedFormula};
use crate::solvers::PimError;
use std::fmt;

/// Name of the intercept column.
pub const INTERCEPT: &str = "(Intercept)";

/// How plain predictor terms are turned into pairwise terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelMode {
    /// `x` becomes `R(x) - L(x)`.
    #[default]
    Difference,
    /// `x` becomes `R(x)`.
    Marginal,
    /// Declared for completeness; compiling it fails.
    Regular,
    /// Terms are used as written with explicit `L()`/`R()` wrappers.
    Customized,
}

impl ModelMode {
    pub fn name(&self) -> &'static str {
        match self {
            ModelMode::Difference => "difference",
            ModelMode::Marginal => "marginal",
            ModelMode::Regular => "regular",
            ModelMode::Customized => "customized",
        }
    }

    fn default_intercept(&self) -> bool {
        matches!(self, ModelMode::Marginal)
    }
}

impl fmt::Display for ModelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named column definition.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTerm {
    /// Column name.
    pub name: String,
    /// Expression evaluated per comparison pair.
    pub expr: Expr,
}

impl CompiledTerm {
    fn new(name: impl Into<String>, expr: Expr) -> Self {
        Self {
            name: name.into(),
            expr,
        }
    }

    /// Frames the term reads from.
    pub fn frames(&self) -> FrameUsage {
        self.expr.frames()
    }
}

/// Fully explicit model: every variable is read in a known frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSpec {
    /// Pseudo-response, a comparison indicator.
    pub response: CompiledTerm,
    /// Design columns in order, intercept first when present.
    pub terms: Vec<CompiledTerm>,
    /// Mode actually used after marker detection.
    pub model: ModelMode,
    /// The formula as written.
    pub formula: String,
}

impl CompiledSpec {
    /// Parse `formula` and rewrite it under `mode`.
    ///
    /// A formula with any `L`, `R`, `PO` or `P` marker is compiled as
    /// [`ModelMode::Customized`] whatever `mode` says.
    pub fn compile(formula: &str, mode: ModelMode) -> Result<CompiledSpec, PimError> {
        let parsed = FormulaParser::parse(formula)?;
        Self::from_parsed(parsed, mode)
    }

    /// Rewrite an already parsed formula.
    pub fn from_parsed(parsed: ParsedFormula, mode: ModelMode) -> Result<CompiledSpec, PimError> {
        let model = if parsed.has_pair_markers() {
            ModelMode::Customized
        } else {
            mode
        };

        let rewrite: fn(Expr) -> Expr = match model {
            ModelMode::Difference => {
                |e| Expr::binary(BinaryOp::Sub, Expr::right(e.clone()), Expr::left(e))
            }
            ModelMode::Marginal => Expr::right,
            ModelMode::Customized => |e| e,
            ModelMode::Regular => return Err(PimError::UnsupportedModel(ModelMode::Regular)),
        };

        let response = compile_response(&parsed.response)?;

        let mut terms = Vec::with_capacity(parsed.terms.len() + 1);
        if parsed.intercept.unwrap_or(model.default_intercept()) {
            terms.push(CompiledTerm::new(INTERCEPT, Expr::Number(1.0)));
        }

        for term in &parsed.terms {
            let expr = rewrite(term.expr());
            if let Some(variable) = expr.unwrapped_variable() {
                return Err(SpecError::UnwrappedVariable {
                    variable: variable.to_string(),
                    term: term.label.clone(),
                }
                .into());
            }
            terms.push(CompiledTerm::new(term.label.clone(), expr));
        }

        if terms.is_empty() {
            return Err(SpecError::EmptyModel.into());
        }

        Ok(CompiledSpec {
            response,
            terms,
            model,
            formula: parsed.original,
        })
    }

    /// Number of design columns.
    pub fn n_terms(&self) -> usize {
        self.terms.len()
    }

    /// Column names in design order.
    pub fn term_names(&self) -> Vec<String> {
        self.terms.iter().map(|t| t.name.clone()).collect()
    }

    pub fn has_intercept(&self) -> bool {
        self.terms.first().is_some_and(|t| t.name == INTERCEPT)
    }

    /// Variables used by the predictor terms.
    pub fn predictor_variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        for term in &self.terms {
            term.expr.collect_variables(&mut out);
        }
        out
    }

    /// Variables used anywhere in the model, response first.
    pub fn variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.response.expr.collect_variables(&mut out);
        for term in &self.terms {
            term.expr.collect_variables(&mut out);
        }
        out
    }

    /// Fail with [`SpecError::UnknownVariable`] for the first variable in
    /// `variables` that is not a column of `data`.
    pub fn check_variables(variables: &[String], data: &Dataset) -> Result<(), SpecError> {
        match variables.iter().find(|v| !data.has_column(v)) {
            Some(missing) => Err(SpecError::UnknownVariable {
                variable: missing.clone(),
                available: data.names().to_vec(),
            }),
            None => Ok(()),
        }
    }
}

fn compile_response(response: &Expr) -> Result<CompiledTerm, SpecError> {
    if response.is_comparison() {
        if let Some(variable) = response.unwrapped_variable() {
            return Err(SpecError::UnwrappedVariable {
                variable: variable.to_string(),
                term: response.to_string(),
            });
        }
        return Ok(CompiledTerm::new(response.to_string(), response.clone()));
    }

    if response.has_pair_markers() {
        return Err(SpecError::InvalidResponse {
            response: response.to_string(),
            message: "pair markers in the response must sit inside PO() or P()".into(),
        });
    }

    let expr = Expr::pairwise_index(response.clone());
    Ok(CompiledTerm::new(expr.to_string(), expr))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Expr {
        Expr::variable(name)
    }

    fn diff(name: &str) -> Expr {
        Expr::binary(BinaryOp::Sub, Expr::right(var(name)), Expr::left(var(name)))
    }

    #[test]
    fn test_difference_mode() {
        let spec = CompiledSpec::compile("y ~ x + z", ModelMode::Difference).unwrap();
        assert_eq!(spec.model, ModelMode::Difference);
        assert!(!spec.has_intercept());
        assert_eq!(spec.term_names(), vec!["x", "z"]);
        assert_eq!(spec.terms[0].expr, diff("x"));
        assert_eq!(spec.terms[0].frames(), FrameUsage::Both);
        assert_eq!(spec.response.expr, Expr::pairwise_index(var("y")));
        assert_eq!(spec.response.name, "PO(L(y), R(y))");
    }

    #[test]
    fn test_marginal_mode_has_intercept() {
        let spec = CompiledSpec::compile("y ~ x", ModelMode::Marginal).unwrap();
        assert_eq!(spec.term_names(), vec![INTERCEPT, "x"]);
        assert_eq!(spec.terms[1].expr, Expr::right(var("x")));
        assert_eq!(spec.terms[1].frames(), FrameUsage::Right);

        let spec = CompiledSpec::compile("y ~ x - 1", ModelMode::Marginal).unwrap();
        assert_eq!(spec.term_names(), vec!["x"]);
    }

    #[test]
    fn test_interaction_is_rewritten_as_a_whole() {
        let spec = CompiledSpec::compile("y ~ x:z", ModelMode::Difference).unwrap();
        let product = Expr::binary(BinaryOp::Mul, var("x"), var("z"));
        assert_eq!(
            spec.terms[0].expr,
            Expr::binary(
                BinaryOp::Sub,
                Expr::right(product.clone()),
                Expr::left(product)
            )
        );
    }

    #[test]
    fn test_regular_mode_is_unsupported() {
        let result = CompiledSpec::compile("y ~ x", ModelMode::Regular);
        assert!(matches!(
            result,
            Err(PimError::UnsupportedModel(ModelMode::Regular))
        ));
    }

    #[test]
    fn test_markers_force_customized() {
        for mode in [
            ModelMode::Difference,
            ModelMode::Marginal,
            ModelMode::Regular,
        ] {
            let spec = CompiledSpec::compile("y ~ L(x) + R(x)", mode).unwrap();
            assert_eq!(spec.model, ModelMode::Customized);
            assert_eq!(spec.term_names(), vec!["L(x)", "R(x)"]);
        }

        let spec = CompiledSpec::compile("PO(L(y), R(y)) ~ I(R(x) - L(x))", ModelMode::Difference)
            .unwrap();
        assert_eq!(spec.model, ModelMode::Customized);
        assert_eq!(spec.response.expr, Expr::pairwise_index(var("y")));
    }

    #[test]
    fn test_customized_requires_wrapping() {
        let result = CompiledSpec::compile("y ~ L(x) + z", ModelMode::Customized);
        assert!(matches!(
            result,
            Err(PimError::InvalidSpec(SpecError::UnwrappedVariable { .. }))
        ));

        // plain terms passed in customized mode are not rewritten
        let result = CompiledSpec::compile("y ~ x", ModelMode::Customized);
        assert!(matches!(
            result,
            Err(PimError::InvalidSpec(SpecError::UnwrappedVariable { .. }))
        ));
    }

    #[test]
    fn test_signed_response_is_kept() {
        let spec = CompiledSpec::compile("P(y) ~ I(R(x) - L(x))", ModelMode::Difference).unwrap();
        assert_eq!(spec.model, ModelMode::Customized);
        assert_eq!(spec.response.expr, Expr::signed_pairwise_index(var("y")));

        // the marker switches mode, so plain predictors are rejected
        let result = CompiledSpec::compile("P(y) ~ x", ModelMode::Difference);
        assert!(matches!(
            result,
            Err(PimError::InvalidSpec(SpecError::UnwrappedVariable { .. }))
        ));
    }

    #[test]
    fn test_invalid_response() {
        let result = CompiledSpec::compile("L(y) ~ L(x)", ModelMode::Customized);
        assert!(matches!(
            result,
            Err(PimError::InvalidSpec(SpecError::InvalidResponse { .. }))
        ));
    }

    #[test]
    fn test_empty_model() {
        let result = CompiledSpec::compile("y ~ 0", ModelMode::Difference);
        assert!(matches!(
            result,
            Err(PimError::InvalidSpec(SpecError::EmptyModel))
        ));
    }

    #[test]
    fn test_variables() {
        let spec = CompiledSpec::compile("y ~ x*z + I(w^2)", ModelMode::Difference).unwrap();
        assert_eq!(spec.variables(), vec!["y", "x", "z", "w"]);
        assert_eq!(spec.predictor_variables(), vec!["x", "z", "w"]);
    }
}
