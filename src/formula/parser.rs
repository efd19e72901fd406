//! Parser for PIM model formulas.
//!
//! Supported syntax:
//! - Response and predictors: `y ~ x + z`
//! - Intercept control: `y ~ 1 + x`, `y ~ x - 1`, `y ~ 0 + x`
//! - Interactions: `x:z`; crossing: `x*z` expands to `x + z + x:z`
//! - Term removal: `y ~ x*z - x:z`
//! - Grouping: `(x + z):w` expands to `x:w + z:w`
//! - Pair markers: `L(x)`, `R(x)`, `PO(a, b)`, `PO(y)`, `P(a, b)`, `P(y)`
//! - Literal arithmetic: `I(x^2)`, `I(R(x) - L(x))`
//! - Math functions: `log(x)`, `exp(x)`, `sqrt(x)`, `abs(x)`

use crate::formula::ast::{BinaryOp, Expr, MathFn};
use crate::formula::error::SpecError;

/// One formula term: an interaction of one or more factors.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTerm {
    /// Label as written, factors joined by `:`.
    pub label: String,
    /// Factors multiplied together to form the column.
    pub factors: Vec<Expr>,
}

impl ParsedTerm {
    fn single(factor: Expr) -> Self {
        Self {
            label: factor.to_string(),
            factors: vec![factor],
        }
    }

    /// Product of all factors.
    pub fn expr(&self) -> Expr {
        let mut factors = self.factors.iter().cloned();
        let first = factors.next().unwrap_or(Expr::Number(1.0));
        factors.fold(first, |acc, f| Expr::binary(BinaryOp::Mul, acc, f))
    }

    fn interact(&self, other: &ParsedTerm) -> ParsedTerm {
        let mut factors = self.factors.clone();
        for f in &other.factors {
            if !factors.contains(f) {
                factors.push(f.clone());
            }
        }
        let label = factors
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(":");
        ParsedTerm { label, factors }
    }
}

/// Result of parsing a formula string, before any model-mode rewriting.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFormula {
    /// Left-hand side expression.
    pub response: Expr,
    /// Predictor terms in order of appearance, duplicates removed.
    pub terms: Vec<ParsedTerm>,
    /// Explicit intercept request: `Some(true)` for `+ 1`, `Some(false)` for `- 1`/`0 +`.
    pub intercept: Option<bool>,
    /// The formula as written.
    pub original: String,
}

impl ParsedFormula {
    /// Whether any part of the formula carries an explicit pair marker.
    pub fn has_pair_markers(&self) -> bool {
        self.response.has_pair_markers()
            || self
                .terms
                .iter()
                .any(|t| t.factors.iter().any(Expr::has_pair_markers))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Colon,
    Tilde,
    Comma,
    LParen,
    RParen,
    End,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("'{}'", s),
            Token::Number(v) => format!("'{}'", v),
            Token::Plus => "'+'".into(),
            Token::Minus => "'-'".into(),
            Token::Star => "'*'".into(),
            Token::Slash => "'/'".into(),
            Token::Caret => "'^'".into(),
            Token::Colon => "':'".into(),
            Token::Tilde => "'~'".into(),
            Token::Comma => "','".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
            Token::End => "end of input".into(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, SpecError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        let start = pos;
        let token = match c {
            c if c.is_whitespace() => {
                pos += 1;
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '^' => Token::Caret,
            ':' => Token::Colon,
            '~' => Token::Tilde,
            ',' => Token::Comma,
            '(' => Token::LParen,
            ')' => Token::RParen,
            c if c.is_ascii_digit()
                || (c == '.' && chars.get(pos + 1).is_some_and(|d| d.is_ascii_digit())) =>
            {
                let mut end = pos;
                while end < chars.len() && (chars[end].is_ascii_digit() || chars[end] == '.') {
                    end += 1;
                }
                // optional exponent
                if end < chars.len() && (chars[end] == 'e' || chars[end] == 'E') {
                    let mut look = end + 1;
                    if look < chars.len() && (chars[look] == '+' || chars[look] == '-') {
                        look += 1;
                    }
                    if look < chars.len() && chars[look].is_ascii_digit() {
                        end = look;
                        while end < chars.len() && chars[end].is_ascii_digit() {
                            end += 1;
                        }
                    }
                }
                let text: String = chars[pos..end].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| SpecError::syntax(start, format!("invalid number '{}'", text)))?;
                pos = end;
                tokens.push((start, Token::Number(value)));
                continue;
            }
            c if c.is_alphabetic() || c == '.' => {
                let mut end = pos;
                while end < chars.len()
                    && (chars[end].is_alphanumeric() || chars[end] == '_' || chars[end] == '.')
                {
                    end += 1;
                }
                let ident: String = chars[pos..end].iter().collect();
                pos = end;
                tokens.push((start, Token::Ident(ident)));
                continue;
            }
            other => {
                return Err(SpecError::syntax(
                    start,
                    format!("unexpected character '{}'", other),
                ))
            }
        };
        tokens.push((start, token));
        pos += 1;
    }

    tokens.push((chars.len(), Token::End));
    Ok(tokens)
}

/// Formula-level item: either a set of terms or an intercept directive.
enum Item {
    Terms(Vec<ParsedTerm>),
    Intercept(bool),
}

/// Recursive-descent formula parser.
pub struct FormulaParser {
    tokens: Vec<(usize, Token)>,
    cursor: usize,
    original: String,
}

impl FormulaParser {
    /// Create a parser over `input`.
    pub fn new(input: &str) -> Result<Self, SpecError> {
        Ok(Self {
            tokens: tokenize(input)?,
            cursor: 0,
            original: input.to_string(),
        })
    }

    /// Parse a complete formula.
    pub fn parse(formula: &str) -> Result<ParsedFormula, SpecError> {
        let mut parser = FormulaParser::new(formula)?;
        parser.parse_formula()
    }

    fn parse_formula(&mut self) -> Result<ParsedFormula, SpecError> {
        if self.peek() == &Token::End {
            return Err(SpecError::syntax(0, "empty formula"));
        }
        if self.peek() == &Token::Tilde {
            return Err(SpecError::syntax(
                self.position(),
                "a response is required before '~'",
            ));
        }

        let response = self.parse_arith()?;
        self.expect(Token::Tilde)?;

        let (terms, intercept) = self.parse_rhs()?;

        if self.peek() != &Token::End {
            return Err(SpecError::syntax(
                self.position(),
                format!("trailing input starting at {}", self.peek().describe()),
            ));
        }

        Ok(ParsedFormula {
            response,
            terms,
            intercept,
            original: self.original.clone(),
        })
    }

    /// rhs := ['+'|'-'] item (('+'|'-') item)*
    fn parse_rhs(&mut self) -> Result<(Vec<ParsedTerm>, Option<bool>), SpecError> {
        let mut added: Vec<ParsedTerm> = Vec::new();
        let mut removed: Vec<String> = Vec::new();
        let mut intercept = None;

        if self.peek() == &Token::End || self.peek() == &Token::RParen {
            return Err(SpecError::syntax(
                self.position(),
                "expected at least one term",
            ));
        }

        let mut sign_positive = match self.peek() {
            Token::Minus => {
                self.advance();
                false
            }
            Token::Plus => {
                self.advance();
                true
            }
            _ => true,
        };

        loop {
            match self.parse_item()? {
                Item::Intercept(one) => intercept = Some(one == sign_positive),
                Item::Terms(terms) => {
                    if sign_positive {
                        for term in terms {
                            push_unique(&mut added, term);
                        }
                    } else {
                        removed.extend(terms.into_iter().map(|t| t.label));
                    }
                }
            }

            sign_positive = match self.peek() {
                Token::Plus => true,
                Token::Minus => false,
                _ => break,
            };
            self.advance();
        }

        added.retain(|t| !removed.contains(&t.label));
        Ok((added, intercept))
    }

    /// item := inter ('*' inter)*
    fn parse_item(&mut self) -> Result<Item, SpecError> {
        let first = self.parse_interaction()?;
        if self.peek() != &Token::Star {
            return Ok(first);
        }

        let mut acc = self.require_terms(first)?;
        while self.peek() == &Token::Star {
            self.advance();
            let next = self.parse_interaction()?;
            let next = self.require_terms(next)?;
            let crossed = cross(&acc, &next);
            for term in next.into_iter().chain(crossed) {
                push_unique(&mut acc, term);
            }
        }
        Ok(Item::Terms(acc))
    }

    /// inter := factor (':' factor)*
    fn parse_interaction(&mut self) -> Result<Item, SpecError> {
        let first = self.parse_factor()?;
        if self.peek() != &Token::Colon {
            return Ok(first);
        }

        let mut acc = self.require_terms(first)?;
        while self.peek() == &Token::Colon {
            self.advance();
            let next = self.parse_factor()?;
            let next = self.require_terms(next)?;
            acc = cross(&acc, &next);
        }
        Ok(Item::Terms(acc))
    }

    /// factor := '(' rhs ')' | NUMBER | IDENT | IDENT '(' args ')'
    fn parse_factor(&mut self) -> Result<Item, SpecError> {
        let position = self.position();
        match self.advance() {
            Token::LParen => {
                let (terms, intercept) = self.parse_rhs()?;
                if intercept.is_some() {
                    return Err(SpecError::syntax(
                        position,
                        "intercept terms are not allowed inside parentheses",
                    ));
                }
                self.expect(Token::RParen)?;
                Ok(Item::Terms(terms))
            }
            Token::Number(v) if v == 0.0 || v == 1.0 => Ok(Item::Intercept(v == 1.0)),
            Token::Number(v) => Err(SpecError::syntax(
                position,
                format!("numeric term '{}' is not allowed; wrap arithmetic in I()", v),
            )),
            Token::Ident(name) => {
                let factor = if self.peek() == &Token::LParen {
                    self.parse_call(name)?
                } else {
                    Expr::Variable(name)
                };
                Ok(Item::Terms(vec![ParsedTerm::single(factor)]))
            }
            other => Err(SpecError::syntax(
                position,
                format!("expected a term, found {}", other.describe()),
            )),
        }
    }

    fn require_terms(&self, item: Item) -> Result<Vec<ParsedTerm>, SpecError> {
        match item {
            Item::Terms(terms) => Ok(terms),
            Item::Intercept(_) => Err(SpecError::syntax(
                self.position(),
                "intercept cannot take part in an interaction",
            )),
        }
    }

    /// arith := mul (('+'|'-') mul)*
    fn parse_arith(&mut self) -> Result<Expr, SpecError> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_mul()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    /// mul := unary (('*'|'/') unary)*
    fn parse_mul(&mut self) -> Result<Expr, SpecError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    /// unary := '-' unary | power
    fn parse_unary(&mut self) -> Result<Expr, SpecError> {
        if self.peek() == &Token::Minus {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.parse_power()
    }

    /// power := primary ['^' unary]
    fn parse_power(&mut self) -> Result<Expr, SpecError> {
        let base = self.parse_primary()?;
        if self.peek() == &Token::Caret {
            self.advance();
            let exponent = self.parse_unary()?;
            return Ok(Expr::binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    /// primary := NUMBER | IDENT | IDENT '(' args ')' | '(' arith ')'
    fn parse_primary(&mut self) -> Result<Expr, SpecError> {
        let position = self.position();
        match self.advance() {
            Token::Number(v) => Ok(Expr::Number(v)),
            Token::Ident(name) => {
                if self.peek() == &Token::LParen {
                    self.parse_call(name)
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Token::LParen => {
                let inner = self.parse_arith()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            other => Err(SpecError::syntax(
                position,
                format!("expected an expression, found {}", other.describe()),
            )),
        }
    }

    /// Parse `name(arg, ...)` after the identifier has been consumed.
    fn parse_call(&mut self, name: String) -> Result<Expr, SpecError> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() != &Token::RParen {
            loop {
                args.push(self.parse_arith()?);
                if self.peek() == &Token::Comma {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect(Token::RParen)?;
        build_call(&name, args)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.cursor.min(self.tokens.len() - 1)].1
    }

    fn position(&self) -> usize {
        self.tokens[self.cursor.min(self.tokens.len() - 1)].0
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.cursor < self.tokens.len() - 1 {
            self.cursor += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), SpecError> {
        let position = self.position();
        let found = self.advance();
        if found == expected {
            Ok(())
        } else {
            Err(SpecError::syntax(
                position,
                format!("expected {}, found {}", expected.describe(), found.describe()),
            ))
        }
    }
}

fn build_call(name: &str, mut args: Vec<Expr>) -> Result<Expr, SpecError> {
    let arity = |expected: &'static str, got: usize| SpecError::Arity {
        function: name.to_string(),
        expected,
        got,
    };

    match name {
        "L" | "R" | "I" => {
            if args.len() != 1 {
                return Err(arity("1", args.len()));
            }
            let inner = Box::new(args.remove(0));
            Ok(match name {
                "L" => Expr::Left(inner),
                "R" => Expr::Right(inner),
                _ => Expr::Literal(inner),
            })
        }
        "PO" | "P" => match args.len() {
            1 => {
                let inner = args.remove(0);
                Ok(if name == "PO" {
                    Expr::pairwise_index(inner)
                } else {
                    Expr::signed_pairwise_index(inner)
                })
            }
            2 => {
                let b = Box::new(args.remove(1));
                let a = Box::new(args.remove(0));
                Ok(if name == "PO" {
                    Expr::Compare(a, b)
                } else {
                    Expr::SignedCompare(a, b)
                })
            }
            got => Err(arity("1 or 2", got)),
        },
        _ => match MathFn::from_name(name) {
            Some(func) => {
                if args.len() != 1 {
                    return Err(arity("1", args.len()));
                }
                Ok(Expr::Function {
                    func,
                    arg: Box::new(args.remove(0)),
                })
            }
            None => Err(SpecError::UnknownFunction {
                name: name.to_string(),
            }),
        },
    }
}

fn push_unique(terms: &mut Vec<ParsedTerm>, term: ParsedTerm) {
    if !terms.iter().any(|t| t.label == term.label) {
        terms.push(term);
    }
}

fn cross(a: &[ParsedTerm], b: &[ParsedTerm]) -> Vec<ParsedTerm> {
    let mut out = Vec::with_capacity(a.len() * b.len());
    for ta in a {
        for tb in b {
            push_unique(&mut out, ta.interact(tb));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(f: &ParsedFormula) -> Vec<&str> {
        f.terms.iter().map(|t| t.label.as_str()).collect()
    }

    #[test]
    fn test_simple_formula() {
        let f = FormulaParser::parse("y ~ x + z").unwrap();
        assert_eq!(f.response, Expr::variable("y"));
        assert_eq!(labels(&f), vec!["x", "z"]);
        assert_eq!(f.intercept, None);
        assert!(!f.has_pair_markers());
    }

    #[test]
    fn test_intercept_directives() {
        assert_eq!(FormulaParser::parse("y ~ 1 + x").unwrap().intercept, Some(true));
        assert_eq!(FormulaParser::parse("y ~ x - 1").unwrap().intercept, Some(false));
        assert_eq!(FormulaParser::parse("y ~ 0 + x").unwrap().intercept, Some(false));
        assert_eq!(FormulaParser::parse("y ~ -1 + x").unwrap().intercept, Some(false));
    }

    #[test]
    fn test_crossing_and_removal() {
        let f = FormulaParser::parse("y ~ x*z").unwrap();
        assert_eq!(labels(&f), vec!["x", "z", "x:z"]);

        let f = FormulaParser::parse("y ~ x*z - x:z").unwrap();
        assert_eq!(labels(&f), vec!["x", "z"]);

        let f = FormulaParser::parse("y ~ a*b*c").unwrap();
        assert_eq!(labels(&f), vec!["a", "b", "a:b", "c", "a:c", "b:c", "a:b:c"]);
    }

    #[test]
    fn test_grouping_distributes() {
        let f = FormulaParser::parse("y ~ (x + z):w").unwrap();
        assert_eq!(labels(&f), vec!["x:w", "z:w"]);
    }

    #[test]
    fn test_duplicate_terms_collapse() {
        let f = FormulaParser::parse("y ~ x + x + x:x").unwrap();
        assert_eq!(labels(&f), vec!["x"]);
    }

    #[test]
    fn test_pair_markers() {
        let f = FormulaParser::parse("PO(L(y), R(y)) ~ I(R(x) - L(x)) + L(z)").unwrap();
        assert!(f.has_pair_markers());
        assert_eq!(f.response, Expr::pairwise_index(Expr::variable("y")));
        assert_eq!(labels(&f), vec!["I(R(x) - L(x))", "L(z)"]);
    }

    #[test]
    fn test_single_argument_comparisons() {
        let f = FormulaParser::parse("P(y) ~ L(x)").unwrap();
        assert_eq!(f.response, Expr::signed_pairwise_index(Expr::variable("y")));
    }

    #[test]
    fn test_literal_arithmetic() {
        let f = FormulaParser::parse("y ~ I(x^2) + log(z) + I(-x * 2.5e1)").unwrap();
        assert_eq!(labels(&f), vec!["I(x^2)", "log(z)", "I(-x * 25)"]);
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(
            FormulaParser::parse(""),
            Err(SpecError::Syntax { .. })
        ));
        assert!(matches!(
            FormulaParser::parse("~ x"),
            Err(SpecError::Syntax { .. })
        ));
        assert!(matches!(
            FormulaParser::parse("y x"),
            Err(SpecError::Syntax { .. })
        ));
        assert!(matches!(
            FormulaParser::parse("y ~ x +"),
            Err(SpecError::Syntax { .. })
        ));
        assert!(matches!(
            FormulaParser::parse("y ~ (x + z"),
            Err(SpecError::Syntax { .. })
        ));
        assert!(matches!(
            FormulaParser::parse("y ~ 2"),
            Err(SpecError::Syntax { .. })
        ));
        assert!(matches!(
            FormulaParser::parse("y ~ x $ z"),
            Err(SpecError::Syntax { position: 6, .. })
        ));
    }

    #[test]
    fn test_function_errors() {
        assert!(matches!(
            FormulaParser::parse("y ~ foo(x)"),
            Err(SpecError::UnknownFunction { .. })
        ));
        assert!(matches!(
            FormulaParser::parse("y ~ L(x, z)"),
            Err(SpecError::Arity { .. })
        ));
        assert!(matches!(
            FormulaParser::parse("y ~ PO(x, y, z)"),
            Err(SpecError::Arity { .. })
        ));
    }
}
