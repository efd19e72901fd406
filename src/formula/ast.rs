//! Typed expression tree for pairwise model terms.
//!
//! Every predictor column and the response of a PIM is an [`Expr`]. Variable
//! references carry no frame of their own: the enclosing [`Expr::Left`] or
//! [`Expr::Right`] wrapper decides whether a variable is read from the left
//! or the right member of each comparison pair.

use std::fmt;

/// Member of a comparison pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// First observation of the pair, `L()`.
    Left,
    /// Second observation of the pair, `R()`.
    Right,
}

/// Which frames an expression reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameUsage {
    /// Constant expression, no variable is read.
    #[default]
    None,
    Left,
    Right,
    Both,
}

impl FrameUsage {
    fn merge(self, other: FrameUsage) -> FrameUsage {
        use FrameUsage::*;
        match (self, other) {
            (None, x) | (x, None) => x,
            (Left, Left) => Left,
            (Right, Right) => Right,
            _ => Both,
        }
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Add | BinaryOp::Sub => 1,
            BinaryOp::Mul | BinaryOp::Div => 2,
            BinaryOp::Pow => 4,
        }
    }

    /// Apply the operator to two scalars. NaN propagates through IEEE rules.
    #[inline]
    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Pow => a.powf(b),
        }
    }
}

/// Elementwise math functions available inside terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFn {
    Log,
    Exp,
    Sqrt,
    Abs,
}

impl MathFn {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "log" => Some(MathFn::Log),
            "exp" => Some(MathFn::Exp),
            "sqrt" => Some(MathFn::Sqrt),
            "abs" => Some(MathFn::Abs),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MathFn::Log => "log",
            MathFn::Exp => "exp",
            MathFn::Sqrt => "sqrt",
            MathFn::Abs => "abs",
        }
    }

    #[inline]
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            MathFn::Log => x.ln(),
            MathFn::Exp => x.exp(),
            MathFn::Sqrt => x.sqrt(),
            MathFn::Abs => x.abs(),
        }
    }
}

/// A term expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Dataset column, read in the frame set by the nearest wrapper.
    Variable(String),
    /// Numeric constant.
    Number(f64),
    /// Unary minus.
    Negate(Box<Expr>),
    /// Arithmetic between two expressions.
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Elementwise math function.
    Function { func: MathFn, arg: Box<Expr> },
    /// `L(e)`: evaluate `e` on the left member of each pair.
    Left(Box<Expr>),
    /// `R(e)`: evaluate `e` on the right member of each pair.
    Right(Box<Expr>),
    /// `PO(a, b)`: 1 if a < b, 0 if a > b, 0.5 on ties.
    Compare(Box<Expr>, Box<Expr>),
    /// `P(a, b)`: 1 if a < b, -1 if a > b, 0 on ties.
    SignedCompare(Box<Expr>, Box<Expr>),
    /// `I(e)`: arithmetic taken literally.
    Literal(Box<Expr>),
}

impl Expr {
    pub fn variable(name: impl Into<String>) -> Self {
        Expr::Variable(name.into())
    }

    pub fn left(inner: Expr) -> Self {
        Expr::Left(Box::new(inner))
    }

    pub fn right(inner: Expr) -> Self {
        Expr::Right(Box::new(inner))
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// `PO(L(e), R(e))`.
    pub fn pairwise_index(inner: Expr) -> Self {
        Expr::Compare(
            Box::new(Expr::left(inner.clone())),
            Box::new(Expr::right(inner)),
        )
    }

    /// `P(L(e), R(e))`.
    pub fn signed_pairwise_index(inner: Expr) -> Self {
        Expr::SignedCompare(
            Box::new(Expr::left(inner.clone())),
            Box::new(Expr::right(inner)),
        )
    }

    /// Whether the expression contains an explicit `L`, `R`, `PO` or `P` marker.
    pub fn has_pair_markers(&self) -> bool {
        match self {
            Expr::Variable(_) | Expr::Number(_) => false,
            Expr::Left(_) | Expr::Right(_) | Expr::Compare(..) | Expr::SignedCompare(..) => true,
            Expr::Negate(e) | Expr::Function { arg: e, .. } | Expr::Literal(e) => {
                e.has_pair_markers()
            }
            Expr::Binary { lhs, rhs, .. } => lhs.has_pair_markers() || rhs.has_pair_markers(),
        }
    }

    /// Whether the top-level node is a comparison indicator.
    pub fn is_comparison(&self) -> bool {
        matches!(self, Expr::Compare(..) | Expr::SignedCompare(..))
    }

    /// Referenced variables in first-appearance order, without duplicates.
    pub fn variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    pub(crate) fn collect_variables(&self, out: &mut Vec<String>) {
        match self {
            Expr::Variable(name) => {
                if !out.iter().any(|v| v == name) {
                    out.push(name.clone());
                }
            }
            Expr::Number(_) => {}
            Expr::Negate(e)
            | Expr::Function { arg: e, .. }
            | Expr::Literal(e)
            | Expr::Left(e)
            | Expr::Right(e) => e.collect_variables(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
            Expr::Compare(a, b) | Expr::SignedCompare(a, b) => {
                a.collect_variables(out);
                b.collect_variables(out);
            }
        }
    }

    /// First variable that is not enclosed in a frame wrapper, if any.
    pub fn unwrapped_variable(&self) -> Option<&str> {
        match self {
            Expr::Variable(name) => Some(name),
            Expr::Number(_) | Expr::Left(_) | Expr::Right(_) => None,
            Expr::Negate(e) | Expr::Function { arg: e, .. } | Expr::Literal(e) => {
                e.unwrapped_variable()
            }
            Expr::Binary { lhs, rhs, .. } => lhs
                .unwrapped_variable()
                .or_else(|| rhs.unwrapped_variable()),
            Expr::Compare(a, b) | Expr::SignedCompare(a, b) => {
                a.unwrapped_variable().or_else(|| b.unwrapped_variable())
            }
        }
    }

    /// Frames this expression reads from when evaluated.
    pub fn frames(&self) -> FrameUsage {
        self.frames_in(FrameUsage::None)
    }

    fn frames_in(&self, current: FrameUsage) -> FrameUsage {
        match self {
            Expr::Variable(_) => current,
            Expr::Number(_) => FrameUsage::None,
            Expr::Left(e) => e.frames_in(FrameUsage::Left),
            Expr::Right(e) => e.frames_in(FrameUsage::Right),
            Expr::Negate(e) | Expr::Function { arg: e, .. } | Expr::Literal(e) => {
                e.frames_in(current)
            }
            Expr::Binary { lhs, rhs, .. } => lhs.frames_in(current).merge(rhs.frames_in(current)),
            Expr::Compare(a, b) | Expr::SignedCompare(a, b) => {
                a.frames_in(current).merge(b.frames_in(current))
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Negate(_) => 3,
            _ => 5,
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Variable(name) => f.write_str(name),
            Expr::Number(v) => write!(f, "{}", v),
            Expr::Negate(e) => {
                f.write_str("-")?;
                e.fmt_operand(f, 3)
            }
            Expr::Binary { op, lhs, rhs } => {
                let p = op.precedence();
                // `^` is right associative, everything else left associative
                let (lmin, rmin) = if *op == BinaryOp::Pow {
                    (p + 1, p)
                } else {
                    (p, p + 1)
                };
                lhs.fmt_operand(f, lmin)?;
                if *op == BinaryOp::Pow {
                    f.write_str("^")?;
                } else {
                    write!(f, " {} ", op.symbol())?;
                }
                rhs.fmt_operand(f, rmin)
            }
            Expr::Function { func, arg } => write!(f, "{}({})", func.name(), arg),
            Expr::Left(e) => write!(f, "L({})", e),
            Expr::Right(e) => write!(f, "R({})", e),
            Expr::Compare(a, b) => write!(f, "PO({}, {})", a, b),
            Expr::SignedCompare(a, b) => write!(f, "P({}, {})", a, b),
            Expr::Literal(e) => write!(f, "I({})", e),
        }
    }
}
