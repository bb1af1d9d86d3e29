//! Symbolic integer expressions.
//!
//! Expressions are plain owned trees. [`Expr::reduce`] folds every subtree
//! whose value can be determined through a [`Resolver`] and leaves the rest
//! alone, so it can be applied as often as new information shows up.
//! Sums are kept in a canonical shape (a list of weighted terms plus a
//! constant) so that `end - start` collapses to a number as soon as the
//! unknown parts of both sides are the same.

use std::fmt::{self, Display, Formatter};

use thiserror::Error;

use crate::line::LineId;

/// Nested symbol substitutions beyond this depth are left unresolved.
/// This is what stops `a equ b` / `b equ a` from recursing forever.
const MAX_DEPTH: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    #[error("undefined symbol {0}")]
    UnresolvedReference(String),

    #[error("division by zero")]
    DivisionByZero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Plus,
    Minus,
    Times,
    Divide,
    Modulus,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    LogicalAnd,
    LogicalOr,
}

impl Op {
    /// Applies the operator. `None` only for a zero divisor.
    pub fn apply(self, lhs: i32, rhs: i32) -> Option<i32> {
        Some(match self {
            Op::Plus => lhs.wrapping_add(rhs),
            Op::Minus => lhs.wrapping_sub(rhs),
            Op::Times => lhs.wrapping_mul(rhs),
            Op::Divide => {
                if rhs == 0 {
                    return None;
                }
                lhs.wrapping_div(rhs)
            }
            Op::Modulus => {
                if rhs == 0 {
                    return None;
                }
                lhs.wrapping_rem(rhs)
            }
            Op::And => lhs & rhs,
            Op::Or => lhs | rhs,
            Op::Xor => lhs ^ rhs,
            Op::Shl => lhs.wrapping_shl(rhs as u32),
            Op::Shr => lhs.wrapping_shr(rhs as u32),
            Op::Lt => (lhs < rhs) as i32,
            Op::Le => (lhs <= rhs) as i32,
            Op::Gt => (lhs > rhs) as i32,
            Op::Ge => (lhs >= rhs) as i32,
            Op::Eq => (lhs == rhs) as i32,
            Op::Ne => (lhs != rhs) as i32,
            Op::LogicalAnd => ((lhs != 0) && (rhs != 0)) as i32,
            Op::LogicalOr => ((lhs != 0) || (rhs != 0)) as i32,
        })
    }

    fn symbol(self) -> &'static str {
        match self {
            Op::Plus => "+",
            Op::Minus => "-",
            Op::Times => "*",
            Op::Divide => "/",
            Op::Modulus => "%",
            Op::And => "&",
            Op::Or => "|",
            Op::Xor => "^",
            Op::Shl => "<<",
            Op::Shr => ">>",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::LogicalAnd => "&&",
            Op::LogicalOr => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Neg,
    Com,
    Not,
}

impl UnOp {
    pub fn apply(self, value: i32) -> i32 {
        match self {
            UnOp::Neg => value.wrapping_neg(),
            UnOp::Com => !value,
            UnOp::Not => (value == 0) as i32,
        }
    }
}

/// Terms whose value comes from the state of the line chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Special {
    /// Encoded length of a line, once fixed.
    LineLength,
    /// Address of a line (`*` in operands).
    LineAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Int(i32),
    Symbol(String),
    Unary(UnOp, Box<Expr>),
    Binary(Op, Box<Expr>, Box<Expr>),
    Special(Special, LineId),
}

/// Supplies values for the free terms of an expression.
pub trait Resolver {
    fn symbol(&self, name: &str) -> Option<Expr>;

    fn special(&self, kind: Special, line: LineId) -> Option<Expr>;
}

/// Resolves nothing. Reducing against it only folds constants.
pub struct NoResolver;

impl Resolver for NoResolver {
    fn symbol(&self, _name: &str) -> Option<Expr> {
        None
    }

    fn special(&self, _kind: Special, _line: LineId) -> Option<Expr> {
        None
    }
}

impl Expr {
    pub fn int(value: i32) -> Self {
        Expr::Int(value)
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Expr::Symbol(name.into())
    }

    pub fn unary(op: UnOp, operand: Expr) -> Self {
        Expr::Unary(op, Box::new(operand))
    }

    pub fn binary(op: Op, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn special(kind: Special, line: LineId) -> Self {
        Expr::Special(kind, line)
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Expr::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Expr::Int(_))
    }

    /// Visits every symbol leaf, left to right.
    pub fn for_each_symbol<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            Expr::Symbol(name) => f(name),
            Expr::Unary(_, operand) => operand.for_each_symbol(f),
            Expr::Binary(_, lhs, rhs) => {
                lhs.for_each_symbol(f);
                rhs.for_each_symbol(f);
            }
            Expr::Int(_) | Expr::Special(..) => {}
        }
    }

    /// Returns an equivalent expression with every determinable subtree
    /// folded. Never fails: whatever cannot be determined stays symbolic.
    pub fn reduce(&self, resolver: &dyn Resolver) -> Expr {
        self.reduce_depth(resolver, 0)
    }

    fn reduce_depth(&self, resolver: &dyn Resolver, depth: usize) -> Expr {
        match self {
            Expr::Int(_) => self.clone(),
            Expr::Symbol(name) => {
                if depth < MAX_DEPTH {
                    if let Some(value) = resolver.symbol(name) {
                        return value.reduce_depth(resolver, depth + 1);
                    }
                }
                self.clone()
            }
            Expr::Special(kind, line) => {
                if depth < MAX_DEPTH {
                    if let Some(value) = resolver.special(*kind, *line) {
                        return value.reduce_depth(resolver, depth + 1);
                    }
                }
                self.clone()
            }
            Expr::Unary(op, operand) => {
                let operand = operand.reduce_depth(resolver, depth);
                if let Expr::Int(value) = operand {
                    return Expr::Int(op.apply(value));
                }
                let expr = Expr::unary(*op, operand);
                if *op == UnOp::Neg {
                    Sum::collect(&expr).build()
                } else {
                    expr
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = lhs.reduce_depth(resolver, depth);
                let rhs = rhs.reduce_depth(resolver, depth);
                if let (Expr::Int(l), Expr::Int(r)) = (&lhs, &rhs) {
                    // a zero divisor stays in the tree for evaluate() to report
                    if let Some(value) = op.apply(*l, *r) {
                        return Expr::Int(value);
                    }
                }
                let expr = Expr::binary(*op, lhs, rhs);
                if expr.is_linear() {
                    Sum::collect(&expr).build()
                } else {
                    expr
                }
            }
        }
    }

    /// True when some division in the tree has a divisor not known to be
    /// nonzero. Such a term must survive even with a zero coefficient.
    fn may_divide_by_zero(&self) -> bool {
        match self {
            Expr::Binary(op, lhs, rhs) => {
                let risky = matches!(op, Op::Divide | Op::Modulus)
                    && !matches!(**rhs, Expr::Int(value) if value != 0);
                risky || lhs.may_divide_by_zero() || rhs.may_divide_by_zero()
            }
            Expr::Unary(_, operand) => operand.may_divide_by_zero(),
            Expr::Int(_) | Expr::Symbol(_) | Expr::Special(..) => false,
        }
    }

    fn is_linear(&self) -> bool {
        match self {
            Expr::Binary(Op::Plus | Op::Minus, ..) => true,
            Expr::Binary(Op::Times, lhs, rhs) => lhs.is_constant() || rhs.is_constant(),
            Expr::Unary(UnOp::Neg, _) => true,
            _ => false,
        }
    }

    /// Reduces and demands a fixed value.
    pub fn evaluate(&self, resolver: &dyn Resolver) -> Result<i32, ExprError> {
        self.reduce(resolver).value()
    }

    fn value(&self) -> Result<i32, ExprError> {
        match self {
            Expr::Int(value) => Ok(*value),
            Expr::Symbol(name) => Err(ExprError::UnresolvedReference(name.clone())),
            Expr::Special(..) => Err(ExprError::UnresolvedReference(self.to_string())),
            Expr::Unary(op, operand) => Ok(op.apply(operand.value()?)),
            Expr::Binary(op, lhs, rhs) => {
                // check the divisor first so x/0 reports the division
                let rhs = rhs.value()?;
                if matches!(op, Op::Divide | Op::Modulus) && rhs == 0 {
                    return Err(ExprError::DivisionByZero);
                }
                let lhs = lhs.value()?;
                op.apply(lhs, rhs).ok_or(ExprError::DivisionByZero)
            }
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Int(value) => write!(f, "{value}"),
            Expr::Symbol(name) => write!(f, "{name}"),
            Expr::Special(Special::LineLength, line) => write!(f, "<len {line}>"),
            Expr::Special(Special::LineAddress, line) => write!(f, "<addr {line}>"),
            Expr::Unary(UnOp::Neg, operand) => write!(f, "-{operand}"),
            Expr::Unary(UnOp::Com, operand) => write!(f, "~{operand}"),
            Expr::Unary(UnOp::Not, operand) => write!(f, "!{operand}"),
            Expr::Binary(op, lhs, rhs) => write!(f, "({lhs}{}{rhs})", op.symbol()),
        }
    }
}

/// A linear combination: `constant + sum(coefficient * term)`.
struct Sum {
    constant: i32,
    terms: Vec<(i32, Expr)>,
}

impl Sum {
    fn collect(expr: &Expr) -> Self {
        let mut sum = Sum {
            constant: 0,
            terms: Vec::new(),
        };
        sum.add(expr, 1);
        sum
    }

    fn add(&mut self, expr: &Expr, mult: i32) {
        match expr {
            Expr::Int(value) => self.constant = self.constant.wrapping_add(mult.wrapping_mul(*value)),
            Expr::Binary(Op::Plus, lhs, rhs) => {
                self.add(lhs, mult);
                self.add(rhs, mult);
            }
            Expr::Binary(Op::Minus, lhs, rhs) => {
                self.add(lhs, mult);
                self.add(rhs, mult.wrapping_neg());
            }
            Expr::Unary(UnOp::Neg, operand) => self.add(operand, mult.wrapping_neg()),
            Expr::Binary(Op::Times, lhs, rhs) => match (lhs.as_ref(), rhs.as_ref()) {
                (Expr::Int(c), other) | (other, Expr::Int(c)) => {
                    self.add(other, mult.wrapping_mul(*c))
                }
                _ => self.term(expr, mult),
            },
            _ => self.term(expr, mult),
        }
    }

    fn term(&mut self, expr: &Expr, mult: i32) {
        if let Some(term) = self.terms.iter_mut().find(|term| &term.1 == expr) {
            term.0 = term.0.wrapping_add(mult);
        } else {
            self.terms.push((mult, expr.clone()));
        }
    }

    fn build(self) -> Expr {
        let mut acc: Option<Expr> = None;
        let terms = self
            .terms
            .into_iter()
            .filter(|(coef, term)| *coef != 0 || term.may_divide_by_zero());
        for (coef, term) in terms {
            acc = Some(match acc {
                None => match coef {
                    1 => term,
                    -1 => Expr::unary(UnOp::Neg, term),
                    coef => Expr::binary(Op::Times, Expr::Int(coef), term),
                },
                Some(acc) if coef >= 0 => Expr::binary(Op::Plus, acc, scaled(coef, term)),
                Some(acc) => Expr::binary(Op::Minus, acc, scaled(coef.wrapping_neg(), term)),
            });
        }
        match acc {
            None => Expr::Int(self.constant),
            Some(acc) if self.constant > 0 => Expr::binary(Op::Plus, acc, Expr::Int(self.constant)),
            Some(acc) if self.constant < 0 => Expr::binary(
                Op::Minus,
                acc,
                Expr::Int(self.constant.wrapping_neg()),
            ),
            Some(acc) => acc,
        }
    }
}

fn scaled(coef: i32, term: Expr) -> Expr {
    if coef == 1 {
        term
    } else {
        Expr::binary(Op::Times, Expr::Int(coef), term)
    }
}
