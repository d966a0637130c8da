//! Front-end expression trees.
//!
//! These are the affine index/bound expressions and boolean guards the
//! annotated program hands to the analyzer. The trees are immutable and
//! structurally shared through `Rc`; every rewrite builds new nodes and
//! leaves the original intact, so two accesses can safely point at the
//! same subscript expression.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

/// An affine integer expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AffineExpr {
    /// Integer literal
    Int(i64),
    /// Named variable (induction variable or global parameter)
    Var(String),
    /// Sum of two expressions
    Add(Rc<AffineExpr>, Rc<AffineExpr>),
    /// Difference of two expressions
    Sub(Rc<AffineExpr>, Rc<AffineExpr>),
    /// Constant multiple
    Mul(i64, Rc<AffineExpr>),
    /// Exact division by a constant
    Div(Rc<AffineExpr>, i64),
}

impl AffineExpr {
    /// Integer literal.
    pub fn int(value: i64) -> Rc<Self> {
        Rc::new(AffineExpr::Int(value))
    }

    /// Named variable.
    pub fn var(name: impl Into<String>) -> Rc<Self> {
        Rc::new(AffineExpr::Var(name.into()))
    }

    /// `a + b`.
    pub fn add(a: &Rc<Self>, b: &Rc<Self>) -> Rc<Self> {
        Rc::new(AffineExpr::Add(Rc::clone(a), Rc::clone(b)))
    }

    /// `a - b`.
    pub fn sub(a: &Rc<Self>, b: &Rc<Self>) -> Rc<Self> {
        Rc::new(AffineExpr::Sub(Rc::clone(a), Rc::clone(b)))
    }

    /// `c * a`.
    pub fn mul(c: i64, a: &Rc<Self>) -> Rc<Self> {
        Rc::new(AffineExpr::Mul(c, Rc::clone(a)))
    }

    /// `a / c`, exact.
    pub fn div(a: &Rc<Self>, c: i64) -> Rc<Self> {
        Rc::new(AffineExpr::Div(Rc::clone(a), c))
    }

    /// Collect every variable name mentioned by the expression.
    pub fn collect_vars(&self, into: &mut BTreeSet<String>) {
        match self {
            AffineExpr::Int(_) => {}
            AffineExpr::Var(name) => {
                into.insert(name.clone());
            }
            AffineExpr::Add(a, b) | AffineExpr::Sub(a, b) => {
                a.collect_vars(into);
                b.collect_vars(into);
            }
            AffineExpr::Mul(_, a) | AffineExpr::Div(a, _) => a.collect_vars(into),
        }
    }
}

impl fmt::Display for AffineExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AffineExpr::Int(v) => write!(f, "{}", v),
            AffineExpr::Var(name) => write!(f, "{}", name),
            AffineExpr::Add(a, b) => write!(f, "({} + {})", a, b),
            AffineExpr::Sub(a, b) => write!(f, "({} - {})", a, b),
            AffineExpr::Mul(c, a) => write!(f, "{}*{}", c, a),
            AffineExpr::Div(a, c) => write!(f, "({} / {})", a, c),
        }
    }
}

/// Comparison operator of a guard leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `==`
    Eq,
    /// `!=`
    Ne,
}

/// A boolean guard over affine expressions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardExpr {
    /// A comparison between two affine expressions
    Cmp(CmpOp, Rc<AffineExpr>, Rc<AffineExpr>),
    /// Conjunction
    And(Rc<GuardExpr>, Rc<GuardExpr>),
    /// Disjunction
    Or(Rc<GuardExpr>, Rc<GuardExpr>),
}

impl GuardExpr {
    /// `a < b`.
    pub fn lt(a: &Rc<AffineExpr>, b: &Rc<AffineExpr>) -> Rc<Self> {
        Rc::new(GuardExpr::Cmp(CmpOp::Lt, Rc::clone(a), Rc::clone(b)))
    }

    /// `a <= b`.
    pub fn le(a: &Rc<AffineExpr>, b: &Rc<AffineExpr>) -> Rc<Self> {
        Rc::new(GuardExpr::Cmp(CmpOp::Le, Rc::clone(a), Rc::clone(b)))
    }

    /// `a == b`.
    pub fn eq(a: &Rc<AffineExpr>, b: &Rc<AffineExpr>) -> Rc<Self> {
        Rc::new(GuardExpr::Cmp(CmpOp::Eq, Rc::clone(a), Rc::clone(b)))
    }

    /// `a != b`.
    pub fn ne(a: &Rc<AffineExpr>, b: &Rc<AffineExpr>) -> Rc<Self> {
        Rc::new(GuardExpr::Cmp(CmpOp::Ne, Rc::clone(a), Rc::clone(b)))
    }

    /// `a && b`.
    pub fn and(a: &Rc<GuardExpr>, b: &Rc<GuardExpr>) -> Rc<Self> {
        Rc::new(GuardExpr::And(Rc::clone(a), Rc::clone(b)))
    }

    /// `a || b`.
    pub fn or(a: &Rc<GuardExpr>, b: &Rc<GuardExpr>) -> Rc<Self> {
        Rc::new(GuardExpr::Or(Rc::clone(a), Rc::clone(b)))
    }

    /// Whether the guard contains a disjunction anywhere.
    pub fn has_or(&self) -> bool {
        match self {
            GuardExpr::Cmp(..) => false,
            GuardExpr::And(a, b) => a.has_or() || b.has_or(),
            GuardExpr::Or(..) => true,
        }
    }

    /// Collect every variable name mentioned by the guard.
    pub fn collect_vars(&self, into: &mut BTreeSet<String>) {
        match self {
            GuardExpr::Cmp(_, a, b) => {
                a.collect_vars(into);
                b.collect_vars(into);
            }
            GuardExpr::And(a, b) | GuardExpr::Or(a, b) => {
                a.collect_vars(into);
                b.collect_vars(into);
            }
        }
    }
}

impl fmt::Display for GuardExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardExpr::Cmp(op, a, b) => {
                let sym = match op {
                    CmpOp::Lt => "<",
                    CmpOp::Le => "<=",
                    CmpOp::Eq => "==",
                    CmpOp::Ne => "!=",
                };
                write!(f, "{} {} {}", a, sym, b)
            }
            GuardExpr::And(a, b) => write!(f, "({}) && ({})", a, b),
            GuardExpr::Or(a, b) => write!(f, "({}) || ({})", a, b),
        }
    }
}
