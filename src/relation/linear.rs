//! Linear expressions over typed relation variables.
//!
//! A linear expression is an integer constant plus a sum of integer
//! coefficients over [`Var`]s: `lin = c0 + c1*v1 + c2*v2 + ...`.
//! Unlike a positional coefficient vector, terms are keyed by the variable
//! itself, so an input `k` and an output `k` of a self-arrow stay distinct.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// A variable of a relation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Var {
    /// Input tuple position (source side of an arrow)
    In(usize),
    /// Output tuple position (sink side of an arrow)
    Out(usize),
    /// A global parameter, identified by name
    Global(String),
    /// An existentially quantified variable local to one conjunct
    Exists(usize),
}

impl Var {
    /// Whether this is a tuple variable (input or output position).
    pub fn is_tuple(&self) -> bool {
        matches!(self, Var::In(_) | Var::Out(_))
    }

    /// Whether this is an existential.
    pub fn is_exists(&self) -> bool {
        matches!(self, Var::Exists(_))
    }
}

/// A linear expression: constant + sum(coeff * var).
///
/// Terms with zero coefficient are never stored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinearExpr {
    /// Coefficients keyed by variable
    pub terms: BTreeMap<Var, i64>,
    /// Constant term
    pub constant: i64,
}

impl LinearExpr {
    /// The zero expression.
    pub fn zero() -> Self {
        Self::default()
    }

    /// A constant expression.
    pub fn constant(value: i64) -> Self {
        Self {
            terms: BTreeMap::new(),
            constant: value,
        }
    }

    /// An expression equal to a single variable.
    pub fn var(v: Var) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(v, 1);
        Self { terms, constant: 0 }
    }

    /// Coefficient of a variable (0 when absent).
    pub fn coeff(&self, v: &Var) -> i64 {
        self.terms.get(v).copied().unwrap_or(0)
    }

    /// Add `c * v` to the expression.
    pub fn add_term(&mut self, v: Var, c: i64) {
        if c == 0 {
            return;
        }
        let new = self.coeff(&v) + c;
        if new == 0 {
            self.terms.remove(&v);
        } else {
            self.terms.insert(v, new);
        }
    }

    /// Whether the expression has no variable terms.
    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    /// Whether the expression is identically zero.
    pub fn is_zero(&self) -> bool {
        self.constant == 0 && self.terms.is_empty()
    }

    /// The constant value, if the expression is constant.
    pub fn as_constant(&self) -> Option<i64> {
        if self.is_constant() {
            Some(self.constant)
        } else {
            None
        }
    }

    /// Scale every term and the constant by a factor.
    pub fn scale(&self, factor: i64) -> Self {
        if factor == 0 {
            return Self::zero();
        }
        Self {
            terms: self
                .terms
                .iter()
                .map(|(v, &c)| (v.clone(), c * factor))
                .collect(),
            constant: self.constant * factor,
        }
    }

    /// GCD of all variable coefficients (not the constant); 0 when there
    /// are no variable terms.
    pub fn coeff_gcd(&self) -> i64 {
        use num_integer::Integer;
        let mut g: i64 = 0;
        for &c in self.terms.values() {
            g = g.gcd(&c.abs());
        }
        g
    }

    /// Remove a variable, returning its coefficient (0 if absent).
    pub fn remove(&mut self, v: &Var) -> i64 {
        self.terms.remove(v).unwrap_or(0)
    }

    /// Substitute `v := replacement` into the expression.
    ///
    /// Only valid when the coefficient of `v` in `replacement` is zero.
    pub fn substitute(&self, v: &Var, replacement: &LinearExpr) -> Self {
        let c = self.coeff(v);
        if c == 0 {
            return self.clone();
        }
        let mut result = self.clone();
        result.terms.remove(v);
        for (rv, &rc) in &replacement.terms {
            result.add_term(rv.clone(), c * rc);
        }
        result.constant += c * replacement.constant;
        result
    }

    /// Iterate the variables with nonzero coefficients.
    pub fn vars(&self) -> impl Iterator<Item = &Var> {
        self.terms.keys()
    }

    /// Render using a naming function for variables.
    pub fn to_string_with<F>(&self, name_of: F) -> String
    where
        F: Fn(&Var) -> String,
    {
        let mut parts = Vec::new();
        for (v, &c) in &self.terms {
            let name = name_of(v);
            if c == 1 {
                parts.push(name);
            } else if c == -1 {
                parts.push(format!("-{}", name));
            } else {
                parts.push(format!("{}*{}", c, name));
            }
        }
        if self.constant != 0 || parts.is_empty() {
            parts.push(format!("{}", self.constant));
        }
        parts.join(" + ").replace("+ -", "- ")
    }
}

impl Add for LinearExpr {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        let mut result = self;
        for (v, c) in other.terms {
            result.add_term(v, c);
        }
        result.constant += other.constant;
        result
    }
}

impl Sub for LinearExpr {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        let mut result = self;
        for (v, c) in other.terms {
            result.add_term(v, -c);
        }
        result.constant -= other.constant;
        result
    }
}

impl Neg for LinearExpr {
    type Output = Self;

    fn neg(self) -> Self {
        self.scale(-1)
    }
}

impl fmt::Display for LinearExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.to_string_with(|v| match v {
                Var::In(i) => format!("in{}", i),
                Var::Out(i) => format!("out{}", i),
                Var::Global(name) => name.clone(),
                Var::Exists(i) => format!("e{}", i),
            })
        )
    }
}
