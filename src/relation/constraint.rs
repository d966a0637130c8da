//! Constraints and conjuncts.
//!
//! Every constraint is kept in the normal form `expr >= 0` or `expr == 0`.
//! A conjunct is a conjunction of constraints over one set of variables;
//! disjunction lives one level up, in [`crate::relation::Relation`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::linear::{LinearExpr, Var};

/// The kind of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// expr >= 0
    Inequality,
    /// expr == 0
    Equality,
}

/// A single affine constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    /// The affine expression (compared against zero)
    pub expr: LinearExpr,
    /// Inequality (>= 0) or equality (== 0)
    pub kind: ConstraintKind,
}

impl Constraint {
    /// Create `expr >= 0`.
    pub fn ge_zero(expr: LinearExpr) -> Self {
        Self {
            expr,
            kind: ConstraintKind::Inequality,
        }
    }

    /// Create `expr == 0`.
    pub fn eq_zero(expr: LinearExpr) -> Self {
        Self {
            expr,
            kind: ConstraintKind::Equality,
        }
    }

    /// Create `lhs >= rhs` as `lhs - rhs >= 0`.
    pub fn ge(lhs: LinearExpr, rhs: LinearExpr) -> Self {
        Self::ge_zero(lhs - rhs)
    }

    /// Create `lhs <= rhs` as `rhs - lhs >= 0`.
    pub fn le(lhs: LinearExpr, rhs: LinearExpr) -> Self {
        Self::ge_zero(rhs - lhs)
    }

    /// Create `lhs < rhs` as `rhs - lhs - 1 >= 0`.
    pub fn lt(lhs: LinearExpr, rhs: LinearExpr) -> Self {
        let mut expr = rhs - lhs;
        expr.constant -= 1;
        Self::ge_zero(expr)
    }

    /// Create `lhs == rhs` as `lhs - rhs == 0`.
    pub fn eq(lhs: LinearExpr, rhs: LinearExpr) -> Self {
        Self::eq_zero(lhs - rhs)
    }

    /// Whether this is an equality constraint.
    pub fn is_equality(&self) -> bool {
        self.kind == ConstraintKind::Equality
    }

    /// Negate an inequality: `!(e >= 0)` is `-e - 1 >= 0`.
    ///
    /// Equalities split into two inequalities under negation, so they are
    /// handled by the caller ([`crate::relation::Relation::complement`]).
    pub fn negate_inequality(&self) -> Self {
        debug_assert_eq!(self.kind, ConstraintKind::Inequality);
        let mut expr = self.expr.clone().scale(-1);
        expr.constant -= 1;
        Self::ge_zero(expr)
    }

    /// Constant-fold: `Some(true/false)` if the constraint has no variables.
    pub fn as_trivial(&self) -> Option<bool> {
        let c = self.expr.as_constant()?;
        Some(match self.kind {
            ConstraintKind::Inequality => c >= 0,
            ConstraintKind::Equality => c == 0,
        })
    }

    /// Divide out the GCD of the variable coefficients.
    ///
    /// For an inequality the constant is floored (`2x + 3 >= 0` becomes
    /// `x + 1 >= 0`), which is exact over the integers. For an equality
    /// with a non-divisible constant the constraint has no integer
    /// solution; the caller detects that via [`Constraint::as_trivial`]
    /// after we rewrite it to the unsatisfiable `1 == 0`.
    pub fn normalize(&self) -> Self {
        let g = self.expr.coeff_gcd();
        if g <= 1 {
            return self.clone();
        }
        match self.kind {
            ConstraintKind::Inequality => {
                let mut expr = LinearExpr::zero();
                for (v, &c) in &self.expr.terms {
                    expr.add_term(v.clone(), c / g);
                }
                expr.constant = self.expr.constant.div_euclid(g);
                Self::ge_zero(expr)
            }
            ConstraintKind::Equality => {
                if self.expr.constant % g != 0 {
                    return Self::eq_zero(LinearExpr::constant(1));
                }
                let mut expr = LinearExpr::zero();
                for (v, &c) in &self.expr.terms {
                    expr.add_term(v.clone(), c / g);
                }
                expr.constant = self.expr.constant / g;
                Self::eq_zero(expr)
            }
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ConstraintKind::Inequality => write!(f, "{} >= 0", self.expr),
            ConstraintKind::Equality => write!(f, "{} == 0", self.expr),
        }
    }
}

/// A conjunction of constraints.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Conjunct {
    /// The constraints, all of which must hold
    pub constraints: Vec<Constraint>,
}

impl Conjunct {
    /// The empty (universally true) conjunct.
    pub fn universe() -> Self {
        Self::default()
    }

    /// Add a constraint, folding trivial ones.
    ///
    /// Returns `false` if the constraint is trivially false (the conjunct
    /// is then unsatisfiable and the caller may drop it).
    pub fn push(&mut self, c: Constraint) -> bool {
        match c.as_trivial() {
            Some(true) => true,
            Some(false) => {
                self.constraints.push(c);
                false
            }
            None => {
                self.constraints.push(c);
                true
            }
        }
    }

    /// Merge another conjunct into this one.
    pub fn extend(&mut self, other: &Conjunct) {
        self.constraints.extend(other.constraints.iter().cloned());
    }

    /// Whether any constraint is trivially false.
    pub fn trivially_false(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| c.as_trivial() == Some(false))
    }

    /// All variables mentioned by any constraint.
    pub fn vars(&self) -> BTreeSet<Var> {
        let mut set = BTreeSet::new();
        for c in &self.constraints {
            for v in c.expr.vars() {
                set.insert(v.clone());
            }
        }
        set
    }

    /// The existential variables mentioned by any constraint.
    pub fn exists_vars(&self) -> BTreeSet<usize> {
        let mut set = BTreeSet::new();
        for c in &self.constraints {
            for v in c.expr.vars() {
                if let Var::Exists(i) = v {
                    set.insert(*i);
                }
            }
        }
        set
    }

    /// Substitute `v := replacement` in every constraint.
    pub fn substitute(&self, v: &Var, replacement: &LinearExpr) -> Self {
        Self {
            constraints: self
                .constraints
                .iter()
                .map(|c| Constraint {
                    expr: c.expr.substitute(v, replacement),
                    kind: c.kind,
                })
                .collect(),
        }
    }

    /// Drop duplicate and trivially true constraints, normalize the rest.
    pub fn simplify(&self) -> Self {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for c in &self.constraints {
            let n = c.normalize();
            if n.as_trivial() == Some(true) {
                continue;
            }
            let key = format!("{:?}|{:?}", n.kind, n.expr);
            if seen.insert(key) {
                out.push(n);
            }
        }
        Self { constraints: out }
    }
}

impl fmt::Display for Conjunct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.constraints.is_empty() {
            return write!(f, "true");
        }
        let parts: Vec<String> = self.constraints.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join(" && "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negate_inequality() {
        // x - 1 >= 0 negated is -x >= 0
        let mut e = LinearExpr::constant(-1);
        e.add_term(Var::In(0), 1);
        let c = Constraint::ge_zero(e);
        let n = c.negate_inequality();
        assert_eq!(n.expr.coeff(&Var::In(0)), -1);
        assert_eq!(n.expr.constant, 0);
    }

    #[test]
    fn test_normalize_inequality_floors() {
        // 2x + 3 >= 0  ->  x + 1 >= 0
        let mut e = LinearExpr::constant(3);
        e.add_term(Var::In(0), 2);
        let n = Constraint::ge_zero(e).normalize();
        assert_eq!(n.expr.coeff(&Var::In(0)), 1);
        assert_eq!(n.expr.constant, 1);
    }

    #[test]
    fn test_normalize_equality_infeasible() {
        // 2x + 1 == 0 has no integer solution
        let mut e = LinearExpr::constant(1);
        e.add_term(Var::In(0), 2);
        let n = Constraint::eq_zero(e).normalize();
        assert_eq!(n.as_trivial(), Some(false));
    }

    #[test]
    fn test_conjunct_push_trivial() {
        let mut cj = Conjunct::universe();
        assert!(cj.push(Constraint::ge_zero(LinearExpr::constant(5))));
        assert!(cj.constraints.is_empty());
        assert!(!cj.push(Constraint::ge_zero(LinearExpr::constant(-1))));
        assert!(cj.trivially_false());
    }
}
