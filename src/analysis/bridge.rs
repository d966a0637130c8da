//! Conversions between front-end expression trees and relations.
//!
//! The relation algebra works on coefficient vectors; the front end and
//! the output side work on expression trees. This module is the only
//! place that translates between the two. Names resolve against a
//! per-side tuple map first and the global-parameter registry second; a
//! name known to neither is a hard error.

use log::warn;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::analysis::tree::{CondTree, TreeOp};
use crate::ir::expr::{AffineExpr, CmpOp, GuardExpr};
use crate::ir::program::AnalysisContext;
use crate::relation::{Conjunct, Constraint, ConstraintKind, LinearExpr, Relation, Space, Var};
use crate::utils::errors::{AnalysisResult, BridgeError};

/// Maps induction-variable names to tuple positions for one side of a
/// relation.
#[derive(Debug, Clone, Default)]
pub struct VarMap {
    map: BTreeMap<String, Var>,
}

impl VarMap {
    /// Bind `names[i]` to the input tuple position `i`.
    pub fn input(names: &[String]) -> Self {
        Self {
            map: names
                .iter()
                .enumerate()
                .map(|(i, n)| (n.clone(), Var::In(i)))
                .collect(),
        }
    }

    /// Bind `names[i]` to the output tuple position `i`.
    pub fn output(names: &[String]) -> Self {
        Self {
            map: names
                .iter()
                .enumerate()
                .map(|(i, n)| (n.clone(), Var::Out(i)))
                .collect(),
        }
    }

    /// Look up a name.
    pub fn get(&self, name: &str) -> Option<&Var> {
        self.map.get(name)
    }

    /// Bind one more name.
    pub fn bind(&mut self, name: impl Into<String>, v: Var) {
        self.map.insert(name.into(), v);
    }
}

/// Accumulate `multiplier * expr` into a linear expression over relation
/// variables.
///
/// Division distributes only when every collected coefficient is
/// divisible; anything else is not affine and is rejected.
pub fn accumulate_expr(
    expr: &AffineExpr,
    multiplier: i64,
    vars: &VarMap,
    ctx: &AnalysisContext,
    out: &mut LinearExpr,
) -> AnalysisResult<()> {
    match expr {
        AffineExpr::Int(v) => {
            out.constant += multiplier * v;
            Ok(())
        }
        AffineExpr::Var(name) => {
            if let Some(v) = vars.get(name) {
                out.add_term(v.clone(), multiplier);
                Ok(())
            } else if ctx.is_global(name) {
                out.add_term(Var::Global(name.clone()), multiplier);
                Ok(())
            } else {
                Err(BridgeError::unanalyzable(name).into())
            }
        }
        AffineExpr::Add(a, b) => {
            accumulate_expr(a, multiplier, vars, ctx, out)?;
            accumulate_expr(b, multiplier, vars, ctx, out)
        }
        AffineExpr::Sub(a, b) => {
            accumulate_expr(a, multiplier, vars, ctx, out)?;
            accumulate_expr(b, -multiplier, vars, ctx, out)
        }
        AffineExpr::Mul(c, a) => accumulate_expr(a, multiplier * c, vars, ctx, out),
        AffineExpr::Div(a, c) => {
            if *c == 0 {
                return Err(BridgeError::malformed("division by zero").into());
            }
            let mut inner = LinearExpr::zero();
            accumulate_expr(a, 1, vars, ctx, &mut inner)?;
            if inner.constant % c != 0 || inner.terms.values().any(|v| v % c != 0) {
                return Err(
                    BridgeError::malformed(format!("inexact division by {}", c)).into(),
                );
            }
            out.constant += multiplier * (inner.constant / c);
            for (v, coeff) in inner.terms {
                out.add_term(v, multiplier * (coeff / c));
            }
            Ok(())
        }
    }
}

/// Translate an expression to a linear form over relation variables.
pub fn expr_to_linear(
    expr: &AffineExpr,
    vars: &VarMap,
    ctx: &AnalysisContext,
) -> AnalysisResult<LinearExpr> {
    let mut out = LinearExpr::zero();
    accumulate_expr(expr, 1, vars, ctx, &mut out)?;
    Ok(out)
}

/// Translate a guard to disjunctive normal form over relation
/// constraints.
///
/// `!=` splits into two strict sides. A disjunction is accepted but
/// flagged: downstream passes treat each disjunct independently, which
/// can widen conditions that share state across the branches.
pub fn guard_to_conjuncts(
    guard: &GuardExpr,
    vars: &VarMap,
    ctx: &AnalysisContext,
) -> AnalysisResult<Vec<Conjunct>> {
    match guard {
        GuardExpr::Cmp(op, lhs, rhs) => {
            let l = expr_to_linear(lhs, vars, ctx)?;
            let r = expr_to_linear(rhs, vars, ctx)?;
            Ok(match op {
                CmpOp::Lt => vec![single(Constraint::lt(l, r))],
                CmpOp::Le => vec![single(Constraint::le(l, r))],
                CmpOp::Eq => vec![single(Constraint::eq(l, r))],
                CmpOp::Ne => {
                    // l != r: l <= r - 1 or l >= r + 1
                    let mut below = l.clone() - r.clone();
                    below.constant += 1;
                    let above = {
                        let mut e = l - r;
                        e.constant -= 1;
                        e
                    };
                    vec![
                        single(Constraint::ge_zero(below.scale(-1))),
                        single(Constraint::ge_zero(above)),
                    ]
                }
            })
        }
        GuardExpr::And(a, b) => {
            let left = guard_to_conjuncts(a, vars, ctx)?;
            let right = guard_to_conjuncts(b, vars, ctx)?;
            let mut out = Vec::with_capacity(left.len() * right.len());
            for l in &left {
                for r in &right {
                    let mut merged = l.clone();
                    merged.extend(r);
                    out.push(merged);
                }
            }
            Ok(out)
        }
        GuardExpr::Or(a, b) => {
            warn!("disjunctive guard; branches are analyzed independently");
            let mut out = guard_to_conjuncts(a, vars, ctx)?;
            out.extend(guard_to_conjuncts(b, vars, ctx)?);
            Ok(out)
        }
    }
}

fn single(c: Constraint) -> Conjunct {
    let mut cj = Conjunct::universe();
    cj.constraints.push(c);
    cj
}

/// Rebuild an expression tree from a linear form, naming variables
/// through the relation's space.
pub fn linear_to_expr(expr: &LinearExpr, space: &Space) -> Rc<AffineExpr> {
    let mut acc: Option<Rc<AffineExpr>> = None;
    for (v, &c) in &expr.terms {
        let leaf = AffineExpr::var(space.name_of(v));
        let term = if c == 1 {
            leaf
        } else {
            AffineExpr::mul(c, &leaf)
        };
        acc = Some(match acc {
            Some(prev) => AffineExpr::add(&prev, &term),
            None => term,
        });
    }
    match acc {
        Some(prev) if expr.constant == 0 => prev,
        Some(prev) if expr.constant < 0 => AffineExpr::sub(&prev, &AffineExpr::int(-expr.constant)),
        Some(prev) => AffineExpr::add(&prev, &AffineExpr::int(expr.constant)),
        None => AffineExpr::int(expr.constant),
    }
}

/// Convert one conjunct to a conjunctive condition tree.
///
/// Existentials should be projected out first; any that remain keep
/// their synthetic `e<i>` names.
pub fn conjunct_to_tree(conjunct: &Conjunct, space: &Space) -> Option<Rc<CondTree>> {
    let zero = AffineExpr::int(0);
    let parts: Vec<Rc<CondTree>> = conjunct
        .constraints
        .iter()
        .map(|c| {
            let lhs = linear_to_expr(&c.expr, space);
            match c.kind {
                ConstraintKind::Inequality => CondTree::ge(&lhs, &zero),
                ConstraintKind::Equality => CondTree::eq(&lhs, &zero),
            }
        })
        .collect();
    CondTree::conjoin(&parts)
}

/// Convert a whole relation to a condition tree (disjunction of
/// conjunctive trees). `None` for the empty relation.
pub fn relation_to_tree(relation: &Relation) -> Option<Rc<CondTree>> {
    let simplified = relation.simplify();
    let mut acc: Option<Rc<CondTree>> = None;
    for cj in &simplified.disjuncts {
        let part = conjunct_to_tree(cj, &relation.space)
            .unwrap_or_else(|| CondTree::ge(&AffineExpr::int(0), &AffineExpr::int(0)));
        acc = Some(match acc {
            Some(prev) => CondTree::or(&prev, &part),
            None => part,
        });
    }
    acc
}

/// Convert a conjunctive condition tree back to a conjunct, resolving
/// names through a variable map.
pub fn tree_to_conjunct(
    tree: &Rc<CondTree>,
    vars: &VarMap,
    ctx: &AnalysisContext,
) -> AnalysisResult<Conjunct> {
    let mut out = Conjunct::universe();
    for cmp in tree.comparisons() {
        let CondTree::Cmp(op, lhs, rhs) = &*cmp else {
            return Err(BridgeError::malformed("nested disjunction in conjunct").into());
        };
        let l = expr_to_linear(lhs, vars, ctx)?;
        let r = expr_to_linear(rhs, vars, ctx)?;
        let c = match op {
            TreeOp::Ge => Constraint::ge(l, r),
            TreeOp::Eq => Constraint::eq(l, r),
        };
        out.constraints.push(c);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expr::GuardExpr;
    use crate::ir::program::Program;

    fn ctx_with(names: &[&str]) -> AnalysisContext {
        let mut ctx = AnalysisContext::from_program(&Program::new("t"));
        for n in names {
            ctx.declare(*n);
        }
        ctx
    }

    #[test]
    fn test_expr_to_linear() {
        let vars = VarMap::input(&["i".into(), "j".into()]);
        let ctx = ctx_with(&["N"]);
        // 2*i - j + N + 3
        let e = AffineExpr::add(
            &AffineExpr::sub(
                &AffineExpr::mul(2, &AffineExpr::var("i")),
                &AffineExpr::var("j"),
            ),
            &AffineExpr::add(&AffineExpr::var("N"), &AffineExpr::int(3)),
        );
        let lin = expr_to_linear(&e, &vars, &ctx).unwrap();
        assert_eq!(lin.coeff(&Var::In(0)), 2);
        assert_eq!(lin.coeff(&Var::In(1)), -1);
        assert_eq!(lin.coeff(&Var::Global("N".into())), 1);
        assert_eq!(lin.constant, 3);
    }

    #[test]
    fn test_unknown_name_fails() {
        let vars = VarMap::input(&["i".into()]);
        let ctx = ctx_with(&[]);
        let e = AffineExpr::var("mystery");
        assert!(expr_to_linear(&e, &vars, &ctx).is_err());
    }

    #[test]
    fn test_ne_guard_splits() {
        let vars = VarMap::input(&["i".into()]);
        let ctx = ctx_with(&[]);
        let g = GuardExpr::ne(&AffineExpr::var("i"), &AffineExpr::int(0));
        let cjs = guard_to_conjuncts(&g, &vars, &ctx).unwrap();
        assert_eq!(cjs.len(), 2);
    }

    #[test]
    fn test_tree_roundtrip_preserves_meaning() {
        // i' == i + 1 && i >= 0, through tree form and back
        let space = Space::map(vec!["i".into()], vec!["i".into()]);
        let mut cj = Conjunct::universe();
        let mut step = LinearExpr::var(Var::Out(0));
        step.add_term(Var::In(0), -1);
        step.constant = -1;
        cj.constraints.push(Constraint::eq_zero(step));
        cj.constraints
            .push(Constraint::ge_zero(LinearExpr::var(Var::In(0))));
        let rel = Relation::from_conjunct(space.clone(), cj);

        let tree = relation_to_tree(&rel).unwrap();
        let mut vars = VarMap::input(&["i".into()]);
        vars.bind("i'", Var::Out(0));
        let ctx = ctx_with(&[]);
        let back = tree_to_conjunct(&tree, &vars, &ctx).unwrap();
        let rel2 = Relation::from_conjunct(space, back);
        assert!(!rel.difference(&rel2).is_satisfiable());
        assert!(!rel2.difference(&rel).is_satisfiable());
    }
}
