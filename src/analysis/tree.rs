//! Condition trees and symbolic solving.
//!
//! A [`CondTree`] is the front-end-facing form of a relation's
//! constraints: comparisons over [`AffineExpr`] trees combined with
//! and/or. Trees are immutable; every rewrite (substitution, solving,
//! transitivity elimination) returns freshly built nodes and leaves the
//! input shared and intact.

use log::warn;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use crate::ir::expr::AffineExpr;
use crate::ir::program::AnalysisContext;
use crate::relation::{Relation, Var};
use crate::utils::errors::{AnalysisResult, BridgeError};

/// Comparison carried by a tree leaf. Everything is normalized to
/// `lhs == rhs` or `lhs >= rhs` on the way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeOp {
    /// `lhs == rhs`
    Eq,
    /// `lhs >= rhs`
    Ge,
}

/// A boolean condition over affine expression trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CondTree {
    /// `lhs op rhs`
    Cmp(TreeOp, Rc<AffineExpr>, Rc<AffineExpr>),
    /// Conjunction
    And(Rc<CondTree>, Rc<CondTree>),
    /// Disjunction
    Or(Rc<CondTree>, Rc<CondTree>),
}

impl CondTree {
    /// `lhs == rhs` leaf.
    pub fn eq(lhs: &Rc<AffineExpr>, rhs: &Rc<AffineExpr>) -> Rc<Self> {
        Rc::new(CondTree::Cmp(TreeOp::Eq, Rc::clone(lhs), Rc::clone(rhs)))
    }

    /// `lhs >= rhs` leaf.
    pub fn ge(lhs: &Rc<AffineExpr>, rhs: &Rc<AffineExpr>) -> Rc<Self> {
        Rc::new(CondTree::Cmp(TreeOp::Ge, Rc::clone(lhs), Rc::clone(rhs)))
    }

    /// Conjunction node.
    pub fn and(a: &Rc<CondTree>, b: &Rc<CondTree>) -> Rc<Self> {
        Rc::new(CondTree::And(Rc::clone(a), Rc::clone(b)))
    }

    /// Disjunction node.
    pub fn or(a: &Rc<CondTree>, b: &Rc<CondTree>) -> Rc<Self> {
        Rc::new(CondTree::Or(Rc::clone(a), Rc::clone(b)))
    }

    /// Fold a list of trees into a right-leaning conjunction.
    pub fn conjoin(parts: &[Rc<CondTree>]) -> Option<Rc<CondTree>> {
        let mut iter = parts.iter().rev();
        let mut acc = Rc::clone(iter.next()?);
        for p in iter {
            acc = CondTree::and(p, &acc);
        }
        Some(acc)
    }

    /// Split the tree at top-level disjunctions.
    ///
    /// `And` nodes above an `Or` distribute, so the result is a full
    /// disjunctive normal form; applying the split to any returned tree
    /// again yields just that tree back.
    pub fn split_disjunctions(self: &Rc<Self>) -> Vec<Rc<CondTree>> {
        match &**self {
            CondTree::Cmp(..) => vec![Rc::clone(self)],
            CondTree::Or(a, b) => {
                let mut out = a.split_disjunctions();
                out.extend(b.split_disjunctions());
                out
            }
            CondTree::And(a, b) => {
                let left = a.split_disjunctions();
                let right = b.split_disjunctions();
                let mut out = Vec::with_capacity(left.len() * right.len());
                for l in &left {
                    for r in &right {
                        out.push(CondTree::and(l, r));
                    }
                }
                out
            }
        }
    }

    /// The comparisons of a purely conjunctive tree, left to right.
    pub fn comparisons(self: &Rc<Self>) -> Vec<Rc<CondTree>> {
        match &**self {
            CondTree::Cmp(..) => vec![Rc::clone(self)],
            CondTree::And(a, b) => {
                let mut out = a.comparisons();
                out.extend(b.comparisons());
                out
            }
            CondTree::Or(..) => Vec::new(),
        }
    }

    /// Whether the tree mentions a variable.
    pub fn mentions(&self, var: &str) -> bool {
        match self {
            CondTree::Cmp(_, a, b) => {
                let mut vars = std::collections::BTreeSet::new();
                a.collect_vars(&mut vars);
                b.collect_vars(&mut vars);
                vars.contains(var)
            }
            CondTree::And(a, b) | CondTree::Or(a, b) => a.mentions(var) || b.mentions(var),
        }
    }

    /// Substitute `var := replacement` throughout, rebuilding only the
    /// paths that change.
    pub fn substitute(self: &Rc<Self>, var: &str, replacement: &Rc<AffineExpr>) -> Rc<CondTree> {
        match &**self {
            CondTree::Cmp(op, a, b) => Rc::new(CondTree::Cmp(
                *op,
                substitute_expr(a, var, replacement),
                substitute_expr(b, var, replacement),
            )),
            CondTree::And(a, b) => CondTree::and(
                &a.substitute(var, replacement),
                &b.substitute(var, replacement),
            ),
            CondTree::Or(a, b) => CondTree::or(
                &a.substitute(var, replacement),
                &b.substitute(var, replacement),
            ),
        }
    }
}

impl fmt::Display for CondTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CondTree::Cmp(TreeOp::Eq, a, b) => write!(f, "{} == {}", a, b),
            CondTree::Cmp(TreeOp::Ge, a, b) => write!(f, "{} >= {}", a, b),
            CondTree::And(a, b) => write!(f, "({}) && ({})", a, b),
            CondTree::Or(a, b) => write!(f, "({}) || ({})", a, b),
        }
    }
}

/// Substitute a variable in an expression tree, sharing unchanged
/// subtrees with the input.
pub fn substitute_expr(
    expr: &Rc<AffineExpr>,
    var: &str,
    replacement: &Rc<AffineExpr>,
) -> Rc<AffineExpr> {
    match &**expr {
        AffineExpr::Int(_) => Rc::clone(expr),
        AffineExpr::Var(name) => {
            if name == var {
                Rc::clone(replacement)
            } else {
                Rc::clone(expr)
            }
        }
        AffineExpr::Add(a, b) => {
            let na = substitute_expr(a, var, replacement);
            let nb = substitute_expr(b, var, replacement);
            if Rc::ptr_eq(&na, a) && Rc::ptr_eq(&nb, b) {
                Rc::clone(expr)
            } else {
                AffineExpr::add(&na, &nb)
            }
        }
        AffineExpr::Sub(a, b) => {
            let na = substitute_expr(a, var, replacement);
            let nb = substitute_expr(b, var, replacement);
            if Rc::ptr_eq(&na, a) && Rc::ptr_eq(&nb, b) {
                Rc::clone(expr)
            } else {
                AffineExpr::sub(&na, &nb)
            }
        }
        AffineExpr::Mul(c, a) => {
            let na = substitute_expr(a, var, replacement);
            if Rc::ptr_eq(&na, a) {
                Rc::clone(expr)
            } else {
                AffineExpr::mul(*c, &na)
            }
        }
        AffineExpr::Div(a, c) => {
            let na = substitute_expr(a, var, replacement);
            if Rc::ptr_eq(&na, a) {
                Rc::clone(expr)
            } else {
                AffineExpr::div(&na, *c)
            }
        }
    }
}

/// A linear view of an expression tree: name-keyed coefficients plus a
/// constant. `None` from [`LinearForm::from_expr`] means the tree is not
/// affine (e.g. an inexact division).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearForm {
    /// Coefficient per variable name.
    pub terms: BTreeMap<String, i64>,
    /// Constant term.
    pub constant: i64,
}

impl LinearForm {
    /// Linearize an expression tree.
    pub fn from_expr(expr: &AffineExpr) -> Option<Self> {
        match expr {
            AffineExpr::Int(v) => Some(Self {
                terms: BTreeMap::new(),
                constant: *v,
            }),
            AffineExpr::Var(name) => {
                let mut terms = BTreeMap::new();
                terms.insert(name.clone(), 1);
                Some(Self { terms, constant: 0 })
            }
            AffineExpr::Add(a, b) => {
                let mut l = Self::from_expr(a)?;
                let r = Self::from_expr(b)?;
                for (name, c) in r.terms {
                    *l.terms.entry(name).or_insert(0) += c;
                }
                l.constant += r.constant;
                l.retain_nonzero();
                Some(l)
            }
            AffineExpr::Sub(a, b) => {
                let mut l = Self::from_expr(a)?;
                let r = Self::from_expr(b)?;
                for (name, c) in r.terms {
                    *l.terms.entry(name).or_insert(0) -= c;
                }
                l.constant -= r.constant;
                l.retain_nonzero();
                Some(l)
            }
            AffineExpr::Mul(c, a) => {
                let mut l = Self::from_expr(a)?;
                for v in l.terms.values_mut() {
                    *v *= c;
                }
                l.constant *= c;
                l.retain_nonzero();
                Some(l)
            }
            AffineExpr::Div(a, c) => {
                if *c == 0 {
                    return None;
                }
                let l = Self::from_expr(a)?;
                if l.constant % c != 0 || l.terms.values().any(|v| v % c != 0) {
                    return None;
                }
                Some(Self {
                    terms: l.terms.iter().map(|(n, v)| (n.clone(), v / c)).collect(),
                    constant: l.constant / c,
                })
            }
        }
    }

    fn retain_nonzero(&mut self) {
        self.terms.retain(|_, c| *c != 0);
    }

    /// Coefficient of a name (0 when absent).
    pub fn coeff(&self, name: &str) -> i64 {
        self.terms.get(name).copied().unwrap_or(0)
    }

    /// Rebuild an expression tree from the linear view.
    pub fn to_expr(&self) -> Rc<AffineExpr> {
        let mut acc: Option<Rc<AffineExpr>> = None;
        for (name, &c) in &self.terms {
            let v = AffineExpr::var(name.clone());
            let term = if c == 1 { v } else { AffineExpr::mul(c, &v) };
            acc = Some(match acc {
                Some(prev) => AffineExpr::add(&prev, &term),
                None => term,
            });
        }
        match acc {
            Some(prev) if self.constant == 0 => prev,
            Some(prev) if self.constant < 0 => {
                AffineExpr::sub(&prev, &AffineExpr::int(-self.constant))
            }
            Some(prev) => AffineExpr::add(&prev, &AffineExpr::int(self.constant)),
            None => AffineExpr::int(self.constant),
        }
    }
}

/// Solve a single comparison for a variable.
///
/// For an equality `L == R` containing `var` with coefficient `a`, the
/// result is the expression `var` equals. When `|a| > 1` the solution
/// carries an exact division node; that path sees little exercise in
/// practice, so it is flagged in the log.
pub fn solve_cmp_for_var(cmp: &CondTree, var: &str) -> Option<Rc<AffineExpr>> {
    let CondTree::Cmp(TreeOp::Eq, lhs, rhs) = cmp else {
        return None;
    };
    let mut form = LinearForm::from_expr(&AffineExpr::Sub(Rc::clone(lhs), Rc::clone(rhs)))?;
    let a = form.terms.remove(var)?;
    // a*var + rest == 0  =>  var == -rest/a
    let mut rest = form;
    for v in rest.terms.values_mut() {
        *v = -*v;
    }
    rest.constant = -rest.constant;
    if a == 1 {
        Some(rest.to_expr())
    } else if a == -1 {
        for v in rest.terms.values_mut() {
            *v = -*v;
        }
        rest.constant = -rest.constant;
        Some(rest.to_expr())
    } else {
        warn!(
            "solving for '{}' divides by {}; verify the result",
            var, a
        );
        Some(AffineExpr::div(&rest.to_expr(), a))
    }
}

/// Iteration cap for [`solve_tree_for_var`].
const SOLVE_STEP_LIMIT: usize = 1000;

/// Solve a conjunctive tree for a variable.
///
/// Scans the equalities for one that isolates `var` with a solution not
/// mentioning `var` itself. Substitution chains through other
/// equalities are followed up to a step limit; exceeding it reports the
/// solve as unbounded rather than looping.
pub fn solve_tree_for_var(
    tree: &Rc<CondTree>,
    var: &str,
) -> AnalysisResult<Option<Rc<AffineExpr>>> {
    let mut steps = 0usize;
    for cmp in tree.comparisons() {
        steps += 1;
        if steps > SOLVE_STEP_LIMIT {
            return Err(BridgeError::unbounded(var).into());
        }
        if let Some(solution) = solve_cmp_for_var(&cmp, var) {
            let mut vars = std::collections::BTreeSet::new();
            solution.collect_vars(&mut vars);
            if !vars.contains(var) {
                return Ok(Some(solution));
            }
            // self-referential solution: try to cancel through another
            // equality before giving up on this candidate
            for other in tree.comparisons() {
                steps += 1;
                if steps > SOLVE_STEP_LIMIT {
                    return Err(BridgeError::unbounded(var).into());
                }
                if Rc::ptr_eq(&other, &cmp) {
                    continue;
                }
                for mention in vars.iter() {
                    if let Some(repl) = solve_cmp_for_var(&other, mention) {
                        let rewritten = substitute_expr(&solution, mention, &repl);
                        let mut rv = std::collections::BTreeSet::new();
                        rewritten.collect_vars(&mut rv);
                        if !rv.contains(var) {
                            return Ok(Some(rewritten));
                        }
                    }
                }
            }
        }
    }
    Ok(None)
}

/// Eliminate a variable from a conjunctive tree by transitivity.
///
/// Every pair of a lower bound `var >= lo` and an upper bound
/// `var <= hi` contributes `hi >= lo`; comparisons not mentioning the
/// variable pass through unchanged. Comparisons that mention the
/// variable non-linearly are dropped, widening the condition.
pub fn eliminate_var_by_transitivity(tree: &Rc<CondTree>, var: &str) -> Option<Rc<CondTree>> {
    let mut lowers: Vec<(i64, LinearForm)> = Vec::new();
    let mut uppers: Vec<(i64, LinearForm)> = Vec::new();
    let mut kept: Vec<Rc<CondTree>> = Vec::new();

    for cmp in tree.comparisons() {
        let CondTree::Cmp(op, lhs, rhs) = &*cmp else {
            continue;
        };
        if !cmp.mentions(var) {
            kept.push(Rc::clone(&cmp));
            continue;
        }
        let Some(mut form) =
            LinearForm::from_expr(&AffineExpr::Sub(Rc::clone(lhs), Rc::clone(rhs)))
        else {
            continue;
        };
        let a = form.coeff(var);
        if a == 0 {
            kept.push(Rc::clone(&cmp));
            continue;
        }
        form.terms.remove(var);
        match op {
            TreeOp::Ge => {
                // a*var + rest >= 0
                if a > 0 {
                    lowers.push((a, form));
                } else {
                    uppers.push((-a, form));
                }
            }
            TreeOp::Eq => {
                // an equality bounds from both sides
                if a > 0 {
                    lowers.push((a, form.clone()));
                    uppers.push((a, negate_form(form)));
                } else {
                    uppers.push((-a, form.clone()));
                    lowers.push((-a, negate_form(form)));
                }
            }
        }
    }

    use num_integer::Integer;
    for (a, lo_rest) in &lowers {
        for (b, up_rest) in &uppers {
            // a*var >= -lo_rest and b*var <= up_rest'...
            // scaled combination: b*lo_rest + a*up_rest >= 0
            let g = a.gcd(b);
            let mut combined = LinearForm::default();
            for (name, &c) in &lo_rest.terms {
                *combined.terms.entry(name.clone()).or_insert(0) += c * (b / g);
            }
            combined.constant += lo_rest.constant * (b / g);
            for (name, &c) in &up_rest.terms {
                *combined.terms.entry(name.clone()).or_insert(0) += c * (a / g);
            }
            combined.constant += up_rest.constant * (a / g);
            combined.retain_nonzero();
            kept.push(CondTree::ge(&combined.to_expr(), &AffineExpr::int(0)));
        }
    }

    CondTree::conjoin(&kept)
}

fn negate_form(mut form: LinearForm) -> LinearForm {
    for v in form.terms.values_mut() {
        *v = -*v;
    }
    form.constant = -form.constant;
    form
}

/// Textual bounds of a variable in a conjunctive tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBounds {
    /// Greatest lower bound, folded with `MAX(..)`; `"??"` when unknown
    pub lower: String,
    /// Least upper bound, folded with `MIN(..)`; `"??"` when unknown
    pub upper: String,
}

impl fmt::Display for VarBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.lower, self.upper)
    }
}

/// Extract the bounds on `var` from the comparisons of a conjunctive
/// tree. Multiple lower bounds fold into `MAX(a, b)`, multiple upper
/// bounds into `MIN(a, b)`; a comparison that mentions the variable but
/// cannot be solved for it collapses that side to `"??"`.
///
/// A solved bound may only reference names in `known_vars` or globals
/// registered in `ctx`, and never an output variable of `relation`: a
/// bound over a name the emitted guard cannot evaluate also collapses
/// its side to `"??"`.
pub fn find_bounds_of_var(
    tree: &Rc<CondTree>,
    var: &str,
    known_vars: &BTreeSet<String>,
    relation: &Relation,
    ctx: &AnalysisContext,
) -> VarBounds {
    let outputs: BTreeSet<String> = (0..relation.n_out())
        .map(|i| relation.space.name_of(&Var::Out(i)))
        .collect();
    let in_scope = |form: &LinearForm| {
        form.terms.keys().all(|name| {
            !outputs.contains(name) && (known_vars.contains(name) || ctx.is_global(name))
        })
    };

    let mut lower: Option<String> = None;
    let mut upper: Option<String> = None;
    let mut lower_unknown = false;
    let mut upper_unknown = false;

    for cmp in tree.comparisons() {
        let CondTree::Cmp(op, lhs, rhs) = &*cmp else {
            continue;
        };
        if !cmp.mentions(var) {
            continue;
        }
        let solved = LinearForm::from_expr(&AffineExpr::Sub(Rc::clone(lhs), Rc::clone(rhs)));
        let Some(mut form) = solved else {
            lower_unknown = true;
            upper_unknown = true;
            continue;
        };
        let a = form.coeff(var);
        if a == 0 {
            continue;
        }
        form.terms.remove(var);
        match op {
            TreeOp::Eq => {
                if a.abs() != 1 || !in_scope(&form) {
                    lower_unknown = true;
                    upper_unknown = true;
                    continue;
                }
                // var == -rest/a
                let bound = if a == 1 { negate_form(form) } else { form };
                let text = format!("{}", bound.to_expr());
                fold_bound(&mut lower, "MAX", &text);
                fold_bound(&mut upper, "MIN", &text);
            }
            TreeOp::Ge => {
                if a.abs() != 1 || !in_scope(&form) {
                    if a > 0 {
                        lower_unknown = true;
                    } else {
                        upper_unknown = true;
                    }
                    continue;
                }
                if a == 1 {
                    // var >= -rest
                    let text = format!("{}", negate_form(form).to_expr());
                    fold_bound(&mut lower, "MAX", &text);
                } else {
                    // var <= rest
                    let text = format!("{}", form.to_expr());
                    fold_bound(&mut upper, "MIN", &text);
                }
            }
        }
    }

    VarBounds {
        lower: match lower {
            Some(text) if !lower_unknown => text,
            _ => "??".to_string(),
        },
        upper: match upper {
            Some(text) if !upper_unknown => text,
            _ => "??".to_string(),
        },
    }
}

fn fold_bound(slot: &mut Option<String>, fold: &str, text: &str) {
    *slot = Some(match slot.take() {
        Some(prev) if prev != text => format!("{}({}, {})", fold, prev, text),
        Some(prev) => prev,
        None => text.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(name: &str) -> Rc<AffineExpr> {
        AffineExpr::var(name)
    }

    #[test]
    fn test_split_disjunctions_idempotent() {
        let a = CondTree::ge(&v("i"), &AffineExpr::int(0));
        let b = CondTree::eq(&v("j"), &v("i"));
        let c = CondTree::ge(&v("k"), &v("j"));
        let tree = CondTree::and(&CondTree::or(&a, &b), &c);
        let split = tree.split_disjunctions();
        assert_eq!(split.len(), 2);
        for part in &split {
            assert_eq!(part.split_disjunctions(), vec![Rc::clone(part)]);
        }
    }

    #[test]
    fn test_solve_cmp() {
        // i + 1 == j  solved for i gives j - 1
        let cmp = CondTree::eq(&AffineExpr::add(&v("i"), &AffineExpr::int(1)), &v("j"));
        let sol = solve_cmp_for_var(&cmp, "i").unwrap();
        let form = LinearForm::from_expr(&sol).unwrap();
        assert_eq!(form.coeff("j"), 1);
        assert_eq!(form.constant, -1);
    }

    #[test]
    fn test_solve_tree_skips_self_reference() {
        // j == j has no solution for j; j == i + 2 does
        let selfy = CondTree::eq(&v("j"), &v("j"));
        let good = CondTree::eq(&v("j"), &AffineExpr::add(&v("i"), &AffineExpr::int(2)));
        let tree = CondTree::and(&selfy, &good);
        let sol = solve_tree_for_var(&tree, "j").unwrap().unwrap();
        let form = LinearForm::from_expr(&sol).unwrap();
        assert_eq!(form.coeff("i"), 1);
        assert_eq!(form.constant, 2);
    }

    #[test]
    fn test_transitivity_elimination() {
        // i >= lo  and  hi >= i  collapse to  hi >= lo
        let lower = CondTree::ge(&v("i"), &v("lo"));
        let upper = CondTree::ge(&v("hi"), &v("i"));
        let tree = CondTree::and(&lower, &upper);
        let out = eliminate_var_by_transitivity(&tree, "i").unwrap();
        assert!(!out.mentions("i"));
        assert!(out.mentions("hi"));
        assert!(out.mentions("lo"));
    }

    fn bounds_scope(globals: &[&str]) -> (BTreeSet<String>, Relation, AnalysisContext) {
        use crate::ir::program::Program;
        use crate::relation::Space;

        let mut ctx = AnalysisContext::from_program(&Program::new("t"));
        for g in globals {
            ctx.declare(*g);
        }
        let relation = Relation::universe(Space::map(vec!["k".into()], vec!["k".into()]));
        (BTreeSet::from(["k".to_string()]), relation, ctx)
    }

    #[test]
    fn test_find_bounds_folds() {
        // 0 <= k, k <= N-1, k <= M  =>  0..MIN(N - 1, M)
        let zero = AffineExpr::int(0);
        let t1 = CondTree::ge(&v("k"), &zero);
        let t2 = CondTree::ge(&AffineExpr::sub(&v("N"), &AffineExpr::int(1)), &v("k"));
        let t3 = CondTree::ge(&v("M"), &v("k"));
        let tree = CondTree::conjoin(&[t1, t2, t3]).unwrap();
        let (known, relation, ctx) = bounds_scope(&["N", "M"]);
        let bounds = find_bounds_of_var(&tree, "k", &known, &relation, &ctx);
        assert_eq!(bounds.lower, "0");
        assert!(bounds.upper.starts_with("MIN("));
        assert!(bounds.upper.contains('M'));
    }

    #[test]
    fn test_find_bounds_unknown() {
        // 2k <= N cannot be solved with unit coefficient
        let two_k = AffineExpr::mul(2, &v("k"));
        let tree = CondTree::ge(&v("N"), &two_k);
        let (known, relation, ctx) = bounds_scope(&["N"]);
        let bounds = find_bounds_of_var(&tree, "k", &known, &relation, &ctx);
        assert_eq!(bounds.upper, "??");
        assert_eq!(bounds.lower, "??");
    }

    #[test]
    fn test_find_bounds_rejects_unknown_name() {
        // k >= free is not a usable lower bound when `free` is neither
        // a known variable nor a registered global
        let tree = CondTree::ge(&v("k"), &v("free"));
        let (known, relation, ctx) = bounds_scope(&["N"]);
        let bounds = find_bounds_of_var(&tree, "k", &known, &relation, &ctx);
        assert_eq!(bounds.lower, "??");
        // a bound over a known global still comes through
        let tree = CondTree::ge(&v("k"), &v("N"));
        let bounds = find_bounds_of_var(&tree, "k", &known, &relation, &ctx);
        assert_eq!(bounds.lower, "N");
    }

    #[test]
    fn test_find_bounds_rejects_output_variable() {
        use crate::ir::program::Program;
        use crate::relation::Space;

        // the output side of `{[k] -> [j]}` cannot appear in a bound
        // on the input side
        let tree = CondTree::ge(&v("j"), &v("k"));
        let ctx = AnalysisContext::from_program(&Program::new("t"));
        let relation = Relation::universe(Space::map(vec!["k".into()], vec!["j".into()]));
        let known = BTreeSet::from(["k".to_string(), "j".to_string()]);
        let bounds = find_bounds_of_var(&tree, "k", &known, &relation, &ctx);
        assert_eq!(bounds.upper, "??");
    }
}
