//! Presburger-style relations: disjunctions of affine conjuncts with
//! named input/output tuples.
//!
//! A [`Relation`] is the unit the dependence passes trade in: an arrow
//! set `{ [i,j] -> [i',j'] : constraints }`. The algebra here covers the
//! operations those passes need (union, intersection, difference,
//! complement, composition, inverse, transitive closure, satisfiability)
//! with the approximation directions that are safe for dependence
//! analysis: a result may describe extra arrows, never fewer, except for
//! the transitive closure which only under-approximates (see
//! [`Relation::transitive_closure`]).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::constraint::{Conjunct, Constraint, ConstraintKind};
use super::eliminate::eliminate;
use super::linear::{LinearExpr, Var};
use super::space::Space;

/// A union of conjuncts over a common space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// The named tuple variables
    pub space: Space,
    /// The disjuncts; an empty vector is the empty relation
    pub disjuncts: Vec<Conjunct>,
}

impl Relation {
    /// The empty relation over a space.
    pub fn empty(space: Space) -> Self {
        Self {
            space,
            disjuncts: Vec::new(),
        }
    }

    /// The universal relation over a space.
    pub fn universe(space: Space) -> Self {
        Self {
            space,
            disjuncts: vec![Conjunct::universe()],
        }
    }

    /// A relation with a single conjunct.
    pub fn from_conjunct(space: Space, conjunct: Conjunct) -> Self {
        Self {
            space,
            disjuncts: vec![conjunct],
        }
    }

    /// Whether the relation has no disjuncts at all.
    pub fn is_empty(&self) -> bool {
        self.disjuncts.is_empty()
    }

    /// Input tuple arity.
    pub fn n_in(&self) -> usize {
        self.space.n_in()
    }

    /// Output tuple arity.
    pub fn n_out(&self) -> usize {
        self.space.n_out()
    }

    /// Add a disjunct.
    pub fn push(&mut self, conjunct: Conjunct) {
        self.disjuncts.push(conjunct);
    }

    /// Whether some integer point satisfies some disjunct.
    ///
    /// All variables, parameters included, are treated existentially.
    pub fn is_satisfiable(&self) -> bool {
        self.disjuncts.iter().any(|cj| {
            let vars: Vec<Var> = cj.vars().into_iter().collect();
            !eliminate(cj, &vars).trivially_false()
        })
    }

    /// Project the existentials out of every conjunct, normalize the
    /// constraints, and drop unsatisfiable or duplicate disjuncts.
    pub fn simplify(&self) -> Self {
        let mut out = Vec::new();
        for cj in &self.disjuncts {
            let ex: Vec<Var> = cj.exists_vars().into_iter().map(Var::Exists).collect();
            let projected = eliminate(cj, &ex);
            if projected.trivially_false() {
                continue;
            }
            // local satisfiability check before keeping the disjunct
            let all: Vec<Var> = projected.vars().into_iter().collect();
            if eliminate(&projected, &all).trivially_false() {
                continue;
            }
            if !out.contains(&projected) {
                out.push(projected);
            }
        }
        Self {
            space: self.space.clone(),
            disjuncts: out,
        }
    }

    /// Union with another relation over the same space shape.
    pub fn union_with(&self, other: &Relation) -> Self {
        debug_assert_eq!(self.n_in(), other.n_in());
        debug_assert_eq!(self.n_out(), other.n_out());
        let mut disjuncts = self.disjuncts.clone();
        let offset = exists_base(&disjuncts);
        for cj in &other.disjuncts {
            disjuncts.push(renumber_exists(cj, offset));
        }
        Self {
            space: self.space.clone(),
            disjuncts,
        }
    }

    /// Intersection: pairwise conjunct merge.
    pub fn intersection(&self, other: &Relation) -> Self {
        debug_assert_eq!(self.n_in(), other.n_in());
        debug_assert_eq!(self.n_out(), other.n_out());
        let mut disjuncts = Vec::new();
        for a in &self.disjuncts {
            let offset = exists_base(std::slice::from_ref(a));
            for b in &other.disjuncts {
                let mut merged = a.clone();
                merged.extend(&renumber_exists(b, offset));
                if !merged.trivially_false() {
                    disjuncts.push(merged);
                }
            }
        }
        Self {
            space: self.space.clone(),
            disjuncts,
        }
    }

    /// Complement of the relation within its space.
    ///
    /// Conjuncts are projected quantifier-free first, so the negation
    /// distributes over plain constraints. `!(e >= 0)` is `-e-1 >= 0`;
    /// an equality splits into two strict sides.
    pub fn complement(&self) -> Self {
        let simplified = self.simplify();
        let mut acc = Relation::universe(self.space.clone());
        for cj in &simplified.disjuncts {
            let mut negated = Relation::empty(self.space.clone());
            for c in &cj.constraints {
                match c.kind {
                    ConstraintKind::Inequality => {
                        let mut single = Conjunct::universe();
                        single.constraints.push(c.negate_inequality());
                        negated.push(single);
                    }
                    ConstraintKind::Equality => {
                        // e != 0  <=>  e - 1 >= 0  or  -e - 1 >= 0
                        let mut pos = c.expr.clone();
                        pos.constant -= 1;
                        let mut neg = c.expr.clone().scale(-1);
                        neg.constant -= 1;
                        let mut above = Conjunct::universe();
                        above.constraints.push(Constraint::ge_zero(pos));
                        negated.push(above);
                        let mut below = Conjunct::universe();
                        below.constraints.push(Constraint::ge_zero(neg));
                        negated.push(below);
                    }
                }
            }
            acc = acc.intersection(&negated);
        }
        acc.simplify()
    }

    /// Set difference: `self - other` as `self /\ !other`.
    pub fn difference(&self, other: &Relation) -> Self {
        self.intersection(&other.complement()).simplify()
    }

    /// Swap the input and output tuples.
    pub fn inverse(&self) -> Self {
        let disjuncts = self
            .disjuncts
            .iter()
            .map(|cj| {
                cj.constraints
                    .iter()
                    .map(|c| {
                        let mut expr = LinearExpr::constant(c.expr.constant);
                        for (v, &coeff) in &c.expr.terms {
                            let flipped = match v {
                                Var::In(i) => Var::Out(*i),
                                Var::Out(i) => Var::In(*i),
                                other => other.clone(),
                            };
                            expr.add_term(flipped, coeff);
                        }
                        Constraint { expr, kind: c.kind }
                    })
                    .collect::<Vec<_>>()
            })
            .map(|constraints| Conjunct { constraints })
            .collect();
        Self {
            space: self.space.inverse(),
            disjuncts,
        }
    }

    /// Composition `self o other`: apply `other` first, then `self`.
    ///
    /// Requires `other.n_out() == self.n_in()`. The shared middle tuple
    /// becomes existential and is projected out.
    pub fn compose(&self, other: &Relation) -> Self {
        let mid = self.n_in();
        debug_assert_eq!(other.n_out(), mid);
        let space = Space::map(other.space.input.clone(), self.space.output.clone());
        let mut result = Relation::empty(space);
        for g in &other.disjuncts {
            for f in &self.disjuncts {
                // keep the two conjuncts' own existentials apart
                let base = exists_base(std::slice::from_ref(g));
                let f = renumber_exists(f, base);
                let mid_base = exists_base(&[g.clone(), f.clone()]);
                let g = remap(g, |v| match v {
                    Var::Out(i) => Var::Exists(mid_base + i),
                    other => other.clone(),
                });
                let f = remap(&f, |v| match v {
                    Var::In(i) => Var::Exists(mid_base + i),
                    other => other.clone(),
                });
                let mut merged = g;
                merged.extend(&f);
                let mids: Vec<Var> = (0..mid).map(|i| Var::Exists(mid_base + i)).collect();
                let projected = eliminate(&merged, &mids);
                if !projected.trivially_false() {
                    result.push(projected);
                }
            }
        }
        result.simplify()
    }

    /// Positive transitive closure `R+`.
    ///
    /// A conjunct whose output tuple is a constant translation of its
    /// input tuple (`out_i == in_i + d_i`) closes exactly with a fresh
    /// step count `t >= 1`, with every bound constraint required at
    /// both the first and last link of the chain. Other conjuncts
    /// contribute a bounded union of repeated compositions instead, an
    /// under-approximation. Missing long interleaved paths only leaves
    /// a redundant synchronization in place, it never removes a needed
    /// one.
    pub fn transitive_closure(&self) -> Self {
        let simplified = self.simplify();
        let mut result = simplified.clone();
        let mut needs_powers = false;
        for cj in &simplified.disjuncts {
            let closed = uniform_distance(cj, self.n_in())
                .and_then(|distances| close_uniform(cj, &distances));
            match closed {
                Some(closed) => result.push(closed),
                None => needs_powers = true,
            }
        }
        if needs_powers && self.n_in() == self.n_out() {
            let mut power = simplified.clone();
            for _ in 0..3 {
                power = power.compose(&simplified);
                if !power.is_satisfiable() {
                    break;
                }
                result = result.union_with(&power);
            }
        }
        result.simplify()
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.disjuncts.is_empty() {
            return write!(f, "{{ {} : false }}", self.space);
        }
        let body: Vec<String> = self
            .disjuncts
            .iter()
            .map(|cj| {
                if cj.constraints.is_empty() {
                    "true".to_string()
                } else {
                    cj.constraints
                        .iter()
                        .map(|c| {
                            let rendered = c.expr.to_string_with(|v| self.space.name_of(v));
                            match c.kind {
                                ConstraintKind::Inequality => format!("{} >= 0", rendered),
                                ConstraintKind::Equality => format!("{} == 0", rendered),
                            }
                        })
                        .collect::<Vec<_>>()
                        .join(" && ")
                }
            })
            .collect();
        write!(f, "{{ {} : {} }}", self.space, body.join(" || "))
    }
}

/// First existential id unused by any of the conjuncts.
fn exists_base(conjuncts: &[Conjunct]) -> usize {
    conjuncts
        .iter()
        .flat_map(|cj| cj.exists_vars())
        .max()
        .map(|m| m + 1)
        .unwrap_or(0)
}

/// Shift every existential id by `offset`.
fn renumber_exists(cj: &Conjunct, offset: usize) -> Conjunct {
    if offset == 0 {
        return cj.clone();
    }
    remap(cj, |v| match v {
        Var::Exists(i) => Var::Exists(i + offset),
        other => other.clone(),
    })
}

/// Rebuild a conjunct with every variable passed through `f`.
fn remap<F>(cj: &Conjunct, f: F) -> Conjunct
where
    F: Fn(&Var) -> Var,
{
    Conjunct {
        constraints: cj
            .constraints
            .iter()
            .map(|c| {
                let mut expr = LinearExpr::constant(c.expr.constant);
                for (v, &coeff) in &c.expr.terms {
                    expr.add_term(f(v), coeff);
                }
                Constraint { expr, kind: c.kind }
            })
            .collect(),
    }
}

/// If the conjunct's equalities pin `out_i - in_i` to a constant for
/// every tuple position, return those distances.
fn uniform_distance(cj: &Conjunct, arity: usize) -> Option<Vec<i64>> {
    let mut distances = vec![None; arity];
    for c in &cj.constraints {
        if !c.is_equality() {
            continue;
        }
        // look for out_i - in_i == d (in either sign)
        for i in 0..arity {
            let a_out = c.expr.coeff(&Var::Out(i));
            let a_in = c.expr.coeff(&Var::In(i));
            if a_out == 0 && a_in == 0 {
                continue;
            }
            let only_this_pair = c
                .expr
                .vars()
                .all(|v| *v == Var::Out(i) || *v == Var::In(i));
            if !only_this_pair {
                return None;
            }
            if a_out == 1 && a_in == -1 {
                distances[i] = Some(-c.expr.constant);
            } else if a_out == -1 && a_in == 1 {
                distances[i] = Some(c.expr.constant);
            } else {
                return None;
            }
        }
    }
    distances.into_iter().collect()
}

/// Closure of a uniform-translation conjunct: replace each
/// `out_i == in_i + d_i` by `out_i == in_i + d_i*t` with `t >= 1`.
///
/// Every other constraint must hold at each link of the chain
/// `x -> x+d -> .. -> x+t*d`. Its value along the chain is linear in
/// the link number, so requiring it at the first link (in terms of the
/// input tuple) and at the last link (in terms of the output tuple)
/// covers every link between. Conjuncts carrying existential variables
/// would need a fresh witness per link and return `None`.
fn close_uniform(cj: &Conjunct, distances: &[i64]) -> Option<Conjunct> {
    if cj
        .constraints
        .iter()
        .any(|c| c.expr.vars().any(|v| matches!(v, Var::Exists(_))))
    {
        return None;
    }
    let t = exists_base(std::slice::from_ref(cj));
    let mut out = Conjunct::universe();
    for c in &cj.constraints {
        let is_step = c.is_equality()
            && (0..distances.len()).any(|i| {
                c.expr.coeff(&Var::Out(i)) != 0 || c.expr.coeff(&Var::In(i)) != 0
            });
        if is_step {
            continue;
        }
        let tuple_free = (0..distances.len())
            .all(|i| c.expr.coeff(&Var::In(i)) == 0 && c.expr.coeff(&Var::Out(i)) == 0);
        if tuple_free {
            out.constraints.push(c.clone());
            continue;
        }
        let mut first = LinearExpr::constant(c.expr.constant);
        let mut last = LinearExpr::constant(c.expr.constant);
        for (v, &coeff) in &c.expr.terms {
            match v {
                Var::In(i) => {
                    first.add_term(Var::In(*i), coeff);
                    last.add_term(Var::Out(*i), coeff);
                    last.constant -= coeff * distances[*i];
                }
                Var::Out(i) => {
                    first.add_term(Var::In(*i), coeff);
                    first.constant += coeff * distances[*i];
                    last.add_term(Var::Out(*i), coeff);
                }
                other => {
                    first.add_term(other.clone(), coeff);
                    last.add_term(other.clone(), coeff);
                }
            }
        }
        out.constraints.push(Constraint::ge_zero(first));
        out.constraints.push(Constraint::ge_zero(last));
    }
    for (i, &d) in distances.iter().enumerate() {
        let mut e = LinearExpr::var(Var::Out(i));
        e.add_term(Var::In(i), -1);
        e.add_term(Var::Exists(t), -d);
        out.constraints.push(Constraint::eq_zero(e));
    }
    // t >= 1
    let mut step = LinearExpr::var(Var::Exists(t));
    step.constant = -1;
    out.constraints.push(Constraint::ge_zero(step));
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lin(terms: &[(Var, i64)], constant: i64) -> LinearExpr {
        let mut e = LinearExpr::constant(constant);
        for (v, c) in terms {
            e.add_term(v.clone(), *c);
        }
        e
    }

    /// `{ [k] -> [k'] : k' == k + d && 0 <= k && k' <= ub }`
    fn shift_relation(d: i64, ub: i64) -> Relation {
        let space = Space::map(vec!["k".into()], vec!["k".into()]);
        let mut cj = Conjunct::universe();
        cj.constraints.push(Constraint::eq_zero(lin(
            &[(Var::Out(0), 1), (Var::In(0), -1)],
            -d,
        )));
        cj.constraints
            .push(Constraint::ge_zero(lin(&[(Var::In(0), 1)], 0)));
        cj.constraints
            .push(Constraint::ge_zero(lin(&[(Var::Out(0), -1)], ub)));
        Relation::from_conjunct(space, cj)
    }

    #[test]
    fn test_satisfiable() {
        let r = shift_relation(1, 10);
        assert!(r.is_satisfiable());
        let empty = Relation::empty(r.space.clone());
        assert!(!empty.is_satisfiable());
    }

    #[test]
    fn test_intersection_conflicting_shifts() {
        let a = shift_relation(1, 10);
        let b = shift_relation(2, 10);
        let both = a.intersection(&b);
        assert!(!both.is_satisfiable());
    }

    #[test]
    fn test_difference_removes_everything() {
        let a = shift_relation(1, 10);
        let d = a.difference(&a);
        assert!(!d.is_satisfiable());
    }

    #[test]
    fn test_complement_misses_original() {
        let a = shift_relation(1, 10);
        let c = a.complement();
        assert!(!a.intersection(&c).is_satisfiable());
    }

    #[test]
    fn test_compose_shifts_add() {
        let a = shift_relation(1, 10);
        let b = shift_relation(2, 10);
        // a o b shifts by 3
        let ab = a.compose(&b);
        assert!(ab.is_satisfiable());
        let three = shift_relation(3, 10);
        // every arrow of a o b shifts by exactly 3
        assert!(!ab.difference(&three).is_satisfiable());
    }

    #[test]
    fn test_inverse() {
        let a = shift_relation(1, 10);
        let inv = a.inverse();
        // inverse shifts by -1: composing gives the identity on the domain
        let id = a.compose(&inv);
        assert!(id.is_satisfiable());
    }

    #[test]
    fn test_transitive_closure_uniform() {
        let a = shift_relation(1, 10);
        let tc = a.transitive_closure();
        // the closure must contain the shift by 5
        let five = shift_relation(5, 10);
        assert!(!five.difference(&tc).is_satisfiable());
        // and must not contain any backward arrow
        let back = shift_relation(-1, 10);
        assert!(!tc.intersection(&back).is_satisfiable());
    }

    #[test]
    fn test_transitive_closure_one_sided_bound() {
        // {[k] -> [k'] : k' == k + 1 && k <= 5}: every link of a chain
        // needs its source at or below 5, so no chain reaches past 6
        let space = Space::map(vec!["k".into()], vec!["k".into()]);
        let mut cj = Conjunct::universe();
        cj.constraints.push(Constraint::eq_zero(lin(
            &[(Var::Out(0), 1), (Var::In(0), -1)],
            -1,
        )));
        cj.constraints
            .push(Constraint::ge_zero(lin(&[(Var::In(0), -1)], 5)));
        let r = Relation::from_conjunct(space.clone(), cj);
        let tc = r.transitive_closure();

        let chain = |d: i64, lo: i64| {
            let mut cj = Conjunct::universe();
            cj.constraints.push(Constraint::eq_zero(lin(
                &[(Var::Out(0), 1), (Var::In(0), -1)],
                -d,
            )));
            cj.constraints
                .push(Constraint::ge_zero(lin(&[(Var::In(0), 1)], -lo)));
            Relation::from_conjunct(space.clone(), cj)
        };
        // two steps from k = 5 would pass through 6
        assert!(!tc.intersection(&chain(2, 5)).is_satisfiable());
        // two steps from k = 4 stay inside the bound
        assert!(tc.intersection(&chain(2, 4)).is_satisfiable());
    }

    #[test]
    fn test_simplify_preserves_satisfiability() {
        let a = shift_relation(1, 10);
        let b = shift_relation(3, 10);
        let r = a.union_with(&b);
        assert!(r.is_satisfiable());
        let s = r.simplify();
        assert!(s.is_satisfiable());
        // no arrow gained or lost
        assert!(!s.difference(&r).is_satisfiable());
        assert!(!r.difference(&s).is_satisfiable());
    }

    #[test]
    fn test_simplify_drops_empty_disjuncts() {
        let mut r = shift_relation(1, 10);
        let mut dead = Conjunct::universe();
        dead.constraints
            .push(Constraint::ge_zero(LinearExpr::constant(-1)));
        r.push(dead);
        assert_eq!(r.disjuncts.len(), 2);
        assert_eq!(r.simplify().disjuncts.len(), 1);
    }
}
