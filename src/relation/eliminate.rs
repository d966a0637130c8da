//! Variable elimination (existential projection) on conjuncts.
//!
//! Projection prefers exact equality substitution and falls back to
//! Fourier-Motzkin combination of bound pairs. The inequality paths are
//! exact over the rationals and may over-approximate the integer
//! projection; for dependence analysis the over-approximation direction
//! only ever keeps an edge, never drops one.

use num_integer::Integer;

use super::constraint::{Conjunct, Constraint, ConstraintKind};
use super::linear::{LinearExpr, Var};

/// Eliminate each of `targets` from the conjunct.
///
/// The result mentions none of the target variables. It may be trivially
/// false when the conjunct forces an infeasible combination.
pub fn eliminate(conjunct: &Conjunct, targets: &[Var]) -> Conjunct {
    let mut current = conjunct.simplify();
    for v in targets {
        if current.trivially_false() {
            return current;
        }
        current = eliminate_one(&current, v);
    }
    current.simplify()
}

fn eliminate_one(conjunct: &Conjunct, v: &Var) -> Conjunct {
    // Exact path: an equality with a unit coefficient on v.
    if let Some((idx, repl)) = find_unit_equality(conjunct, v) {
        let mut rest = Conjunct::universe();
        for (i, c) in conjunct.constraints.iter().enumerate() {
            if i != idx {
                rest.constraints.push(c.clone());
            }
        }
        return rest.substitute(v, &repl).simplify();
    }

    // Equality with a non-unit coefficient: scaled substitution, exact
    // over the rationals. The equality's own divisibility requirement is
    // kept as a normalized residue constraint when it has no solution.
    if let Some(idx) = conjunct
        .constraints
        .iter()
        .position(|c| c.is_equality() && c.expr.coeff(v) != 0)
    {
        return scaled_substitution(conjunct, v, idx);
    }

    fourier_motzkin(conjunct, v)
}

/// Find `v == repl` among the equalities, where v's coefficient is +-1.
fn find_unit_equality(conjunct: &Conjunct, v: &Var) -> Option<(usize, LinearExpr)> {
    for (idx, c) in conjunct.constraints.iter().enumerate() {
        if !c.is_equality() {
            continue;
        }
        let coeff = c.expr.coeff(v);
        if coeff == 1 || coeff == -1 {
            // a*v + rest == 0  =>  v == -rest/a
            let mut rest = c.expr.clone();
            rest.remove(v);
            let repl = rest.scale(-coeff);
            return Some((idx, repl));
        }
    }
    None
}

/// Substitute v out of every other constraint using the equality at
/// `eq_idx`, scaling each constraint so the substitution stays integral.
fn scaled_substitution(conjunct: &Conjunct, v: &Var, eq_idx: usize) -> Conjunct {
    let eq = &conjunct.constraints[eq_idx];
    let a = eq.expr.coeff(v);
    // a*v == -rest
    let mut rest = eq.expr.clone();
    rest.remove(v);
    let a_abs = a.abs();
    let sign = a.signum();

    let mut out = Conjunct::universe();
    // a*v == -rest requires a to divide rest. Check it exactly when rest
    // is constant; otherwise the divisibility is dropped, which
    // over-approximates the integer projection.
    if let Some(k) = rest.as_constant() {
        if k % a_abs != 0 {
            out.constraints
                .push(Constraint::eq_zero(LinearExpr::constant(1)));
            return out;
        }
    }
    for (i, c) in conjunct.constraints.iter().enumerate() {
        if i == eq_idx {
            continue;
        }
        let b = c.expr.coeff(v);
        if b == 0 {
            out.constraints.push(c.clone());
            continue;
        }
        // |a|*(b*v + f) = b*sign(a)*(a*v) + |a|*f = -b*sign(a)*rest + |a|*f
        let mut f = c.expr.clone();
        f.remove(v);
        let combined = rest.scale(-b * sign) + f.scale(a_abs);
        out.constraints.push(Constraint {
            expr: combined,
            kind: c.kind,
        });
    }
    out.simplify()
}

/// Classic Fourier-Motzkin step for one variable over the inequalities.
fn fourier_motzkin(conjunct: &Conjunct, v: &Var) -> Conjunct {
    let mut lowers: Vec<(i64, LinearExpr)> = Vec::new(); // a > 0: a*v + e >= 0
    let mut uppers: Vec<(i64, LinearExpr)> = Vec::new(); // a < 0: a*v + e >= 0
    let mut out = Conjunct::universe();

    for c in &conjunct.constraints {
        let a = c.expr.coeff(v);
        if a == 0 {
            out.constraints.push(c.clone());
            continue;
        }
        debug_assert_eq!(c.kind, ConstraintKind::Inequality);
        let mut e = c.expr.clone();
        e.remove(v);
        if a > 0 {
            lowers.push((a, e));
        } else {
            uppers.push((-a, e));
        }
    }

    // Pair every lower bound with every upper bound:
    //   a*v >= -e  and  b*v <= f  imply  b*(-e) <= a*f, i.e. b*e + a*f >= 0.
    for (a, e) in &lowers {
        for (b, f) in &uppers {
            let g = a.gcd(b);
            let combined = e.scale(b / g) + f.scale(a / g);
            out.constraints.push(Constraint::ge_zero(combined));
        }
    }
    out.simplify()
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

    #[test]
    fn test_unit_equality_substitution() {
        // e0 == in0 + 1, out0 == e0  =>  out0 == in0 + 1
        let mut cj = Conjunct::universe();
        cj.constraints.push(Constraint::eq_zero(lin(
            &[(Var::Exists(0), 1), (Var::In(0), -1)],
            -1,
        )));
        cj.constraints.push(Constraint::eq_zero(lin(
            &[(Var::Out(0), 1), (Var::Exists(0), -1)],
            0,
        )));
        let r = eliminate(&cj, &[Var::Exists(0)]);
        assert_eq!(r.constraints.len(), 1);
        let c = &r.constraints[0];
        assert!(c.is_equality());
        assert_eq!(c.expr.coeff(&Var::Out(0)).abs(), 1);
        assert_eq!(c.expr.coeff(&Var::Exists(0)), 0);
    }

    #[test]
    fn test_fourier_motzkin_bounds() {
        // 0 <= e0 <= 5, in0 <= e0  =>  in0 <= 5
        let mut cj = Conjunct::universe();
        cj.constraints
            .push(Constraint::ge_zero(lin(&[(Var::Exists(0), 1)], 0)));
        cj.constraints
            .push(Constraint::ge_zero(lin(&[(Var::Exists(0), -1)], 5)));
        cj.constraints.push(Constraint::ge_zero(lin(
            &[(Var::Exists(0), 1), (Var::In(0), -1)],
            0,
        )));
        let r = eliminate(&cj, &[Var::Exists(0)]);
        assert!(!r.trivially_false());
        // Some surviving constraint must bound in0 from above by 5.
        assert!(r
            .constraints
            .iter()
            .any(|c| c.expr.coeff(&Var::In(0)) == -1 && c.expr.constant == 5));
    }

    #[test]
    fn test_infeasible_detected() {
        // e0 >= 3 and e0 <= 1 is empty
        let mut cj = Conjunct::universe();
        cj.constraints
            .push(Constraint::ge_zero(lin(&[(Var::Exists(0), 1)], -3)));
        cj.constraints
            .push(Constraint::ge_zero(lin(&[(Var::Exists(0), -1)], 1)));
        let r = eliminate(&cj, &[Var::Exists(0)]);
        assert!(r.trivially_false());
    }

    #[test]
    fn test_scaled_substitution() {
        // 2*e0 == in0, e0 >= 1  =>  in0 >= 2
        let mut cj = Conjunct::universe();
        cj.constraints.push(Constraint::eq_zero(lin(
            &[(Var::Exists(0), 2), (Var::In(0), -1)],
            0,
        )));
        cj.constraints
            .push(Constraint::ge_zero(lin(&[(Var::Exists(0), 1)], -1)));
        let r = eliminate(&cj, &[Var::Exists(0)]);
        assert!(r
            .constraints
            .iter()
            .any(|c| c.expr.coeff(&Var::In(0)) == 1 && c.expr.constant == -2));
    }
}
