//! Per-edge condition simplification for emission.
//!
//! A surviving dependence edge carries a relation in disjunctive
//! normal form. Each disjunct becomes one guarded binding: its
//! condition tree with every sink coordinate solved away, minus any
//! comparison the source task's execution space already guarantees.

use std::rc::Rc;

use crate::analysis::bridge::{relation_to_tree, tree_to_conjunct, VarMap};
use crate::analysis::tree::{
    eliminate_var_by_transitivity, solve_tree_for_var, CondTree,
};
use crate::ir::program::AnalysisContext;
use crate::relation::{Relation, Space, Var};
use crate::utils::errors::AnalysisResult;

pub use crate::analysis::tree::{find_bounds_of_var, VarBounds};

/// One disjunct of an edge relation, reduced to an emission-ready
/// guard condition plus the sub-relation it came from.
#[derive(Debug, Clone)]
pub struct SimplifiedDisjunct {
    /// Guard over source coordinates and globals; `None` means
    /// unconditional.
    pub condition: Option<Rc<CondTree>>,
    /// The single-conjunct relation behind the guard
    pub relation: Relation,
}

/// Whether the execution space already implies a single comparison.
///
/// The comparison is lifted into a set over the execution-space tuple
/// and the test is `S_es - (S_es & S_cmp)` being unsatisfiable: no
/// point of the space escapes the comparison.
fn covered_by_space(
    cmp: &Rc<CondTree>,
    exec_space: &Relation,
    ctx: &AnalysisContext,
) -> AnalysisResult<bool> {
    let vars = VarMap::input(&exec_space.space.input);
    let conjunct = tree_to_conjunct(cmp, &vars, ctx)?;
    let candidate = Relation::from_conjunct(Space::set(exec_space.space.input.clone()), conjunct);
    let escaped = exec_space.difference(&exec_space.intersection(&candidate));
    Ok(!escaped.is_satisfiable())
}

/// Split a relation into one simplified condition per disjunct.
///
/// Within each disjunct every output variable is removed: by solving
/// an equality for it and substituting the solution, or failing that
/// by transitive elimination of its inequality bounds. Comparisons the
/// execution space implies are then dropped. Conditions that reduce to
/// nothing come back as `None`.
pub fn split_disjunctions(
    relation: &Relation,
    exec_space: &Relation,
    ctx: &AnalysisContext,
) -> AnalysisResult<Vec<SimplifiedDisjunct>> {
    let simplified = relation.simplify();
    let mut result = Vec::new();

    for cj in &simplified.disjuncts {
        let sub = Relation::from_conjunct(simplified.space.clone(), cj.clone()).simplify();
        let mut cond = relation_to_tree(&sub);

        for i in 0..simplified.n_out() {
            let name = simplified.space.name_of(&Var::Out(i));
            let Some(cur) = cond.clone() else { break };
            cond = match solve_tree_for_var(&cur, &name)? {
                Some(solution) => Some(cur.substitute(&name, &solution)),
                None => eliminate_var_by_transitivity(&cur, &name),
            };
        }

        if let Some(cur) = cond.take() {
            let mut kept = Vec::new();
            for cmp in cur.comparisons() {
                if !covered_by_space(&cmp, exec_space, ctx)? {
                    kept.push(cmp);
                }
            }
            cond = CondTree::conjoin(&kept);
        }

        result.push(SimplifiedDisjunct {
            condition: cond,
            relation: sub,
        });
    }

    Ok(result)
}
