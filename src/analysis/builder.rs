//! Construction of dependence, entry, and exit relations.
//!
//! For a chosen source access this walks every other access of the same
//! array in textual order and builds the arrow set between their
//! iteration spaces: bound and guard constraints on both sides,
//! subscript equalities, and the lexicographic ordering disjunction
//! that makes the arrows point forward in execution order.

use log::warn;

use crate::analysis::bridge::{expr_to_linear, guard_to_conjuncts, VarMap};
use crate::ir::expr::{AffineExpr, CmpOp, GuardExpr};
use crate::ir::program::{AccessId, AccessKind, AccessOccurrence, AnalysisContext, Program};
use crate::relation::{Conjunct, Constraint, LinearExpr, Relation, Space, Var};
use crate::utils::errors::{AnalysisResult, BuildError};

/// The kind of a dependence edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DepKind {
    /// Read after write
    Flow,
    /// Write after read
    Anti,
    /// Write after write
    Output,
}

/// One endpoint of a dependence edge.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum Endpoint {
    /// A concrete access occurrence
    Access(AccessId),
    /// The program entry pseudo-task
    Entry,
    /// The program exit pseudo-task
    Exit,
}

/// A dependence edge with its arrow set.
#[derive(Debug, Clone)]
pub struct DepEdge {
    /// Flow, anti, or output.
    pub kind: DepKind,
    /// Producing endpoint.
    pub source: Endpoint,
    /// Consuming endpoint.
    pub sink: Endpoint,
    /// Pairs of source and sink iterations related by the edge.
    pub relation: Relation,
}

/// Two region tags that are both set and share no bit cover disjoint
/// parts of the element.
fn regions_disjoint(a: u32, b: u32) -> bool {
    a != 0 && b != 0 && (a & b) == 0
}

/// Builds relations for one program.
pub struct RelationBuilder<'a> {
    program: &'a Program,
    ctx: &'a AnalysisContext,
}

impl<'a> RelationBuilder<'a> {
    /// A builder over one program and its free-variable context.
    pub fn new(program: &'a Program, ctx: &'a AnalysisContext) -> Self {
        Self { program, ctx }
    }

    /// The iteration set of one access: loop bounds plus guards, as a
    /// set relation over the loop tuple (outermost first).
    pub fn execution_space(&self, id: AccessId) -> AnalysisResult<Relation> {
        let access = self.program.access(id);
        let names = self.program.tuple_names(access);
        let vars = VarMap::input(&names);
        let disjuncts = self.side_conjuncts(access, &vars)?;
        Ok(Relation {
            space: Space::set(names),
            disjuncts,
        })
    }

    /// Dependence relations from one source access to every compatible
    /// sink of the same array. For flow sources the edge to the exit
    /// pseudo-task is always included.
    pub fn dep_relations(
        &self,
        source: AccessId,
        kind: DepKind,
    ) -> AnalysisResult<Vec<DepEdge>> {
        let def = self.program.access(source);
        let mut edges = Vec::new();
        let mut after_def = false;

        for sink_id in self.program.accesses_of(&def.array) {
            let und = self.program.access(sink_id);
            let wanted = match kind {
                DepKind::Flow => und.kind == AccessKind::Read,
                DepKind::Anti | DepKind::Output => und.kind == AccessKind::Write,
            };
            if !wanted {
                if sink_id == source {
                    after_def = true;
                }
                continue;
            }
            if regions_disjoint(def.region, und.region) {
                if sink_id == source {
                    after_def = true;
                }
                continue;
            }

            if let Some(relation) =
                self.build_pair(def, und, source == sink_id, after_def, kind)?
            {
                if relation.is_satisfiable() {
                    edges.push(DepEdge {
                        kind,
                        source: Endpoint::Access(source),
                        sink: Endpoint::Access(sink_id),
                        relation,
                    });
                }
            }

            if sink_id == source {
                after_def = true;
            }
        }

        if kind == DepKind::Flow {
            edges.push(DepEdge {
                kind,
                source: Endpoint::Access(source),
                sink: Endpoint::Exit,
                relation: self.exit_relation(source)?,
            });
        }
        Ok(edges)
    }

    /// Relations from the entry pseudo-task to every read (flow) or
    /// write (output) of an array. The source tuple ranges over the
    /// array coordinates and is equated with the sink's subscripts.
    pub fn entry_relations(
        &self,
        array: &str,
        kind: DepKind,
    ) -> AnalysisResult<Vec<DepEdge>> {
        let mut edges = Vec::new();
        for sink_id in self.program.accesses_of(array) {
            let und = self.program.access(sink_id);
            let wanted = match kind {
                DepKind::Flow => und.kind == AccessKind::Read,
                DepKind::Output => und.kind == AccessKind::Write,
                DepKind::Anti => false,
            };
            if !wanted {
                continue;
            }
            let use_names = self.program.tuple_names(und);
            let coord_names: Vec<String> =
                (0..und.indices.len()).map(|i| format!("Var_{}", i)).collect();
            let space = Space::map(coord_names, use_names.clone());
            let ovars = VarMap::output(&use_names);
            let mut disjuncts = self.side_conjuncts(und, &ovars)?;
            for cj in &mut disjuncts {
                for (d, idx) in und.indices.iter().enumerate() {
                    let sub = expr_to_linear(idx, &ovars, self.ctx)?;
                    let coord = LinearExpr::var(Var::In(d));
                    cj.constraints.push(Constraint::eq(coord, sub));
                }
            }
            let relation = Relation { space, disjuncts };
            if relation.is_satisfiable() {
                edges.push(DepEdge {
                    kind,
                    source: Endpoint::Entry,
                    sink: Endpoint::Access(sink_id),
                    relation,
                });
            }
        }
        Ok(edges)
    }

    /// Relation from a write to the exit pseudo-task: iterations of the
    /// write mapped to the array coordinates it defines.
    pub fn exit_relation(&self, source: AccessId) -> AnalysisResult<Relation> {
        let def = self.program.access(source);
        let def_names = self.program.tuple_names(def);
        let coord_names: Vec<String> =
            (0..def.indices.len()).map(|i| format!("Var_{}", i)).collect();
        let space = Space::map(def_names.clone(), coord_names);
        let ivars = VarMap::input(&def_names);
        let mut disjuncts = self.side_conjuncts(def, &ivars)?;
        for cj in &mut disjuncts {
            for (d, idx) in def.indices.iter().enumerate() {
                let sub = expr_to_linear(idx, &ivars, self.ctx)?;
                let coord = LinearExpr::var(Var::Out(d));
                cj.constraints.push(Constraint::eq(coord, sub));
            }
        }
        Ok(Relation { space, disjuncts }.simplify())
    }

    /// Build the relation between one source/sink access pair, or
    /// `None` when the pair cannot carry a dependence.
    fn build_pair(
        &self,
        def: &AccessOccurrence,
        und: &AccessOccurrence,
        same_access: bool,
        after_def: bool,
        kind: DepKind,
    ) -> AnalysisResult<Option<Relation>> {
        let def_names = self.program.tuple_names(def);
        let use_names = self.program.tuple_names(und);
        let ivars = VarMap::input(&def_names);
        let ovars = VarMap::output(&use_names);
        let space = Space::map(def_names, use_names);

        let shared = self.program.closest_enclosing_loop(def, und);
        let same_task = def.task == und.task;

        if shared.is_none() && same_task && (kind != DepKind::Anti || !same_access) {
            // both endpoints run exactly once in the same task
            return Ok(None);
        }
        let unordered_ok = (after_def && !same_task)
            || (kind == DepKind::Anti && (after_def || same_access));
        if shared.is_none() && !unordered_ok {
            warn!(
                "sink {} precedes source {} with no common loop; edge dropped",
                self.program.task(und.task).name,
                self.program.task(def.task).name,
            );
            return Ok(None);
        }

        // Both endpoints' bounds and guards.
        let src = self.side_conjuncts(def, &ivars)?;
        let dst = self.side_conjuncts(und, &ovars)?;
        let mut base = Vec::with_capacity(src.len() * dst.len());
        for a in &src {
            for b in &dst {
                let mut merged = a.clone();
                merged.extend(b);
                base.push(merged);
            }
        }

        // Subscript equalities, dimension by dimension.
        let dims = def.indices.len().min(und.indices.len());
        let mut subs = Vec::with_capacity(dims);
        for d in 0..dims {
            let s = expr_to_linear(&def.indices[d], &ivars, self.ctx)?;
            let u = expr_to_linear(&und.indices[d], &ovars, self.ctx)?;
            subs.push(Constraint::eq(s, u));
        }
        for cj in &mut base {
            cj.constraints.extend(subs.iter().cloned());
        }

        // Lexicographic ordering over the shared loop prefix: one
        // disjunct per shared level, outer levels equal, this level
        // forward. Only the innermost shared level of a textually
        // forward pair between different tasks may stay non-strict.
        let disjuncts = match shared {
            None => base,
            Some((_, depth)) => {
                let mut ordered = Vec::new();
                for level in (0..=depth).rev() {
                    let non_strict = after_def && !same_task && level == depth;
                    let mut ord = Conjunct::universe();
                    let mut fwd = LinearExpr::var(Var::Out(level));
                    fwd.add_term(Var::In(level), -1);
                    if !non_strict {
                        fwd.constant -= 1;
                    }
                    ord.constraints.push(Constraint::ge_zero(fwd));
                    for outer in 0..level {
                        let mut eq = LinearExpr::var(Var::Out(outer));
                        eq.add_term(Var::In(outer), -1);
                        ord.constraints.push(Constraint::eq_zero(eq));
                    }
                    for b in &base {
                        let mut merged = b.clone();
                        merged.extend(&ord);
                        ordered.push(merged);
                    }
                }
                ordered
            }
        };

        Ok(Some(Relation { space, disjuncts }.simplify()))
    }

    /// Bound and guard constraints for an access, expressed over
    /// whichever side of the relation the variable map binds.
    fn side_conjuncts(
        &self,
        access: &AccessOccurrence,
        vars: &VarMap,
    ) -> AnalysisResult<Vec<Conjunct>> {
        let mut bounds = Conjunct::universe();
        for lid in &access.loops {
            let lp = self.program.lp(*lid);
            let iv = vars
                .get(&lp.induction)
                .cloned()
                .ok_or_else(|| BuildError::invalid_reference(format!(
                    "induction variable '{}' missing from tuple",
                    lp.induction
                )))?;
            // induction >= lower
            let lower = expr_to_linear(&lp.lower, vars, self.ctx)?;
            bounds
                .constraints
                .push(Constraint::ge(LinearExpr::var(iv.clone()), lower));
            self.end_condition(&lp.end, &lp.induction, vars, &mut bounds)?;
        }

        let mut disjuncts = vec![bounds];
        for guard in &access.guards {
            let parts = guard_to_conjuncts(guard, vars, self.ctx)?;
            let mut crossed = Vec::with_capacity(disjuncts.len() * parts.len());
            for d in &disjuncts {
                for p in &parts {
                    let mut merged = d.clone();
                    merged.extend(p);
                    crossed.push(merged);
                }
            }
            disjuncts = crossed;
        }
        Ok(disjuncts)
    }

    /// Translate a loop end condition: a conjunction of `iv < e` /
    /// `iv <= e` terms. Anything else is not a counted loop.
    fn end_condition(
        &self,
        end: &GuardExpr,
        induction: &str,
        vars: &VarMap,
        out: &mut Conjunct,
    ) -> AnalysisResult<()> {
        match end {
            GuardExpr::Cmp(op, lhs, rhs) => {
                let is_iv = matches!(&**lhs, AffineExpr::Var(name) if name == induction);
                if !is_iv {
                    return Err(BuildError::unsupported(format!(
                        "end condition must compare the induction variable '{}'",
                        induction
                    ))
                    .into());
                }
                let iv = expr_to_linear(lhs, vars, self.ctx)?;
                let bound = expr_to_linear(rhs, vars, self.ctx)?;
                match op {
                    CmpOp::Lt => out.constraints.push(Constraint::lt(iv, bound)),
                    CmpOp::Le => out.constraints.push(Constraint::le(iv, bound)),
                    CmpOp::Eq | CmpOp::Ne => {
                        return Err(BuildError::unsupported(
                            "equality end conditions are not counted loops",
                        )
                        .into())
                    }
                }
                Ok(())
            }
            GuardExpr::And(a, b) => {
                self.end_condition(a, induction, vars, out)?;
                self.end_condition(b, induction, vars, out)
            }
            GuardExpr::Or(..) => Err(BuildError::unsupported(
                "disjunctive end conditions are not supported",
            )
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expr::GuardExpr;
    use crate::ir::program::{Loop, Program};
    use std::rc::Rc;

    /// `for (k = 0; k < N; k++) { T1: A[k] write; T2: A[k-1] read }`
    fn pipeline_program() -> Program {
        let mut p = Program::new("pipeline");
        let k = AffineExpr::var("k");
        let lp = p.add_loop(Loop {
            induction: "k".into(),
            lower: AffineExpr::int(0),
            end: GuardExpr::lt(&k, &AffineExpr::var("N")),
        });
        let t1 = p.add_task("writer");
        let t2 = p.add_task("reader");
        p.add_access(crate::ir::program::AccessOccurrence {
            array: "A".into(),
            indices: vec![Rc::clone(&k)],
            kind: AccessKind::Write,
            region: 0,
            task: t1,
            loops: vec![lp],
            guards: vec![],
            order: 0,
        });
        p.add_access(crate::ir::program::AccessOccurrence {
            array: "A".into(),
            indices: vec![AffineExpr::sub(&k, &AffineExpr::int(1))],
            kind: AccessKind::Read,
            region: 0,
            task: t2,
            loops: vec![lp],
            guards: vec![],
            order: 0,
        });
        p
    }

    #[test]
    fn test_flow_edge_shape() {
        let p = pipeline_program();
        let ctx = AnalysisContext::from_program(&p);
        let b = RelationBuilder::new(&p, &ctx);
        let edges = b.dep_relations(AccessId(0), DepKind::Flow).unwrap();
        // one edge to the read plus the exit edge
        assert_eq!(edges.len(), 2);
        let flow = &edges[0];
        assert_eq!(flow.sink, Endpoint::Access(AccessId(1)));
        // write at k feeds read at k' with k' - 1 == k: k' == k + 1
        let plus_one = {
            let space = Space::map(vec!["k".into()], vec!["k".into()]);
            let mut cj = Conjunct::universe();
            let mut e = LinearExpr::var(Var::Out(0));
            e.add_term(Var::In(0), -1);
            e.constant = -1;
            cj.constraints.push(Constraint::eq_zero(e));
            Relation::from_conjunct(space, cj)
        };
        assert!(!flow.relation.difference(&plus_one).is_satisfiable());
        assert!(flow.relation.is_satisfiable());
    }

    #[test]
    fn test_exit_edge_present() {
        let p = pipeline_program();
        let ctx = AnalysisContext::from_program(&p);
        let b = RelationBuilder::new(&p, &ctx);
        let edges = b.dep_relations(AccessId(0), DepKind::Flow).unwrap();
        assert!(edges.iter().any(|e| e.sink == Endpoint::Exit));
    }

    #[test]
    fn test_entry_relation_subscripts() {
        let p = pipeline_program();
        let ctx = AnalysisContext::from_program(&p);
        let b = RelationBuilder::new(&p, &ctx);
        let entries = b.entry_relations("A", DepKind::Flow).unwrap();
        assert_eq!(entries.len(), 1);
        // entry covers the read of A[k-1]; its source coordinate equals k-1
        let rel = &entries[0].relation;
        assert_eq!(rel.n_in(), 1);
        assert_eq!(rel.n_out(), 1);
        assert!(rel.is_satisfiable());
    }

    #[test]
    fn test_region_tags_skip_disjoint() {
        let mut p = pipeline_program();
        p.accesses[0].region = 0b01;
        p.accesses[1].region = 0b10;
        let ctx = AnalysisContext::from_program(&p);
        let b = RelationBuilder::new(&p, &ctx);
        let edges = b.dep_relations(AccessId(0), DepKind::Flow).unwrap();
        // only the exit edge survives
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].sink, Endpoint::Exit);
    }

    #[test]
    fn test_disjunctive_end_condition_rejected() {
        let mut p = Program::new("bad");
        let k = AffineExpr::var("k");
        let n = AffineExpr::var("N");
        let lp = p.add_loop(Loop {
            induction: "k".into(),
            lower: AffineExpr::int(0),
            end: GuardExpr::or(&GuardExpr::lt(&k, &n), &GuardExpr::lt(&k, &AffineExpr::int(4))),
        });
        let t = p.add_task("T");
        p.add_access(crate::ir::program::AccessOccurrence {
            array: "A".into(),
            indices: vec![Rc::clone(&k)],
            kind: AccessKind::Write,
            region: 0,
            task: t,
            loops: vec![lp],
            guards: vec![],
            order: 0,
        });
        let ctx = AnalysisContext::from_program(&p);
        let b = RelationBuilder::new(&p, &ctx);
        assert!(b.execution_space(AccessId(0)).is_err());
    }
}
