//! Dependence analysis passes.
//!
//! The pipeline runs in four stages: the relation builder produces raw
//! flow, output, and anti edges per array variable; the minimizer
//! kills flow edges that an intervening write overwrites; the
//! finalizer reduces anti edges to the sync set no flow chain already
//! orders; and the condition simplifier turns each surviving relation
//! into emission-ready guards.

pub mod bridge;
pub mod builder;
pub mod conditions;
pub mod finalize;
pub mod minimize;
pub mod tree;

pub use builder::{DepEdge, DepKind, Endpoint, RelationBuilder};
pub use conditions::{find_bounds_of_var, split_disjunctions, SimplifiedDisjunct, VarBounds};
pub use finalize::finalize_sync_edges;
pub use minimize::{minimize_flow_edges, EdgesBySource};

use std::collections::BTreeMap;

use crate::ir::program::{AccessKind, AnalysisContext, Program};
use crate::relation::Relation;
use crate::utils::errors::AnalysisResult;

/// Name under which edges sourced at the entry pseudo-task are keyed.
pub const ENTRY_TASK: &str = "ENTRY";

/// The finished product of whole-program dependence analysis.
#[derive(Debug)]
pub struct DependenceSummary {
    /// Minimized flow edges, including those from the entry pseudo-task
    /// and to the exit pseudo-task, keyed by source task class
    pub outgoing: BTreeMap<String, Vec<DepEdge>>,
    /// Inverses of the outgoing edges, keyed by sink task class
    pub incoming: BTreeMap<String, Vec<DepEdge>>,
    /// Finalized sync edges, keyed by source task class
    pub sync: BTreeMap<String, Vec<DepEdge>>,
    /// Iteration set of each task class
    pub execution_spaces: BTreeMap<String, Relation>,
}

fn source_task_name(program: &Program, ep: &Endpoint) -> String {
    match ep {
        Endpoint::Entry => ENTRY_TASK.to_string(),
        Endpoint::Exit => "EXIT".to_string(),
        Endpoint::Access(id) => program.task(program.access(*id).task).name.clone(),
    }
}

/// Run the whole analysis over a program.
///
/// Per array variable this builds entry relations and all flow and
/// output edges for every write plus all anti edges for every read,
/// minimizes the flow edges against the output edges, and discards
/// the output edges. The anti edges across all variables then go
/// through the sync finalizer against the surviving flow edges.
pub fn analyze(program: &Program) -> AnalysisResult<DependenceSummary> {
    let ctx = AnalysisContext::from_program(program);
    let builder = RelationBuilder::new(program, &ctx);

    let mut outgoing: BTreeMap<String, Vec<DepEdge>> = BTreeMap::new();
    let mut anti_edges: Vec<DepEdge> = Vec::new();

    for array in program.arrays() {
        let mut flow: EdgesBySource = BTreeMap::new();
        let mut output: EdgesBySource = BTreeMap::new();

        flow.insert(
            Endpoint::Entry,
            builder.entry_relations(&array, DepKind::Flow)?,
        );
        output.insert(
            Endpoint::Entry,
            builder.entry_relations(&array, DepKind::Output)?,
        );

        for id in program.accesses_of(&array) {
            match program.access(id).kind {
                AccessKind::Write => {
                    flow.insert(
                        Endpoint::Access(id),
                        builder.dep_relations(id, DepKind::Flow)?,
                    );
                    output.insert(
                        Endpoint::Access(id),
                        builder.dep_relations(id, DepKind::Output)?,
                    );
                }
                AccessKind::Read => {
                    anti_edges.extend(builder.dep_relations(id, DepKind::Anti)?);
                }
            }
        }

        for edge in minimize_flow_edges(&flow, &output) {
            let name = source_task_name(program, &edge.source);
            outgoing.entry(name).or_default().push(edge);
        }
    }

    let flow_edges: Vec<DepEdge> = outgoing.values().flatten().cloned().collect();
    let sync = finalize_sync_edges(program, &anti_edges, &flow_edges)?;

    // Incoming edges are the inverses of the outgoing ones; edges into
    // the exit pseudo-task stay outgoing-only.
    let mut incoming: BTreeMap<String, Vec<DepEdge>> = BTreeMap::new();
    for edges in outgoing.values() {
        for edge in edges {
            let Endpoint::Access(id) = edge.sink else {
                continue;
            };
            let sink_name = program.task(program.access(id).task).name.clone();
            incoming.entry(sink_name).or_default().push(DepEdge {
                kind: edge.kind,
                source: edge.source,
                sink: edge.sink,
                relation: edge.relation.inverse(),
            });
        }
    }

    let mut execution_spaces: BTreeMap<String, Relation> = BTreeMap::new();
    for (i, access) in program.accesses.iter().enumerate() {
        let name = program.task(access.task).name.clone();
        if !execution_spaces.contains_key(&name) {
            let space = builder.execution_space(crate::ir::program::AccessId(i))?;
            execution_spaces.insert(name, space);
        }
    }

    Ok(DependenceSummary {
        outgoing,
        incoming,
        sync,
        execution_spaces,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expr::{AffineExpr, GuardExpr};
    use crate::ir::program::{AccessOccurrence, Loop};
    use std::rc::Rc;

    /// `for (k...) { T1: write A[k]; T2: read A[k-1] }`
    fn pipeline() -> Program {
        let mut p = Program::new("pipeline");
        let k = AffineExpr::var("k");
        let lp = p.add_loop(Loop {
            induction: "k".into(),
            lower: AffineExpr::int(0),
            end: GuardExpr::lt(&k, &AffineExpr::var("N")),
        });
        let t1 = p.add_task("writer");
        let t2 = p.add_task("reader");
        p.add_access(AccessOccurrence {
            array: "A".into(),
            indices: vec![Rc::clone(&k)],
            kind: AccessKind::Write,
            region: 0,
            task: t1,
            loops: vec![lp],
            guards: vec![],
            order: 0,
        });
        p.add_access(AccessOccurrence {
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
    fn test_analyze_pipeline_outgoing() {
        let summary = analyze(&pipeline()).unwrap();
        let writer = &summary.outgoing["writer"];
        // flow to the reader plus the exit edge
        assert_eq!(writer.len(), 2);
        assert!(writer.iter().any(|e| e.sink == Endpoint::Exit));
        assert!(summary.outgoing.contains_key(ENTRY_TASK));
    }

    #[test]
    fn test_analyze_pipeline_incoming() {
        let summary = analyze(&pipeline()).unwrap();
        let reader = &summary.incoming["reader"];
        // the inverted flow edge plus the inverted entry edge
        assert_eq!(reader.len(), 2);
        for edge in reader {
            assert!(edge.relation.is_satisfiable());
        }
    }

    #[test]
    fn test_analyze_execution_spaces() {
        let summary = analyze(&pipeline()).unwrap();
        assert!(summary.execution_spaces.contains_key("writer"));
        assert!(summary.execution_spaces.contains_key("reader"));
        assert!(summary.execution_spaces["writer"].is_satisfiable());
    }

    #[test]
    fn test_analyze_sync_edge_survives() {
        // the reader looks one iteration ahead, so the next writer
        // must wait for it: an anti edge with no flow chain covering
        // it comes through the finalizer intact
        let mut p = Program::new("lookahead");
        let k = AffineExpr::var("k");
        let lp = p.add_loop(Loop {
            induction: "k".into(),
            lower: AffineExpr::int(0),
            end: GuardExpr::lt(&k, &AffineExpr::var("N")),
        });
        let t1 = p.add_task("writer");
        let t2 = p.add_task("reader");
        p.add_access(AccessOccurrence {
            array: "A".into(),
            indices: vec![Rc::clone(&k)],
            kind: AccessKind::Write,
            region: 0,
            task: t1,
            loops: vec![lp],
            guards: vec![],
            order: 0,
        });
        p.add_access(AccessOccurrence {
            array: "A".into(),
            indices: vec![AffineExpr::add(&k, &AffineExpr::int(1))],
            kind: AccessKind::Read,
            region: 0,
            task: t2,
            loops: vec![lp],
            guards: vec![],
            order: 0,
        });
        let summary = analyze(&p).unwrap();
        let kept: usize = summary.sync.values().map(|v| v.len()).sum();
        assert_eq!(kept, 1);
        assert!(summary.sync.contains_key("reader"));
    }
}
