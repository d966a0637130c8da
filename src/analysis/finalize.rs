//! Reduction of anti dependences to a necessary set of sync edges.
//!
//! An anti dependence only has to be enforced explicitly when no chain
//! of flow edges and other sync edges already orders the same pairs of
//! task instances. This pass builds a graph whose nodes are task
//! classes and whose edges carry dependence relations, closes every
//! cycle transitively, and subtracts from each anti edge the union of
//! all transitive paths that connect its endpoints without it. What
//! remains of the edge is the part that still needs a sync.

use std::collections::{BTreeMap, BTreeSet};

use crate::analysis::builder::{DepEdge, Endpoint};
use crate::ir::program::Program;
use crate::relation::{Conjunct, Constraint, LinearExpr, Relation, Space, Var};
use crate::utils::errors::{AnalysisResult, GraphError};

/// Index of a node in a [`TaskClassGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GraphEdgeKind {
    Flow,
    Anti,
    /// Result of merging parallel edges with the same destination
    Union,
}

#[derive(Debug, Clone)]
struct GraphEdge {
    kind: GraphEdgeKind,
    dst: NodeId,
    relation: Relation,
}

#[derive(Debug)]
struct GraphNode {
    name: String,
    edges: Vec<GraphEdge>,
    /// Union of the transitive closures of every cycle through this
    /// node, seeded with the identity relation. `None` for nodes that
    /// have no outgoing edges.
    cycle: Option<Relation>,
}

/// Task classes as arena-indexed nodes, dependence relations as edges.
#[derive(Debug, Default)]
struct TaskClassGraph {
    nodes: Vec<GraphNode>,
    index: BTreeMap<String, NodeId>,
}

impl TaskClassGraph {
    /// Id of the node for a task class, creating it on first use.
    fn node_id(&mut self, name: &str) -> NodeId {
        if let Some(id) = self.index.get(name) {
            return *id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(GraphNode {
            name: name.to_string(),
            edges: Vec::new(),
            cycle: None,
        });
        self.index.insert(name.to_string(), id);
        id
    }

    fn lookup(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }

    fn add_edge(&mut self, src: &str, dst: &str, kind: GraphEdgeKind, relation: Relation) {
        let src_id = self.node_id(src);
        let dst_id = self.node_id(dst);
        self.nodes[src_id.0].edges.push(GraphEdge {
            kind,
            dst: dst_id,
            relation,
        });
    }
}

/// Whether two relations describe exactly the same pairs.
///
/// Arity mismatches are never equivalent; otherwise the test is that
/// `!a & b` holds no pair. The one-sided check suffices for the edge
/// lookups here, where `b` was built from `a` by operations that only
/// ever shrink it.
fn relations_equivalent(a: &Relation, b: &Relation) -> bool {
    if a.n_in() != b.n_in() || a.n_out() != b.n_out() {
        return false;
    }
    !a.complement().intersection(b).is_satisfiable()
}

/// Task-class name of an endpoint; the entry and exit pseudo-tasks
/// have none and stay out of the graph.
fn task_name(program: &Program, ep: &Endpoint) -> Option<String> {
    match ep {
        Endpoint::Access(id) => {
            let access = program.access(*id);
            Some(program.task(access.task).name.clone())
        }
        Endpoint::Entry | Endpoint::Exit => None,
    }
}

/// Build the master graph over all sync and flow edges whose endpoints
/// are real tasks.
fn build_graph(program: &Program, sync: &[DepEdge], flow: &[DepEdge]) -> TaskClassGraph {
    let mut graph = TaskClassGraph::default();
    for (edges, kind) in [(sync, GraphEdgeKind::Anti), (flow, GraphEdgeKind::Flow)] {
        for edge in edges {
            let src = task_name(program, &edge.source);
            let dst = task_name(program, &edge.sink);
            if let (Some(src), Some(dst)) = (src, dst) {
                graph.add_edge(&src, &dst, kind, edge.relation.clone());
            }
        }
    }
    graph
}

/// Copy the graph, leaving out the one anti edge from `src` to `dst`
/// whose relation is equivalent to `rel`.
fn copy_excluding(
    master: &TaskClassGraph,
    src: &str,
    dst: &str,
    rel: &Relation,
) -> TaskClassGraph {
    let mut copy = TaskClassGraph::default();
    for node in &master.nodes {
        copy.node_id(&node.name);
    }
    for node in &master.nodes {
        for edge in &node.edges {
            let edge_dst = master.nodes[edge.dst.0].name.as_str();
            if node.name == src
                && edge_dst == dst
                && edge.kind == GraphEdgeKind::Anti
                && relations_equivalent(&edge.relation, rel)
            {
                continue;
            }
            copy.add_edge(&node.name, edge_dst, edge.kind, edge.relation.clone());
        }
    }
    copy
}

/// Replace all parallel edges with the same destination by their
/// union, for every node reachable from `start`.
fn union_parallel_edges(graph: &mut TaskClassGraph, start: NodeId) {
    let mut visited = BTreeSet::from([start]);
    let mut worklist = vec![start];
    while let Some(id) = worklist.pop() {
        let mut merged: BTreeMap<NodeId, Relation> = BTreeMap::new();
        for edge in &graph.nodes[id.0].edges {
            merged
                .entry(edge.dst)
                .and_modify(|r| *r = r.union_with(&edge.relation))
                .or_insert_with(|| edge.relation.clone());
        }
        graph.nodes[id.0].edges = merged
            .into_iter()
            .map(|(dst, relation)| GraphEdge {
                kind: GraphEdgeKind::Union,
                dst,
                relation,
            })
            .collect();
        for edge in &graph.nodes[id.0].edges {
            if visited.insert(edge.dst) {
                worklist.push(edge.dst);
            }
        }
    }
}

/// `{[v1,...,vn] -> [v1',...,vn'] : vi == vi'}`
fn identity_relation(names: &[String]) -> Relation {
    let space = Space::map(names.to_vec(), names.to_vec());
    let mut cj = Conjunct::universe();
    for i in 0..names.len() {
        let mut e = LinearExpr::var(Var::Out(i));
        e.add_term(Var::In(i), -1);
        cj.push(Constraint::eq_zero(e));
    }
    Relation::from_conjunct(space, cj)
}

/// Seed every reachable node that has outgoing edges with the identity
/// cycle over its own tuple. The tuple arity comes from the input side
/// of any outgoing edge. Nodes without outgoing edges keep no cycle,
/// nothing composes through them.
fn add_tautological_cycles(graph: &mut TaskClassGraph, start: NodeId) {
    let mut visited = BTreeSet::from([start]);
    let mut worklist = vec![start];
    while let Some(id) = worklist.pop() {
        let names = graph.nodes[id.0]
            .edges
            .first()
            .map(|e| e.relation.space.input.clone());
        if let Some(names) = names {
            graph.nodes[id.0].cycle = Some(identity_relation(&names));
        }
        let dsts: Vec<NodeId> = graph.nodes[id.0].edges.iter().map(|e| e.dst).collect();
        for dst in dsts {
            if visited.insert(dst) {
                worklist.push(dst);
            }
        }
    }
}

/// Compose the edge relations along one cycle, close the result
/// transitively, and union it into the cycle field of the cycle's
/// first node.
fn close_one_cycle(graph: &mut TaskClassGraph, cycle: &[NodeId]) {
    let start = cycle[0];
    let mut transitive: Option<Relation> = None;
    for i in 0..cycle.len() {
        let src = cycle[i];
        let dst = cycle[(i + 1) % cycle.len()];
        if let Some(edge) = graph.nodes[src.0].edges.iter().find(|e| e.dst == dst) {
            transitive = Some(match transitive {
                None => edge.relation.clone(),
                Some(acc) => edge.relation.compose(&acc),
            });
        }
    }
    let closed = match transitive {
        Some(r) => r.transitive_closure(),
        None => return,
    };
    let node = &mut graph.nodes[start.0];
    node.cycle = Some(match node.cycle.take() {
        Some(c) => c.union_with(&closed),
        None => closed,
    });
}

/// Depth-first search for cycles. Every back edge closes one cycle per
/// rotation of the node list, so that each member of the cycle gets
/// the closure that starts and ends at itself.
fn close_all_cycles(graph: &mut TaskClassGraph, src: NodeId, stack: &[NodeId]) {
    let mut stack = stack.to_vec();
    stack.push(src);
    let dsts: Vec<NodeId> = graph.nodes[src.0].edges.iter().map(|e| e.dst).collect();
    for next in dsts {
        match stack.iter().position(|n| *n == next) {
            None => close_all_cycles(graph, next, &stack),
            Some(pos) => {
                let mut cycle = stack[pos..].to_vec();
                loop {
                    close_one_cycle(graph, &cycle);
                    cycle.rotate_left(1);
                    if cycle[0] == next {
                        break;
                    }
                }
            }
        }
    }
}

/// Union of the relations of all transitive paths from `src` to `snk`.
///
/// Each path is the left-to-right composition of the node cycles and
/// edge relations met along the way. The search never revisits a node
/// within one path, except that for a self edge the sink may be
/// reentered once; in that case the sink's own cycle enters the path
/// only at the end.
#[allow(clippy::too_many_arguments)]
fn find_transitive_edge(
    graph: &TaskClassGraph,
    cur: NodeId,
    acc: Option<Relation>,
    mut visited: BTreeSet<NodeId>,
    fifo: &[Relation],
    src: NodeId,
    snk: NodeId,
    just_started: bool,
) -> Option<Relation> {
    visited.insert(cur);
    let mut fifo = fifo.to_vec();
    if let Some(cycle) = &graph.nodes[cur.0].cycle {
        if !(cur == snk && just_started) {
            fifo.push(cycle.clone());
        }
    }

    if cur == snk && !just_started {
        let mut steps = fifo.iter();
        let path = steps.next().map(|first| {
            let mut r = first.simplify();
            for step in steps {
                r = step.simplify().compose(&r).simplify();
            }
            r
        });
        return match (acc, path) {
            (None, path) => path,
            (acc @ Some(_), None) => acc,
            (Some(acc), Some(path)) => Some(acc.union_with(&path)),
        };
    }

    let mut acc = acc;
    for edge in &graph.nodes[cur.0].edges {
        if !visited.contains(&edge.dst) || (src == snk && edge.dst == snk) {
            let mut next_fifo = fifo.clone();
            next_fifo.push(edge.relation.clone());
            acc = find_transitive_edge(
                graph,
                edge.dst,
                acc,
                visited.clone(),
                &next_fifo,
                src,
                snk,
                false,
            );
        }
    }
    acc
}

/// Replace the relation of the matching anti edge in the master graph,
/// so that later edges see this edge already reduced.
fn update_sync_edge(
    master: &mut TaskClassGraph,
    src: &str,
    dst: &str,
    old: &Relation,
    finalized: Relation,
) -> AnalysisResult<()> {
    let src_id = master
        .lookup(src)
        .ok_or_else(|| GraphError::unknown_node(src))?;
    let dst_id = master.lookup(dst);
    for edge in &mut master.nodes[src_id.0].edges {
        if Some(edge.dst) == dst_id && relations_equivalent(&edge.relation, old) {
            edge.relation = finalized;
            return Ok(());
        }
    }
    Err(GraphError::unknown_node(format!("sync edge {src} -> {dst}")).into())
}

/// Reduce every anti edge to the part no transitive path already
/// covers, returning the surviving sync edges keyed by source task.
///
/// Edges are processed in order and the master graph is updated after
/// each reduction, so a later edge is subtracted against the already
/// reduced forms of the earlier ones.
pub fn finalize_sync_edges(
    program: &Program,
    sync: &[DepEdge],
    flow: &[DepEdge],
) -> AnalysisResult<BTreeMap<String, Vec<DepEdge>>> {
    let mut master = build_graph(program, sync, flow);
    let mut result: BTreeMap<String, Vec<DepEdge>> = BTreeMap::new();

    for edge in sync {
        let src = task_name(program, &edge.source);
        let dst = task_name(program, &edge.sink);
        let (Some(src), Some(dst)) = (src, dst) else {
            // Pseudo-task endpoints never enter the graph; keep the
            // edge as it stands.
            if edge.relation.is_satisfiable() {
                let key = match edge.source {
                    Endpoint::Entry => "ENTRY".to_string(),
                    Endpoint::Exit => "EXIT".to_string(),
                    Endpoint::Access(id) => {
                        program.task(program.access(id).task).name.clone()
                    }
                };
                result.entry(key).or_default().push(edge.clone());
            }
            continue;
        };

        let mut graph = copy_excluding(&master, &src, &dst, &edge.relation);
        let source = graph
            .lookup(&src)
            .ok_or_else(|| GraphError::unknown_node(&*src))?;
        let sink = graph
            .lookup(&dst)
            .ok_or_else(|| GraphError::unknown_node(&*dst))?;

        union_parallel_edges(&mut graph, source);
        add_tautological_cycles(&mut graph, source);
        close_all_cycles(&mut graph, source, &[]);

        let covered = find_transitive_edge(
            &graph,
            source,
            None,
            BTreeSet::new(),
            &[],
            source,
            sink,
            true,
        )
        .map(|r| r.simplify());

        let finalized = match covered {
            None => edge.relation.clone(),
            Some(covered) => {
                let reduced = edge.relation.difference(&covered);
                update_sync_edge(&mut master, &src, &dst, &edge.relation, reduced.clone())?;
                reduced
            }
        };

        if finalized.is_satisfiable() {
            result.entry(src).or_default().push(DepEdge {
                kind: edge.kind,
                source: edge.source,
                sink: edge.sink,
                relation: finalized,
            });
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::builder::DepKind;
    use crate::ir::expr::{AffineExpr, GuardExpr};
    use crate::ir::program::{AccessId, AccessKind, AccessOccurrence, Loop, Program};
    use std::rc::Rc;

    /// Two tasks in one loop: a write of `A[k]` and a read of `A[k]`.
    /// The access ids double as dependence endpoints.
    fn two_task_program() -> Program {
        let mut p = Program::new("twotask");
        let k = AffineExpr::var("k");
        let lp = p.add_loop(Loop {
            induction: "k".into(),
            lower: AffineExpr::int(0),
            end: GuardExpr::lt(&k, &AffineExpr::var("N")),
        });
        let writer = p.add_task("writer");
        let reader = p.add_task("reader");
        p.add_access(AccessOccurrence {
            array: "A".into(),
            indices: vec![Rc::clone(&k)],
            kind: AccessKind::Write,
            region: 0,
            task: writer,
            loops: vec![lp],
            guards: vec![],
            order: 0,
        });
        p.add_access(AccessOccurrence {
            array: "A".into(),
            indices: vec![Rc::clone(&k)],
            kind: AccessKind::Read,
            region: 0,
            task: reader,
            loops: vec![lp],
            guards: vec![],
            order: 0,
        });
        p
    }

    /// `{[k] -> [k'] : k' == k + d}`
    fn shift(d: i64) -> Relation {
        let space = Space::map(vec!["k".into()], vec!["k".into()]);
        let mut cj = Conjunct::universe();
        let mut e = LinearExpr::var(Var::Out(0));
        e.add_term(Var::In(0), -1);
        e.constant = -d;
        cj.push(Constraint::eq_zero(e));
        Relation::from_conjunct(space, cj)
    }

    /// `{[k] -> [k'] : k' >= k + d}`
    fn shift_at_least(d: i64) -> Relation {
        let space = Space::map(vec!["k".into()], vec!["k".into()]);
        let mut cj = Conjunct::universe();
        let mut e = LinearExpr::var(Var::Out(0));
        e.add_term(Var::In(0), -1);
        e.constant = -d;
        cj.push(Constraint::ge_zero(e));
        Relation::from_conjunct(space, cj)
    }

    fn edge(kind: DepKind, source: usize, sink: usize, relation: Relation) -> DepEdge {
        DepEdge {
            kind,
            source: Endpoint::Access(AccessId(source)),
            sink: Endpoint::Access(AccessId(sink)),
            relation,
        }
    }

    fn same_pairs(a: &Relation, b: &Relation) -> bool {
        !a.difference(b).is_satisfiable() && !b.difference(a).is_satisfiable()
    }

    #[test]
    fn test_uncovered_anti_edge_survives() {
        let p = two_task_program();
        // read at k, write at k+1, nothing else orders them
        let anti = edge(DepKind::Anti, 1, 0, shift(1));
        let out = finalize_sync_edges(&p, &[anti.clone()], &[]).unwrap();
        let kept = &out["reader"];
        assert_eq!(kept.len(), 1);
        assert!(same_pairs(&kept[0].relation, &anti.relation));
    }

    #[test]
    fn test_overlapping_sync_edges_reduce_each_other() {
        let p = two_task_program();
        let narrow = edge(DepKind::Anti, 1, 0, shift(1));
        let wide = edge(DepKind::Anti, 1, 0, shift_at_least(1));
        let out = finalize_sync_edges(&p, &[narrow.clone(), wide], &[]).unwrap();
        // the one-sided equivalence test also hides the wide edge while
        // the narrow one is being reduced, so the narrow edge survives
        // whole and the wide edge loses the pairs the narrow one covers
        let kept = &out["reader"];
        assert_eq!(kept.len(), 2);
        assert!(same_pairs(&kept[0].relation, &narrow.relation));
        assert!(same_pairs(&kept[1].relation, &shift_at_least(2)));
        // no ordered pair was lost: the kept edges together still
        // cover everything the wide edge covered
        let union = kept[0].relation.union_with(&kept[1].relation);
        assert!(same_pairs(&union, &shift_at_least(1)));
    }

    #[test]
    fn test_anti_edge_erased_by_cycle_closure() {
        let p = two_task_program();
        // flow edges form a cycle: writer feeds the next reader, the
        // reader feeds the same-iteration writer
        let flow = vec![
            edge(DepKind::Flow, 0, 1, shift(1)),
            edge(DepKind::Flow, 1, 0, shift(0)),
        ];
        // the direct path reader -> writer only covers k -> k; the
        // anti edge at k -> k+1 needs the closed cycle to disappear
        let anti = edge(DepKind::Anti, 1, 0, shift(1));
        let out = finalize_sync_edges(&p, &[anti], &flow).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_parallel_edges_union_before_search() {
        let p = two_task_program();
        // two flow edges reader -> writer that only cover the anti
        // edge together
        let flow = vec![
            edge(DepKind::Flow, 1, 0, shift(1)),
            edge(DepKind::Flow, 1, 0, shift(2)),
        ];
        let anti_rel = shift(1).union_with(&shift(2));
        let anti = DepEdge {
            kind: DepKind::Anti,
            source: Endpoint::Access(AccessId(1)),
            sink: Endpoint::Access(AccessId(0)),
            relation: anti_rel,
        };
        let out = finalize_sync_edges(&p, &[anti], &flow).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_identity_relation_shape() {
        let id = identity_relation(&["i".into(), "j".into()]);
        assert_eq!(id.n_in(), 2);
        assert_eq!(id.n_out(), 2);
        assert!(id.is_satisfiable());
        // k -> k+1 escapes the identity
        let mut e = LinearExpr::var(Var::Out(0));
        e.add_term(Var::In(0), -1);
        e.constant = -1;
        let mut cj = Conjunct::universe();
        cj.push(Constraint::eq_zero(e));
        let off = Relation::from_conjunct(id.space.clone(), cj);
        assert!(off.difference(&id).is_satisfiable());
    }
}
