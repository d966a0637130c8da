//! Flow-edge minimization against output dependences.
//!
//! A flow edge from a write to a read only carries data for the
//! iterations where no later write lands on the same element first.
//! Every output edge out of the source composes with the overwriting
//! write's own flow to the same sink; the union of those compositions
//! is the killed part, and what survives is the difference.

use std::collections::BTreeMap;

use crate::analysis::builder::{DepEdge, Endpoint};
use crate::relation::Relation;

/// Flow and output edges grouped by their source endpoint.
pub type EdgesBySource = BTreeMap<Endpoint, Vec<DepEdge>>;

/// Minimize every flow edge in `flow` against the output edges in
/// `output`. Edges whose arrow set empties out are dropped.
pub fn minimize_flow_edges(flow: &EdgesBySource, output: &EdgesBySource) -> Vec<DepEdge> {
    let mut kept = Vec::new();
    for (source, flow_edges) in flow {
        let output_edges: &[DepEdge] = output
            .get(source)
            .map(|v| v.as_slice())
            .unwrap_or(&[]);
        for fd1 in flow_edges {
            let mut all_kill: Option<Relation> = None;
            for od in output_edges {
                let killer = if od.sink == *source {
                    // the write overwrites itself on a later iteration;
                    // compose the original flow behind it
                    fd1.relation.compose(&od.relation)
                } else {
                    // look for the overwriting write's flow edge to the
                    // same sink
                    let Some(fd2) = flow
                        .get(&od.sink)
                        .and_then(|edges| edges.iter().find(|e| e.sink == fd1.sink))
                    else {
                        continue;
                    };
                    fd2.relation.compose(&od.relation)
                };
                all_kill = Some(match all_kill {
                    Some(acc) => acc.union_with(&killer),
                    None => killer,
                });
            }
            let real = match all_kill {
                Some(kill) => fd1.relation.difference(&kill),
                None => fd1.relation.clone(),
            };
            if real.is_satisfiable() {
                kept.push(DepEdge {
                    kind: fd1.kind,
                    source: fd1.source,
                    sink: fd1.sink,
                    relation: real.simplify(),
                });
            }
        }
    }
    kept
}
