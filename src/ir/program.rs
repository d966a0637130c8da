//! The annotated-program representation the analyzer consumes.
//!
//! A program is a flat arena of loops, task classes, and array access
//! occurrences. Each occurrence records the chain of loops enclosing it
//! (innermost first), the guards on its execution, its subscripts, and
//! its position in textual program order. The front end that produces
//! this structure is out of scope; tests assemble it directly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::rc::Rc;

use super::expr::{AffineExpr, GuardExpr};

/// Identifier of a loop in the program arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoopId(pub usize);

/// Identifier of a task class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub usize);

/// Identifier of an access occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccessId(pub usize);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// A counted loop with unit step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loop {
    /// Induction variable name
    pub induction: String,
    /// Lower bound (inclusive)
    pub lower: Rc<AffineExpr>,
    /// End condition, a conjunction of `<`/`<=` comparisons on the
    /// induction variable
    pub end: Rc<GuardExpr>,
}

/// A task class: one annotated invocation site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Task class name
    pub name: String,
}

/// Whether an access reads or writes its array element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessKind {
    /// The element is read
    Read,
    /// The element is written
    Write,
}

/// One textual occurrence of an array reference inside a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessOccurrence {
    /// Array variable name
    pub array: String,
    /// Subscript expressions, one per array dimension
    pub indices: Vec<Rc<AffineExpr>>,
    /// Read or write
    pub kind: AccessKind,
    /// Region tag bitmask; 0 means untagged. Two accesses with nonzero,
    /// disjoint tags touch disjoint parts of the element and cannot
    /// conflict.
    pub region: u32,
    /// The task class this occurrence belongs to
    pub task: TaskId,
    /// Enclosing loops, innermost first
    pub loops: Vec<LoopId>,
    /// Guards on the execution of the enclosing task
    pub guards: Vec<Rc<GuardExpr>>,
    /// Position in textual program order
    pub order: usize,
}

/// A whole annotated program.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    /// Program name
    pub name: String,
    /// Loop arena
    pub loops: Vec<Loop>,
    /// Task-class arena
    pub tasks: Vec<Task>,
    /// Access arena, in textual program order
    pub accesses: Vec<AccessOccurrence>,
}

impl Program {
    /// An empty program with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a loop, returning its id.
    pub fn add_loop(&mut self, lp: Loop) -> LoopId {
        self.loops.push(lp);
        LoopId(self.loops.len() - 1)
    }

    /// Add a task class, returning its id.
    pub fn add_task(&mut self, name: impl Into<String>) -> TaskId {
        self.tasks.push(Task { name: name.into() });
        TaskId(self.tasks.len() - 1)
    }

    /// Add an access occurrence, returning its id. The occurrence's
    /// `order` field is filled from the arena position.
    pub fn add_access(&mut self, mut access: AccessOccurrence) -> AccessId {
        access.order = self.accesses.len();
        self.accesses.push(access);
        AccessId(self.accesses.len() - 1)
    }

    /// Look up a loop by id.
    pub fn lp(&self, id: LoopId) -> &Loop {
        &self.loops[id.0]
    }

    /// Look up a task class by id.
    pub fn task(&self, id: TaskId) -> &Task {
        &self.tasks[id.0]
    }

    /// Look up an access occurrence by id.
    pub fn access(&self, id: AccessId) -> &AccessOccurrence {
        &self.accesses[id.0]
    }

    /// All array names accessed by the program, in first-seen order.
    pub fn arrays(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for acc in &self.accesses {
            if seen.insert(acc.array.clone()) {
                out.push(acc.array.clone());
            }
        }
        out
    }

    /// Ids of all accesses to an array, in program order.
    pub fn accesses_of(&self, array: &str) -> Vec<AccessId> {
        self.accesses
            .iter()
            .enumerate()
            .filter(|(_, a)| a.array == array)
            .map(|(i, _)| AccessId(i))
            .collect()
    }

    /// Induction variable names of an access's loop chain, outermost
    /// first (the order its iteration tuple is written in).
    pub fn tuple_names(&self, access: &AccessOccurrence) -> Vec<String> {
        access
            .loops
            .iter()
            .rev()
            .map(|id| self.lp(*id).induction.clone())
            .collect()
    }

    /// Innermost loop shared by two accesses, with its (0-based) depth
    /// from the outermost level, when the chains share a prefix.
    pub fn closest_enclosing_loop(
        &self,
        a: &AccessOccurrence,
        b: &AccessOccurrence,
    ) -> Option<(LoopId, usize)> {
        let mut found = None;
        let outer_a: Vec<LoopId> = a.loops.iter().rev().copied().collect();
        let outer_b: Vec<LoopId> = b.loops.iter().rev().copied().collect();
        for (depth, (x, y)) in outer_a.iter().zip(outer_b.iter()).enumerate() {
            if x == y {
                found = Some((*x, depth));
            } else {
                break;
            }
        }
        found
    }
}

/// Registry of global parameters: every name free in the program's
/// bounds, guards, and subscripts that is not an induction variable.
///
/// Built once by [`AnalysisContext::from_program`] and read-only after
/// that; re-declaring a name is a no-op.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisContext {
    globals: BTreeSet<String>,
}

impl AnalysisContext {
    /// Scan the program and register every global parameter.
    pub fn from_program(program: &Program) -> Self {
        let mut names = BTreeSet::new();
        for lp in &program.loops {
            lp.lower.collect_vars(&mut names);
            lp.end.collect_vars(&mut names);
        }
        for acc in &program.accesses {
            for idx in &acc.indices {
                idx.collect_vars(&mut names);
            }
            for g in &acc.guards {
                g.collect_vars(&mut names);
            }
        }
        for lp in &program.loops {
            names.remove(&lp.induction);
        }
        Self { globals: names }
    }

    /// Register a global parameter by hand.
    pub fn declare(&mut self, name: impl Into<String>) {
        self.globals.insert(name.into());
    }

    /// Whether a name is a known global parameter.
    pub fn is_global(&self, name: &str) -> bool {
        self.globals.contains(name)
    }

    /// The registered names.
    pub fn globals(&self) -> impl Iterator<Item = &str> {
        self.globals.iter().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expr::GuardExpr;

    fn simple_loop(name: &str, ub: &str) -> Loop {
        let iv = AffineExpr::var(name);
        Loop {
            induction: name.to_string(),
            lower: AffineExpr::int(0),
            end: GuardExpr::lt(&iv, &AffineExpr::var(ub)),
        }
    }

    #[test]
    fn test_context_separates_globals() {
        let mut p = Program::new("p");
        let i = p.add_loop(simple_loop("i", "N"));
        let t = p.add_task("T");
        p.add_access(AccessOccurrence {
            array: "A".into(),
            indices: vec![AffineExpr::var("i")],
            kind: AccessKind::Write,
            region: 0,
            task: t,
            loops: vec![i],
            guards: vec![],
            order: 0,
        });
        let ctx = AnalysisContext::from_program(&p);
        assert!(ctx.is_global("N"));
        assert!(!ctx.is_global("i"));
    }

    #[test]
    fn test_closest_enclosing_loop() {
        let mut p = Program::new("p");
        let i = p.add_loop(simple_loop("i", "N"));
        let j = p.add_loop(simple_loop("j", "N"));
        let k = p.add_loop(simple_loop("k", "N"));
        let t = p.add_task("T");
        let mk = |loops: Vec<LoopId>| AccessOccurrence {
            array: "A".into(),
            indices: vec![],
            kind: AccessKind::Read,
            region: 0,
            task: t,
            loops,
            guards: vec![],
            order: 0,
        };
        // chains [j, i] and [k, i] (innermost first) share only i
        let a = mk(vec![j, i]);
        let b = mk(vec![k, i]);
        let (shared, depth) = p.closest_enclosing_loop(&a, &b).unwrap();
        assert_eq!(shared, i);
        assert_eq!(depth, 0);
        // disjoint chains share nothing
        let c = mk(vec![j]);
        let d = mk(vec![k]);
        assert!(p.closest_enclosing_loop(&c, &d).is_none());
    }
}
