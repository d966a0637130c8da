//! # Taskdep - Dependence Analysis for Task-Graph Synthesis
//!
//! Turns the memory accesses of a sequential loop nest into the data
//! and synchronization edges of a dataflow task graph:
//! - Affine relation algebra (union, intersection, difference,
//!   complement, composition, inverse, transitive closure)
//! - Flow, output, and anti dependence relation construction, with
//!   entry/exit pseudo-tasks for data that enters or leaves the graph
//! - Flow-edge minimization against intervening overwrites
//! - Anti-edge reduction to the necessary synchronization set
//! - Per-edge condition simplification for emission
//!
//! ## Architecture
//!
//! ```text
//! IR accesses → Relation Builder → Minimizer → Finalizer → Conditions
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use taskdep::prelude::*;
//!
//! let mut program = Program::new("pipeline");
//! // ... add loops, tasks, and accesses ...
//! let summary = taskdep::analyze(&program)?;
//! for (task, edges) in &summary.outgoing {
//!     println!("{task}: {} outgoing edges", edges.len());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(dead_code)] // During development

pub mod analysis;
pub mod ir;
pub mod relation;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::analysis::{
        analyze, split_disjunctions, DepEdge, DepKind, DependenceSummary, Endpoint,
        RelationBuilder, SimplifiedDisjunct,
    };
    pub use crate::ir::expr::{AffineExpr, CmpOp, GuardExpr};
    pub use crate::ir::program::{
        AccessId, AccessKind, AccessOccurrence, AnalysisContext, Loop, LoopId, Program, Task,
        TaskId,
    };
    pub use crate::relation::{Conjunct, Constraint, LinearExpr, Relation, Space, Var};
    pub use crate::utils::errors::*;
}

use anyhow::Result;

/// Run dependence analysis over a program.
pub fn analyze(program: &ir::program::Program) -> Result<analysis::DependenceSummary> {
    Ok(analysis::analyze(program)?)
}

/// Crate version, for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
