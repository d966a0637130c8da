//! Input program representation.
//!
//! - Affine expression and guard trees ([`expr`])
//! - The loop/task/access arenas and the global-parameter registry
//!   ([`program`])

pub mod expr;
pub mod program;

pub use expr::{AffineExpr, CmpOp, GuardExpr};
pub use program::{
    AccessId, AccessKind, AccessOccurrence, AnalysisContext, Loop, LoopId, Program, Task, TaskId,
};
