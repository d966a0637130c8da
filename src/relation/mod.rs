//! Affine relation algebra.
//!
//! The machinery the dependence passes run on:
//! - Linear expressions over typed variables
//! - Constraints and conjuncts
//! - Relations (unions of conjuncts) with the set/map algebra
//! - Existential projection

pub mod constraint;
pub mod eliminate;
pub mod linear;
pub mod relation;
pub mod space;

pub use constraint::{Conjunct, Constraint, ConstraintKind};
pub use linear::{LinearExpr, Var};
pub use relation::Relation;
pub use space::Space;
