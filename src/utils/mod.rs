//! Utility modules for the dependence analyzer.
//!
//! Currently this holds the error taxonomy shared by all phases.

pub mod errors;

// Re-exports
pub use errors::*;
