//! Error types for the dependence analyzer.
//!
//! This module defines all error types used throughout the crate,
//! organized by the phase that produces them.

use std::fmt;
use thiserror::Error;

/// Top-level error type for the analyzer.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Error while converting between expression trees and relations
    #[error("Expression bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Error while building dependence relations
    #[error("Relation construction error: {0}")]
    Build(#[from] BuildError),

    /// Error while finalizing synchronization edges
    #[error("Task graph error: {0}")]
    Graph(#[from] GraphError),

    /// Internal analyzer error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error during expression-tree / relation conversion or solving.
#[derive(Error, Debug, Clone)]
pub struct BridgeError {
    /// The error message
    pub message: String,
    /// The kind of bridge error
    pub kind: BridgeErrorKind,
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// What went wrong during tree / relation conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeErrorKind {
    /// A name in an expression is neither a tuple variable nor a
    /// registered global parameter
    UnanalyzableReference,
    /// A constraint tree does not have the comparison shape the
    /// converter accepts
    MalformedConstraint,
    /// Solving a tree for a variable failed to converge
    UnboundedSolve,
}

impl BridgeError {
    /// An expression mentions a name the analysis context does not know.
    pub fn unanalyzable(name: impl Into<String>) -> Self {
        Self {
            message: format!("reference to unknown variable '{}'", name.into()),
            kind: BridgeErrorKind::UnanalyzableReference,
        }
    }

    /// A condition tree is not a conjunction/disjunction of comparisons.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: BridgeErrorKind::MalformedConstraint,
        }
    }

    /// The iterative solver hit its step limit.
    pub fn unbounded(var: &str) -> Self {
        Self {
            message: format!("solving for '{}' did not converge", var),
            kind: BridgeErrorKind::UnboundedSolve,
        }
    }
}

/// Error during dependence relation construction.
#[derive(Error, Debug, Clone)]
pub struct BuildError {
    /// The error message
    pub message: String,
    /// The kind of construction error
    pub kind: BuildErrorKind,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// What went wrong while building relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildErrorKind {
    /// A loop end condition or guard uses a construct the builder
    /// cannot translate (e.g. a disjunctive end condition)
    UnsupportedConstruct,
    /// An access refers to a loop or task that is not in the program
    InvalidReference,
}

impl BuildError {
    /// The builder met a construct it cannot translate.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: BuildErrorKind::UnsupportedConstruct,
        }
    }

    /// Dangling loop/task/access id.
    pub fn invalid_reference(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: BuildErrorKind::InvalidReference,
        }
    }
}

/// Error during synchronization-edge finalization.
#[derive(Error, Debug, Clone)]
pub struct GraphError {
    /// The error message
    pub message: String,
    /// The kind of graph error
    pub kind: GraphErrorKind,
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// What went wrong in the task-class graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphErrorKind {
    /// An edge names a task class that is not a node of the graph
    UnknownNode,
}

impl GraphError {
    /// Edge endpoint is not a node of the task-class graph.
    pub fn unknown_node(name: impl Into<String>) -> Self {
        Self {
            message: format!("no task class named '{}'", name.into()),
            kind: GraphErrorKind::UnknownNode,
        }
    }
}

/// Result type using AnalysisError.
pub type AnalysisResult<T> = Result<T, AnalysisError>;
