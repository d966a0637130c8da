//! Variable spaces for relations.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::linear::Var;

/// The named tuple variables of a relation.
///
/// A map relation has both input and output tuples; a set has only the
/// input tuple. Global parameters are not tracked here, they are named
/// directly in [`Var::Global`] terms.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Space {
    /// Names of the input tuple variables
    pub input: Vec<String>,
    /// Names of the output tuple variables (empty for a set)
    pub output: Vec<String>,
}

impl Space {
    /// A set space over the given variable names.
    pub fn set(input: Vec<String>) -> Self {
        Self {
            input,
            output: Vec::new(),
        }
    }

    /// A map space over the given input and output names.
    pub fn map(input: Vec<String>, output: Vec<String>) -> Self {
        Self { input, output }
    }

    /// Whether this is a set space.
    pub fn is_set(&self) -> bool {
        self.output.is_empty()
    }

    /// Input tuple arity.
    pub fn n_in(&self) -> usize {
        self.input.len()
    }

    /// Output tuple arity.
    pub fn n_out(&self) -> usize {
        self.output.len()
    }

    /// The space of the inverse map.
    pub fn inverse(&self) -> Self {
        Self {
            input: self.output.clone(),
            output: self.input.clone(),
        }
    }

    /// Display name for a variable in this space.
    ///
    /// Output variables that collide with an input name are primed, the
    /// way a self-arrow `[k] -> [k']` reads.
    pub fn name_of(&self, v: &Var) -> String {
        match v {
            Var::In(i) => self
                .input
                .get(*i)
                .cloned()
                .unwrap_or_else(|| format!("in{}", i)),
            Var::Out(i) => {
                let base = self
                    .output
                    .get(*i)
                    .cloned()
                    .unwrap_or_else(|| format!("out{}", i));
                if self.input.contains(&base) {
                    format!("{}'", base)
                } else {
                    base
                }
            }
            Var::Global(name) => name.clone(),
            Var::Exists(i) => format!("e{}", i),
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outs: Vec<String> = (0..self.output.len())
            .map(|i| self.name_of(&Var::Out(i)))
            .collect();
        if self.is_set() {
            write!(f, "[{}]", self.input.join(","))
        } else {
            write!(f, "[{}] -> [{}]", self.input.join(","), outs.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primed_output() {
        let s = Space::map(vec!["k".into()], vec!["k".into()]);
        assert_eq!(s.name_of(&Var::In(0)), "k");
        assert_eq!(s.name_of(&Var::Out(0)), "k'");
        assert_eq!(format!("{}", s), "[k] -> [k']");
    }

    #[test]
    fn test_set_display() {
        let s = Space::set(vec!["i".into(), "j".into()]);
        assert!(s.is_set());
        assert_eq!(format!("{}", s), "[i,j]");
    }
}
