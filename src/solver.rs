//! The constraint solver seam.

use std::fmt;

use crate::constraints::ConstraintSet;
use crate::error::SolverError;
use crate::expr::ExprManager;
use crate::reference::ExprRef;

/// A satisfiability question: can `expr` be true together with `constraints`?
#[derive(Debug, Copy, Clone)]
pub struct Query<'c> {
    pub constraints: &'c ConstraintSet,
    pub expr: ExprRef,
}

impl<'c> Query<'c> {
    pub fn new(constraints: &'c ConstraintSet, expr: ExprRef) -> Self {
        Self { constraints, expr }
    }
}

/// A decision procedure over expressions built by an [`ExprManager`].
pub trait Solver {
    /// Checks whether `query.expr` may be true under `query.constraints`.
    fn may_be_true(&mut self, mgr: &ExprManager, query: &Query) -> Result<bool, SolverError>;

    /// Produces concrete contents for every registered array such that all
    /// `constraints` hold.
    fn concrete_model(&mut self, mgr: &ExprManager, constraints: &ConstraintSet) -> Result<Solution, SolverError>;
}

impl<S: Solver + ?Sized> Solver for &mut S {
    fn may_be_true(&mut self, mgr: &ExprManager, query: &Query) -> Result<bool, SolverError> {
        (**self).may_be_true(mgr, query)
    }

    fn concrete_model(&mut self, mgr: &ExprManager, constraints: &ConstraintSet) -> Result<Solution, SolverError> {
        (**self).concrete_model(mgr, constraints)
    }
}

/// Concrete input bytes per symbolic array, in array registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Solution {
    values: Vec<(String, Vec<u8>)>,
}

impl Solution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.values.push((name.into(), bytes));
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, b)| b.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.values.iter().map(|(n, b)| (n.as_str(), b.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Vec<u8>)> for Solution {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, bytes) in &self.values {
            write!(f, "{}:", name)?;
            for b in bytes {
                write!(f, " {:#04x}", b)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solution_lookup() {
        let mut solution = Solution::new();
        solution.push("size", vec![0xff, 0x00]);
        solution.push("flag", vec![1]);
        assert_eq!(solution.get("size"), Some(&[0xff, 0x00][..]));
        assert_eq!(solution.get("missing"), None);
        assert_eq!(solution.iter().map(|(n, _)| n).collect::<Vec<_>>(), ["size", "flag"]);
        assert_eq!(solution.len(), 2);
    }

    #[test]
    fn test_solution_display() {
        let solution: Solution = [("size".to_string(), vec![0xff, 0x00, 0x10])].into_iter().collect();
        assert_eq!(solution.to_string(), "size: 0xff 0x00 0x10\n");
    }
}
