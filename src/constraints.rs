//! Path constraints.

use crate::reference::ExprRef;

/// An ordered conjunction of boolean expressions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintSet {
    constraints: Vec<ExprRef>,
}

/// A point in the history of a [`ConstraintSet`] that it can be rolled back to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Snapshot(usize);

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, constraint: ExprRef) {
        self.constraints.push(constraint);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.constraints.len())
    }

    /// Drops every constraint added after `snapshot` was taken.
    pub fn restore(&mut self, snapshot: Snapshot) {
        assert!(
            snapshot.0 <= self.constraints.len(),
            "Snapshot of {} constraints is newer than the set ({})",
            snapshot.0,
            self.constraints.len()
        );
        self.constraints.truncate(snapshot.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = ExprRef> + '_ {
        self.constraints.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

impl FromIterator<ExprRef> for ConstraintSet {
    fn from_iter<I: IntoIterator<Item = ExprRef>>(iter: I) -> Self {
        Self {
            constraints: iter.into_iter().collect(),
        }
    }
}
