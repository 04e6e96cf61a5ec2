//! Breadth-first search for a satisfiable overflow.
//!
//! Starting from the expression of a traced value, the search pops nodes in
//! FIFO order, asks the solver whether the node's overflow predicate can hold
//! under the current path constraints, and on the first hit extracts concrete
//! inputs that trigger it. Nodes whose predicate is unsatisfiable (or that
//! have none) contribute their children to the worklist; array reads are
//! leaves of the search.
//!
//! [`OverflowSearch::check_size`] asks the same solver a single question
//! about a sink argument instead: can it exceed a [`SizeBound`]?

use std::collections::VecDeque;

use log::{debug, info, warn};

use crate::constraints::ConstraintSet;
use crate::error::{SearchError, SolverError};
use crate::expr::ExprManager;
use crate::node::Kind;
use crate::overflow::{self, SizeBound};
use crate::reference::ExprRef;
use crate::solver::{Query, Solution, Solver};
use crate::visitor::{Identity, Rewriter};

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct SearchConfig {
    /// Stop after popping this many nodes.
    pub max_nodes: Option<usize>,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct SearchStats {
    pub nodes_visited: usize,
    pub queries: usize,
    pub query_failures: usize,
}

/// An overflow together with inputs that trigger it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counterexample {
    /// The operator node that overflows.
    pub node: ExprRef,
    /// Its overflow predicate.
    pub predicate: ExprRef,
    /// Distance from the root, in worklist generations.
    pub depth: usize,
    pub solution: Solution,
}

pub struct OverflowSearch<'m, S> {
    mgr: &'m ExprManager,
    rewriter: Rewriter<'m, Identity>,
    solver: S,
    config: SearchConfig,
    stats: SearchStats,
}

impl<'m, S: Solver> OverflowSearch<'m, S> {
    pub fn new(mgr: &'m ExprManager, solver: S) -> Self {
        Self::with_config(mgr, solver, SearchConfig::default())
    }

    pub fn with_config(mgr: &'m ExprManager, solver: S, config: SearchConfig) -> Self {
        Self {
            mgr,
            rewriter: Rewriter::new(mgr, Identity),
            solver,
            config,
            stats: SearchStats::default(),
        }
    }

    pub fn config(&self) -> SearchConfig {
        self.config
    }

    /// Statistics of the last call to [`find`][Self::find].
    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut S {
        &mut self.solver
    }

    pub fn into_solver(self) -> S {
        self.solver
    }

    /// Searches the expression tree under `root` for the first node, in
    /// breadth-first order, whose overflow is satisfiable under `constraints`.
    ///
    /// `constraints` is left exactly as it was on every return path.
    pub fn find(
        &mut self,
        root: ExprRef,
        constraints: &mut ConstraintSet,
    ) -> Result<Option<Counterexample>, SearchError> {
        self.stats = SearchStats::default();

        let mut worklist = VecDeque::from([(root, 0usize)]);
        while let Some((current, depth)) = worklist.pop_front() {
            if let Some(max) = self.config.max_nodes {
                if self.stats.nodes_visited >= max {
                    warn!("Overflow search stopped after visiting {} nodes", max);
                    return Ok(None);
                }
            }
            self.stats.nodes_visited += 1;

            let node = self.mgr.node(current);
            if node.kind == Kind::Read {
                continue;
            }

            if let Some(predicate) = self.predicate(current) {
                if self.may_overflow(constraints, current, predicate) {
                    let solution = self
                        .extract(constraints, predicate)
                        .map_err(|source| SearchError::SolutionExtractionFailed { node: current, source })?;
                    info!("Found overflow in {} {} at depth {}", node.kind, current, depth);
                    return Ok(Some(Counterexample {
                        node: current,
                        predicate,
                        depth,
                        solution,
                    }));
                }
            }

            worklist.extend(node.kids().iter().map(|&kid| (kid, depth + 1)));
        }

        info!(
            "No overflow found after visiting {} nodes ({} queries)",
            self.stats.nodes_visited, self.stats.queries
        );
        Ok(None)
    }

    /// Checks whether `size`, the argument of a sink, can violate `bound`
    /// under `constraints`, and extracts inputs that make it do so.
    ///
    /// The check is a single query on `size` itself: its subexpressions are
    /// not searched. A failed query is logged and reported as `Ok(None)`.
    /// `constraints` is left exactly as it was on every return path.
    pub fn check_size(
        &mut self,
        size: ExprRef,
        constraints: &mut ConstraintSet,
        bound: SizeBound,
    ) -> Result<Option<Counterexample>, SearchError> {
        self.stats = SearchStats {
            nodes_visited: 1,
            ..Default::default()
        };

        let predicate = overflow::size_condition(self.mgr, size, bound);
        if self.mgr.as_bool(predicate) == Some(false) {
            debug!("Size {} is within {:?}", size, bound);
            return Ok(None);
        }
        if !self.may_overflow(constraints, size, predicate) {
            return Ok(None);
        }

        let solution = self
            .extract(constraints, predicate)
            .map_err(|source| SearchError::SolutionExtractionFailed { node: size, source })?;
        info!("Size {} can exceed {:?}", size, bound);
        Ok(Some(Counterexample {
            node: size,
            predicate,
            depth: 0,
            solution,
        }))
    }

    /// The overflow predicate of `e`, unless it has none or it is trivially false.
    fn predicate(&self, e: ExprRef) -> Option<ExprRef> {
        let predicate = self.rewriter.visit_outside_op(e);
        if predicate == e || !self.mgr.width(predicate).is_bool() {
            return None;
        }
        if self.mgr.as_bool(predicate) == Some(false) {
            debug!("Overflow predicate of {} is constant false", e);
            return None;
        }
        Some(predicate)
    }

    fn may_overflow(&mut self, constraints: &ConstraintSet, node: ExprRef, predicate: ExprRef) -> bool {
        self.stats.queries += 1;
        match self.solver.may_be_true(self.mgr, &Query::new(constraints, predicate)) {
            Ok(res) => {
                debug!("Overflow of {} satisfiable: {}", node, res);
                res
            }
            Err(e) => {
                self.stats.query_failures += 1;
                warn!("Solver failed on the overflow predicate of {}: {}", node, e);
                false
            }
        }
    }

    /// Gets a model of `constraints ∧ predicate`, leaving `constraints` unchanged.
    fn extract(&mut self, constraints: &mut ConstraintSet, predicate: ExprRef) -> Result<Solution, SolverError> {
        let snapshot = constraints.snapshot();
        let mut trial = scopeguard::guard(constraints, move |c| c.restore(snapshot));
        trial.push(predicate);
        self.solver.concrete_model(self.mgr, &trial)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::blast::BddSolver;
    use crate::types::Width;

    const W8: Width = Width::INT8;

    /// Answers every query with a fixed verdict and records the constraint
    /// sets it was shown.
    #[derive(Default)]
    struct Scripted {
        sat: bool,
        seen: Vec<usize>,
    }

    impl Solver for Scripted {
        fn may_be_true(&mut self, _mgr: &ExprManager, query: &Query) -> Result<bool, SolverError> {
            self.seen.push(query.constraints.len());
            Ok(self.sat)
        }

        fn concrete_model(&mut self, _mgr: &ExprManager, constraints: &ConstraintSet) -> Result<Solution, SolverError> {
            self.seen.push(constraints.len());
            Ok(Solution::new())
        }
    }

    #[test]
    fn test_no_overflow_capable_nodes() {
        let mgr = ExprManager::new();
        let x = mgr.mk_symbolic("x", W8);
        let y = mgr.mk_symbolic("y", W8);
        let root = mgr.mk_xor(mgr.mk_and(x, y), mgr.mk_not(x));

        let mut constraints = ConstraintSet::new();
        constraints.push(mgr.mk_ult(x, y));
        let before = constraints.clone();

        let mut search = OverflowSearch::new(&mgr, Scripted { sat: true, ..Default::default() });
        assert_eq!(search.find(root, &mut constraints).unwrap(), None);
        assert_eq!(constraints, before);
        assert_eq!(search.stats().queries, 0);
        assert!(search.solver().seen.is_empty());
    }

    #[test]
    fn test_trial_constraint_is_visible_to_model_extraction() {
        let mgr = ExprManager::new();
        let x = mgr.mk_symbolic("x", W8);
        let y = mgr.mk_symbolic("y", W8);
        let root = mgr.mk_add(x, y);

        let mut constraints = ConstraintSet::new();
        constraints.push(mgr.mk_ult(x, y));

        let mut search = OverflowSearch::new(&mgr, Scripted { sat: true, ..Default::default() });
        let cex = search.find(root, &mut constraints).unwrap().unwrap();
        assert_eq!(cex.node, root);
        assert_eq!(cex.depth, 0);
        // One query with the caller's constraint, one model request with the predicate added.
        assert_eq!(search.solver().seen, vec![1, 2]);
        assert_eq!(constraints.len(), 1);
    }

    #[test]
    fn test_finds_overflow_with_bdd_solver() {
        let mgr = ExprManager::new();
        let x = mgr.mk_symbolic("x", W8);
        let root = mgr.mk_add(x, mgr.mk_const(16, W8));

        let mut constraints = ConstraintSet::new();
        let mut search = OverflowSearch::new(&mgr, BddSolver::new());
        let cex = search.find(root, &mut constraints).unwrap().unwrap();
        let value = cex.solution.get("x").unwrap()[0];
        assert!(value >= 0x70, "{:#x}", value);
        assert!(constraints.is_empty());
    }

    #[test]
    fn test_max_nodes() {
        let mgr = ExprManager::new();
        let x = mgr.mk_symbolic("x", W8);
        let y = mgr.mk_symbolic("y", W8);
        let root = mgr.mk_xor(mgr.mk_and(x, y), mgr.mk_add(x, y));

        let config = SearchConfig { max_nodes: Some(2) };
        let mut search = OverflowSearch::with_config(&mgr, Scripted { sat: true, ..Default::default() }, config);
        let mut constraints = ConstraintSet::new();
        assert_eq!(search.find(root, &mut constraints).unwrap(), None);
        assert_eq!(search.stats().nodes_visited, 2);
    }
}
