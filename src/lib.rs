//! # overflow-rs: Integer-overflow search over bit-vector expressions
//!
//! **`overflow-rs`** finds integer overflows in symbolic values.
//! Given the expression a program computed (say, the size passed to an allocator) and the path
//! constraints under which it was computed, it looks for an arithmetic operation inside that
//! expression that can wrap, and produces concrete input bytes that make it wrap.
//!
//! ## How it works
//!
//! - Expressions are immutable, **hash-consed** nodes owned by an [`ExprManager`][crate::expr::ExprManager].
//!   Structurally equal expressions share one [`ExprRef`][crate::reference::ExprRef], so identity is equality.
//! - A [`Rewriter`][crate::visitor::Rewriter] walks expressions with user-supplied [`Visitor`][crate::visitor::Visitor] hooks,
//!   memoizing the rewrite of every node it has seen.
//! - For each arithmetic node, [`overflow_condition`][crate::overflow::overflow_condition] builds a boolean
//!   **overflow predicate** over the node's own operands and result.
//! - [`OverflowSearch`][crate::search::OverflowSearch] visits the tree breadth-first, asks a
//!   [`Solver`][crate::solver::Solver] whether a predicate can hold, and extracts a model for the first one that can.
//!   The caller's [`ConstraintSet`][crate::constraints::ConstraintSet] is always restored.
//! - [`BddSolver`][crate::blast::BddSolver] is a complete reference solver that bit-blasts expressions into BDDs.
//!
//! ## Basic Usage
//!
//! ```rust
//! use overflow_rs::blast::BddSolver;
//! use overflow_rs::constraints::ConstraintSet;
//! use overflow_rs::expr::ExprManager;
//! use overflow_rs::search::OverflowSearch;
//! use overflow_rs::types::Width;
//!
//! let mgr = ExprManager::new();
//!
//! // size = n * 4, with n < 0x50
//! let n = mgr.mk_symbolic("n", Width::INT8);
//! let size = mgr.mk_mul(n, mgr.mk_const(4, Width::INT8));
//! let mut constraints = ConstraintSet::new();
//! constraints.push(mgr.mk_ult(n, mgr.mk_const(0x50, Width::INT8)));
//!
//! let mut search = OverflowSearch::new(&mgr, BddSolver::new());
//! let cex = search.find(size, &mut constraints).unwrap().unwrap();
//! assert_eq!(cex.node, size);
//! let n = cex.solution.get("n").unwrap()[0];
//! assert!((0x20..0x50).contains(&n));
//! assert_eq!(constraints.len(), 1);
//! ```

pub mod bdd;
pub mod blast;
pub mod cache;
pub mod constraints;
pub mod error;
pub mod eval;
pub mod expr;
pub mod node;
pub mod overflow;
pub mod reference;
pub mod search;
pub mod solver;
pub mod storage;
pub mod types;
pub mod visitor;
