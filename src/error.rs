//! Error types of the solver seam and the overflow search.
//!
//! Malformed expressions (wrong arity, mismatched widths, stale handles) are
//! not represented here: they are programming errors and panic at the point
//! of construction.

use thiserror::Error;

use crate::reference::ExprRef;

/// Failure of a single solver call.
///
/// All variants are recoverable: the search treats a failed satisfiability
/// check as "no" for the node being examined.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    /// The backend could not answer (timeout, crash, missing engine, ...).
    #[error("solver unavailable: {0}")]
    Unavailable(String),

    /// The query needed more decision diagram nodes than allowed.
    #[error("node limit of {limit} exceeded")]
    NodeLimit { limit: usize },

    /// A model was requested for an unsatisfiable constraint set.
    #[error("constraints are unsatisfiable")]
    Unsatisfiable,
}

#[derive(Error, Debug)]
pub enum SearchError {
    /// The overflow predicate of `node` was reported satisfiable, but no
    /// concrete input could be extracted for it.
    #[error("failed to extract a solution for the overflow at {node}")]
    SolutionExtractionFailed {
        node: ExprRef,
        #[source]
        source: SolverError,
    },
}
