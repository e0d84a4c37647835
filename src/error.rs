//! # Error Types
//!
//! Each pipeline stage owns a small `thiserror`-derived enum scoped to its
//! own failure modes. [`Error`] aggregates them behind a single `#[from]`
//! surface for callers that just want to run the whole pipeline.

use thiserror::Error;

/// Errors raised while bump-allocating tree nodes from a per-query [`crate::arena::Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArenaError {
    /// The arena's backing storage would exceed its configured capacity.
    /// The query must be aborted; the caller may retry with a larger arena.
    #[error("arena exhausted: requested node would exceed capacity of {capacity}")]
    AllocationExhausted {
        /// The arena's configured maximum node count.
        capacity: usize,
    },
}

/// Errors raised by [`crate::term_tree::Builder`] misuse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// A second child was added to a `Not` builder.
    #[error("Not builder already has a child")]
    NotChildAlreadySet,

    /// A `Phrase` was built with fewer than two grams.
    #[error("Phrase requires at least two grams, got {0}")]
    SinglePhraseGram(usize),

    /// `Fact(0)` was constructed explicitly; handle 0 is reserved for match-all.
    #[error("Fact handle 0 is reserved for the match-all term")]
    ReservedFactHandle,

    /// A [`crate::row_tree::RowMatchNode`] `And`/`Or` builder completed with
    /// fewer than two children. Unlike [`crate::term_tree::Builder`], row
    /// match trees never flatten: a plan's row tree is compiler input, so a
    /// degenerate connective indicates a bug in [`crate::term_plan`] rather
    /// than a shape the rewriter should tolerate.
    #[error("row {0:?} requires at least two children, got {1}")]
    InsufficientRowChildren(crate::row_tree::RowConnectiveKind, usize),
}

/// Errors raised while resolving a [`crate::term_tree::TermMatchNode`] to a
/// [`crate::row_tree::RowMatchNode`] via [`crate::term_plan::TermPlanConverter`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// A term hash had no entry in the `TermTable` and no adhoc row could be
    /// synthesised for it.
    #[error("no row found for term hash {hash:#018x} and no adhoc row available")]
    TermNotFound {
        /// The hash that failed to resolve.
        hash: u64,
    },

    /// The plan would require more shards or abstract rows than configured.
    #[error("row count exceeded: {actual} rows exceeds configured maximum of {limit}")]
    RowCountExceeded {
        /// The configured maximum.
        limit: u32,
        /// The number of rows the plan actually needed.
        actual: u32,
    },
}

/// Errors raised by the rank-down compiler / interpreter that indicate a bug
/// in plan construction rather than a user-facing condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CompileError {
    /// The interpreter's evaluation stack exceeded its statically bounded
    /// depth. This should be prevented at compile time by bounding tree
    /// depth; if it happens at runtime, it is a bug, not a user error.
    #[error("interpreter stack overflow: depth {depth} exceeds bound {bound}")]
    InterpreterOverflow {
        /// The depth the stack reached.
        depth: usize,
        /// The statically computed bound that was violated.
        bound: usize,
    },

    /// The results buffer filled up mid-query. Per the concurrency model,
    /// this is fatal for the query rather than something the interpreter
    /// can recover from — the buffer is sized at plan time from the
    /// expected match volume.
    #[error("results buffer exhausted: capacity {capacity} reached")]
    ResultsBufferFull {
        /// The buffer's configured capacity.
        capacity: usize,
    },
}

/// Aggregate error type for the full plan → compile → execute pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// See [`ArenaError`].
    #[error(transparent)]
    Arena(#[from] ArenaError),
    /// See [`TreeError`].
    #[error(transparent)]
    Tree(#[from] TreeError),
    /// See [`PlanError`].
    #[error(transparent)]
    Plan(#[from] PlanError),
    /// See [`CompileError`].
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
