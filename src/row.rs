//! # Row Types
//!
//! [`Rank`] covers `0..=6`; a rank-r row covers `2^r` adjacent documents per
//! bit. [`RowId`] is a physical row address within one shard; [`AbstractRow`]
//! is the plan-local handle a query builds against, resolved through
//! [`crate::term_table::PlanRows`] to a `RowId` per shard.

/// The maximum legal row rank (inclusive). Rows covering `2^6 = 64`
/// documents per bit are the coarsest the planner reasons about.
pub const MAX_RANK: u8 = 6;

/// Log2-sized row rank, `0..=MAX_RANK`.
pub type Rank = u8;

/// Physical row address within a shard: a rank plus an index into that
/// rank's row table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowId {
    /// The row's rank.
    pub rank: Rank,
    /// The row's index within its rank's table.
    pub index: u32,
}

impl RowId {
    /// Construct a `RowId`, asserting the rank is in range.
    pub fn new(rank: Rank, index: u32) -> Self {
        assert!(rank <= MAX_RANK, "rank {rank} exceeds MAX_RANK {MAX_RANK}");
        RowId { rank, index }
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RowId({}, {})", self.rank, self.index)
    }
}

/// A plan-local reference to a row: `id` indexes into the plan's
/// [`crate::term_table::PlanRows`] table rather than addressing a physical
/// row directly, `rank` mirrors the `RowId` it resolves to (redundantly, so
/// the planner never needs a `PlanRows` lookup just to reason about rank),
/// and `inverted` marks a logical complement applied at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AbstractRow {
    /// Plan-local index into `PlanRows`.
    pub id: u32,
    /// The rank of the row this id resolves to.
    pub rank: Rank,
    /// Whether the row is logically complemented when loaded.
    pub inverted: bool,
}

impl AbstractRow {
    /// Construct a new abstract row reference.
    pub fn new(id: u32, rank: Rank, inverted: bool) -> Self {
        assert!(rank <= MAX_RANK, "rank {rank} exceeds MAX_RANK {MAX_RANK}");
        AbstractRow { id, rank, inverted }
    }

    /// Same row, but rank-0 and complemented. Used by the rewriter's
    /// "rank-up" step when a row appears inside a `NOT` (see
    /// [`crate::rewriter`]); the caller is responsible for actually having
    /// produced a rank-0 `RowId` for this abstract id in `PlanRows`.
    pub fn rank_up_to_zero(self, new_id: u32) -> Self {
        AbstractRow {
            id: new_id,
            rank: 0,
            inverted: self.inverted,
        }
    }
}

impl std::fmt::Display for AbstractRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // `delta` is reserved and always zero per the wire format.
        write!(f, "Row({}, {}, 0, {})", self.id, self.rank, self.inverted)
    }
}
