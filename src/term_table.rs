//! # Term Table
//!
//! Maps a term's [`Hash`](crate::hash::Hash) to the physical
//! [`RowId`](crate::row::RowId)s a shard carries for it, built once at index
//! time and read many times at query time. [`PlanRows`] is the per-query
//! companion table: it interns the physical rows a single plan touches,
//! deduplicating repeats so the same physical row gets one
//! [`AbstractRow`](crate::row::AbstractRow) id no matter how many terms in
//! the query resolve to it.
//!
//! Grounded in the original engine's `OpenTerm` / `AddRowId` / `CloseTerm` /
//! `SetRowCounts` / `Seal` builder workflow (see
//! `TermPlanConverterTest.cpp`): a term's explicit rows are added between
//! `OpenTerm`/`CloseTerm`, and every term additionally falls back to a
//! shared adhoc row when it has no entry at all.

use crate::row::RowId;
use std::collections::HashMap;

/// Read side of a term table: what a query planner needs to resolve terms
/// into physical rows.
pub trait TermTable {
    /// The explicit rows a shard carries for `hash`, if any were indexed.
    fn rows_for_hash(&self, hash: u64) -> Option<&[RowId]>;

    /// The row a term falls back to when it has no explicit entry — the
    /// conservative "might contain this term" bit shared by every
    /// unindexed term, keeping unindexed-term queries sound rather than
    /// silently dropping them.
    fn adhoc_row(&self) -> RowId;
}

/// A simple in-memory [`TermTable`], built via [`TermTableBuilder`].
#[derive(Debug, Clone)]
pub struct InMemoryTermTable {
    rows: HashMap<u64, Vec<RowId>>,
    adhoc_row: RowId,
}

impl TermTable for InMemoryTermTable {
    fn rows_for_hash(&self, hash: u64) -> Option<&[RowId]> {
        self.rows.get(&hash).map(Vec::as_slice)
    }

    fn adhoc_row(&self) -> RowId {
        self.adhoc_row
    }
}

/// Builder mirroring the original engine's `OpenTerm`/`AddRowId`/`CloseTerm`
/// sequence, so one term's rows are assembled before being committed under
/// its hash.
pub struct TermTableBuilder {
    rows: HashMap<u64, Vec<RowId>>,
    adhoc_row: RowId,
    pending: Option<Vec<RowId>>,
}

impl TermTableBuilder {
    /// Start a builder. `adhoc_row` is the fallback row assigned to every
    /// term with no explicit entry.
    pub fn new(adhoc_row: RowId) -> Self {
        TermTableBuilder {
            rows: HashMap::new(),
            adhoc_row,
            pending: None,
        }
    }

    /// Begin accumulating rows for the next term.
    ///
    /// # Panics
    /// Panics if a term is already open (mismatched `OpenTerm`/`CloseTerm`
    /// calls are a builder misuse, not a runtime condition).
    pub fn open_term(&mut self) {
        assert!(self.pending.is_none(), "open_term called while a term is already open");
        self.pending = Some(Vec::new());
    }

    /// Add a physical row to the term currently open.
    ///
    /// # Panics
    /// Panics if no term is open.
    pub fn add_row_id(&mut self, row_id: RowId) {
        self.pending
            .as_mut()
            .expect("add_row_id called with no term open")
            .push(row_id);
    }

    /// Commit the currently open term's rows under `hash`.
    ///
    /// # Panics
    /// Panics if no term is open.
    pub fn close_term(&mut self, hash: u64) {
        let rows = self.pending.take().expect("close_term called with no term open");
        self.rows.insert(hash, rows);
    }

    /// Finish building.
    pub fn seal(self) -> InMemoryTermTable {
        InMemoryTermTable {
            rows: self.rows,
            adhoc_row: self.adhoc_row,
        }
    }
}

/// Per-query table of the physical rows a plan actually references,
/// deduplicated so repeated rows share one
/// [`AbstractRow`](crate::row::AbstractRow) id. Indexes are dense and stable
/// for the lifetime of one plan (never reused across queries — rebuild a
/// fresh `PlanRows` per query, the same way a fresh
/// [`Arena`](crate::arena::Arena) is used per query).
#[derive(Debug, Default)]
pub struct PlanRows {
    rows: Vec<RowId>,
    index_of: HashMap<RowId, u32>,
}

impl PlanRows {
    /// Create an empty plan-local row table.
    pub fn new() -> Self {
        PlanRows::default()
    }

    /// Intern `row_id`, returning its plan-local index. Repeated calls with
    /// the same `row_id` return the same index.
    pub fn intern(&mut self, row_id: RowId) -> u32 {
        if let Some(&id) = self.index_of.get(&row_id) {
            return id;
        }
        let id = u32::try_from(self.rows.len()).expect("plan exceeds u32 row index space");
        self.rows.push(row_id);
        self.index_of.insert(row_id, id);
        id
    }

    /// Resolve a plan-local id back to its physical row.
    pub fn resolve(&self, id: u32) -> RowId {
        self.rows[id as usize]
    }

    /// Allocate a second plan-local id for a row already interned, used by
    /// [`crate::rewriter`] when an out-of-rank row is rank-upped inside a
    /// `NOT` subtree: the physical row is unchanged, but the rank-0 usage
    /// needs its own abstract id so the register allocator never conflates
    /// a row's rank-down-layer use with its rank-0-layer use.
    pub fn intern_shadow(&mut self, row_id: RowId) -> u32 {
        let id = u32::try_from(self.rows.len()).expect("plan exceeds u32 row index space");
        self.rows.push(row_id);
        id
    }

    /// Number of distinct physical rows this plan references.
    pub fn row_count(&self) -> u32 {
        u32::try_from(self.rows.len()).expect("plan exceeds u32 row index space")
    }
}
