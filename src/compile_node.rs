//! # Compile Nodes
//!
//! The output of [`crate::compiler::RankDownCompiler`]: a tree mixing two
//! layers, mirroring `original_source/src/Plan/src/CompileNodes.h`.
//!
//! - **Rank-down layer** (`AndRowJz`, `LoadRowJz`, `Or`, `RankDown`,
//!   `Report`) walks rows from high rank to low, testing each row as it
//!   goes and bailing out early (`Jz` = jump if zero) the moment the
//!   accumulator goes to zero.
//! - **Rank-zero layer** (`AndTree`, `OrTree`, `LoadRow`, `Not`) is plain
//!   boolean tree evaluation at the finest rank, used for `NOT` subtrees and
//!   for whatever the rewriter left in `other_tree`.
//!
//! `Or`/`AndTree`/`OrTree` are binary, matching the original's
//! `CompileNode::Binary` base — [`crate::compiler::RankDownCompiler`] folds
//! this rewrite's n-ary [`crate::row_tree::RowMatchNode::Or`] /
//! `RowMatchNode::And` into left-deep chains of these at emission time.

use crate::arena::{Arena, NodeId};
use crate::row::{AbstractRow, Rank};

/// A node in the compiled match tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompileNode {
    /// Rank-down layer: AND `row` into the accumulator, short-circuiting to
    /// zero (abandoning `child`) if the result is zero.
    AndRowJz {
        /// The row to load and AND in.
        row: AbstractRow,
        /// Continuation evaluated if the AND is still non-zero. `None`
        /// means this was the last condition on the path — reaching here
        /// with a non-zero accumulator is itself a match.
        child: Option<NodeId<CompileNode>>,
    },
    /// Rank-down layer: load `row` as the initial accumulator value, then
    /// evaluate `child` (used for the first row at a given rank).
    LoadRowJz {
        /// The row to load.
        row: AbstractRow,
        /// Continuation evaluated if the load is still non-zero. `None`
        /// has the same fallthrough-match meaning as in `AndRowJz`.
        child: Option<NodeId<CompileNode>>,
    },
    /// Rank-down layer: binary OR of two rank-down subtrees.
    Or {
        /// Left branch.
        left: NodeId<CompileNode>,
        /// Right branch.
        right: NodeId<CompileNode>,
    },
    /// Rank-down layer: drop from the current rank by `delta`, evaluating
    /// `child` (a rank-zero-layer subtree) at the finer rank.
    RankDown {
        /// How many ranks to descend.
        delta: Rank,
        /// The rank-zero-layer subtree evaluated after descending.
        child: NodeId<CompileNode>,
    },
    /// Rank-down layer: mark a match. `child` is `None` at the root of a
    /// plan with no rows at all.
    Report {
        /// The subtree whose matches are reported, if any.
        child: Option<NodeId<CompileNode>>,
    },
    /// Rank-zero layer: binary AND.
    AndTree {
        /// Left branch.
        left: NodeId<CompileNode>,
        /// Right branch.
        right: NodeId<CompileNode>,
    },
    /// Rank-zero layer: binary OR.
    OrTree {
        /// Left branch.
        left: NodeId<CompileNode>,
        /// Right branch.
        right: NodeId<CompileNode>,
    },
    /// Rank-zero layer: load a single row's value.
    LoadRow {
        /// The row to load.
        row: AbstractRow,
    },
    /// Rank-zero layer: logical complement of `child`.
    Not {
        /// The subtree to complement.
        child: NodeId<CompileNode>,
    },
}

impl CompileNode {
    /// Whether this node belongs to the rank-zero layer (as opposed to the
    /// rank-down layer). Used by [`crate::register_allocator`] to decide
    /// register-use scaling under an enclosing [`CompileNode::RankDown`].
    pub fn is_rank_zero_layer(&self) -> bool {
        matches!(
            self,
            CompileNode::AndTree { .. }
                | CompileNode::OrTree { .. }
                | CompileNode::LoadRow { .. }
                | CompileNode::Not { .. }
        )
    }
}

/// Render `id` in the textual format documented in `SPEC_FULL.md` §6. Only
/// the node structure and field names are normative; this rewrite's choice
/// of child layout for the binary rank-zero nodes (`Children: [left, right]`)
/// is not.
pub fn format_compile_tree(arena: &Arena<CompileNode>, id: NodeId<CompileNode>) -> String {
    match *arena.get(id) {
        CompileNode::AndRowJz { row, child } => format!(
            "AndRowJz {{ Row: {row}, Child: {} }}",
            format_optional_child(arena, child)
        ),
        CompileNode::LoadRowJz { row, child } => format!(
            "LoadRowJz {{ Row: {row}, Child: {} }}",
            format_optional_child(arena, child)
        ),
        CompileNode::Or { left, right } => format!(
            "Or {{ Children: [ {}, {} ] }}",
            format_compile_tree(arena, left),
            format_compile_tree(arena, right)
        ),
        CompileNode::RankDown { delta, child } => format!(
            "RankDown {{ Delta: {delta}, Child: {} }}",
            format_compile_tree(arena, child)
        ),
        CompileNode::Report { child } => {
            format!("Report {{ Child: {} }}", format_optional_child(arena, child))
        }
        CompileNode::AndTree { left, right } => format!(
            "AndTree {{ Children: [ {}, {} ] }}",
            format_compile_tree(arena, left),
            format_compile_tree(arena, right)
        ),
        CompileNode::OrTree { left, right } => format!(
            "OrTree {{ Children: [ {}, {} ] }}",
            format_compile_tree(arena, left),
            format_compile_tree(arena, right)
        ),
        CompileNode::LoadRow { row } => format!("LoadRow({}, {}, 0, {})", row.id, row.rank, row.inverted),
        CompileNode::Not { child } => format!("Not {{ Child: {} }}", format_compile_tree(arena, child)),
    }
}

fn format_optional_child(arena: &Arena<CompileNode>, child: Option<NodeId<CompileNode>>) -> String {
    match child {
        Some(child) => format_compile_tree(arena, child),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::AbstractRow;

    #[test]
    fn load_row_formats_as_a_flat_tuple() {
        let mut arena = Arena::new();
        let node = arena.alloc(CompileNode::LoadRow { row: AbstractRow::new(0, 6, false) }).unwrap();
        assert_eq!(format_compile_tree(&arena, node), "LoadRow(0, 6, 0, false)");
    }

    #[test]
    fn report_with_no_child_has_an_empty_slot() {
        let mut arena = Arena::new();
        let node = arena.alloc(CompileNode::Report { child: None }).unwrap();
        assert_eq!(format_compile_tree(&arena, node), "Report { Child:  }");
    }

    #[test]
    fn load_row_jz_with_no_child_nests_the_row() {
        let mut arena = Arena::new();
        let node = arena
            .alloc(CompileNode::LoadRowJz { row: AbstractRow::new(1, 2, false), child: None })
            .unwrap();
        assert_eq!(
            format_compile_tree(&arena, node),
            "LoadRowJz { Row: Row(1, 2, 0, false), Child:  }"
        );
    }
}
