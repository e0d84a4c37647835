//! # Row Match Tree
//!
//! The output of [`crate::term_plan::TermPlanConverter`] and the input to
//! [`crate::rewriter::MatchTreeRewriter`]: a boolean tree over
//! [`crate::row::AbstractRow`] leaves instead of terms. Unlike
//! [`crate::term_tree::TermMatchNode`], `And`/`Or` here never flatten a
//! single child away — a row tree is compiler input, and a degenerate
//! connective is a bug in the plan converter, not a shape downstream code
//! should silently absorb.

use crate::arena::{Arena, NodeId};
use crate::error::TreeError;
use crate::row::AbstractRow;

/// Which connective a [`Builder`] is accumulating children for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowConnectiveKind {
    /// Logical AND of all children.
    And,
    /// Logical OR of all children.
    Or,
}

/// A node in the row match tree.
#[derive(Debug, Clone, PartialEq)]
pub enum RowMatchNode {
    /// Variadic AND, at least two children, insertion order.
    And(Vec<NodeId<RowMatchNode>>),
    /// Variadic OR, at least two children, insertion order.
    Or(Vec<NodeId<RowMatchNode>>),
    /// Logical complement of a single child.
    Not(NodeId<RowMatchNode>),
    /// A leaf abstract row reference.
    Row(AbstractRow),
    /// Marks the root of a plan: everywhere the tree evaluates true, the
    /// matching document is reported. A `None` child matches nothing (the
    /// degenerate "no terms resolved to any row" plan).
    Report(Option<NodeId<RowMatchNode>>),
}

/// Builder for `And`/`Or`/`Not` nodes. [`RowMatchNode::Row`] and
/// [`RowMatchNode::Report`] are built directly via the free functions below.
pub struct Builder {
    kind: BuilderKind,
}

enum BuilderKind {
    And(Vec<NodeId<RowMatchNode>>),
    Or(Vec<NodeId<RowMatchNode>>),
    Not(Option<NodeId<RowMatchNode>>),
}

impl Builder {
    /// Start building an `And` or `Or` node.
    pub fn new_connective(kind: RowConnectiveKind) -> Self {
        Builder {
            kind: match kind {
                RowConnectiveKind::And => BuilderKind::And(Vec::new()),
                RowConnectiveKind::Or => BuilderKind::Or(Vec::new()),
            },
        }
    }

    /// Start building a `Not` node.
    pub fn new_not() -> Self {
        Builder {
            kind: BuilderKind::Not(None),
        }
    }

    /// Append a child. For `And`/`Or` this always succeeds; for `Not` a
    /// second call fails with [`TreeError::NotChildAlreadySet`].
    pub fn add_child(&mut self, child: NodeId<RowMatchNode>) -> Result<(), TreeError> {
        match &mut self.kind {
            BuilderKind::And(children) | BuilderKind::Or(children) => {
                children.push(child);
                Ok(())
            }
            BuilderKind::Not(slot) => {
                if slot.is_some() {
                    return Err(TreeError::NotChildAlreadySet);
                }
                *slot = Some(child);
                Ok(())
            }
        }
    }

    /// Finish the node. `And`/`Or` require at least two children
    /// ([`TreeError::InsufficientRowChildren`] otherwise); `Not` requires
    /// exactly one (also `InsufficientRowChildren`-free since
    /// [`Builder::add_child`] already enforces the single slot — a `Not`
    /// with no child set is simply never completed by callers, who build
    /// the child first).
    pub fn complete(
        self,
        arena: &mut Arena<RowMatchNode>,
    ) -> Result<NodeId<RowMatchNode>, crate::error::Error> {
        match self.kind {
            BuilderKind::And(children) => {
                if children.len() < 2 {
                    return Err(
                        TreeError::InsufficientRowChildren(RowConnectiveKind::And, children.len())
                            .into(),
                    );
                }
                Ok(arena.alloc(RowMatchNode::And(children))?)
            }
            BuilderKind::Or(children) => {
                if children.len() < 2 {
                    return Err(
                        TreeError::InsufficientRowChildren(RowConnectiveKind::Or, children.len())
                            .into(),
                    );
                }
                Ok(arena.alloc(RowMatchNode::Or(children))?)
            }
            BuilderKind::Not(Some(child)) => Ok(arena.alloc(RowMatchNode::Not(child))?),
            BuilderKind::Not(None) => {
                Err(TreeError::InsufficientRowChildren(RowConnectiveKind::And, 0).into())
            }
        }
    }
}

/// Construct a `Row` leaf.
pub fn row(
    arena: &mut Arena<RowMatchNode>,
    abstract_row: AbstractRow,
) -> Result<NodeId<RowMatchNode>, crate::error::Error> {
    Ok(arena.alloc(RowMatchNode::Row(abstract_row))?)
}

/// Construct a `Report` node wrapping `child`.
pub fn report(
    arena: &mut Arena<RowMatchNode>,
    child: Option<NodeId<RowMatchNode>>,
) -> Result<NodeId<RowMatchNode>, crate::error::Error> {
    Ok(arena.alloc(RowMatchNode::Report(child))?)
}

/// Render `id` in the textual format documented in `SPEC_FULL.md` §6,
/// matching the original engine's `RowMatchNode::Format` byte for byte.
pub fn format_row_tree(arena: &Arena<RowMatchNode>, id: NodeId<RowMatchNode>) -> String {
    match arena.get(id) {
        RowMatchNode::And(children) => format!(
            "And {{ Children: [{}] }}",
            format_child_list(arena, children)
        ),
        RowMatchNode::Or(children) => format!(
            "Or {{ Children: [{}] }}",
            format_child_list(arena, children)
        ),
        RowMatchNode::Not(child) => {
            format!("Not {{ Child: {} }}", format_row_tree(arena, *child))
        }
        RowMatchNode::Report(Some(child)) => {
            format!("Report {{ Child: {} }}", format_row_tree(arena, *child))
        }
        RowMatchNode::Report(None) => "Report { Child:  }".to_string(),
        RowMatchNode::Row(abstract_row) => abstract_row.to_string(),
    }
}

fn format_child_list(arena: &Arena<RowMatchNode>, children: &[NodeId<RowMatchNode>]) -> String {
    if children.is_empty() {
        return String::new();
    }
    let rendered = children
        .iter()
        .map(|&c| format_row_tree(arena, c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(" {rendered} ")
}

/// Structural equality between two (possibly different) arenas' trees.
pub fn row_trees_equal(
    arena_a: &Arena<RowMatchNode>,
    a: NodeId<RowMatchNode>,
    arena_b: &Arena<RowMatchNode>,
    b: NodeId<RowMatchNode>,
) -> bool {
    match (arena_a.get(a), arena_b.get(b)) {
        (RowMatchNode::And(xs), RowMatchNode::And(ys))
        | (RowMatchNode::Or(xs), RowMatchNode::Or(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys.iter())
                    .all(|(&x, &y)| row_trees_equal(arena_a, x, arena_b, y))
        }
        (RowMatchNode::Not(x), RowMatchNode::Not(y)) => row_trees_equal(arena_a, *x, arena_b, *y),
        (RowMatchNode::Report(x), RowMatchNode::Report(y)) => match (x, y) {
            (Some(x), Some(y)) => row_trees_equal(arena_a, *x, arena_b, *y),
            (None, None) => true,
            _ => false,
        },
        (RowMatchNode::Row(x), RowMatchNode::Row(y)) => x == y,
        _ => false,
    }
}
