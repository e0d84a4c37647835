//! # Rank-Down Compiler
//!
//! Lowers a rewritten [`RowMatchNode`] tree into a [`CompileNode`] tree in a
//! single left-to-right pass, per `SPEC_FULL.md` §4.6. Grounded in
//! `original_source/src/Plan/src/CompileNodes.h`'s two-layer node set.
//!
//! The rewritten tree's top-level AND list (see [`crate::rewriter`]) is
//! already ordered: descending-rank rows, then an optional OR subtree, then
//! rank-0 rows, then whatever `NOT` subtrees and leftovers the rewrite
//! didn't reduce further. This compiler walks that list, emitting a
//! [`CompileNode::LoadRowJz`]/[`CompileNode::AndRowJz`] chain for every
//! leading bare row — rank 0 included, since a flat AND of all-rank-0 rows
//! is the common case and still belongs in the short-circuit chain rather
//! than the rank-zero tree — then a single [`CompileNode::RankDown`] at the
//! point the leading-rows prefix ends and the first `OR`/`NOT` subtree (or
//! other leftover) begins, under which everything remaining is compiled as
//! a plain rank-zero boolean tree
//! ([`CompileNode::AndTree`]/[`CompileNode::OrTree`]/[`CompileNode::LoadRow`]/
//! [`CompileNode::Not`]).

use crate::arena::{Arena, NodeId};
use crate::compile_node::CompileNode;
use crate::row::Rank;
use crate::row_tree::RowMatchNode;

/// Compile a rewritten row plan into a [`CompileNode`] tree.
pub fn compile(
    row_arena: &Arena<RowMatchNode>,
    root: NodeId<RowMatchNode>,
    compile_arena: &mut Arena<CompileNode>,
) -> NodeId<CompileNode> {
    let _guard = tracing::info_span!("compile").entered();
    let child = match row_arena.get(root) {
        RowMatchNode::Report(Some(inner)) => Some(compile_expr(row_arena, *inner, compile_arena)),
        RowMatchNode::Report(None) => None,
        _ => Some(compile_expr(row_arena, root, compile_arena)),
    };
    compile_arena.alloc(CompileNode::Report { child }).expect("alloc never fails with an unbounded arena")
}

fn compile_expr(
    row_arena: &Arena<RowMatchNode>,
    node: NodeId<RowMatchNode>,
    compile_arena: &mut Arena<CompileNode>,
) -> NodeId<CompileNode> {
    let mut items = Vec::new();
    flatten_and(row_arena, node, &mut items);

    let split = items
        .iter()
        .position(|&n| !is_row(row_arena, n))
        .unwrap_or(items.len());
    let (prefix, suffix) = items.split_at(split);

    let suffix_node = if suffix.is_empty() {
        None
    } else {
        let rank_zero = compile_rank_zero_and(row_arena, suffix, compile_arena);
        match prefix.last() {
            // The prefix already descended to some rank above zero; drop
            // the rest of the way in one RankDown.
            Some(&last) => {
                let last_rank = row_rank(row_arena, last);
                Some(
                    compile_arena
                        .alloc(CompileNode::RankDown {
                            delta: last_rank,
                            child: rank_zero,
                        })
                        .expect("alloc never fails with an unbounded arena"),
                )
            }
            // No row prefix at all: the first item is itself an OR/NOT
            // subtree (or other leftover), so there's no rank to descend
            // from. Wrapping this in a RankDown would fabricate a drop from
            // MAX_RANK that was never actually present in the plan.
            None => Some(rank_zero),
        }
    };

    build_rank_down_chain(row_arena, prefix, suffix_node, compile_arena)
        .or(suffix_node)
        .expect("compile_expr called on an empty expression")
}

fn build_rank_down_chain(
    row_arena: &Arena<RowMatchNode>,
    prefix: &[NodeId<RowMatchNode>],
    tail: Option<NodeId<CompileNode>>,
    compile_arena: &mut Arena<CompileNode>,
) -> Option<NodeId<CompileNode>> {
    let mut child = tail;
    for (i, &row_node) in prefix.iter().enumerate().rev() {
        let row = row_of(row_arena, row_node);
        let node = if i == 0 {
            CompileNode::LoadRowJz { row, child }
        } else {
            CompileNode::AndRowJz { row, child }
        };
        child = Some(compile_arena.alloc(node).expect("alloc never fails with an unbounded arena"));
    }
    child
}

fn compile_rank_zero_and(
    row_arena: &Arena<RowMatchNode>,
    items: &[NodeId<RowMatchNode>],
    compile_arena: &mut Arena<CompileNode>,
) -> NodeId<CompileNode> {
    let mut iter = items.iter();
    let first = *iter.next().expect("compile_rank_zero_and called with no items");
    let mut acc = compile_rank_zero_node(row_arena, first, compile_arena);
    for &item in iter {
        let next = compile_rank_zero_node(row_arena, item, compile_arena);
        acc = compile_arena
            .alloc(CompileNode::AndTree { left: acc, right: next })
            .expect("alloc never fails with an unbounded arena");
    }
    acc
}

fn compile_rank_zero_node(
    row_arena: &Arena<RowMatchNode>,
    node: NodeId<RowMatchNode>,
    compile_arena: &mut Arena<CompileNode>,
) -> NodeId<CompileNode> {
    match row_arena.get(node).clone() {
        RowMatchNode::Row(row) => compile_arena
            .alloc(CompileNode::LoadRow { row })
            .expect("alloc never fails with an unbounded arena"),
        RowMatchNode::And(children) => fold_binary(row_arena, &children, compile_arena, true),
        RowMatchNode::Or(children) => fold_binary(row_arena, &children, compile_arena, false),
        RowMatchNode::Not(inner) => {
            let child = compile_rank_zero_node(row_arena, inner, compile_arena);
            compile_arena
                .alloc(CompileNode::Not { child })
                .expect("alloc never fails with an unbounded arena")
        }
        RowMatchNode::Report(_) => unreachable!("Report cannot appear nested inside a row plan"),
    }
}

fn fold_binary(
    row_arena: &Arena<RowMatchNode>,
    children: &[NodeId<RowMatchNode>],
    compile_arena: &mut Arena<CompileNode>,
    is_and: bool,
) -> NodeId<CompileNode> {
    let mut iter = children.iter();
    let mut acc = compile_rank_zero_node(row_arena, *iter.next().expect("connective has at least one child"), compile_arena);
    for &child in iter {
        let next = compile_rank_zero_node(row_arena, child, compile_arena);
        let node = if is_and {
            CompileNode::AndTree { left: acc, right: next }
        } else {
            CompileNode::OrTree { left: acc, right: next }
        };
        acc = compile_arena.alloc(node).expect("alloc never fails with an unbounded arena");
    }
    acc
}

fn flatten_and(row_arena: &Arena<RowMatchNode>, node: NodeId<RowMatchNode>, out: &mut Vec<NodeId<RowMatchNode>>) {
    match row_arena.get(node) {
        RowMatchNode::And(children) => {
            for &c in children.clone().iter() {
                flatten_and(row_arena, c, out);
            }
        }
        _ => out.push(node),
    }
}

/// Whether `node` is a bare row leaf — of any rank, including 0 — as
/// opposed to an `OR`/`NOT` subtree or other leftover the rewrite didn't
/// reduce. The rank-down chain covers every leading row regardless of rank;
/// only non-row items fall through to the rank-zero layer.
fn is_row(row_arena: &Arena<RowMatchNode>, node: NodeId<RowMatchNode>) -> bool {
    matches!(row_arena.get(node), RowMatchNode::Row(_))
}

fn row_rank(row_arena: &Arena<RowMatchNode>, node: NodeId<RowMatchNode>) -> Rank {
    match row_arena.get(node) {
        RowMatchNode::Row(r) => r.rank,
        _ => unreachable!("row_rank called on a non-Row node"),
    }
}

fn row_of(row_arena: &Arena<RowMatchNode>, node: NodeId<RowMatchNode>) -> crate::row::AbstractRow {
    match row_arena.get(node) {
        RowMatchNode::Row(r) => *r,
        _ => unreachable!("row_of called on a non-Row node"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::AbstractRow;
    use crate::row_tree;

    #[test]
    fn single_row_compiles_to_load_row_jz_under_report() {
        let mut row_arena = Arena::new();
        let row = row_tree::row(&mut row_arena, AbstractRow::new(0, 3, false)).unwrap();
        let plan = row_tree::report(&mut row_arena, Some(row)).unwrap();

        let mut compile_arena = Arena::new();
        let compiled = compile(&row_arena, plan, &mut compile_arena);

        match compile_arena.get(compiled) {
            CompileNode::Report { child: Some(inner) } => match compile_arena.get(*inner) {
                CompileNode::LoadRowJz { row, child: None } => assert_eq!(row.rank, 3),
                other => panic!("expected LoadRowJz, got {other:?}"),
            },
            other => panic!("expected Report, got {other:?}"),
        }
    }

    #[test]
    fn or_subtree_residue_is_wrapped_in_a_single_rank_down() {
        // A rank-4 row ANDed with an OR subtree: the row stays in the
        // rank-down chain, the OR subtree (not a bare row) falls through to
        // the rank-zero layer behind exactly one RankDown.
        let mut row_arena = Arena::new();
        let high = row_tree::row(&mut row_arena, AbstractRow::new(0, 4, false)).unwrap();
        let a = row_tree::row(&mut row_arena, AbstractRow::new(1, 0, false)).unwrap();
        let b = row_tree::row(&mut row_arena, AbstractRow::new(2, 0, false)).unwrap();
        let mut or_builder = row_tree::Builder::new_connective(row_tree::RowConnectiveKind::Or);
        or_builder.add_child(a).unwrap();
        or_builder.add_child(b).unwrap();
        let or_node = or_builder.complete(&mut row_arena).unwrap();
        let mut builder = row_tree::Builder::new_connective(row_tree::RowConnectiveKind::And);
        builder.add_child(high).unwrap();
        builder.add_child(or_node).unwrap();
        let and_node = builder.complete(&mut row_arena).unwrap();
        let plan = row_tree::report(&mut row_arena, Some(and_node)).unwrap();

        let mut compile_arena = Arena::new();
        let compiled = compile(&row_arena, plan, &mut compile_arena);

        match compile_arena.get(compiled) {
            CompileNode::Report { child: Some(inner) } => match compile_arena.get(*inner) {
                CompileNode::LoadRowJz { row, child: Some(next) } => {
                    assert_eq!(row.rank, 4);
                    match compile_arena.get(*next) {
                        CompileNode::RankDown { delta, child } => {
                            assert_eq!(*delta, 4);
                            assert!(matches!(compile_arena.get(*child), CompileNode::OrTree { .. }));
                        }
                        other => panic!("expected RankDown, got {other:?}"),
                    }
                }
                other => panic!("expected LoadRowJz, got {other:?}"),
            },
            other => panic!("expected Report, got {other:?}"),
        }
    }

    #[test]
    fn all_rank_zero_and_compiles_to_a_row_jz_chain_with_no_rank_down() {
        // The common case: a top-level AND of several rank-0 rows compiles
        // entirely through the short-circuit chain, with no RankDown at
        // all — there's no OR/NOT residue to descend into.
        let mut row_arena = Arena::new();
        let a = row_tree::row(&mut row_arena, AbstractRow::new(2, 0, false)).unwrap();
        let b = row_tree::row(&mut row_arena, AbstractRow::new(1, 0, false)).unwrap();
        let c = row_tree::row(&mut row_arena, AbstractRow::new(0, 0, false)).unwrap();
        let mut builder = row_tree::Builder::new_connective(row_tree::RowConnectiveKind::And);
        builder.add_child(a).unwrap();
        builder.add_child(b).unwrap();
        builder.add_child(c).unwrap();
        let and_node = builder.complete(&mut row_arena).unwrap();
        let plan = row_tree::report(&mut row_arena, Some(and_node)).unwrap();

        let mut compile_arena = Arena::new();
        let compiled = compile(&row_arena, plan, &mut compile_arena);

        match compile_arena.get(compiled) {
            CompileNode::Report { child: Some(inner) } => match compile_arena.get(*inner) {
                CompileNode::LoadRowJz { row: row0, child: Some(next1) } => {
                    assert_eq!(row0.id, 2);
                    match compile_arena.get(*next1) {
                        CompileNode::AndRowJz { row: row1, child: Some(next2) } => {
                            assert_eq!(row1.id, 1);
                            match compile_arena.get(*next2) {
                                CompileNode::AndRowJz { row: row2, child: None } => assert_eq!(row2.id, 0),
                                other => panic!("expected final AndRowJz with no child, got {other:?}"),
                            }
                        }
                        other => panic!("expected AndRowJz, got {other:?}"),
                    }
                }
                other => panic!("expected LoadRowJz, got {other:?}"),
            },
            other => panic!("expected Report, got {other:?}"),
        }
    }

    #[test]
    fn empty_plan_compiles_to_report_with_no_child() {
        let mut row_arena = Arena::new();
        let plan = row_tree::report(&mut row_arena, None).unwrap();
        let mut compile_arena = Arena::new();
        let compiled = compile(&row_arena, plan, &mut compile_arena);
        assert!(matches!(compile_arena.get(compiled), CompileNode::Report { child: None }));
    }
}
