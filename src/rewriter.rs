//! # Match Tree Rewriter
//!
//! Normalises a [`RowMatchNode`] tree into the shape
//! [`crate::compiler::RankDownCompiler`] expects: a top-level AND of rows in
//! descending rank order, followed by OR-expanded subtrees, a rank-0
//! residue, and a bucket of anything the rewrite gave up on (NOT subtrees,
//! and whatever was left once the row budget was spent).
//!
//! Grounded in `original_source/src/Plan/src/MatchTreeRewriter.h`'s
//! `Partition`/`BuildCompileTree` design; the header's `m_rows[rank]`
//! buckets, `m_orTree`/`m_rank0Tree`/`m_otherTree`, and out-of-order
//! detection via `m_parentRank`/`m_minRank` all have direct counterparts
//! below. The original's binary `Or`/`And` nodes are generalised to the
//! n-ary [`RowMatchNode::Or`]/[`RowMatchNode::And`] this rewrite already
//! uses (see the arena design note in `SPEC_FULL.md` §9), so cross-product
//! expansion produces one n-ary `Or` of AND-terms rather than nested binary
//! `Or`s.

use crate::arena::{Arena, NodeId};
use crate::row::{AbstractRow, Rank, MAX_RANK};
use crate::row_tree::{self, RowConnectiveKind, RowMatchNode};
use crate::term_table::PlanRows;

/// Tuning knobs for [`rewrite`]. See
/// [`crate::config::PlannerConfig`](crate::config::PlannerConfig) for the
/// query-facing configuration these are drawn from.
#[derive(Debug, Clone, Copy)]
pub struct RewriteConfig {
    /// Stop recursing into a subtree once every path from its root
    /// references at least this many distinct rows.
    pub target_row_count: u32,
    /// Soft cap on the number of terms an OR cross-product expansion may
    /// generate before subsequent OR children are left unexpanded.
    pub target_cross_product_term_count: u32,
}

/// Rewrite `root` in place (new nodes are allocated into `arena`; existing
/// nodes are shared, never mutated), returning the rewritten root.
///
/// `plan_rows` mints fresh plan-local ids for rows rank-upped out of a
/// `NOT` subtree (see [`PlanRows::intern_shadow`]).
pub fn rewrite(
    arena: &mut Arena<RowMatchNode>,
    root: NodeId<RowMatchNode>,
    plan_rows: &mut PlanRows,
    config: &RewriteConfig,
) -> NodeId<RowMatchNode> {
    let span = tracing::info_span!(
        "rewrite",
        target_row_count = config.target_row_count,
        target_cross_product_term_count = config.target_cross_product_term_count,
    );
    let _guard = span.enter();

    match arena.get(root).clone() {
        RowMatchNode::Report(Some(child)) => {
            let rewritten = rewrite_and(arena, child, MAX_RANK, &mut 0, plan_rows, config);
            row_tree::report(arena, Some(rewritten)).expect("report alloc never fails with an unbounded arena")
        }
        RowMatchNode::Report(None) => root,
        _ => rewrite_and(arena, root, MAX_RANK, &mut 0, plan_rows, config),
    }
}

/// Rewrites `node` as though it were the top of an AND-expression, honoring
/// `parent_rank` for out-of-order detection and `placed` as the running
/// count of rows already committed toward `target_row_count` on this path.
fn rewrite_and(
    arena: &mut Arena<RowMatchNode>,
    node: NodeId<RowMatchNode>,
    parent_rank: Rank,
    placed: &mut u32,
    plan_rows: &mut PlanRows,
    config: &RewriteConfig,
) -> NodeId<RowMatchNode> {
    let mut children = Vec::new();
    flatten_and(arena, node, &mut children);

    let mut rank_tree: Vec<Vec<NodeId<RowMatchNode>>> = vec![Vec::new(); (MAX_RANK as usize) + 1];
    let mut or_children: Vec<NodeId<RowMatchNode>> = Vec::new();
    let mut other_tree: Vec<NodeId<RowMatchNode>> = Vec::new();
    let mut budget_spent = false;

    for child in children {
        if budget_spent {
            other_tree.push(child);
            continue;
        }
        match arena.get(child).clone() {
            RowMatchNode::Row(abstract_row) => {
                if abstract_row.rank > parent_rank {
                    tracing::debug!(
                        row_id = abstract_row.id,
                        row_rank = abstract_row.rank,
                        parent_rank,
                        "row_out_of_order"
                    );
                    other_tree.push(child);
                } else {
                    rank_tree[abstract_row.rank as usize].push(child);
                    *placed += 1;
                }
            }
            RowMatchNode::Or(_) => or_children.push(child),
            RowMatchNode::Not(inner) => {
                let ranked_up = rank_up_to_zero(arena, inner, plan_rows, config);
                let mut builder = row_tree::Builder::new_not();
                builder.add_child(ranked_up).expect("fresh Not builder accepts one child");
                other_tree.push(builder.complete(arena).expect("alloc never fails with an unbounded arena"));
            }
            _ => other_tree.push(child),
        }
        if *placed >= config.target_row_count {
            budget_spent = true;
        }
    }

    let min_rank = (1..=MAX_RANK).find(|&r| !rank_tree[r as usize].is_empty()).unwrap_or(parent_rank);

    let or_tree = if or_children.is_empty() {
        None
    } else {
        Some(build_or_tree(arena, or_children, min_rank, plan_rows, config))
    };

    assemble(arena, rank_tree, or_tree, other_tree)
}

/// Cross-multiplies successive OR children under the soft
/// `target_cross_product_term_count` budget, recursively rewriting every
/// branch and every product term at `parent_rank`.
fn build_or_tree(
    arena: &mut Arena<RowMatchNode>,
    or_children: Vec<NodeId<RowMatchNode>>,
    parent_rank: Rank,
    plan_rows: &mut PlanRows,
    config: &RewriteConfig,
) -> NodeId<RowMatchNode> {
    let mut iter = or_children.into_iter();
    let first = iter.next().expect("build_or_tree called with no OR children");
    let mut terms: Vec<NodeId<RowMatchNode>> = branches_of(arena, first)
        .into_iter()
        .map(|b| {
            let mut placed = 0;
            rewrite_and(arena, b, parent_rank, &mut placed, plan_rows, config)
        })
        .collect();

    let mut exhausted = terms.len() as u32 > config.target_cross_product_term_count;
    if exhausted {
        tracing::debug!(
            term_count = terms.len(),
            target_cross_product_term_count = config.target_cross_product_term_count,
            "cross_product_budget_exceeded"
        );
    }
    let mut leftover: Vec<NodeId<RowMatchNode>> = Vec::new();

    for or_node in iter {
        if exhausted {
            let mut placed = 0;
            leftover.push(rewrite_and(arena, or_node, parent_rank, &mut placed, plan_rows, config));
            continue;
        }
        let branches = branches_of(arena, or_node);
        let mut crossed = Vec::with_capacity(terms.len() * branches.len());
        for &t in &terms {
            for &b in &branches {
                let and_pair = make_and(arena, t, b);
                let mut placed = 0;
                crossed.push(rewrite_and(arena, and_pair, parent_rank, &mut placed, plan_rows, config));
            }
        }
        exhausted = crossed.len() as u32 > config.target_cross_product_term_count;
        if exhausted {
            tracing::debug!(
                term_count = crossed.len(),
                target_cross_product_term_count = config.target_cross_product_term_count,
                "cross_product_budget_exceeded"
            );
        }
        terms = crossed;
    }

    let or_node = build_n_ary(arena, terms, RowConnectiveKind::Or)
        .expect("cross product always produces at least two terms");

    if leftover.is_empty() {
        or_node
    } else {
        let mut all = vec![or_node];
        all.extend(leftover);
        build_n_ary(arena, all, RowConnectiveKind::And).expect("at least the or_node is present")
    }
}

fn branches_of(arena: &Arena<RowMatchNode>, or_node: NodeId<RowMatchNode>) -> Vec<NodeId<RowMatchNode>> {
    match arena.get(or_node) {
        RowMatchNode::Or(children) => children.clone(),
        _ => unreachable!("branches_of called on a non-Or node"),
    }
}

fn make_and(arena: &mut Arena<RowMatchNode>, a: NodeId<RowMatchNode>, b: NodeId<RowMatchNode>) -> NodeId<RowMatchNode> {
    let mut builder = row_tree::Builder::new_connective(RowConnectiveKind::And);
    builder.add_child(a).expect("And builder accepts any number of children");
    builder.add_child(b).expect("And builder accepts any number of children");
    builder.complete(arena).expect("alloc never fails with an unbounded arena")
}

fn build_n_ary(
    arena: &mut Arena<RowMatchNode>,
    mut children: Vec<NodeId<RowMatchNode>>,
    kind: RowConnectiveKind,
) -> Option<NodeId<RowMatchNode>> {
    match children.len() {
        0 => None,
        1 => Some(children.remove(0)),
        _ => {
            let mut builder = row_tree::Builder::new_connective(kind);
            for c in children {
                builder.add_child(c).expect("builder accepts any number of children");
            }
            Some(builder.complete(arena).expect("alloc never fails with an unbounded arena"))
        }
    }
}

/// Raises every row inside a `NOT` subtree to rank 0, since the compiler
/// only evaluates `NOT` subtrees at rank 0 (see `SPEC_FULL.md` §4.5's
/// "rank-up" note). The physical row is unchanged; a fresh plan-local id
/// marks this as a distinct rank-0 usage of it.
fn rank_up_to_zero(
    arena: &mut Arena<RowMatchNode>,
    node: NodeId<RowMatchNode>,
    plan_rows: &mut PlanRows,
    config: &RewriteConfig,
) -> NodeId<RowMatchNode> {
    match arena.get(node).clone() {
        RowMatchNode::Row(abstract_row) => {
            if abstract_row.rank == 0 {
                node
            } else {
                let physical = plan_rows.resolve(abstract_row.id);
                let shadow_id = plan_rows.intern_shadow(physical);
                let ranked = abstract_row.rank_up_to_zero(shadow_id);
                row_tree::row(arena, ranked).expect("alloc never fails with an unbounded arena")
            }
        }
        RowMatchNode::And(children) => {
            let raised: Vec<_> = children
                .iter()
                .map(|&c| rank_up_to_zero(arena, c, plan_rows, config))
                .collect();
            build_n_ary(arena, raised, RowConnectiveKind::And).expect("non-empty And stays non-empty")
        }
        RowMatchNode::Or(children) => {
            let raised: Vec<_> = children
                .iter()
                .map(|&c| rank_up_to_zero(arena, c, plan_rows, config))
                .collect();
            build_n_ary(arena, raised, RowConnectiveKind::Or).expect("non-empty Or stays non-empty")
        }
        RowMatchNode::Not(inner) => {
            let raised = rank_up_to_zero(arena, inner, plan_rows, config);
            let mut builder = row_tree::Builder::new_not();
            builder.add_child(raised).expect("fresh Not builder accepts one child");
            builder.complete(arena).expect("alloc never fails with an unbounded arena")
        }
        RowMatchNode::Report(_) => node,
    }
}

fn flatten_and(arena: &Arena<RowMatchNode>, node: NodeId<RowMatchNode>, out: &mut Vec<NodeId<RowMatchNode>>) {
    match arena.get(node) {
        RowMatchNode::And(children) => {
            for &c in children.clone().iter() {
                flatten_and(arena, c, out);
            }
        }
        _ => out.push(node),
    }
}

fn assemble(
    arena: &mut Arena<RowMatchNode>,
    rank_tree: Vec<Vec<NodeId<RowMatchNode>>>,
    or_tree: Option<NodeId<RowMatchNode>>,
    other_tree: Vec<NodeId<RowMatchNode>>,
) -> NodeId<RowMatchNode> {
    let mut ordered: Vec<NodeId<RowMatchNode>> = Vec::new();
    for r in (1..=MAX_RANK).rev() {
        ordered.extend(rank_tree[r as usize].iter().copied());
    }
    if let Some(or_node) = or_tree {
        ordered.push(or_node);
    }
    ordered.extend(rank_tree[0].iter().copied());
    ordered.extend(other_tree);

    build_n_ary(arena, ordered, RowConnectiveKind::And)
        .unwrap_or_else(|| row_tree::row(arena, AbstractRow::new(0, 0, false)).expect("fallback alloc"))
}
