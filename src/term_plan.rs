//! # Term Plan Converter
//!
//! Resolves a [`TermMatchNode`] tree into a [`RowMatchNode`] tree by looking
//! every term up in a [`TermTable`] and interning the physical rows it finds
//! into a [`PlanRows`] table. Grounded in
//! `original_source/inc/BitFunnel/Plan/TermPlanConverter.h`'s
//! `BuildRowPlan` static method.
//!
//! Unigrams and phrases always resolve — a term with no explicit rows falls
//! back to the term table's adhoc row rather than failing the plan, per
//! `TermPlanConverterTest.cpp`'s `Unigram` case, which expects a soft
//! fallback row standing in for the missing term. Facts have no such
//! fallback: a fact handle with no row is
//! [`PlanError::TermNotFound`](crate::error::PlanError::TermNotFound),
//! since there's no conservative default for "does this document have this
//! fact" the way there is for "might this document contain this term".
//!
//! The adhoc row does double duty, and the two uses are kept separate here:
//! a term-miss falls back to it locally, at the leaf that failed to
//! resolve, while the table's global match-all row — soft-delete exclusion
//! — is ANDed in exactly once, as the last AND-child of the whole plan's
//! root, regardless of the term tree's shape. ANDing it per-leaf instead
//! (as earlier versions of this module did) is wrong for a `NOT`-rooted
//! query: `Report(Not(rowA))` would leave a soft-deleted document (adhoc
//! bit 0) matching through the negation.

use crate::arena::{Arena, NodeId};
use crate::error::{Error, PlanError};
use crate::hash::{self, Hash};
use crate::row::AbstractRow;
use crate::row_tree::{self, RowConnectiveKind, RowMatchNode};
use crate::term_table::{PlanRows, TermTable};
use crate::term_tree::TermMatchNode;

/// Resolve a term match tree into a row plan.
///
/// `term_root` is `None` when the term tree itself collapsed to nothing
/// (e.g. an empty top-level `And`); the resulting plan is `Report { Child:
/// }`, matching nothing.
///
/// `row_limit` bounds the number of distinct physical rows the plan may
/// intern (see [`crate::config::PlannerConfig::target_row_count`]); `None`
/// disables the check.
pub fn build_row_plan<T: TermTable>(
    term_arena: &Arena<TermMatchNode>,
    term_root: Option<NodeId<TermMatchNode>>,
    term_table: &T,
    row_arena: &mut Arena<RowMatchNode>,
    plan_rows: &mut PlanRows,
    row_limit: Option<u32>,
) -> Result<NodeId<RowMatchNode>, Error> {
    let _guard = tracing::info_span!("resolve_rows", row_limit = ?row_limit).entered();

    let child = match term_root {
        Some(id) => {
            let converted = convert(term_arena, id, term_table, row_arena, plan_rows, row_limit)?;
            Some(and_with_match_all(converted, term_table, row_arena, plan_rows, row_limit)?)
        }
        None => None,
    };
    Ok(row_tree::report(row_arena, child)?)
}

/// AND the table's match-all row into the plan's root, flattening into an
/// existing top-level `And` rather than nesting a redundant wrapper around
/// it. Never called on an empty plan (`term_root == None`): a query with no
/// terms at all matches nothing, and ANDing in match-all would turn that
/// into "every live document," which is not what an empty query means.
fn and_with_match_all<T: TermTable>(
    root: NodeId<RowMatchNode>,
    term_table: &T,
    row_arena: &mut Arena<RowMatchNode>,
    plan_rows: &mut PlanRows,
    row_limit: Option<u32>,
) -> Result<NodeId<RowMatchNode>, Error> {
    let match_all = intern_leaf(term_table.adhoc_row(), row_arena, plan_rows, row_limit)?;
    let mut builder = row_tree::Builder::new_connective(RowConnectiveKind::And);
    match row_arena.get(root).clone() {
        RowMatchNode::And(children) => {
            for child in children {
                builder.add_child(child).expect("And builder accepts any number of children");
            }
        }
        _ => {
            builder.add_child(root).expect("And builder accepts any number of children");
        }
    }
    builder.add_child(match_all).expect("And builder accepts any number of children");
    Ok(builder.complete(row_arena)?)
}

fn convert<T: TermTable>(
    term_arena: &Arena<TermMatchNode>,
    id: NodeId<TermMatchNode>,
    term_table: &T,
    row_arena: &mut Arena<RowMatchNode>,
    plan_rows: &mut PlanRows,
    row_limit: Option<u32>,
) -> Result<NodeId<RowMatchNode>, Error> {
    match term_arena.get(id) {
        TermMatchNode::And(children) => {
            convert_connective(term_arena, children, term_table, row_arena, plan_rows, row_limit, RowConnectiveKind::And)
        }
        TermMatchNode::Or(children) => {
            convert_connective(term_arena, children, term_table, row_arena, plan_rows, row_limit, RowConnectiveKind::Or)
        }
        TermMatchNode::Not(child) => {
            let converted = convert(term_arena, *child, term_table, row_arena, plan_rows, row_limit)?;
            let mut builder = row_tree::Builder::new_not();
            builder.add_child(converted).expect("fresh Not builder accepts one child");
            Ok(builder.complete(row_arena)?)
        }
        TermMatchNode::Unigram { text, stream } => {
            let h = hash::hash_unigram(text);
            let _ = stream;
            and_term_rows(term_table.rows_for_hash(h), term_table, row_arena, plan_rows, row_limit)
        }
        TermMatchNode::Phrase { grams, stream } => {
            let _ = stream;
            let gram_refs: Vec<&str> = grams.iter().map(String::as_str).collect();
            let subphrase_hashes = hash::subphrase_hashes(&gram_refs);
            convert_phrase(&subphrase_hashes, term_table, row_arena, plan_rows, row_limit)
        }
        TermMatchNode::Fact(handle) => {
            let h = hash::hash_fact(*handle);
            let rows = term_table
                .rows_for_hash(h)
                .ok_or(PlanError::TermNotFound { hash: h })?;
            and_rows(rows, row_arena, plan_rows, row_limit)
        }
    }
}

fn convert_connective<T: TermTable>(
    term_arena: &Arena<TermMatchNode>,
    children: &[NodeId<TermMatchNode>],
    term_table: &T,
    row_arena: &mut Arena<RowMatchNode>,
    plan_rows: &mut PlanRows,
    row_limit: Option<u32>,
    kind: RowConnectiveKind,
) -> Result<NodeId<RowMatchNode>, Error> {
    let mut builder = row_tree::Builder::new_connective(kind);
    for &child in children {
        let converted = convert(term_arena, child, term_table, row_arena, plan_rows, row_limit)?;
        builder
            .add_child(converted)
            .expect("And/Or builder accepts any number of children");
    }
    Ok(builder.complete(row_arena)?)
}

/// AND together every subphrase prefix's resolved rows (each subphrase falls
/// back to the adhoc row independently, same as a unigram).
fn convert_phrase<T: TermTable>(
    subphrase_hashes: &[Hash],
    term_table: &T,
    row_arena: &mut Arena<RowMatchNode>,
    plan_rows: &mut PlanRows,
    row_limit: Option<u32>,
) -> Result<NodeId<RowMatchNode>, Error> {
    let mut builder = row_tree::Builder::new_connective(RowConnectiveKind::And);
    let mut leaves: Vec<NodeId<RowMatchNode>> = Vec::with_capacity(subphrase_hashes.len());
    for &h in subphrase_hashes {
        leaves.push(and_term_rows(
            term_table.rows_for_hash(h),
            term_table,
            row_arena,
            plan_rows,
            row_limit,
        )?);
    }
    if leaves.len() == 1 {
        return Ok(leaves[0]);
    }
    for leaf in leaves {
        builder.add_child(leaf).expect("And builder accepts any number of children");
    }
    Ok(builder.complete(row_arena)?)
}

/// Resolve a term's explicit rows, falling back to the table's adhoc row
/// alone when the term is unresolved. Never fails.
fn and_term_rows<T: TermTable>(
    explicit: Option<&[crate::row::RowId]>,
    term_table: &T,
    row_arena: &mut Arena<RowMatchNode>,
    plan_rows: &mut PlanRows,
    row_limit: Option<u32>,
) -> Result<NodeId<RowMatchNode>, Error> {
    match explicit {
        None => intern_leaf(term_table.adhoc_row(), row_arena, plan_rows, row_limit),
        Some(rows) => and_rows(rows, row_arena, plan_rows, row_limit),
    }
}

fn and_rows(
    rows: &[crate::row::RowId],
    row_arena: &mut Arena<RowMatchNode>,
    plan_rows: &mut PlanRows,
    row_limit: Option<u32>,
) -> Result<NodeId<RowMatchNode>, Error> {
    if rows.len() == 1 {
        return intern_leaf(rows[0], row_arena, plan_rows, row_limit);
    }
    let mut builder = row_tree::Builder::new_connective(RowConnectiveKind::And);
    for &r in rows {
        builder
            .add_child(intern_leaf(r, row_arena, plan_rows, row_limit)?)
            .expect("And builder accepts any number of children");
    }
    Ok(builder.complete(row_arena)?)
}

fn intern_leaf(
    row_id: crate::row::RowId,
    row_arena: &mut Arena<RowMatchNode>,
    plan_rows: &mut PlanRows,
    row_limit: Option<u32>,
) -> Result<NodeId<RowMatchNode>, Error> {
    let abstract_id = plan_rows.intern(row_id);
    if let Some(limit) = row_limit {
        if plan_rows.row_count() > limit {
            return Err(PlanError::RowCountExceeded {
                limit,
                actual: plan_rows.row_count(),
            }
            .into());
        }
    }
    let abstract_row = AbstractRow::new(abstract_id, row_id.rank, false);
    Ok(row_tree::row(row_arena, abstract_row)?)
}
