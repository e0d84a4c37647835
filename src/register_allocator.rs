//! # Register Allocator
//!
//! Assigns a bounded number of interpreter registers to the rows a compiled
//! plan references most, so the interpreter can pre-load hot rows once per
//! shard instead of re-walking the tree for every document. Grounded in
//! `original_source/src/Plan/src/RegisterAllocator.h`'s `CollectRows`
//! traversal and `Entry` ordering (`uses` descending, `depth` ascending as a
//! tie-break among equally-hot rows, `id` ascending as a final tie-break).
//!
//! A row's `uses` weight doubles with every rank dropped under an enclosing
//! [`CompileNode::RankDown`]: a rank-0 row nested two ranks below a rank-2
//! entry point is revisited up to `2^2` times per rank-2 bit, so it is hot
//! in proportion to that multiplier, not just its raw reference count.

use crate::arena::Arena;
use crate::compile_node::CompileNode;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct Entry {
    depth: usize,
    uses: u64,
}

/// The result of allocating registers over a compiled plan.
#[derive(Debug, Clone)]
pub struct RegisterAllocator {
    register_of: HashMap<u32, u32>,
    register_base: u32,
}

impl RegisterAllocator {
    /// Walk `root` and assign up to `register_count` registers, starting at
    /// `register_base`, to the abstract rows it references most.
    pub fn allocate(
        compile_arena: &Arena<CompileNode>,
        root: crate::arena::NodeId<CompileNode>,
        register_base: u32,
        register_count: u32,
    ) -> Self {
        let span = tracing::info_span!("allocate_registers", register_base, register_count);
        let _guard = span.enter();

        let mut collected: HashMap<u32, Entry> = HashMap::new();
        collect_rows(compile_arena, root, 0, 1, &mut collected);

        let mut entries: Vec<(u32, Entry)> = collected.into_iter().collect();
        entries.sort_by(|(id_a, a), (id_b, b)| {
            b.uses
                .cmp(&a.uses)
                .then(a.depth.cmp(&b.depth))
                .then(id_a.cmp(id_b))
        });

        if entries.len() > register_count as usize {
            tracing::debug!(
                rows_seen = entries.len(),
                register_count,
                rows_memory_resident = entries.len() - register_count as usize,
                "register_budget_exceeded"
            );
        }

        let mut register_of = HashMap::new();
        for (register, (row_id, _)) in entries.into_iter().take(register_count as usize).enumerate() {
            register_of.insert(row_id, register_base + register as u32);
        }

        RegisterAllocator {
            register_of,
            register_base,
        }
    }

    /// Whether `row_id` (a [`crate::row::AbstractRow::id`]) was assigned a
    /// register.
    pub fn is_register(&self, row_id: u32) -> bool {
        self.register_of.contains_key(&row_id)
    }

    /// The register assigned to `row_id`, if any.
    pub fn register_of(&self, row_id: u32) -> Option<u32> {
        self.register_of.get(&row_id).copied()
    }

    /// How many registers were actually assigned.
    pub fn registers_allocated(&self) -> u32 {
        u32::try_from(self.register_of.len()).expect("register count fits in u32")
    }

    /// The first register index this allocator was configured to use.
    pub fn register_base(&self) -> u32 {
        self.register_base
    }
}

fn collect_rows(
    arena: &Arena<CompileNode>,
    node: crate::arena::NodeId<CompileNode>,
    depth: usize,
    uses_scale: u64,
    collected: &mut HashMap<u32, Entry>,
) {
    let mut record = |id: u32, depth: usize, uses: u64, collected: &mut HashMap<u32, Entry>| {
        let entry = collected.entry(id).or_insert(Entry { depth, uses: 0 });
        entry.depth = entry.depth.min(depth);
        entry.uses += uses;
    };

    match arena.get(node) {
        CompileNode::Report { child } => {
            if let Some(c) = child {
                collect_rows(arena, *c, depth, uses_scale, collected);
            }
        }
        CompileNode::LoadRowJz { row, child } | CompileNode::AndRowJz { row, child } => {
            record(row.id, depth, uses_scale, collected);
            if let Some(c) = child {
                collect_rows(arena, *c, depth + 1, uses_scale, collected);
            }
        }
        CompileNode::Or { left, right } | CompileNode::AndTree { left, right } | CompileNode::OrTree { left, right } => {
            collect_rows(arena, *left, depth + 1, uses_scale, collected);
            collect_rows(arena, *right, depth + 1, uses_scale, collected);
        }
        CompileNode::RankDown { delta, child } => {
            let scale = uses_scale.saturating_mul(1u64 << (*delta).min(63));
            collect_rows(arena, *child, depth + 1, scale, collected);
        }
        CompileNode::LoadRow { row } => {
            record(row.id, depth, uses_scale, collected);
        }
        CompileNode::Not { child } => {
            collect_rows(arena, *child, depth + 1, uses_scale, collected);
        }
    }
}
