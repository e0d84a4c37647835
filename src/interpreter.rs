//! # Interpreter
//!
//! Executes a sealed [`Program`] against one shard's row buffers, per
//! `SPEC_FULL.md` §4.9. Grounded in the original engine's per-shard
//! `QueryMachine` state (`slice_cursor`, `offset_cursor`, accumulator,
//! bounded stack, registers, program counter) — this rewrite drops the raw
//! register/pointer caching (there is no raw memory here, only the
//! [`Shard`] trait) and keeps the rest of the state machine as specified.
//!
//! `Jz`'s zero test reads the accumulator directly rather than a separate
//! flags register: every instruction that can precede a `Jz` either writes
//! the accumulator itself or is `UpdateFlags`, which exists in the emitted
//! stream purely as a marker and is a no-op here — the two are
//! observationally identical since nothing else can read a stale flag.

use crate::bytecode::{Instruction, Program};
use crate::error::CompileError;
use crate::row::{RowId, Rank};
use crate::term_table::PlanRows;

/// Read-only view of one shard's row buffers, the only thing the
/// interpreter depends on for document data. Shard construction (slice
/// layout, density, persistence) is out of scope for this crate; only the
/// read path the interpreter drives is specified here.
pub trait Shard {
    /// Number of slices in this shard.
    fn slice_count(&self) -> u32;

    /// Number of rank-0 documents a slice holds (a multiple of 64).
    fn slice_capacity(&self) -> u32;

    /// The 64-bit word for `row` at `slice_index`/`offset`, where `offset`
    /// is a rank-aligned quadword position (step `2^rank` quadwords at
    /// `row.rank`).
    fn row_word(&self, row: RowId, slice_index: u32, offset: u32) -> u64;
}

/// One match record: every set bit in `bits` is a matching document within
/// the `2^rank` block starting at this `(slice_index, offset)`, where
/// `rank` is implied by the report site (callers already know which rank a
/// program reports at).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRecord {
    /// The slice the match was found in.
    pub slice_index: u32,
    /// The rank-aligned quadword offset within the slice.
    pub offset: u32,
    /// The matching bits.
    pub bits: u64,
}

/// Append-only, bounded destination for [`MatchRecord`]s. Exclusive to one
/// query; a full buffer is fatal for the query rather than silently
/// dropping matches.
#[derive(Debug, Clone)]
pub struct ResultsBuffer {
    capacity: usize,
    records: Vec<MatchRecord>,
}

impl ResultsBuffer {
    /// Create an empty buffer bounded at `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        ResultsBuffer {
            capacity,
            records: Vec::with_capacity(capacity.min(1024)),
        }
    }

    /// Append a record, failing if the buffer is already full.
    pub fn push(&mut self, record: MatchRecord) -> Result<(), CompileError> {
        if self.records.len() >= self.capacity {
            return Err(CompileError::ResultsBufferFull { capacity: self.capacity });
        }
        self.records.push(record);
        Ok(())
    }

    /// The records appended so far, in `(slice_index, offset)` order.
    pub fn records(&self) -> &[MatchRecord] {
        &self.records
    }
}

/// Runs a [`Program`] across every slice of a [`Shard`], starting each
/// slice's sweep at `top_rank` (the rank of the outermost row the compiled
/// program expects — typically the highest rank present in the plan).
pub struct Interpreter<'a> {
    program: &'a Program,
    plan_rows: &'a PlanRows,
    stack_bound: usize,
}

impl<'a> Interpreter<'a> {
    /// Build an interpreter for `program`, resolving its `AbstractRow`s
    /// through `plan_rows`. `stack_bound` caps both the value stack and the
    /// call-return stack, per the program's statically computed depth.
    pub fn new(program: &'a Program, plan_rows: &'a PlanRows, stack_bound: usize) -> Self {
        Interpreter { program, plan_rows, stack_bound }
    }

    /// Execute the program over every slice of `shard` at `top_rank`,
    /// appending matches to `results`.
    pub fn run<S: Shard>(
        &self,
        shard: &S,
        top_rank: Rank,
        results: &mut ResultsBuffer,
    ) -> Result<(), CompileError> {
        let span = tracing::info_span!(
            "interpret_shard",
            slice_count = shard.slice_count(),
            top_rank,
        );
        let _guard = span.enter();

        let quadwords_per_slice = shard.slice_capacity() / 64;
        let positions = quadwords_per_slice >> top_rank;

        for slice_index in 0..shard.slice_count() {
            tracing::trace!(slice_index, positions, "interpreter_slice_started");
            for position in 0..positions {
                self.run_one(shard, slice_index, position, results)?;
            }
        }
        Ok(())
    }

    fn run_one<S: Shard>(
        &self,
        shard: &S,
        slice_index: u32,
        start_offset: u32,
        results: &mut ResultsBuffer,
    ) -> Result<(), CompileError> {
        // All-ones is the AND identity: `Report`'s `Push`/`AndStack` gate around
        // its child (see `CompileNode::Report`) must be a no-op the first time
        // it runs, before any row has been loaded.
        let mut accumulator: u64 = u64::MAX;
        let mut offset = start_offset;
        let mut value_stack: Vec<u64> = Vec::new();
        let mut call_stack: Vec<usize> = Vec::new();
        let mut pc = 0usize;
        let instructions = self.program.instructions();

        while pc < instructions.len() {
            match instructions[pc] {
                Instruction::LoadRow(row) => {
                    accumulator = self.load(shard, row, slice_index, offset);
                    pc += 1;
                }
                Instruction::AndRow(row) => {
                    accumulator &= self.load(shard, row, slice_index, offset);
                    pc += 1;
                }
                Instruction::Jz(target) => {
                    pc = if accumulator == 0 { target as usize } else { pc + 1 };
                }
                Instruction::Jmp(target) => {
                    pc = target as usize;
                }
                Instruction::Push => {
                    value_stack.push(accumulator);
                    self.check_bound(value_stack.len())?;
                    pc += 1;
                }
                Instruction::Pop => {
                    accumulator = value_stack.pop().expect("Pop with an empty value stack is a compiler bug");
                    pc += 1;
                }
                Instruction::AndStack => {
                    accumulator &= value_stack.pop().expect("AndStack with an empty value stack is a compiler bug");
                    pc += 1;
                }
                Instruction::OrStack => {
                    accumulator |= value_stack.pop().expect("OrStack with an empty value stack is a compiler bug");
                    pc += 1;
                }
                Instruction::Not => {
                    accumulator = !accumulator;
                    pc += 1;
                }
                Instruction::UpdateFlags => {
                    pc += 1;
                }
                Instruction::LeftShiftOffset(delta) => {
                    offset <<= delta;
                    pc += 1;
                }
                Instruction::RightShiftOffset(delta) => {
                    offset >>= delta;
                    pc += 1;
                }
                Instruction::IncrementOffset => {
                    offset += 1;
                    tracing::trace!(slice_index, offset, "interpreter_offset_advanced");
                    pc += 1;
                }
                Instruction::Call(target) => {
                    call_stack.push(pc + 1);
                    self.check_bound(call_stack.len())?;
                    pc = target as usize;
                }
                Instruction::Return => {
                    pc = call_stack.pop().expect("Return with an empty call stack is a compiler bug");
                }
                Instruction::Report => {
                    results.push(MatchRecord { slice_index, offset, bits: accumulator })?;
                    pc += 1;
                }
            }
        }
        Ok(())
    }

    fn load<S: Shard>(&self, shard: &S, row: crate::row::AbstractRow, slice_index: u32, offset: u32) -> u64 {
        let row_id = self.plan_rows.resolve(row.id);
        let word = shard.row_word(row_id, slice_index, offset);
        if row.inverted { !word } else { word }
    }

    fn check_bound(&self, depth: usize) -> Result<(), CompileError> {
        if depth > self.stack_bound {
            return Err(CompileError::InterpreterOverflow { depth, bound: self.stack_bound });
        }
        Ok(())
    }
}
