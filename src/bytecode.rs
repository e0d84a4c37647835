//! # ByteCode emitter and Program
//!
//! Lowers a [`CompileNode`] tree into a flat [`Instruction`] stream per
//! `SPEC_FULL.md` §4.8, grounded in the rank-down/rank-zero node set of
//! `original_source/src/Plan/src/CompileNodes.h`. Emission walks the tree
//! once, recording forward jump targets as label ids; [`Emitter::seal`]
//! resolves every label into an absolute instruction index and hands back
//! an immutable [`Program`] — "labels never appear in the final program".

use crate::compile_node::CompileNode;
use crate::arena::{Arena, NodeId};
use crate::row::{AbstractRow, Rank};
use std::collections::HashMap;

/// One instruction in a sealed [`Program`]. Jump/call targets are absolute
/// indices into [`Program::instructions`] once sealed; they never appear as
/// bare label ids outside [`Emitter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    /// `accumulator := *row_ptr(row, offset)`, inverted if `row.inverted`.
    LoadRow(AbstractRow),
    /// `accumulator &= *row_ptr(row, offset)`, inverted if `row.inverted`.
    AndRow(AbstractRow),
    /// Jump to `target` if the accumulator (or last-set flag) is zero.
    Jz(u32),
    /// Unconditional jump to `target`.
    Jmp(u32),
    /// Push the accumulator onto the stack.
    Push,
    /// Pop the stack into the accumulator.
    Pop,
    /// `accumulator := pop() & accumulator`.
    AndStack,
    /// `accumulator := pop() | accumulator`.
    OrStack,
    /// `accumulator := !accumulator`.
    Not,
    /// Set the zero flag from the accumulator, for a `Jz` with no
    /// intervening row load.
    UpdateFlags,
    /// Descend `delta` ranks: multiply the current offset by `2^delta`.
    LeftShiftOffset(Rank),
    /// Ascend `delta` ranks: the inverse of `LeftShiftOffset`.
    RightShiftOffset(Rank),
    /// `offset += 1`, visiting the second half of a rank-down iteration.
    IncrementOffset,
    /// One-level subroutine call to `target`; the return address is pushed
    /// onto a bounded call stack distinct from the value stack.
    Call(u32),
    /// Return to the address pushed by the most recent `Call`.
    Return,
    /// For every set bit in the accumulator, append `(slice_index, offset,
    /// accumulator)` to the results buffer.
    Report,
}

/// A sealed, immutable instruction stream ready for interpretation.
#[derive(Debug, Clone)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    /// The instruction stream.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Number of instructions in the program.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Whether the program has no instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Builds a [`Program`] by walking a [`CompileNode`] tree, per the emission
/// table in `SPEC_FULL.md` §4.8.
pub struct Emitter {
    instructions: Vec<Instruction>,
    label_positions: HashMap<u32, u32>,
    fixups: Vec<(usize, u32)>,
    next_label: u32,
}

impl Emitter {
    /// Create an empty emitter.
    pub fn new() -> Self {
        Emitter {
            instructions: Vec::new(),
            label_positions: HashMap::new(),
            fixups: Vec::new(),
            next_label: 0,
        }
    }

    /// Emit the instructions for `root` and seal the result into a
    /// [`Program`] with all labels resolved.
    pub fn compile(compile_arena: &Arena<CompileNode>, root: NodeId<CompileNode>) -> Program {
        let _guard = tracing::info_span!("emit_bytecode").entered();
        let mut emitter = Emitter::new();
        emitter.emit_node(compile_arena, root);
        let program = emitter.seal();
        tracing::debug!(instruction_count = program.len(), "bytecode_emitted");
        program
    }

    fn new_label(&mut self) -> u32 {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    fn mark_label(&mut self, label: u32) {
        self.label_positions.insert(label, self.instructions.len() as u32);
    }

    fn push(&mut self, instr: Instruction) -> usize {
        self.instructions.push(instr);
        self.instructions.len() - 1
    }

    fn push_jz(&mut self, label: u32) {
        let idx = self.push(Instruction::Jz(0));
        self.fixups.push((idx, label));
    }

    fn push_jmp(&mut self, label: u32) {
        let idx = self.push(Instruction::Jmp(0));
        self.fixups.push((idx, label));
    }

    fn push_call(&mut self, label: u32) {
        let idx = self.push(Instruction::Call(0));
        self.fixups.push((idx, label));
    }

    fn emit_node(&mut self, arena: &Arena<CompileNode>, node: NodeId<CompileNode>) {
        match arena.get(node).clone() {
            CompileNode::LoadRowJz { row, child } => {
                self.push(Instruction::LoadRow(row));
                let lend = self.new_label();
                self.push_jz(lend);
                if let Some(child) = child {
                    self.emit_node(arena, child);
                }
                self.mark_label(lend);
            }
            CompileNode::AndRowJz { row, child } => {
                self.push(Instruction::AndRow(row));
                let lend = self.new_label();
                self.push_jz(lend);
                if let Some(child) = child {
                    self.emit_node(arena, child);
                }
                self.mark_label(lend);
            }
            CompileNode::Or { left, right } => {
                self.push(Instruction::Push);
                self.emit_node(arena, left);
                self.push(Instruction::Pop);
                self.emit_node(arena, right);
            }
            CompileNode::RankDown { delta, child } => {
                self.push(Instruction::LeftShiftOffset(delta));
                self.push(Instruction::Push);
                let lbody = self.new_label();
                let lend = self.new_label();
                self.push_call(lbody);
                self.push(Instruction::Pop);
                self.push(Instruction::IncrementOffset);
                self.push_call(lbody);
                self.push_jmp(lend);
                self.mark_label(lbody);
                self.emit_node(arena, child);
                self.push(Instruction::Return);
                self.mark_label(lend);
                self.push(Instruction::RightShiftOffset(delta));
            }
            CompileNode::Report { child } => match child {
                None => {
                    self.push(Instruction::Report);
                }
                Some(child) => {
                    self.push(Instruction::Push);
                    self.emit_node(arena, child);
                    self.push(Instruction::AndStack);
                    let lend = self.new_label();
                    self.push_jz(lend);
                    self.push(Instruction::Report);
                    self.mark_label(lend);
                }
            },
            CompileNode::AndTree { left, right } => {
                self.emit_node(arena, left);
                self.push(Instruction::UpdateFlags);
                let lend = self.new_label();
                self.push_jz(lend);
                self.push(Instruction::Push);
                self.emit_node(arena, right);
                self.push(Instruction::AndStack);
                self.mark_label(lend);
            }
            CompileNode::OrTree { left, right } => {
                self.emit_node(arena, left);
                self.push(Instruction::Push);
                self.emit_node(arena, right);
                self.push(Instruction::OrStack);
            }
            CompileNode::LoadRow { row } => {
                self.push(Instruction::LoadRow(row));
            }
            CompileNode::Not { child } => {
                self.emit_node(arena, child);
                self.push(Instruction::Not);
            }
        }
    }

    /// Resolve every forward jump/call against the label positions recorded
    /// during emission, producing an immutable [`Program`].
    pub fn seal(mut self) -> Program {
        for (instr_index, label) in &self.fixups {
            let target = *self
                .label_positions
                .get(label)
                .expect("every emitted label is marked before seal");
            self.instructions[*instr_index] = match self.instructions[*instr_index] {
                Instruction::Jz(_) => Instruction::Jz(target),
                Instruction::Jmp(_) => Instruction::Jmp(target),
                Instruction::Call(_) => Instruction::Call(target),
                other => other,
            };
        }
        Program {
            instructions: self.instructions,
        }
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}
