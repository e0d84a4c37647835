//! # bitfunnel-core
//!
//! A signature-file query planner and bit-sliced matcher, in the lineage of
//! BitFunnel's `QueryPlanner`/`TermPlan`/`CompileNode`/`Interpreter` pipeline.
//!
//! ## Pipeline
//!
//! ```text
//! TermMatchNode (Term/Phrase/Fact, And/Or/Not)
//!     ↓
//! [TermPlanConverter]           → RowMatchNode, resolving terms through a TermTable
//!     ↓
//! [MatchTreeRewriter]           → rank-bucketed, cross-product-bounded RowMatchNode
//!     ↓
//! [RankDownCompiler]            → CompileNode tree (rank-down layer + rank-zero layer)
//!     ↓
//! [RegisterAllocator]           → abstract row → physical register assignment
//!     ↓
//! [ByteCode Emitter]            → Program (flat Instruction stream)
//!     ↓
//! [Interpreter]                 → per-shard execution → ResultsBuffer
//! ```
//!
//! ## Module organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `arena` | Bump-allocated, index-addressed tree storage (`Arena<T>`/`NodeId<T>`) |
//! | `hash` | FNV-1a term hashing and phrase hash combination |
//! | `row` | `RowId`, `Rank`, `AbstractRow` |
//! | `term_tree` | `TermMatchNode` and its flattening builder |
//! | `term_table` | `TermTable` trait, `PlanRows` dedup/shadow interning |
//! | `term_plan` | `TermPlanConverter`: term tree → row tree |
//! | `row_tree` | `RowMatchNode` |
//! | `rewriter` | `MatchTreeRewriter`: rank bucketing, cross-product bounding |
//! | `compile_node` | `CompileNode`, the two-layer compiled tree |
//! | `compiler` | `RankDownCompiler`: row tree → `CompileNode` tree |
//! | `register_allocator` | Abstract row → physical register assignment |
//! | `bytecode` | `Instruction`, `Program`, `Emitter` |
//! | `interpreter` | `Shard` trait, `ResultsBuffer`, `Interpreter` |
//! | `config` | `PlannerConfig` (figment-layered) |
//! | `concurrency` | `TokenManager`/`QueryToken` reconfiguration gating |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bitfunnel_core::term_tree::Builder;
//! use bitfunnel_core::term_plan::TermPlanConverter;
//! use bitfunnel_core::rewriter::MatchTreeRewriter;
//! use bitfunnel_core::compiler::RankDownCompiler;
//! use bitfunnel_core::register_allocator::RegisterAllocator;
//! use bitfunnel_core::bytecode::Emitter;
//! use bitfunnel_core::interpreter::{Interpreter, ResultsBuffer};
//!
//! // term tree → row tree → rewritten row tree → compile tree → program → matches
//! ```

pub mod error;

pub mod arena;
pub mod hash;
pub mod row;

pub mod term_tree;
pub mod term_table;
pub mod term_plan;
pub mod row_tree;

pub mod rewriter;
pub mod compile_node;
pub mod compiler;
pub mod register_allocator;
pub mod bytecode;
pub mod interpreter;

pub mod config;
pub mod concurrency;

pub use error::{ArenaError, CompileError, Error, PlanError, Result, TreeError};
