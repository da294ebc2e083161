//! Stable entity references into a function's instruction arena.
//!
//! Per `DESIGN.md`'s Cyclic references note, the jump/label graph is not
//! modeled with raw pointers in both directions: every instruction is
//! addressed by a small `Inst` index into a [`cranelift_entity::PrimaryMap`],
//! and the label→jump adjacency lives in an auxiliary side table keyed by
//! `Inst` (see [`crate::ir::function::LabelJumps`]).

use cranelift_entity::entity_impl;

/// Reference to one instruction (including pseudo-ops such as labels) in a
/// function's backing arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// Reference to a function, used by call sites and the duplicate-function
/// merger's hash table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncRef(u32);
entity_impl!(FuncRef, "fn");
