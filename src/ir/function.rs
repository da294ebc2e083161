//! `Function`: one per-function `IRList` plus its side tables.

use std::collections::HashMap;

use cranelift_entity::PrimaryMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::config::OptimizeFlags;

use super::entities::Inst;
use super::instruction::{Aux, Instruction};
use super::layout::Layout;
use super::opcode::Opcode;
use super::operand::Operand;

/// Calling convention, per section 6's external interface.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CallConv {
    /// Arguments/results in registers, no stack frame, non-recursive.
    Fast,
    /// Arguments pushed on a stack; supports recursion.
    Stack,
}

/// Bitfield flags threaded in from the frontend's function descriptor
/// (section 6).
#[derive(Clone, Copy, Default, Debug)]
pub struct FunctionFlags {
    pub is_leaf: bool,
    pub is_recursive: bool,
    pub uses_alloca: bool,
    pub local_address_taken: bool,
    pub closure: bool,
    pub cog_task: bool,
    pub used_as_ptr: bool,
    /// Hint from the frontend; not itself an eligibility test (section 4.5
    /// computes real eligibility), but `prefer_inline` relaxes the
    /// instruction-count threshold.
    pub prefer_inline: bool,
}

/// The label→jump adjacency, owned per label (section 3: "a linked list of
/// jumps that target it"), modeled as a side table keyed by the label's
/// `Inst` rather than an intrusive pointer list (`DESIGN.md`, Cyclic
/// references).
/// Most labels in generated code close a single loop or `if`/`else`
/// branch and so have at most two predecessors; `SmallVec` keeps that
/// common case off the heap entirely.
#[derive(Clone, Default)]
pub struct LabelJumps {
    by_label: FxHashMap<Inst, SmallVec<[Inst; 2]>>,
}

impl LabelJumps {
    pub fn jumps_to(&self, label: Inst) -> &[Inst] {
        self.by_label.get(&label).map_or(&[], |v| v.as_slice())
    }

    pub fn has_known_predecessors(&self, label: Inst) -> bool {
        self.by_label.contains_key(&label)
    }

    pub fn add(&mut self, label: Inst, jump: Inst) {
        self.by_label.entry(label).or_default().push(jump);
    }

    pub fn remove(&mut self, label: Inst, jump: Inst) {
        if let Some(v) = self.by_label.get_mut(&label) {
            v.retain(|j| *j != jump);
        }
    }

    /// Mark a label's predecessor set unknown (section 3: "`L.aux` is NULL
    /// and `L.flags` contains `LABEL_USED`"), e.g. because its address was
    /// taken and handed to code this optimizer cannot see.
    pub fn invalidate(&mut self, label: Inst) {
        self.by_label.remove(&label);
    }

    pub fn clear(&mut self) {
        self.by_label.clear();
    }
}

/// One function: its instruction arena, its layout (ordering), and the
/// label→jump side table. Everything else the frontend hands in (section
/// 6) lives alongside as plain fields.
#[derive(Clone)]
pub struct Function {
    pub name: String,
    pub call_conv: CallConv,
    pub flags: FunctionFlags,
    pub optimize_flags: OptimizeFlags,
    pub entry_label: Option<Inst>,
    pub return_label: Option<Inst>,
    pub alt_entry: Option<Inst>,
    /// Bit `i` set means local slot `i` is referenced from inline assembly
    /// the optimizer must treat conservatively.
    pub locals_used_in_asm: u64,
    pool: PrimaryMap<Inst, Instruction>,
    pub layout: Layout,
    pub label_jumps: LabelJumps,
    /// Call-site count per callee, maintained by the inliner (section 4.5).
    pub call_site_counts: HashMap<String, u32>,
}

impl Function {
    pub fn new(name: impl Into<String>, call_conv: CallConv) -> Self {
        Function {
            name: name.into(),
            call_conv,
            flags: FunctionFlags::default(),
            optimize_flags: OptimizeFlags::all(),
            entry_label: None,
            return_label: None,
            alt_entry: None,
            locals_used_in_asm: 0,
            pool: PrimaryMap::new(),
            layout: Layout::new(),
            label_jumps: LabelJumps::default(),
            call_site_counts: HashMap::new(),
        }
    }

    pub fn clear(&mut self) {
        self.pool.clear();
        self.layout.clear();
        self.label_jumps.clear();
        self.call_site_counts.clear();
    }

    pub fn make(&mut self, inst: Instruction) -> Inst {
        self.pool.push(inst)
    }

    pub fn push(&mut self, inst: Instruction) -> Inst {
        let r = self.make(inst);
        self.layout.append(r);
        r
    }

    pub fn insert_before(&mut self, inst: Instruction, before: Inst) -> Inst {
        let r = self.make(inst);
        self.layout.insert_before(r, before);
        r
    }

    pub fn insert_after(&mut self, inst: Instruction, after: Inst) -> Inst {
        let r = self.make(inst);
        self.layout.insert_after(r, after);
        r
    }

    pub fn data(&self, inst: Inst) -> &Instruction {
        &self.pool[inst]
    }

    pub fn data_mut(&mut self, inst: Inst) -> &mut Instruction {
        &mut self.pool[inst]
    }

    pub fn opcode(&self, inst: Inst) -> Opcode {
        self.pool[inst].opcode
    }

    pub fn dst(&self, inst: Inst) -> Option<&Operand> {
        self.pool[inst].dst.as_ref()
    }

    pub fn src(&self, inst: Inst) -> Option<&Operand> {
        self.pool[inst].src.as_ref()
    }

    /// Unlink `inst` from the layout. Per the Lifecycle invariant this must
    /// be called at most once; if `inst` is a label, its entry in the
    /// jump-list side table is dropped too (any jumps still pointing at it
    /// become dangling `JumpTarget`s, which callers must have already
    /// retargeted — see [`Function::retarget_jumps`]).
    pub fn remove_inst(&mut self, inst: Inst) {
        if self.pool[inst].is_label() {
            self.label_jumps.invalidate(inst);
        } else if let Aux::JumpTarget(t) = self.pool[inst].aux {
            self.label_jumps.remove(t, inst);
        }
        self.layout.remove(inst);
    }

    /// Redirect every jump in `old`'s jump list to target `new`, keeping
    /// the side table consistent (jump/label agreement, section 8 #2).
    pub fn retarget_jumps(&mut self, old: Inst, new: Inst) {
        let jumps = self.label_jumps.jumps_to(old).to_vec();
        for j in &jumps {
            self.pool[*j].set_jump_target(new);
            self.label_jumps.add(new, *j);
        }
        self.label_jumps.invalidate(old);
    }

    pub fn set_jump_target(&mut self, jump: Inst, target: Inst) {
        if let Aux::JumpTarget(old) = self.pool[jump].aux {
            self.label_jumps.remove(old, jump);
        }
        self.pool[jump].set_jump_target(target);
        self.label_jumps.add(target, jump);
    }

    pub fn iter(&self) -> impl Iterator<Item = Inst> + '_ {
        self.layout.iter()
    }

    pub fn instructions(&self) -> impl Iterator<Item = (Inst, &Instruction)> + '_ {
        self.layout.iter().map(move |i| (i, &self.pool[i]))
    }

    pub fn num_insts(&self) -> usize {
        self.layout.iter().count()
    }

    /// Rebuild sequence-number addresses from scratch. The pass driver
    /// calls this at the top of every round (section 4.8, step 2: "assign
    /// temporary sequential addresses").
    pub fn renumber(&mut self) {
        self.layout.renumber_all();
    }

    /// Re-derive `label_jumps` from scratch by scanning every branch's
    /// `aux`. Mirrors `CheckLabelUsage` (section 5): called whenever an
    /// analysis may have invalidated the side table, e.g. after the
    /// inliner splices in cloned code.
    pub fn rebuild_label_jumps(&mut self) {
        self.label_jumps.clear();
        let insts: Vec<Inst> = self.iter().collect();
        for i in insts {
            if let Aux::JumpTarget(t) = self.pool[i].aux {
                self.label_jumps.add(t, i);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::condcodes::Condition;

    #[test]
    fn jump_label_roundtrip() {
        let mut f = Function::new("t", CallConv::Fast);
        let label = f.push(Instruction::label());
        let jump = f.push(Instruction::new(Opcode::Jmp).with_cond(Condition::ALWAYS));
        f.set_jump_target(jump, label);
        assert_eq!(f.label_jumps.jumps_to(label), &[jump]);
        assert_eq!(f.data(jump).jump_target(), Some(label));
    }

    #[test]
    fn remove_inst_cleans_jump_list() {
        let mut f = Function::new("t", CallConv::Fast);
        let label = f.push(Instruction::label());
        let jump = f.push(Instruction::new(Opcode::Jmp));
        f.set_jump_target(jump, label);
        f.remove_inst(jump);
        assert!(f.label_jumps.jumps_to(label).is_empty());
    }
}
