//! Local-register renaming and reuse (section 4.3).
//!
//! After the rest of the local-optimization suite has settled, every
//! `RegLocal`/`RegTemp` touched in the function is renamed to a
//! `localNN`/`varNN` slot, numbered by simple interval-graph coloring over
//! first-touch-to-last-touch ranges — the same shape as a linear-scan
//! register allocator — so that non-overlapping locals share a slot
//! number and the frontend's original (often large and sparse) naming
//! collapses to a dense one the emitter can budget stack/cog space for.
//!
//! Subregister-array contiguity (renaming `x+0`, `x+1`, `x+2` as a
//! contiguous run) is not reproduced here: this pass renames by base
//! register identity only, which is a conservative simplification noted
//! in `DESIGN.md`.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;

use crate::ir::operand::{Operand, OperandKind, RegClass, Symbol};
use crate::ir::{Function, Inst};
use crate::timing;

fn collect_regs(op: &Operand, out: &mut Vec<(RegClass, Symbol)>) {
    match &op.kind {
        OperandKind::Reg(class @ (RegClass::Local | RegClass::Temp), name) => {
            out.push((*class, name.clone()));
        }
        OperandKind::SubReg { parent, .. } => collect_regs(parent, out),
        OperandKind::HubMemRef { base, .. } | OperandKind::CogMemRef { base, .. } => collect_regs(base, out),
        _ => {}
    }
}

fn rename_operand(op: &mut Operand, map: &FxHashMap<Symbol, Symbol>) {
    match &mut op.kind {
        OperandKind::Reg(RegClass::Local | RegClass::Temp, name) => {
            if let Some(new_name) = map.get(name) {
                *name = new_name.clone();
            }
        }
        OperandKind::SubReg { parent, .. } => rename_operand(parent, map),
        OperandKind::HubMemRef { base, .. } | OperandKind::CogMemRef { base, .. } => rename_operand(base, map),
        _ => {}
    }
}

pub fn run(func: &mut Function) -> bool {
    let _t = timing::start(timing::Pass::LocalRegs);
    let insts: Vec<Inst> = func.iter().collect();

    // First/last touch index per (class, name), in program order.
    let mut first_seen: FxHashMap<(RegClass, Symbol), usize> = FxHashMap::default();
    let mut last_seen: FxHashMap<(RegClass, Symbol), usize> = FxHashMap::default();
    for (idx, &inst) in insts.iter().enumerate() {
        let data = func.data(inst);
        let mut touched = Vec::new();
        for slot in [&data.dst, &data.src, &data.src2].into_iter().flatten() {
            collect_regs(slot, &mut touched);
        }
        for key in touched {
            first_seen.entry(key.clone()).or_insert(idx);
            last_seen.insert(key, idx);
        }
    }
    if first_seen.is_empty() {
        return false;
    }

    let mut order: Vec<(RegClass, Symbol)> = first_seen.keys().cloned().collect();
    order.sort_by_key(|k| first_seen[k]);

    let mut local_slots_active: BinaryHeap<(Reverse<usize>, u32)> = BinaryHeap::new();
    let mut local_free: BinaryHeap<Reverse<u32>> = BinaryHeap::new();
    let mut local_next = 0u32;
    let mut temp_slots_active: BinaryHeap<(Reverse<usize>, u32)> = BinaryHeap::new();
    let mut temp_free: BinaryHeap<Reverse<u32>> = BinaryHeap::new();
    let mut temp_next = 0u32;

    let mut rename: FxHashMap<Symbol, Symbol> = FxHashMap::default();

    for key @ (class, name) in &order {
        let start = first_seen[key];
        let end = last_seen[key];
        let (active, free, next, prefix): (_, _, _, &str) = match class {
            RegClass::Local => (&mut local_slots_active, &mut local_free, &mut local_next, "local"),
            _ => (&mut temp_slots_active, &mut temp_free, &mut temp_next, "var"),
        };
        while let Some(&(Reverse(e), slot)) = active.peek() {
            if e < start {
                active.pop();
                free.push(Reverse(slot));
            } else {
                break;
            }
        }
        let slot = match free.pop() {
            Some(Reverse(s)) => s,
            None => {
                let s = *next;
                *next += 1;
                s
            }
        };
        active.push((Reverse(end), slot));
        rename.insert(name.clone(), format!("{prefix}{slot}").into());
    }

    for inst in insts {
        let data = func.data_mut(inst);
        for slot in [&mut data.dst, &mut data.src, &mut data.src2].into_iter().flatten() {
            rename_operand(slot, &rename);
        }
    }
    true
}
