//! Branch common-op hoisting (section 4.3).
//!
//! For a conditional branch whose target label's fall-in is an
//! unconditional jump from exactly one place, compare the instruction
//! above the label with the instruction after the branch; if identical
//! and not flag-critical, hoist one copy before the branch.

use crate::dataflow::is_reorder_barrier;
use crate::ir::{Function, Inst};
use crate::timing;

pub fn run(func: &mut Function) -> bool {
    let _t = timing::start(timing::Pass::BranchHoist);
    let mut changed = false;
    let insts: Vec<Inst> = func.iter().collect();

    for inst in insts {
        if !func.layout.is_inserted(inst) {
            continue;
        }
        let data = func.data(inst).clone();
        if !crate::inst_predicates::is_branch(&data) || data.cond.is_always() {
            continue;
        }
        let Some(target) = data.jump_target() else { continue };
        if func.label_jumps.jumps_to(target).len() != 1 {
            continue;
        }

        let (Some(above), Some(after)) = (func.layout.prev(target), func.layout.next(inst)) else { continue };
        if is_reorder_barrier(func, above) || is_reorder_barrier(func, after) {
            continue;
        }
        let a = func.data(above).clone();
        let b = func.data(after).clone();
        if a.opcode != b.opcode || a.cond != b.cond || a.flags != b.flags {
            continue;
        }
        if !a.flags.writes_c() && !a.flags.writes_z() && a.dst == b.dst && a.src == b.src {
            func.insert_before(a, inst);
            func.remove_inst(after);
            changed = true;
        }
    }
    changed
}
