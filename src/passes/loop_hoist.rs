//! Loop-pointer-offset hoisting and inc/dec hoisting (section 4.3).

use crate::inst_predicates;
use crate::ir::opcode::Opcode;
use crate::ir::{Function, Inst};
use crate::timing;

/// In a loop with a single back-edge, if an add/sub of a constant to a
/// register at the top is matched by the negation at the bottom, and the
/// register is untouched elsewhere in the loop, hoist both out.
pub fn hoist_loop_pointer_offsets(func: &mut Function) -> bool {
    let _t = timing::start(timing::Pass::LoopHoist);
    let mut changed = false;
    let labels: Vec<Inst> = func.iter().filter(|&i| func.data(i).is_label()).collect();

    for label in labels {
        let preds = func.label_jumps.jumps_to(label);
        if preds.len() != 1 {
            continue;
        }
        let back_edge = preds[0];
        if func.layout.cmp(back_edge, label) != std::cmp::Ordering::Greater {
            continue; // not actually a backward edge
        }
        let Some(top) = func.layout.next(label) else { continue };
        let top_data = func.data(top).clone();
        if !matches!(top_data.opcode, Opcode::Add | Opcode::Sub) || !top_data.cond.is_always() {
            continue;
        }
        let Some(reg) = top_data.dst.clone() else { continue };
        let Some(delta) = top_data.src.as_ref().and_then(|s| s.as_imm_int()) else { continue };

        let Some(bottom) = func.layout.prev(back_edge) else { continue };
        let bottom_data = func.data(bottom).clone();
        if !matches!(bottom_data.opcode, Opcode::Add | Opcode::Sub) || !bottom_data.cond.is_always() {
            continue;
        }
        let Some(bdelta) = bottom_data.src.as_ref().and_then(|s| s.as_imm_int()) else { continue };
        if !bottom_data.dst.as_ref().is_some_and(|d| d.same_register(&reg)) {
            continue;
        }
        let signed_top = if top_data.opcode == Opcode::Add { delta } else { -delta };
        let signed_bottom = if bottom_data.opcode == Opcode::Add { bdelta } else { -bdelta };
        if signed_top + signed_bottom != 0 {
            continue;
        }

        if crate::dataflow::modified_in_range(func, func.layout.next(top).unwrap(), func.layout.prev(bottom).unwrap(), &reg) {
            continue;
        }

        func.remove_inst(top);
        func.remove_inst(bottom);
        changed = true;
    }
    changed
}

/// `mov tmp,ptr; add ptr,#1; use tmp` — push the `add ptr` as late as
/// possible past instructions that neither read nor write `ptr` and are
/// not calls/jumps/labels/CORDIC-gets.
pub fn hoist_incdec(func: &mut Function) -> bool {
    let _t = timing::start(timing::Pass::IncDecHoist);
    let mut changed = false;
    let insts: Vec<Inst> = func.iter().collect();

    for inst in insts {
        if !func.layout.is_inserted(inst) {
            continue;
        }
        let data = func.data(inst).clone();
        if !matches!(data.opcode, Opcode::Add | Opcode::Sub) || !data.cond.is_always() {
            continue;
        }
        let Some(ptr) = data.dst.clone() else { continue };
        if !data.src.as_ref().is_some_and(|s| s.is_immediate()) {
            continue;
        }

        let mut cur = inst;
        loop {
            let Some(next) = func.layout.next(cur) else { break };
            let ndata = func.data(next);
            if ndata.is_label()
                || ndata.opcode.is_call()
                || ndata.opcode.is_branch()
                || inst_predicates::is_cordic_get(ndata)
                || inst_predicates::uses(ndata, &ptr)
                || inst_predicates::modifies(ndata, &ptr)
            {
                break;
            }
            cur = next;
        }
        if cur != inst {
            func.layout.remove(inst);
            func.layout.insert_after(inst, cur);
            changed = true;
        }
    }
    changed
}
