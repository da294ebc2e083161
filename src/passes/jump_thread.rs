//! Jump threading (section 4.3): a jump whose target is itself an
//! unconditional jump is redirected to the final target.

use crate::ir::{Function, Inst};
use crate::timing;

pub fn run(func: &mut Function) -> bool {
    let _t = timing::start(timing::Pass::JumpThread);
    let mut changed = false;
    let insts: Vec<Inst> = func.iter().collect();

    for inst in insts {
        if !func.layout.is_inserted(inst) {
            continue;
        }
        let Some(mut target) = func.data(inst).jump_target() else { continue };
        if !crate::inst_predicates::is_jump(func.data(inst)) {
            continue;
        }
        let original = target;
        let mut hops = 0;
        loop {
            let Some(after_label) = func.layout.next(target) else { break };
            let ldata = func.data(after_label);
            if !(ldata.opcode == crate::ir::Opcode::Jmp && ldata.cond.is_always()) {
                break;
            }
            let Some(next_target) = ldata.jump_target() else { break };
            if next_target == target || hops > 32 {
                break;
            }
            target = next_target;
            hops += 1;
        }
        if target != original {
            func.set_jump_target(inst, target);
            changed = true;
        }
    }
    changed
}
