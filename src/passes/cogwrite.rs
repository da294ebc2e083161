//! Cog-memory write fusion (section 4.3): `movs wrcog,#x; movd wrcog,#y;
//! call #wrcog` collapses to `mov x,y` once the callee is resolved to the
//! cog-write helper by name.

use crate::ir::{Function, Inst, Opcode};
use crate::timing;

const WRCOG_HELPER: &str = "wrcog";

pub fn run(func: &mut Function) -> bool {
    let _t = timing::start(timing::Pass::CogwriteFusion);
    let mut changed = false;
    let insts: Vec<Inst> = func.iter().collect();

    for i0 in insts {
        if !func.layout.is_inserted(i0) {
            continue;
        }
        let d0 = func.data(i0).clone();
        if d0.opcode != Opcode::MovS || !targets_helper(&d0) {
            continue;
        }
        let Some(i1) = func.layout.next(i0) else { continue };
        let d1 = func.data(i1).clone();
        if d1.opcode != Opcode::MovD || !targets_helper(&d1) {
            continue;
        }
        let Some(i2) = func.layout.next(i1) else { continue };
        let d2 = func.data(i2).clone();
        if d2.opcode != Opcode::Call || !call_targets(&d2) {
            continue;
        }
        let (Some(x), Some(y)) = (d0.src.clone(), d1.src.clone()) else { continue };

        let d = func.data_mut(i0);
        d.opcode = Opcode::Mov;
        d.dst = Some(x);
        d.src = Some(y);
        func.remove_inst(i1);
        func.remove_inst(i2);
        changed = true;
    }
    changed
}

fn targets_helper(data: &crate::ir::Instruction) -> bool {
    matches!(
        data.dst.as_ref().map(|d| &d.kind),
        Some(crate::ir::operand::OperandKind::RegHw(name)) if name.as_ref() == WRCOG_HELPER
    )
}

fn call_targets(data: &crate::ir::Instruction) -> bool {
    matches!(
        data.dst.as_ref().map(|d| &d.kind),
        Some(crate::ir::operand::OperandKind::ImmCogLabel(name)) if name.as_ref() == WRCOG_HELPER
    )
}
