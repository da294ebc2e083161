//! Compare optimization (section 4.3).

use crate::ir::opcode::{FlagEffects, Opcode};
use crate::ir::{Function, Inst};
use crate::passes::apply_condition::apply_condition_after;
use crate::timing;

pub fn run(func: &mut Function) -> bool {
    let _t = timing::start(timing::Pass::CompareOpt);
    let mut changed = false;
    let insts: Vec<Inst> = func.iter().collect();

    for inst in insts {
        if !func.layout.is_inserted(inst) {
            continue;
        }
        let data = func.data(inst).clone();
        if data.opcode != Opcode::Cmp || !data.cond.is_always() {
            continue;
        }
        let (Some(dst), Some(src)) = (&data.dst, &data.src) else { continue };

        // `cmp x,x wcz` always clears C and sets Z.
        if dst.same_register(src) && data.flags.contains(FlagEffects::WCZ) {
            if apply_condition_after(func, inst, false, true) {
                func.remove_inst(inst);
                changed = true;
                continue;
            }
        }

        // `cmp x,#0 wz` folds into a previous instruction that can itself
        // carry `WZ`, when nothing between them disturbs Z.
        if data.flags == FlagEffects::WZ {
            if let Some(v) = src.as_imm_int() {
                if v == 0 {
                    if let Some(prev) = func.layout.prev(inst) {
                        let pdata = func.data(prev);
                        if pdata.cond.is_always()
                            && !pdata.flags.writes_z()
                            && !pdata.opcode.is_pseudo()
                            && pdata.dst.as_ref().is_some_and(|d| d.same_register(dst))
                        {
                            func.data_mut(prev).flags |= FlagEffects::WZ;
                            func.remove_inst(inst);
                            changed = true;
                        }
                    }
                }
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::operand::{Operand, RegClass};
    use crate::ir::Instruction;
    use crate::ir::CallConv;

    #[test]
    fn self_compare_with_wcz_is_removed() {
        let mut f = Function::new("t", CallConv::Fast);
        let i = Instruction::new(Opcode::Cmp)
            .with_dst(Operand::reg(RegClass::Local, "x"))
            .with_src(Operand::reg(RegClass::Local, "x"))
            .with_flags(FlagEffects::WCZ);
        f.push(i);
        assert!(run(&mut f));
        assert_eq!(f.num_insts(), 0);
    }
}
