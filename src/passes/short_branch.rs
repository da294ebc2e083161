//! Short-forward-branch conditionalization (section 4.3).

use crate::ir::condcodes::Condition;
use crate::ir::{Function, Inst};
use crate::timing;

/// Span limit for inverting a forward branch into per-instruction
/// conditions instead of a real jump.
pub fn span_limit(arch: crate::config::TargetArch, extrasmall: bool) -> usize {
    if extrasmall {
        10
    } else {
        match arch {
            crate::config::TargetArch::P1 => 3,
            crate::config::TargetArch::P2 => 5,
        }
    }
}

fn can_predicate(data: &crate::ir::Instruction) -> bool {
    !data.is_label()
        && !data.opcode.is_branch()
        && !matches!(data.opcode, crate::ir::Opcode::Break)
        && data.cond.is_always()
}

pub fn run(func: &mut Function, arch: crate::config::TargetArch, extrasmall: bool) -> bool {
    let _t = timing::start(timing::Pass::ShortBranch);
    let limit = span_limit(arch, extrasmall);
    let mut changed = false;
    let insts: Vec<Inst> = func.iter().collect();

    for inst in insts {
        if !func.layout.is_inserted(inst) {
            continue;
        }
        let data = func.data(inst).clone();
        if !crate::inst_predicates::is_jump(&data) || data.cond.is_always() {
            continue;
        }
        let Some(target) = data.jump_target() else { continue };

        let mut span = Vec::new();
        let mut cur = func.layout.next(inst);
        let mut ok = true;
        while let Some(i) = cur {
            if i == target {
                break;
            }
            if span.len() >= limit {
                ok = false;
                break;
            }
            let d = func.data(i);
            if !can_predicate(d) {
                ok = false;
                break;
            }
            span.push(i);
            cur = func.layout.next(i);
        }
        if !ok || cur != Some(target) || span.is_empty() {
            continue;
        }

        let inverted = data.cond.invert();
        for i in &span {
            func.data_mut(*i).cond = inverted;
        }
        func.remove_inst(inst);
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetArch;
    use crate::ir::operand::{Operand, RegClass};
    use crate::ir::{CallConv, Instruction, Opcode};

    #[test]
    fn short_forward_branch_is_conditionalized() {
        let mut f = Function::new("t", CallConv::Fast);
        let jmp = f.push(Instruction::new(Opcode::Jmp).with_cond(Condition::IF_Z));
        f.push(Instruction::new(Opcode::Mov).with_dst(Operand::reg(RegClass::Local, "a")).with_src(Operand::imm(1)));
        let label = f.push(Instruction::label());
        f.set_jump_target(jmp, label);
        assert!(run(&mut f, TargetArch::P2, false));
        assert_eq!(f.num_insts(), 2);
    }
}
