//! Tail-call conversion (section 4.3 supplement): `call #f; ret` becomes
//! `jmp #f` whenever the caller's stack frame needs no teardown the
//! callee wouldn't already perform on its own return.

use crate::config::{CompilerConfig, OptimizeFlags};
use crate::ir::opcode::Opcode;
use crate::ir::{Function, Inst};
use crate::timing;

pub fn run(func: &mut Function, config: &CompilerConfig) -> bool {
    let _t = timing::start(timing::Pass::TailCall);
    if !config.enabled(OptimizeFlags::TAIL_CALLS) || func.flags.uses_alloca {
        return false;
    }

    let mut changed = false;
    let insts: Vec<Inst> = func.iter().collect();
    for inst in insts {
        if !func.layout.is_inserted(inst) {
            continue;
        }
        let data = func.data(inst).clone();
        if data.opcode != Opcode::Call || !data.cond.is_always() {
            continue;
        }
        let Some(next) = func.layout.next(inst) else { continue };
        let ndata = func.data(next).clone();
        if ndata.opcode != Opcode::Ret || !ndata.cond.is_always() {
            continue;
        }
        func.remove_inst(next);
        func.data_mut(inst).opcode = Opcode::Jmp;
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetArch;
    use crate::ir::function::CallConv;
    use crate::ir::{Instruction, Operand};

    #[test]
    fn call_then_ret_becomes_jmp() {
        let mut f = Function::new("t", CallConv::Fast);
        f.push(Instruction::new(Opcode::Call).with_dst(Operand::cog_label("callee")));
        f.push(Instruction::new(Opcode::Ret));
        let cfg = CompilerConfig::new(TargetArch::P2, OptimizeFlags::default());
        assert!(run(&mut f, &cfg));
        assert_eq!(f.num_insts(), 1);
        assert_eq!(f.data(f.iter().next().unwrap()).opcode, Opcode::Jmp);
    }

    #[test]
    fn disabled_when_alloca_used() {
        let mut f = Function::new("t", CallConv::Fast);
        f.flags.uses_alloca = true;
        f.push(Instruction::new(Opcode::Call).with_dst(Operand::cog_label("callee")));
        f.push(Instruction::new(Opcode::Ret));
        let cfg = CompilerConfig::new(TargetArch::P2, OptimizeFlags::default());
        assert!(!run(&mut f, &cfg));
    }
}
