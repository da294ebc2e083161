//! Dead-code elimination (section 4.3).

use crate::dataflow;
use crate::inst_predicates;
use crate::ir::opcode::Opcode;
use crate::ir::{Function, Inst};
use crate::timing;

/// Side-effecting opcodes that must survive even with no live destination.
fn has_other_side_effect(opcode: Opcode) -> bool {
    opcode.is_memory_write()
        || opcode.is_branch()
        || opcode.is_hardware_touch()
        || opcode.is_lock_class()
        || opcode.is_wait_class()
        || matches!(
            opcode,
            Opcode::DrvC | Opcode::DrvNc | Opcode::DrvZ | Opcode::DrvNz | Opcode::DrvH | Opcode::DrvL
        )
        || opcode.is_cordic_command()
        || opcode.is_cordic_get()
}

/// Arithmetic identities that are always dead regardless of liveness
/// (`add x, #0`, `and x, #-1`, ...).
fn is_meaningless_arithmetic(func: &Function, inst: Inst) -> bool {
    let data = func.data(inst);
    let Some(src) = data.src.as_ref().and_then(|s| s.as_imm_int()) else {
        return false;
    };
    match data.opcode {
        Opcode::Add | Opcode::Sub | Opcode::Or | Opcode::Xor => src == 0,
        Opcode::And => src == -1,
        Opcode::ZeroX => src == 31,
        Opcode::Shl | Opcode::Shr | Opcode::Sar => src == 0,
        _ => false,
    }
}

/// Run one round of dead-code elimination. Returns whether anything
/// changed.
pub fn run(func: &mut Function) -> bool {
    let _t = timing::start(timing::Pass::Dce);
    let mut changed = false;

    let insts: Vec<Inst> = func.iter().collect();
    for inst in insts {
        if !func.layout.is_inserted(inst) {
            continue;
        }
        let data = func.data(inst);
        if data.volatile || data.is_label() {
            continue;
        }
        if data.cond.is_never() {
            func.remove_inst(inst);
            changed = true;
            continue;
        }
        if data.opcode.is_pseudo() {
            continue;
        }

        let dst = data.dst.clone();
        let sets_live_dst = inst_predicates::sets_dst(data)
            && dst.as_ref().is_some_and(|d| !dataflow::is_dead_after(func, inst, d));
        let writes_live_flags = (data.flags.writes_c() && !dataflow::flags_dead_after(func, inst, crate::ir::opcode::FlagEffects::WC))
            || (data.flags.writes_z() && !dataflow::flags_dead_after(func, inst, crate::ir::opcode::FlagEffects::WZ));

        if has_other_side_effect(data.opcode) {
            continue;
        }
        if is_meaningless_arithmetic(func, inst) {
            func.remove_inst(inst);
            changed = true;
            continue;
        }
        if !sets_live_dst && !writes_live_flags {
            func.remove_inst(inst);
            changed = true;
        }
    }

    changed |= remove_jump_to_next_label(func);
    changed |= remove_dead_code_after_unconditional_jump(func);
    changed
}

/// `JUMP` to the label immediately following it is a no-op.
fn remove_jump_to_next_label(func: &mut Function) -> bool {
    let mut changed = false;
    let insts: Vec<Inst> = func.iter().collect();
    for inst in insts {
        if !func.layout.is_inserted(inst) {
            continue;
        }
        let data = func.data(inst);
        if !inst_predicates::is_jump(data) || !data.cond.is_always() {
            continue;
        }
        let Some(target) = data.jump_target() else { continue };
        if func.layout.next(inst) == Some(target) {
            func.remove_inst(inst);
            changed = true;
        }
    }
    changed
}

/// Unreachable code between an unconditional jump and the next label.
fn remove_dead_code_after_unconditional_jump(func: &mut Function) -> bool {
    let mut changed = false;
    let insts: Vec<Inst> = func.iter().collect();
    let mut skipping = false;
    for inst in insts {
        if !func.layout.is_inserted(inst) {
            continue;
        }
        let data = func.data(inst);
        if data.is_label() {
            skipping = false;
            continue;
        }
        if skipping {
            func.remove_inst(inst);
            changed = true;
            continue;
        }
        if inst_predicates::is_jump(data) && data.cond.is_always() {
            skipping = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CallConv, Instruction};
    use crate::ir::operand::{Operand, RegClass};

    #[test]
    fn dead_store_is_removed() {
        let mut f = Function::new("t", CallConv::Fast);
        f.push(Instruction::new(Opcode::Mov).with_dst(Operand::reg(RegClass::Local, "a")).with_src(Operand::imm(1)));
        f.push(Instruction::new(Opcode::Mov).with_dst(Operand::reg(RegClass::Local, "a")).with_src(Operand::imm(2)));
        assert!(run(&mut f));
        assert_eq!(f.num_insts(), 1);
    }

    #[test]
    fn never_conditioned_instruction_is_removed() {
        let mut f = Function::new("t", CallConv::Fast);
        let mut i = Instruction::new(Opcode::Add).with_dst(Operand::reg(RegClass::Local, "a")).with_src(Operand::imm(1));
        i.cond = crate::ir::condcodes::Condition::NEVER;
        f.push(i);
        assert!(run(&mut f));
        assert_eq!(f.num_insts(), 0);
    }

    #[test]
    fn meaningless_add_zero_removed() {
        let mut f = Function::new("t", CallConv::Fast);
        f.push(Instruction::new(Opcode::Add).with_dst(Operand::reg(RegClass::Result, "r")).with_src(Operand::imm(0)));
        assert!(run(&mut f));
        assert_eq!(f.num_insts(), 0);
    }

    // `mov arg0,#5` right before a call to a known, ordinary callee loads
    // a real argument — the call reads `arg0` by convention even though
    // nothing in this function's own instruction list matches it against
    // the call's src/dst, so it must not be swept away as a dead store.
    #[test]
    fn arg_register_loaded_for_an_ordinary_call_survives() {
        let mut f = Function::new("t", CallConv::Fast);
        f.push(Instruction::new(Opcode::Mov).with_dst(Operand::reg(RegClass::Arg, "arg0")).with_src(Operand::imm(5)));
        f.push(Instruction::new(Opcode::Call).with_dst(Operand::cog_label("foo")));
        f.push(Instruction::new(Opcode::Ret));
        assert!(!run(&mut f));
        assert_eq!(f.num_insts(), 3);
    }

    // The multiply/divide helpers take their operands through
    // `muldiva`/`muldivb`, not `Arg`-class registers, so a leftover
    // `arg0` load ahead of one really is dead.
    #[test]
    fn arg_register_loaded_for_a_muldiv_call_is_dead() {
        let mut f = Function::new("t", CallConv::Fast);
        f.push(Instruction::new(Opcode::Mov).with_dst(Operand::reg(RegClass::Arg, "arg0")).with_src(Operand::imm(5)));
        f.push(Instruction::new(Opcode::Call).with_dst(Operand::cog_label("builtin_mul_32")));
        f.push(Instruction::new(Opcode::Ret));
        assert!(run(&mut f));
        assert_eq!(f.num_insts(), 2);
    }
}
