//! Add/sub coalescing and immediate canonicalization (section 4.3).

use crate::ir::opcode::Opcode;
use crate::ir::{Function, Inst};
use crate::timing;

/// Two consecutive `ADD`/`SUB` on the same register with constant operands
/// and matching conditions collapse to one.
pub fn coalesce(func: &mut Function) -> bool {
    let _t = timing::start(timing::Pass::AddSubCoalesce);
    let mut changed = false;
    let insts: Vec<Inst> = func.iter().collect();

    for inst in insts {
        if !func.layout.is_inserted(inst) {
            continue;
        }
        let data = func.data(inst).clone();
        if !matches!(data.opcode, Opcode::Add | Opcode::Sub) {
            continue;
        }
        let Some(next) = func.layout.next(inst) else { continue };
        let ndata = func.data(next).clone();
        if !matches!(ndata.opcode, Opcode::Add | Opcode::Sub) || ndata.cond != data.cond {
            continue;
        }
        let (Some(d0), Some(d1)) = (&data.dst, &ndata.dst) else { continue };
        if !d0.same_register(d1) {
            continue;
        }
        let (Some(v0), Some(v1)) = (
            data.src.as_ref().and_then(|s| s.as_imm_int()),
            ndata.src.as_ref().and_then(|s| s.as_imm_int()),
        ) else {
            continue;
        };
        if data.flags != ndata.flags {
            continue;
        }
        let sign0 = if data.opcode == Opcode::Add { 1 } else { -1 };
        let sign1 = if ndata.opcode == Opcode::Add { 1 } else { -1 };
        let delta = v0 * sign0 + v1 * sign1;

        let d = func.data_mut(inst);
        d.opcode = if delta < 0 { Opcode::Sub } else { Opcode::Add };
        d.src = Some(crate::ir::Operand::imm(delta.abs()));
        func.remove_inst(next);
        changed = true;
    }
    changed
}

/// `mov r,-k`→`neg r,#k`; `and r,-k`→`andn r,#~k`; negative-immediate
/// `add`/`sub` flips sign; shift/bit-index operands are masked to 5 bits.
pub fn canonicalize_immediates(func: &mut Function) -> bool {
    let _t = timing::start(timing::Pass::ImmCanon);
    let mut changed = false;
    let insts: Vec<Inst> = func.iter().collect();

    for inst in insts {
        if !func.layout.is_inserted(inst) {
            continue;
        }
        let data = func.data(inst).clone();
        let Some(v) = data.src.as_ref().and_then(|s| s.as_imm_int()) else { continue };

        match data.opcode {
            Opcode::Mov if v < 0 => {
                let d = func.data_mut(inst);
                d.opcode = Opcode::Neg;
                d.src = Some(crate::ir::Operand::imm(-v));
                changed = true;
            }
            Opcode::And if v < 0 => {
                let d = func.data_mut(inst);
                d.opcode = Opcode::AndN;
                d.src = Some(crate::ir::Operand::imm(!v));
                changed = true;
            }
            Opcode::Add if v < 0 => {
                let d = func.data_mut(inst);
                d.opcode = Opcode::Sub;
                d.src = Some(crate::ir::Operand::imm(-v));
                changed = true;
            }
            Opcode::Sub if v < 0 => {
                let d = func.data_mut(inst);
                d.opcode = Opcode::Add;
                d.src = Some(crate::ir::Operand::imm(-v));
                changed = true;
            }
            Opcode::Shl | Opcode::Shr | Opcode::Sar | Opcode::TestB | Opcode::TestBn => {
                let masked = v & 31;
                if masked != v {
                    func.data_mut(inst).src = Some(crate::ir::Operand::imm(masked));
                    changed = true;
                }
            }
            _ => {}
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::operand::{Operand, RegClass};
    use crate::ir::{CallConv, Instruction};

    #[test]
    fn consecutive_adds_coalesce() {
        let mut f = Function::new("t", CallConv::Fast);
        f.push(Instruction::new(Opcode::Add).with_dst(Operand::reg(RegClass::Local, "a")).with_src(Operand::imm(3)));
        f.push(Instruction::new(Opcode::Add).with_dst(Operand::reg(RegClass::Local, "a")).with_src(Operand::imm(4)));
        assert!(coalesce(&mut f));
        assert_eq!(f.num_insts(), 1);
        let only = f.iter().next().unwrap();
        assert_eq!(f.data(only).src.as_ref().unwrap().as_imm_int(), Some(7));
    }

    #[test]
    fn negative_mov_becomes_neg() {
        let mut f = Function::new("t", CallConv::Fast);
        f.push(Instruction::new(Opcode::Mov).with_dst(Operand::reg(RegClass::Local, "a")).with_src(Operand::imm(-5)));
        assert!(canonicalize_immediates(&mut f));
        let only = f.iter().next().unwrap();
        assert_eq!(f.data(only).opcode, Opcode::Neg);
        assert_eq!(f.data(only).src.as_ref().unwrap().as_imm_int(), Some(5));
    }
}
