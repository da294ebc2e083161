//! Longfill lowering (section 4.3): a call to the runtime
//! `builtin_longfill_` whose value argument is a known constant is
//! replaced with the inline `SETQ`-fill idiom.

use crate::ir::condcodes::Condition;
use crate::ir::opcode::FlagEffects;
use crate::ir::operand::RegClass;
use crate::ir::{Function, Inst, Instruction, Opcode, Operand};
use crate::timing;

const LONGFILL_HELPER: &str = "builtin_longfill_";

pub fn run(func: &mut Function) -> bool {
    let _t = timing::start(timing::Pass::Longfill);
    let mut changed = false;
    let insts: Vec<Inst> = func.iter().collect();

    for inst in insts {
        if !func.layout.is_inserted(inst) {
            continue;
        }
        let data = func.data(inst).clone();
        if data.opcode != Opcode::Call {
            continue;
        }
        let is_longfill = matches!(
            data.dst.as_ref().map(|d| &d.kind),
            Some(crate::ir::operand::OperandKind::ImmCogLabel(name)) if name.as_ref() == LONGFILL_HELPER
        );
        if !is_longfill {
            continue;
        }
        let Some(k) = data.src.as_ref().and_then(|s| s.as_imm_int()) else { continue };

        let cnt = Operand::reg(RegClass::Global, "cnt");
        let ptr = Operand::reg(RegClass::Global, "ptr");

        func.insert_before(
            Instruction::new(Opcode::Sub).with_dst(cnt.clone()).with_src(Operand::imm(1)).with_flags(FlagEffects::WC),
            inst,
        );
        func.insert_before(
            Instruction::new(Opcode::SetQ).with_dst(cnt).with_cond(Condition::IF_NC),
            inst,
        );
        func.insert_before(
            Instruction::new(Opcode::WrLong).with_dst(Operand::imm(k)).with_src(ptr).with_cond(Condition::IF_NC),
            inst,
        );
        func.remove_inst(inst);
        changed = true;
    }
    changed
}
