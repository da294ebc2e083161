//! Multiply/divide helper call deduplication (section 4.3 supplement).
//!
//! The frontend lowers `a * b` / `a / b` to `mov muldiva,a; mov
//! muldivb,b; call #muldiv_helper`. When two such call sequences are
//! adjacent and load the identical operand pair into `muldiva`/`muldivb`,
//! the second pair of loads is redundant — the hardware registers still
//! hold the values from the first call, provided nothing between the two
//! call sites touches `muldiva`, `muldivb`, or either source operand.

use crate::dataflow::modified_in_range;
use crate::inst_predicates;
use crate::ir::opcode::Opcode;
use crate::ir::operand::Operand;
use crate::ir::{Function, Inst};
use crate::timing;

struct MulDivCall {
    call: Inst,
    mov_a: Inst,
    mov_b: Inst,
    a_val: Operand,
    b_val: Operand,
    helper: crate::ir::operand::Symbol,
}

fn match_call(func: &Function, call: Inst) -> Option<MulDivCall> {
    let data = func.data(call).clone();
    if data.opcode != Opcode::Call || !data.cond.is_always() || !inst_predicates::is_muldiv_helper_call(&data) {
        return None;
    }
    let name = match data.dst.as_ref().map(|d| &d.kind) {
        Some(crate::ir::operand::OperandKind::ImmCogLabel(name)) => name.clone(),
        _ => return None,
    };
    let mov_b = func.layout.prev(call)?;
    let mov_a = func.layout.prev(mov_b)?;
    let b = func.data(mov_b).clone();
    let a = func.data(mov_a).clone();
    if a.opcode != Opcode::Mov || b.opcode != Opcode::Mov || !a.cond.is_always() || !b.cond.is_always() {
        return None;
    }
    if !is_hw(&a.dst, "muldiva") || !is_hw(&b.dst, "muldivb") {
        return None;
    }
    Some(MulDivCall {
        call,
        mov_a,
        mov_b,
        a_val: a.src?,
        b_val: b.src?,
        helper: name,
    })
}

fn is_hw(op: &Option<Operand>, name: &str) -> bool {
    matches!(op.as_ref().map(|o| &o.kind), Some(crate::ir::operand::OperandKind::RegHw(n)) if n.as_ref() == name)
}

pub fn run(func: &mut Function) -> bool {
    let _t = timing::start(timing::Pass::MulDiv);
    let mut changed = false;
    let calls: Vec<Inst> = func
        .iter()
        .filter(|&i| func.data(i).opcode == Opcode::Call)
        .collect();

    let mut prev: Option<MulDivCall> = None;
    for call in calls {
        if !func.layout.is_inserted(call) {
            continue;
        }
        let Some(cur) = match_call(func, call) else {
            prev = None;
            continue;
        };
        if let Some(p) = &prev {
            let same_inputs = p.a_val == cur.a_val && p.b_val == cur.b_val && p.helper == cur.helper;
            let untouched = !modified_in_range(func, p.call, cur.mov_a, &cur.a_val)
                && !modified_in_range(func, p.call, cur.mov_a, &cur.b_val)
                && !modified_in_range(func, p.call, cur.mov_a, &Operand::reg(crate::ir::operand::RegClass::Global, "muldiva"))
                && !modified_in_range(func, p.call, cur.mov_a, &Operand::reg(crate::ir::operand::RegClass::Global, "muldivb"));
            if same_inputs && untouched {
                func.remove_inst(cur.mov_a);
                func.remove_inst(cur.mov_b);
                changed = true;
                prev = Some(cur);
                continue;
            }
        }
        prev = Some(cur);
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::function::CallConv;
    use crate::ir::opcode::FlagEffects;
    use crate::ir::operand::RegClass;
    use crate::ir::Instruction;

    #[test]
    fn repeated_muldiv_reload_is_dropped() {
        let mut func = Function::new("t", CallConv::Fast);
        let a = Operand::reg(RegClass::Local, "a");
        let b = Operand::reg(RegClass::Local, "b");
        for _ in 0..2 {
            func.push(Instruction::new(Opcode::Mov).with_dst(Operand::hw("muldiva")).with_src(a.clone()));
            func.push(Instruction::new(Opcode::Mov).with_dst(Operand::hw("muldivb")).with_src(b.clone()));
            func.push(Instruction::new(Opcode::Call).with_dst(Operand::cog_label("builtin_mul_32")).with_flags(FlagEffects::empty()));
        }
        assert!(run(&mut func));
        assert_eq!(func.num_insts(), 4);
    }
}
