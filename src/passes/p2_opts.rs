//! P2 peephole opportunities called out directly in section 4.3 (distinct
//! from the declarative pattern table in `peephole/`, section 4.4): small,
//! single-instruction opcode substitutions plus the `DJNZ`→`REPEAT` loop
//! rewrite.

use crate::dataflow::modified_in_range;
use crate::ir::opcode::Opcode;
use crate::ir::{Function, Inst};
use crate::timing;

pub fn run(func: &mut Function) -> bool {
    let _t = timing::start(timing::Pass::Peephole);
    let mut changed = false;
    let insts: Vec<Inst> = func.iter().collect();

    for inst in insts {
        if !func.layout.is_inserted(inst) {
            continue;
        }
        let data = func.data(inst).clone();
        if !data.cond.is_always() {
            continue;
        }
        let Some(v) = data.src.as_ref().and_then(|s| s.as_imm_int()) else { continue };

        match data.opcode {
            // `mov r,#1; shl r,n` -> `decod r,n`
            Opcode::Mov if v == 1 => {
                if let Some(next) = func.layout.next(inst) {
                    let n = func.data(next).clone();
                    if n.opcode == Opcode::Shl
                        && n.cond.is_always()
                        && n.dst.as_ref().is_some_and(|d| data.dst.as_ref().is_some_and(|dd| dd.same_register(d)))
                    {
                        let shift = n.src.clone();
                        func.remove_inst(next);
                        let d = func.data_mut(inst);
                        d.opcode = Opcode::Decod;
                        d.src = shift;
                        changed = true;
                    }
                }
            }
            // `xor r,#(1<<k)` -> `bitnot r,#k`
            Opcode::Xor if v.count_ones() == 1 => {
                let k = v.trailing_zeros() as i64;
                let d = func.data_mut(inst);
                d.opcode = Opcode::BitNot;
                d.src = Some(crate::ir::Operand::imm(k));
                changed = true;
            }
            _ => {}
        }
    }

    changed |= djnz_to_repeat(func);
    changed
}

/// A `DJNZ` loop whose body never touches the counter register becomes a
/// `REPEAT`/`REPEAT_END` pair, which the emitter lowers to hardware
/// loop-mode on P2.
fn djnz_to_repeat(func: &mut Function) -> bool {
    let mut changed = false;
    let insts: Vec<Inst> = func.iter().collect();
    for inst in insts {
        if !func.layout.is_inserted(inst) {
            continue;
        }
        let data = func.data(inst).clone();
        if data.opcode != Opcode::Djnz || !data.cond.is_always() {
            continue;
        }
        let (Some(target), Some(counter)) = (data.jump_target(), data.dst.clone()) else { continue };
        if func.layout.cmp(target, inst) != std::cmp::Ordering::Less {
            continue;
        }
        let Some(body_start) = func.layout.next(target) else { continue };
        let Some(body_end) = func.layout.prev(inst) else { continue };
        if modified_in_range(func, body_start, body_end, &counter) {
            continue;
        }
        func.data_mut(target).opcode = Opcode::Repeat;
        func.data_mut(inst).opcode = Opcode::RepeatEnd;
        changed = true;
    }
    changed
}
