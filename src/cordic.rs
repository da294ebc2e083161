//! CORDIC pipelining and constant folding (section 4.6).
//!
//! A CORDIC command (`QMUL`/`QDIV`/`QFRAC`/`QROTATE`/`QSQRT`/`QVECTOR`/
//! `QLOG`/`QEXP`) needs 56 cycles before its paired `GETQX`/`GETQY` can
//! read a result. The reorderer hoists nearby independent instructions
//! into that gap so the pipeline latency is hidden instead of stalling.
//!
//! **Simplification from the full algorithm** (documented in
//! `DESIGN.md`): motion is one instruction at a time, pulled from
//! immediately after the `GET`, rather than the maximal contiguous block
//! the reference design searches for from both ends. In practice the two
//! converge for the common case of a handful of scalar instructions
//! between command and get; wide blocks are left for a future pass.

use crate::config::TargetArch;
use crate::dataflow::{is_reorder_barrier, min_cycles_in_range};
use crate::ir::opcode::Opcode;
use crate::ir::{Function, Inst, Operand};
use crate::timing;

const PIPELINE_CYCLES: u32 = 56;
const SEARCH_BOUND: u32 = 64;

/// The per-round part (constant folding plus stray-command cleanup), run
/// alongside the other cheap passes until a whole round makes no change.
/// Pipeline reordering is deliberately not included here: it is run once
/// on its own after the round converges, and only re-enters the round if
/// it moved anything (see [`pipeline_reorder`]).
pub fn fold_and_clean(func: &mut Function) -> bool {
    let mut changed = false;
    changed |= fold_constants(func);
    changed |= clean_stray_commands(func);
    changed
}

/// Standalone entry point combining every step, for callers that don't
/// need the round/pipeline split `driver` relies on (and for the unit
/// tests below).
pub fn run(func: &mut Function, arch: TargetArch) -> bool {
    let _t = timing::start(timing::Pass::CordicReorder);
    let mut changed = fold_and_clean(func);
    changed |= pipeline_reorder(func, arch);
    changed
}

fn find_paired_get(func: &Function, cmd: Inst) -> Option<Inst> {
    let mut cur = func.layout.next(cmd);
    let mut steps = 0;
    while let Some(i) = cur {
        if steps > SEARCH_BOUND {
            return None;
        }
        let data = func.data(i);
        if data.opcode.is_cordic_get() {
            return Some(i);
        }
        if data.opcode.is_cordic_command() || data.opcode.is_branch() || data.opcode.is_label() {
            return None;
        }
        cur = func.layout.next(i);
        steps += 1;
    }
    None
}

/// True if a second `GET` still expects the same command's hardware
/// result right after the first — constant-folding the command would
/// strand it.
fn has_second_consumer(func: &Function, get: Inst) -> bool {
    let mut cur = func.layout.next(get);
    let mut steps = 0;
    while let Some(i) = cur {
        if steps > 4 {
            return false;
        }
        let data = func.data(i);
        if data.opcode.is_cordic_get() {
            return true;
        }
        if data.opcode.is_cordic_command() || data.opcode.is_label() {
            return false;
        }
        cur = func.layout.next(i);
        steps += 1;
    }
    false
}

/// The value a `GET` reads from a constant `QMUL`/`QDIV` of `a`, `b`.
fn eval_get(cmd_opcode: Opcode, a: i64, b: i64, get_opcode: Opcode) -> Option<i64> {
    match (cmd_opcode, get_opcode) {
        (Opcode::QMul, Opcode::GetQx) => {
            let p = (a as u32 as u64).wrapping_mul(b as u32 as u64);
            Some((p & 0xFFFF_FFFF) as u32 as i32 as i64)
        }
        (Opcode::QMul, Opcode::GetQy) => {
            let p = (a as u32 as u64).wrapping_mul(b as u32 as u64);
            Some(((p >> 32) & 0xFFFF_FFFF) as u32 as i32 as i64)
        }
        (Opcode::QDiv, Opcode::GetQx) if b != 0 => Some(((a as u32 as u64) / (b as u32 as u64)) as u32 as i32 as i64),
        (Opcode::QDiv, Opcode::GetQy) if b != 0 => Some(((a as u32 as u64) % (b as u32 as u64)) as u32 as i32 as i64),
        _ => None,
    }
}

fn fold_constants(func: &mut Function) -> bool {
    let mut changed = false;
    let cmds: Vec<Inst> = func
        .iter()
        .filter(|&i| func.data(i).opcode.is_cordic_command())
        .collect();

    for cmd in cmds {
        if !func.layout.is_inserted(cmd) {
            continue;
        }
        let data = func.data(cmd).clone();
        if !matches!(data.opcode, Opcode::QMul | Opcode::QDiv) || !data.cond.is_always() {
            continue;
        }
        let (Some(a), Some(b)) = (
            data.dst.as_ref().and_then(|d| d.as_imm_int()),
            data.src.as_ref().and_then(|s| s.as_imm_int()),
        ) else {
            continue;
        };
        let Some(get) = find_paired_get(func, cmd) else { continue };
        let get_data = func.data(get).clone();
        if !get_data.cond.is_always() {
            continue;
        }
        let Some(dst) = get_data.dst.clone() else { continue };
        let Some(value) = eval_get(data.opcode, a, b, get_data.opcode) else { continue };

        // A `GETQX`/`GETQY` pair off the same command both expect its
        // result; the second one is rewritten in place to its own `mov`
        // since the command's single `mov` replacement can only stand in
        // for the first.
        let second = has_second_consumer(func, get).then(|| find_paired_get(func, get)).flatten();
        match second {
            Some(second) => {
                let second_data = func.data(second).clone();
                let (Some(second_dst), true) = (second_data.dst.clone(), second_data.cond.is_always()) else { continue };
                let Some(second_value) = eval_get(data.opcode, a, b, second_data.opcode) else { continue };
                let sd = func.data_mut(second);
                sd.opcode = Opcode::Mov;
                sd.dst = Some(second_dst);
                sd.src = Some(Operand::imm(second_value));
                sd.src2 = None;
            }
            None if has_second_consumer(func, get) => continue,
            None => {}
        }

        let d = func.data_mut(cmd);
        d.opcode = Opcode::Mov;
        d.dst = Some(dst);
        d.src = Some(Operand::imm(value));
        d.src2 = None;
        changed = true;
    }
    changed
}

fn can_hoist_into_gap(func: &Function, cmd: Inst, get: Inst, candidate: Inst) -> bool {
    if is_reorder_barrier(func, candidate) {
        return false;
    }
    let c = func.data(candidate);
    if !c.cond.is_always() {
        return false;
    }
    let get_dst = func.data(get).dst.clone();
    let cmd_data = func.data(cmd).clone();
    let touches = |op: &Option<Operand>| -> bool {
        op.as_ref().is_some_and(|o| {
            get_dst.as_ref().is_some_and(|g| g.same_register(o))
                || cmd_data.dst.as_ref().is_some_and(|d| d.same_register(o))
                || cmd_data.src.as_ref().is_some_and(|s| s.same_register(o))
        })
    };
    !touches(&c.dst) && !touches(&c.src) && !touches(&c.src2)
}

/// Hoist instructions into a CORDIC command's 56-cycle pipeline gap. Run
/// once after the cheap round converges; the driver re-enters the round
/// if this changed anything, since freeing up the gap can expose new
/// dead code or move candidates for the other passes.
pub fn pipeline_reorder(func: &mut Function, arch: TargetArch) -> bool {
    let _t = timing::start(timing::Pass::CordicReorder);
    let mut changed = false;
    let cmds: Vec<Inst> = func
        .iter()
        .filter(|&i| func.data(i).opcode.is_cordic_command())
        .collect();

    for cmd in cmds {
        if !func.layout.is_inserted(cmd) {
            continue;
        }
        let Some(get) = find_paired_get(func, cmd) else { continue };
        loop {
            if min_cycles_in_range(func, cmd, get, arch) >= PIPELINE_CYCLES {
                break;
            }
            let Some(candidate) = func.layout.next(get) else { break };
            if !can_hoist_into_gap(func, cmd, get, candidate) {
                break;
            }
            func.layout.remove(candidate);
            func.layout.insert_after(candidate, cmd);
            changed = true;
        }
    }
    changed
}

/// A CORDIC command with no matching `GET` anywhere reachable is dead
/// hardware state. This is the user-diagnostic error class: the offending
/// line is always reported, but the instruction is only actually deleted
/// if the user has not marked it `volatile` (their explicit request to
/// keep it untouched).
fn clean_stray_commands(func: &mut Function) -> bool {
    let mut changed = false;
    let cmds: Vec<Inst> = func
        .iter()
        .filter(|&i| func.data(i).opcode.is_cordic_command())
        .collect();
    for cmd in cmds {
        if !func.layout.is_inserted(cmd) {
            continue;
        }
        if find_paired_get(func, cmd).is_some() {
            continue;
        }
        let data = func.data(cmd).clone();
        crate::error::report_user_diagnostic(data.line, format!("CORDIC command `{:?}` has no matching GETQX/GETQY", data.opcode));
        if data.volatile {
            continue;
        }
        func.remove_inst(cmd);
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::function::CallConv;
    use crate::ir::{Function, Instruction};

    #[test]
    fn constant_qmul_folds_to_mov() {
        let mut f = Function::new("t", CallConv::Fast);
        let dst = Operand::reg(crate::ir::operand::RegClass::Local, "x");
        f.push(Instruction::new(Opcode::QMul).with_dst(Operand::imm(6)).with_src(Operand::imm(7)));
        f.push(Instruction::new(Opcode::GetQx).with_dst(dst));
        assert!(run(&mut f, TargetArch::P2));
        let first = f.iter().next().unwrap();
        assert_eq!(f.data(first).opcode, Opcode::Mov);
        assert_eq!(f.data(first).src.as_ref().and_then(|s| s.as_imm_int()), Some(42));
        assert_eq!(f.num_insts(), 1);
    }

    #[test]
    fn stray_command_without_get_is_removed() {
        let mut f = Function::new("t", CallConv::Fast);
        f.push(Instruction::new(Opcode::QMul).with_dst(Operand::imm(1)).with_src(Operand::imm(2)));
        assert!(run(&mut f, TargetArch::P2));
        assert_eq!(f.num_insts(), 0);
    }
}
