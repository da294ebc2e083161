//! Dataflow queries: interpretations over the IR list starting from a
//! given instruction (section 4.2).
//!
//! These are the load-bearing queries almost every pass in `passes/`
//! gates its rewrite on, so unlike the heuristic cycle-count predicates in
//! `inst_predicates`, every answer here must be conservative: "don't
//! know" always resolves to "live"/"unsafe", never the other way.

use crate::config::TargetArch;
use crate::inst_predicates::{self, instr_min_cycles};
use crate::ir::condcodes::Condition;
use crate::ir::operand::{Operand, OperandKind, RegClass};
use crate::ir::opcode::FlagEffects;
use crate::ir::{Function, Inst, Instruction};

/// Recursion depth bound for forward/backward dataflow walks that follow
/// branches — loops are otherwise infinite. Revisiting an instruction
/// already on the walk's stack is treated as "live" for registers, since a
/// loop-carried use is already accounted for by the first visit.
const MAX_DEPTH: u32 = 8;

/// Per operand class, does `call` settle whether `op` is dead as of its
/// return — and if so, which way? `None` means the call doesn't decide
/// the question either way and the scan should keep walking forward from
/// here, the same as for an ordinary non-call instruction.
///
/// Locals never survive a call by convention. `Arg`-class registers carry
/// the callee's actual parameters (the `mov argN,val` convention
/// `inline.rs`'s `args_all_constant` also relies on), so a call to a
/// known, ordinary callee genuinely reads them — live, immediately, the
/// same as any other use. Only the multiply/divide helpers don't: they
/// take their operands through `muldiva`/`muldivb` instead, so an `Arg`
/// register ahead of one of those is untouched and the scan should keep
/// looking for what actually happens to it. `Result`-class registers are
/// the one class an ordinary call does clobber, but only when the call is
/// unconditional — a call that might not execute can't be assumed to have
/// overwritten anything, so that case also falls through to keep
/// scanning rather than deciding either way.
fn call_retires(call: &Instruction, op: &Operand) -> Option<bool> {
    let is_muldiv = inst_predicates::is_muldiv_helper_call(call);
    match &op.kind {
        OperandKind::Reg(RegClass::Local, _) => Some(true),
        OperandKind::Reg(RegClass::Arg, _) => {
            if is_muldiv {
                None
            } else {
                Some(false)
            }
        }
        OperandKind::Reg(RegClass::Result, _) => {
            if !is_muldiv && call.cond.is_always() {
                Some(true)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Walks forward from (not including) `i`. True iff `op` is provably dead
/// — never read before being unconditionally rewritten, or the function
/// ends first.
pub fn is_dead_after(func: &Function, i: Inst, op: &Operand) -> bool {
    if op.is_hardware() {
        return false;
    }
    if matches!(op.kind, OperandKind::SubReg { .. }) {
        // No partial-word liveness tracking.
        return false;
    }
    scan_dead(func, i, op, &mut Vec::new(), MAX_DEPTH)
}

fn scan_dead(func: &Function, from: Inst, op: &Operand, visited: &mut Vec<Inst>, depth: u32) -> bool {
    let mut cur = func.layout.next(from);
    while let Some(inst) = cur {
        if visited.contains(&inst) {
            return true;
        }
        let data = func.data(inst);
        if data.is_effectively_dead() {
            cur = func.layout.next(inst);
            continue;
        }
        if inst_predicates::uses(data, op) {
            return false;
        }
        if data.opcode.is_return() {
            return !op.is_result();
        }
        if data.opcode.is_call() {
            if let Some(dead) = call_retires(data, op) {
                return dead;
            }
        }
        if inst_predicates::modifies(data, op) && data.cond.is_always() {
            return true;
        }
        if inst_predicates::is_jump(data) {
            if depth == 0 {
                return false;
            }
            let dead_on_taken = match data.jump_target() {
                Some(target) => {
                    visited.push(inst);
                    let label = func.data(target);
                    let r = if label.is_label() {
                        scan_dead(func, target, op, visited, depth - 1)
                    } else {
                        false
                    };
                    visited.pop();
                    r
                }
                None => false,
            };
            if data.cond.is_always() {
                return dead_on_taken;
            }
            // Conditional: dead only if dead on both the taken and the
            // fallthrough path.
            if !dead_on_taken {
                return false;
            }
        }
        cur = func.layout.next(inst);
    }
    true
}

/// Which of C/Z are still dead after `i` (symmetric to [`is_dead_after`],
/// restricted to the flag lattice).
pub fn flags_dead_after(func: &Function, i: Inst, flags: FlagEffects) -> bool {
    let want_c = flags.contains(FlagEffects::WC);
    let want_z = flags.contains(FlagEffects::WZ);
    scan_flags_dead(func, i, want_c, want_z, &mut Vec::new(), MAX_DEPTH)
}

fn scan_flags_dead(
    func: &Function,
    from: Inst,
    mut want_c: bool,
    mut want_z: bool,
    visited: &mut Vec<Inst>,
    depth: u32,
) -> bool {
    if !want_c && !want_z {
        return true;
    }
    let mut cur = func.layout.next(from);
    while let Some(inst) = cur {
        if visited.contains(&inst) {
            return false;
        }
        let data = func.data(inst);
        if data.is_label() {
            // Conservatively assume flags are not needed across arbitrary
            // control-flow joins unless a known predecessor set says
            // otherwise; the label itself doesn't consume flags.
        } else {
            let (reads_c, reads_z) = inst_predicates::flags_used_by_cond(data.cond);
            if (want_c && reads_c) || (want_z && reads_z) {
                return false;
            }
            if want_c && data.flags.writes_c_unconditionally() {
                want_c = false;
            }
            if want_z && data.flags.writes_z_unconditionally() {
                want_z = false;
            }
            if !want_c && !want_z {
                return true;
            }
        }
        if inst_predicates::is_jump(data) {
            if depth == 0 {
                return false;
            }
            match data.jump_target() {
                Some(target) => {
                    visited.push(inst);
                    let r = scan_flags_dead(func, target, want_c, want_z, visited, depth - 1);
                    visited.pop();
                    if data.cond.is_always() {
                        return r;
                    }
                    if !r {
                        return false;
                    }
                }
                None => return false,
            }
        }
        cur = func.layout.next(inst);
    }
    true
}

/// Can every subsequent use of `orig` between `first` and the end of its
/// live range be rewritten to `replace` without changing semantics?
pub fn safe_to_replace_forward(
    func: &Function,
    first: Inst,
    orig: &Operand,
    replace: &Operand,
    setter_cond: Condition,
) -> bool {
    if replace.is_hardware() || matches!(replace.kind, OperandKind::SubReg { .. }) {
        return false;
    }
    let mut condition_safe = true;
    let mut cur = func.layout.next(first);
    while let Some(inst) = cur {
        let data = func.data(inst);
        if data.is_label() {
            // Without a known, single predecessor we cannot prove nothing
            // else observes `orig` live at this join.
            if !func.label_jumps.has_known_predecessors(inst) {
                return false;
            }
        }
        if data.opcode.is_return() {
            return !orig.is_local_or_arg();
        }
        if data.opcode.is_call() && (inst_predicates::uses(data, orig) || inst_predicates::uses(data, replace)) {
            return false;
        }
        if inst_predicates::modifies(data, replace) {
            let discards_old_and_orig_dead = data.cond.is_always() && is_dead_after(func, inst, orig);
            if !discards_old_and_orig_dead {
                return false;
            }
            return true;
        }
        if condition_safe && !cond_is_subset_considering_flags(data.cond, setter_cond) {
            condition_safe = false;
        }
        if !condition_safe && inst_predicates::uses(data, orig) {
            return false;
        }
        cur = func.layout.next(inst);
    }
    true
}

fn cond_is_subset_considering_flags(seen: Condition, setter: Condition) -> bool {
    inst_predicates::cond_is_subset(setter, seen) || seen.is_always()
}

/// Symmetric backward scan: is it safe to fold `mov replace, orig; ... use
/// orig` into `... use replace`? Returns the earliest instruction at
/// which the substitution becomes safe, walking up through a label's
/// known jump-list predecessors.
pub fn safe_to_replace_back(func: &Function, i: Inst, orig: &Operand, replace: &Operand) -> Option<Inst> {
    scan_back(func, i, orig, replace, &mut Vec::new(), MAX_DEPTH)
}

fn scan_back(
    func: &Function,
    from: Inst,
    orig: &Operand,
    replace: &Operand,
    visited: &mut Vec<Inst>,
    depth: u32,
) -> Option<Inst> {
    let mut cur = func.layout.prev(from);
    let mut earliest = from;
    while let Some(inst) = cur {
        if visited.contains(&inst) {
            return None;
        }
        let data = func.data(inst);
        if data.is_label() {
            let preds = func.label_jumps.jumps_to(inst);
            if preds.is_empty() && !func.label_jumps.has_known_predecessors(inst) {
                return None;
            }
            visited.push(inst);
            for &p in preds {
                scan_back(func, p, orig, replace, visited, depth.saturating_sub(1))?;
            }
            visited.pop();
            earliest = inst;
            cur = func.layout.prev(inst);
            continue;
        }
        if inst_predicates::modifies(data, replace) || inst_predicates::modifies(data, orig) {
            return None;
        }
        earliest = inst;
        cur = func.layout.prev(inst);
    }
    Some(earliest)
}

/// Most recent unconditional instruction writing `op`, not crossing a
/// label or branch, refusing if anything in between uses or modifies the
/// setter's own source operand.
pub fn find_prev_setter_for_replace(func: &Function, i: Inst, op: &Operand) -> Option<Inst> {
    find_prev_setter(func, i, op, false)
}

/// As above, but also refusing to cross an instruction that sets flags
/// (since a compare's setter must not have its flag-producing context
/// disturbed).
pub fn find_prev_setter_for_compare(func: &Function, i: Inst, op: &Operand) -> Option<Inst> {
    find_prev_setter(func, i, op, true)
}

fn find_prev_setter(func: &Function, i: Inst, op: &Operand, refuse_flag_setters: bool) -> Option<Inst> {
    let mut cur = func.layout.prev(i);
    while let Some(inst) = cur {
        let data = func.data(inst);
        if data.is_label() || inst_predicates::is_branch(data) {
            return None;
        }
        if refuse_flag_setters && (data.flags.writes_c() || data.flags.writes_z()) && !inst_predicates::modifies(data, op) {
            return None;
        }
        if inst_predicates::modifies(data, op) {
            if !data.cond.is_always() {
                return None;
            }
            return Some(inst);
        }
        if inst_predicates::uses(data, op) {
            return None;
        }
        cur = func.layout.prev(inst);
    }
    None
}

pub fn used_in_range(func: &Function, a: Inst, b: Inst, reg: &Operand) -> bool {
    walk_range(func, a, b, |data| inst_predicates::uses(data, reg))
}

pub fn modified_in_range(func: &Function, a: Inst, b: Inst, reg: &Operand) -> bool {
    walk_range(func, a, b, |data| inst_predicates::modifies(data, reg))
}

pub fn flags_change_in_range(func: &Function, a: Inst, b: Inst, flags: FlagEffects) -> bool {
    let c = flags.contains(FlagEffects::WC);
    let z = flags.contains(FlagEffects::WZ);
    walk_range(func, a, b, |data| {
        (c && data.flags.writes_c()) || (z && data.flags.writes_z())
    })
}

pub fn read_write_in_range(func: &Function, a: Inst, b: Inst) -> bool {
    walk_range(func, a, b, |data| data.opcode.is_memory())
}

pub fn write_in_range(func: &Function, a: Inst, b: Inst) -> bool {
    walk_range(func, a, b, |data| data.opcode.is_memory_write())
}

fn walk_range(func: &Function, a: Inst, b: Inst, mut pred: impl FnMut(&crate::ir::Instruction) -> bool) -> bool {
    let mut cur = Some(a);
    while let Some(inst) = cur {
        if pred(func.data(inst)) {
            return true;
        }
        if inst == b {
            break;
        }
        cur = func.layout.next(inst);
    }
    false
}

pub fn min_cycles_in_range(func: &Function, a: Inst, b: Inst, arch: TargetArch) -> u32 {
    sum_range(func, a, b, arch, instr_min_cycles)
}

/// Upper-bound cycle estimate for branchy code, used only to bias the
/// F-cache window-fit heuristic toward loops that look actually hot
/// (section 4.2 supplement); never load-bearing for correctness.
pub fn max_cycles_in_range(func: &Function, a: Inst, b: Inst, arch: TargetArch) -> u32 {
    sum_range(func, a, b, arch, |data, arch| {
        instr_min_cycles(data, arch) + if data.opcode.is_branch() { 4 } else { 0 }
    })
}

fn sum_range(
    func: &Function,
    a: Inst,
    b: Inst,
    arch: TargetArch,
    mut cost: impl FnMut(&crate::ir::Instruction, TargetArch) -> u32,
) -> u32 {
    let mut total = 0;
    let mut cur = Some(a);
    while let Some(inst) = cur {
        total += cost(func.data(inst), arch);
        if inst == b {
            break;
        }
        cur = func.layout.next(inst);
    }
    total
}

/// Centralizes the barrier test shared by the CORDIC reorderer (4.6) and
/// the branch-hoist pass (4.3): true for anything a reorder could not
/// safely cross.
pub fn is_reorder_barrier(func: &Function, i: Inst) -> bool {
    let data = func.data(i);
    data.volatile
        || inst_predicates::is_branch(data)
        || data.is_label()
        || inst_predicates::is_cordic_command(data)
        || inst_predicates::is_cordic_get(data)
        || data.opcode.is_hardware_touch()
        || data.opcode.is_lock_class()
        || data.opcode.is_wait_class()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CallConv, Function, Instruction, Opcode};

    fn reg(name: &str) -> Operand {
        Operand::reg(RegClass::Local, name)
    }

    #[test]
    fn straight_line_dead_after_unconditional_overwrite() {
        let mut f = Function::new("t", CallConv::Fast);
        let i0 = f.push(Instruction::new(Opcode::Mov).with_dst(reg("a")).with_src(reg("b")));
        f.push(Instruction::new(Opcode::Mov).with_dst(reg("a")).with_src(reg("c")));
        assert!(is_dead_after(&f, i0, &reg("a")));
    }

    #[test]
    fn straight_line_live_when_used_before_overwrite() {
        let mut f = Function::new("t", CallConv::Fast);
        let i0 = f.push(Instruction::new(Opcode::Mov).with_dst(reg("a")).with_src(reg("b")));
        f.push(Instruction::new(Opcode::Add).with_dst(reg("x")).with_src(reg("a")));
        f.push(Instruction::new(Opcode::Mov).with_dst(reg("a")).with_src(reg("c")));
        assert!(!is_dead_after(&f, i0, &reg("a")));
    }

    #[test]
    fn hardware_register_never_dead() {
        let mut f = Function::new("t", CallConv::Fast);
        let i0 = f.push(Instruction::new(Opcode::Mov).with_dst(Operand::hw("dira")).with_src(reg("b")));
        assert!(!is_dead_after(&f, i0, &Operand::hw("dira")));
    }

    fn arg(name: &str) -> Operand {
        Operand::reg(RegClass::Arg, name)
    }

    fn result(name: &str) -> Operand {
        Operand::reg(RegClass::Result, name)
    }

    // An ordinary call reads its argument registers by convention even
    // though nothing in the caller's own instruction list names them.
    #[test]
    fn arg_register_is_live_across_an_ordinary_call() {
        let mut f = Function::new("t", CallConv::Fast);
        let i0 = f.push(Instruction::new(Opcode::Mov).with_dst(arg("arg0")).with_src(Operand::imm(5)));
        f.push(Instruction::new(Opcode::Call).with_dst(Operand::cog_label("foo")));
        f.push(Instruction::new(Opcode::Ret));
        assert!(!is_dead_after(&f, i0, &arg("arg0")));
    }

    // The multiply/divide helpers take their operands through
    // `muldiva`/`muldivb` only, so a plain `Arg` register ahead of one
    // goes dead at the function's end same as if the call weren't there.
    #[test]
    fn arg_register_is_dead_across_a_muldiv_call() {
        let mut f = Function::new("t", CallConv::Fast);
        let i0 = f.push(Instruction::new(Opcode::Mov).with_dst(arg("arg0")).with_src(Operand::imm(5)));
        f.push(Instruction::new(Opcode::Call).with_dst(Operand::cog_label("builtin_mul_32")));
        f.push(Instruction::new(Opcode::Ret));
        assert!(is_dead_after(&f, i0, &arg("arg0")));
    }

    // An unconditional, non-muldiv call resets result registers — a
    // definition of one just before such a call can't survive it.
    #[test]
    fn result_register_is_dead_across_an_unconditional_call() {
        let mut f = Function::new("t", CallConv::Fast);
        let i0 = f.push(Instruction::new(Opcode::Mov).with_dst(result("r")).with_src(Operand::imm(1)));
        f.push(Instruction::new(Opcode::Call).with_dst(Operand::cog_label("foo")));
        f.push(Instruction::new(Opcode::Ret));
        assert!(is_dead_after(&f, i0, &result("r")));
    }

    // A call that might not execute can't be assumed to have clobbered
    // anything, so a conditional call must not retire a result register
    // — the scan keeps going and finds the value observable at `ret`.
    #[test]
    fn result_register_stays_live_across_a_conditional_call() {
        let mut f = Function::new("t", CallConv::Fast);
        let i0 = f.push(Instruction::new(Opcode::Mov).with_dst(result("r")).with_src(Operand::imm(1)));
        f.push(Instruction::new(Opcode::Call).with_dst(Operand::cog_label("foo")).with_cond(Condition::IF_E));
        f.push(Instruction::new(Opcode::Ret));
        assert!(!is_dead_after(&f, i0, &result("r")));
    }
}
