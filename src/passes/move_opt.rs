//! Move elimination and coalescing (section 4.3).

use crate::dataflow::{is_dead_after, safe_to_replace_forward};
use crate::inst_predicates;
use crate::ir::operand::OperandKind;
use crate::ir::opcode::{FlagEffects, Opcode};
use crate::ir::{Function, Inst, Operand};
use crate::timing;

pub fn run(func: &mut Function) -> bool {
    let _t = timing::start(timing::Pass::MoveOpt);
    let mut changed = false;
    let insts: Vec<Inst> = func.iter().collect();

    for inst in insts {
        if !func.layout.is_inserted(inst) {
            continue;
        }
        let data = func.data(inst).clone();
        if data.opcode != Opcode::Mov {
            continue;
        }
        let (Some(dst), Some(src)) = (data.dst.clone(), data.src.clone()) else { continue };

        // `mov r,r` is always a no-op, with or without flags.
        if dst.same_register(&src) {
            if data.flags.contains(FlagEffects::WZ) {
                if fold_wz_into_previous(func, inst) {
                    changed = true;
                    continue;
                }
            }
            func.remove_inst(inst);
            changed = true;
            continue;
        }

        // `mov a,b` with `a` dead shortly after is pure dead-store;
        // DCE handles it, nothing to forward here.
        if is_dead_after(func, inst, &dst) {
            continue;
        }

        // `mov a,b ... mov b,a` — the second is a no-op once the first has
        // run, since `a` already equals `b`'s old value only if nothing
        // redefined either in between; handled conservatively by requiring
        // adjacency-free straight runs via `modifies` checks during the
        // scan below.
        if let Some(next) = find_redundant_reverse_mov(func, inst, &dst, &src) {
            func.remove_inst(next);
            changed = true;
            continue;
        }

        // `mov a,b` register-to-register: if every downstream use of `a`
        // can be legally rewritten to read `b` instead, do it. `a` then has
        // no remaining uses and the `mov` itself falls to DCE next round.
        // Immediate sources are `const_prop`'s job, not this pass's.
        if matches!(src.kind, OperandKind::Reg(..))
            && dst.is_local_or_arg()
            && safe_to_replace_forward(func, inst, &dst, &src, data.cond)
            && rewrite_uses_forward(func, inst, &dst, &src)
        {
            changed = true;
        }
    }
    changed
}

/// Rewrite every read of `orig` with `replace` from just after `after`
/// onward, stopping at the same boundary `safe_to_replace_forward` already
/// proved is safe: a call, return, label with unknown predecessors, or a
/// redefinition of `replace`.
fn rewrite_uses_forward(func: &mut Function, after: Inst, orig: &Operand, replace: &Operand) -> bool {
    let mut changed = false;
    let mut cur = func.layout.next(after);
    while let Some(inst) = cur {
        let data = func.data(inst).clone();
        if data.is_label() && !func.label_jumps.has_known_predecessors(inst) {
            break;
        }
        if data.opcode.is_return() || (data.opcode.is_call() && inst_predicates::uses(&data, orig)) {
            break;
        }
        let d = func.data_mut(inst);
        for slot in [&mut d.src, &mut d.src2] {
            if slot.as_ref().is_some_and(|o| o.same_register(orig)) {
                *slot = Some(replace.clone());
                changed = true;
            }
        }
        if inst_predicates::reads_dst(&data) && d.dst.as_ref().is_some_and(|o| o.same_register(orig)) {
            d.dst = Some(replace.clone());
            changed = true;
        }
        if inst_predicates::modifies(&data, replace) {
            break;
        }
        cur = func.layout.next(inst);
    }
    changed
}

fn fold_wz_into_previous(func: &mut Function, inst: Inst) -> bool {
    let Some(prev) = func.layout.prev(inst) else { return false };
    let pdata = func.data(prev);
    if pdata.is_label() || !pdata.cond.is_always() {
        return false;
    }
    if pdata.flags.contains(FlagEffects::WZ) {
        return false;
    }
    func.data_mut(prev).flags |= FlagEffects::WZ;
    func.remove_inst(inst);
    true
}

/// Looks for `mov b,a` reachable straight-line from `mov a,b` with no
/// intervening modification of either register.
fn find_redundant_reverse_mov(func: &Function, after: Inst, a: &crate::ir::Operand, b: &crate::ir::Operand) -> Option<Inst> {
    let mut cur = func.layout.next(after);
    while let Some(inst) = cur {
        let data = func.data(inst);
        if data.is_label() || data.opcode.is_call() || data.opcode.is_branch() {
            return None;
        }
        if data.opcode == Opcode::Mov && data.cond.is_always() {
            if let (Some(d), Some(s)) = (&data.dst, &data.src) {
                if d.same_register(b) && s.same_register(a) {
                    return Some(inst);
                }
            }
        }
        if crate::inst_predicates::modifies(data, a) || crate::inst_predicates::modifies(data, b) {
            return None;
        }
        cur = func.layout.next(inst);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::operand::{Operand, RegClass};
    use crate::ir::{CallConv, Instruction};

    #[test]
    fn self_move_is_removed() {
        let mut f = Function::new("t", CallConv::Fast);
        f.push(Instruction::new(Opcode::Mov).with_dst(Operand::reg(RegClass::Local, "a")).with_src(Operand::reg(RegClass::Local, "a")));
        assert!(run(&mut f));
        assert_eq!(f.num_insts(), 0);
    }

    #[test]
    fn reverse_move_pair_collapses() {
        let mut f = Function::new("t", CallConv::Fast);
        f.push(Instruction::new(Opcode::Mov).with_dst(Operand::reg(RegClass::Local, "a")).with_src(Operand::reg(RegClass::Local, "b")));
        f.push(Instruction::new(Opcode::Add).with_dst(Operand::reg(RegClass::Result, "r")).with_src(Operand::reg(RegClass::Local, "a")));
        f.push(Instruction::new(Opcode::Mov).with_dst(Operand::reg(RegClass::Local, "b")).with_src(Operand::reg(RegClass::Local, "a")));
        assert!(run(&mut f));
        assert_eq!(f.num_insts(), 2);
    }

    // `a`'s remaining use is safe to rewrite to `b` once something proves
    // `b` gets overwritten (with `a` already dead) before any return, since
    // that bounds how far the substitution has to hold.
    #[test]
    fn forward_substitution_fires_once_replacement_is_redefined() {
        let mut f = Function::new("t", CallConv::Fast);
        f.push(Instruction::new(Opcode::Mov).with_dst(Operand::reg(RegClass::Local, "a")).with_src(Operand::reg(RegClass::Local, "b")));
        let add1 = f.push(Instruction::new(Opcode::Add).with_dst(Operand::reg(RegClass::Result, "r1")).with_src(Operand::reg(RegClass::Local, "a")));
        f.push(Instruction::new(Opcode::Mov).with_dst(Operand::reg(RegClass::Local, "b")).with_src(Operand::reg(RegClass::Local, "c")));
        assert!(run(&mut f));
        let rewritten = f.data(add1).src.as_ref().unwrap().same_register(&Operand::reg(RegClass::Local, "b"));
        assert!(rewritten);
        assert_eq!(f.num_insts(), 3);
    }

    // With no redefinition of `b` anywhere before the function returns,
    // nothing rules out the caller observing `a`'s value at that point, so
    // the substitution must not fire.
    #[test]
    fn forward_substitution_does_not_cross_a_return_with_no_redefinition() {
        let mut f = Function::new("t", CallConv::Fast);
        f.push(Instruction::new(Opcode::Mov).with_dst(Operand::reg(RegClass::Local, "a")).with_src(Operand::reg(RegClass::Local, "b")));
        let add1 = f.push(Instruction::new(Opcode::Add).with_dst(Operand::reg(RegClass::Result, "r1")).with_src(Operand::reg(RegClass::Local, "a")));
        f.push(Instruction::new(Opcode::Ret));
        assert!(!run(&mut f));
        let unchanged = f.data(add1).src.as_ref().unwrap().same_register(&Operand::reg(RegClass::Local, "a"));
        assert!(unchanged);
        assert_eq!(f.num_insts(), 3);
    }
}
