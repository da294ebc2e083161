//! `apply_condition_after`: the shared helper that rewrites every
//! downstream consumer of a now-statically-known flag pair (section 4.3).
//!
//! **Policy decision (resolves the Open Question in SPEC_FULL.md section
//! 9):** on meeting an opcode it has no rewrite for, this walks back every
//! edit it has made so far and aborts the whole rewrite rather than
//! committing a partial one. A constant fold is a pure optimization; a
//! clean abort is always observably correct, whereas a partial rewrite can
//! leave a flag-setting instruction deleted while a downstream consumer
//! still reads the old (now wrong) flag semantics. See `DESIGN.md`.

use crate::error::report_giving_up;
use crate::ir::condcodes::Condition;
use crate::ir::opcode::{FlagEffects, Opcode};
use crate::ir::{Function, Inst, Instruction, Operand};

/// One edit `apply_condition_after` made, kept so a failed rewrite can be
/// rolled back exactly.
enum Edit {
    Opcode(Inst, Opcode),
    Cond(Inst, Condition),
    Flags(Inst, FlagEffects),
    Src(Inst, Option<Operand>),
}

fn undo(func: &mut Function, edits: Vec<Edit>) {
    for edit in edits.into_iter().rev() {
        match edit {
            Edit::Opcode(i, op) => func.data_mut(i).opcode = op,
            Edit::Cond(i, c) => func.data_mut(i).cond = c,
            Edit::Flags(i, f) => func.data_mut(i).flags = f,
            Edit::Src(i, s) => func.data_mut(i).src = s,
        }
    }
}

/// Rewrite every instruction downstream of a flag-setter now known to
/// have produced `(c_val, z_val)`, stopping at the first instruction that
/// unconditionally re-sets every flag this call is tracking. Returns
/// `true` if every dependent instruction downstream could be rewritten
/// (and the edits are left in place); `false` if the helper gave up,
/// in which case every edit made during this call has been undone.
pub fn apply_condition_after(func: &mut Function, setter: Inst, c_val: bool, z_val: bool) -> bool {
    let mut edits = Vec::new();
    let mut cur = func.layout.next(setter);
    let mut c_live = true;
    let mut z_live = true;
    while let Some(inst) = cur {
        if !c_live && !z_live {
            return true;
        }
        let data = func.data(inst).clone();
        if data.is_label() {
            // Conservatively stop rewriting at a control-flow join; the
            // edits made so far (all strictly between setter and here)
            // remain correct on their own.
            return true;
        }

        // Rewrite the instruction's own condition if it reads a flag we
        // know.
        if !data.cond.is_always() && !data.cond.is_never() {
            if let Some(resolved) = resolve_condition(data.cond, c_live, c_val, z_live, z_val) {
                let new_cond = if resolved { Condition::ALWAYS } else { Condition::NEVER };
                edits.push(Edit::Cond(inst, data.cond));
                func.data_mut(inst).cond = new_cond;
            }
        }

        // Rewrite flag-dependent opcodes with a known literal replacement.
        if data.opcode.is_flag_conditional_alu() {
            match rewrite_flag_conditional(data.opcode, c_live, c_val, z_live, z_val) {
                Some(new_op) => {
                    edits.push(Edit::Opcode(inst, data.opcode));
                    func.data_mut(inst).opcode = new_op;
                }
                None => {
                    report_giving_up("apply_condition_after", data.opcode);
                    undo(func, edits);
                    return false;
                }
            }
        }

        if matches!(data.opcode, Opcode::WrC | Opcode::WrNc | Opcode::WrZ | Opcode::WrNz) {
            let bit = match data.opcode {
                Opcode::WrC => c_val,
                Opcode::WrNc => !c_val,
                Opcode::WrZ => z_val,
                Opcode::WrNz => !z_val,
                _ => unreachable!(),
            };
            edits.push(Edit::Opcode(inst, data.opcode));
            edits.push(Edit::Src(inst, data.src.clone()));
            let d = func.data_mut(inst);
            d.opcode = Opcode::Mov;
            d.src = Some(Operand::imm(bit as i64));
        }

        if c_live && data.flags.writes_c_unconditionally() {
            c_live = false;
        }
        if z_live && data.flags.writes_z_unconditionally() {
            z_live = false;
        }
        cur = func.layout.next(inst);
    }
    true
}

fn resolve_condition(cond: Condition, c_live: bool, c_val: bool, z_live: bool, z_val: bool) -> Option<bool> {
    let (reads_c, reads_z) = (cond.reads_c(), cond.reads_z());
    if (reads_c && !c_live) || (reads_z && !z_live) {
        return None;
    }
    let c = if reads_c { c_val } else { false };
    let z = if reads_z { z_val } else { false };
    Some(cond.evaluate(c, z))
}

fn rewrite_flag_conditional(op: Opcode, c_live: bool, c_val: bool, _z_live: bool, _z_val: bool) -> Option<Opcode> {
    if !c_live {
        return None;
    }
    match op {
        Opcode::NegC => Some(if c_val { Opcode::Neg } else { Opcode::Mov }),
        Opcode::NegNc => Some(if c_val { Opcode::Mov } else { Opcode::Neg }),
        Opcode::DrvC => Some(if c_val { Opcode::DrvH } else { Opcode::DrvL }),
        Opcode::DrvNc => Some(if c_val { Opcode::DrvL } else { Opcode::DrvH }),
        Opcode::SumC => Some(if c_val { Opcode::Add } else { Opcode::Sub }),
        Opcode::SumNc => Some(if c_val { Opcode::Sub } else { Opcode::Add }),
        Opcode::MuxC => Some(if c_val { Opcode::Or } else { Opcode::AndN }),
        _ => None,
    }
}
