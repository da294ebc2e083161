//! A small interpreter over pattern-matcher kinds (section 4.4), rather
//! than one hand-written `if`-chain per pattern.

use crate::dataflow::is_dead_after;
use crate::ir::condcodes::Condition;
use crate::ir::opcode::Opcode;
use crate::ir::operand::Operand;
use crate::ir::{Function, Inst};

pub const MAX_CAPTURES: usize = 16;

/// How an instruction's condition must relate to the rest of the window.
#[derive(Clone, Copy, Debug, Default)]
pub enum CondMatcher {
    #[default]
    Always,
    /// Ties every `Any`-marked slot in the pattern to whatever condition
    /// the first matched instruction carries.
    Any,
    /// Must be exactly this condition, independent of the window's tied
    /// condition (used by the if-C/if-NC merge families).
    Fixed(Condition),
}

/// One operand-matcher slot (section 4.4's 4-tuple plus flags word,
/// operand half).
#[derive(Clone, Copy, Debug)]
pub enum OperandMatcher {
    /// The slot may be anything, including absent.
    Any,
    /// The slot must be absent.
    Absent,
    /// Capture whatever is here into the numbered slot.
    Set(usize),
    /// Must equal the operand already captured in the numbered slot.
    Match(usize),
    /// Must equal the numbered slot's operand, and be dead after this
    /// instruction.
    MatchDead(usize),
    /// Must be the integer immediate `k`.
    Imm(i64),
    /// Capture an integer immediate into the numbered slot.
    SetImm(usize),
    /// Must be `captured_imm(n) - 1`, computed as signed, no wraparound.
    MatchM1S(usize),
    /// Must be `captured_imm(n) - 1`, computed as unsigned 32-bit, no
    /// wraparound.
    MatchM1U(usize),
    /// Must be the integer `!(((1 << bits) - 1) << shift)`.
    ClrMask(u32, u32),
}

/// One instruction slot in a pattern (section 4.4's matcher 4-tuple).
#[derive(Clone, Copy)]
pub struct InstMatcher {
    pub opcode: Opcode,
    pub cond: CondMatcher,
    pub dst: OperandMatcher,
    pub src: OperandMatcher,
    pub wcz_allowed: bool,
    pub must_wc: bool,
    pub must_wz: bool,
}

impl InstMatcher {
    pub const fn new(opcode: Opcode) -> Self {
        InstMatcher {
            opcode,
            cond: CondMatcher::Always,
            dst: OperandMatcher::Any,
            src: OperandMatcher::Any,
            wcz_allowed: false,
            must_wc: false,
            must_wz: false,
        }
    }

    pub const fn dst(mut self, m: OperandMatcher) -> Self {
        self.dst = m;
        self
    }

    pub const fn src(mut self, m: OperandMatcher) -> Self {
        self.src = m;
        self
    }

    pub const fn any_cond(mut self) -> Self {
        self.cond = CondMatcher::Any;
        self
    }

    pub const fn fixed_cond(mut self, c: Condition) -> Self {
        self.cond = CondMatcher::Fixed(c);
        self
    }

    pub const fn wcz_allowed(mut self) -> Self {
        self.wcz_allowed = true;
        self
    }

    pub const fn must_wc(mut self) -> Self {
        self.must_wc = true;
        self.wcz_allowed = true;
        self
    }

    pub const fn must_wz(mut self) -> Self {
        self.must_wz = true;
        self.wcz_allowed = true;
        self
    }
}

/// The bindings produced by a successful match: the matched instructions,
/// in window order, plus whatever operands/immediates the pattern
/// captured.
pub struct Match {
    pub insts: Vec<Inst>,
    ops: [Option<Operand>; MAX_CAPTURES],
    imms: [Option<i64>; MAX_CAPTURES],
    pub tied_cond: Condition,
}

impl Match {
    pub fn op(&self, n: usize) -> &Operand {
        self.ops[n].as_ref().expect("fixup referenced an uncaptured operand slot")
    }

    pub fn imm(&self, n: usize) -> i64 {
        self.imms[n].expect("fixup referenced an uncaptured immediate slot")
    }
}

fn match_operand(m: OperandMatcher, op: Option<&Operand>, func: &Function, inst: Inst, ops: &mut [Option<Operand>; MAX_CAPTURES], imms: &mut [Option<i64>; MAX_CAPTURES]) -> bool {
    match m {
        OperandMatcher::Any => true,
        OperandMatcher::Absent => op.is_none(),
        OperandMatcher::Set(n) => {
            let Some(op) = op else { return false };
            ops[n] = Some(op.clone());
            true
        }
        OperandMatcher::Match(n) => {
            let (Some(op), Some(want)) = (op, &ops[n]) else { return false };
            op == want
        }
        OperandMatcher::MatchDead(n) => {
            let (Some(op), Some(want)) = (op, &ops[n]) else { return false };
            op == want && is_dead_after(func, inst, op)
        }
        OperandMatcher::Imm(k) => op.and_then(|o| o.as_imm_int()) == Some(k),
        OperandMatcher::SetImm(n) => {
            let Some(v) = op.and_then(|o| o.as_imm_int()) else { return false };
            imms[n] = Some(v);
            true
        }
        OperandMatcher::MatchM1S(n) => {
            let (Some(v), Some(base)) = (op.and_then(|o| o.as_imm_int()), imms[n]) else { return false };
            base.checked_sub(1).is_some_and(|want| want == v)
        }
        OperandMatcher::MatchM1U(n) => {
            let (Some(v), Some(base)) = (op.and_then(|o| o.as_imm_int()), imms[n]) else { return false };
            (base as u32).checked_sub(1).is_some_and(|want| want as i64 == v)
        }
        OperandMatcher::ClrMask(bits, shift) => {
            let mask = !(((1u32 << bits) - 1) << shift);
            op.and_then(|o| o.as_imm_int()) == Some(mask as i32 as i64)
        }
    }
}

/// Attempt to match `pattern` starting at `start`, walking forward through
/// consecutive instructions (labels and barriers simply fail the match by
/// not satisfying the next slot's opcode/condition).
pub fn try_match(func: &Function, start: Inst, pattern: &[InstMatcher]) -> Option<Match> {
    let mut insts = Vec::with_capacity(pattern.len());
    let mut ops: [Option<Operand>; MAX_CAPTURES] = std::array::from_fn(|_| None);
    let mut imms: [Option<i64>; MAX_CAPTURES] = [None; MAX_CAPTURES];
    let mut tied_cond = Condition::ALWAYS;

    let mut cur = Some(start);
    for (idx, slot) in pattern.iter().enumerate() {
        let inst = cur?;
        let data = func.data(inst);
        if data.opcode != slot.opcode {
            return None;
        }
        match slot.cond {
            CondMatcher::Always => {
                if idx == 0 {
                    tied_cond = data.cond;
                } else if data.cond != tied_cond {
                    return None;
                }
            }
            CondMatcher::Any => {
                if idx == 0 {
                    tied_cond = data.cond;
                }
            }
            CondMatcher::Fixed(want) => {
                if data.cond != want {
                    return None;
                }
                if idx == 0 {
                    tied_cond = data.cond;
                }
            }
        }
        if !slot.wcz_allowed && (data.flags.writes_c() || data.flags.writes_z()) {
            return None;
        }
        if slot.must_wc && !data.flags.writes_c_unconditionally() {
            return None;
        }
        if slot.must_wz && !data.flags.writes_z_unconditionally() {
            return None;
        }
        if !match_operand(slot.dst, data.dst.as_ref(), func, inst, &mut ops, &mut imms) {
            return None;
        }
        if !match_operand(slot.src, data.src.as_ref(), func, inst, &mut ops, &mut imms) {
            return None;
        }
        insts.push(inst);
        cur = func.layout.next(inst);
    }
    Some(Match { insts, ops, imms, tied_cond })
}
