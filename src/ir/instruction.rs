//! The `Instruction` record (section 3).

use super::condcodes::Condition;
use super::entities::{FuncRef, Inst};
use super::opcode::{FlagEffects, Opcode, OperandEffects};
use super::operand::Operand;

/// Per-operand effect bits bundled with the operand they modify, plus an
/// optional packed signed `[n]` offset suffix (section 6).
#[derive(Clone, Debug, Default)]
pub struct OperandEffect {
    pub bits: OperandEffects,
    pub offset: i32,
}

/// What an instruction's `aux` slot means, disambiguated by a real enum
/// instead of the source model's one untyped pointer (section 3: "the
/// `aux` slot doubles as...").
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Aux {
    #[default]
    None,
    /// For a jump/branch/call: the label it targets, if known.
    JumpTarget(Inst),
    /// For a label: nothing is stored here directly — the label's jump
    /// list lives in [`crate::ir::function::Function::label_jumps`], keyed
    /// by the label's own `Inst`, which is the side-table analogue of
    /// "a linked list of jumps that target it."
    Label,
    /// For a call: the statically known callee.
    Callee(FuncRef),
}

/// A single IR instruction (or pseudo-op).
#[derive(Clone, Debug)]
pub struct Instruction {
    pub opcode: Opcode,
    pub cond: Condition,
    pub flags: FlagEffects,
    pub dst: Option<Operand>,
    pub dst_effect: OperandEffect,
    pub src: Option<Operand>,
    pub src_effect: OperandEffect,
    /// Second source operand, used by 3-operand P2 instructions.
    pub src2: Option<Operand>,
    pub aux: Aux,
    /// Source line, threaded through for diagnostics (section 7).
    pub line: Option<u32>,
    /// User-written inline assembly that must not be treated as dead even
    /// if it looks like a side-effect-free no-op (section 7's
    /// user-diagnostic class).
    pub volatile: bool,
}

impl Instruction {
    pub fn new(opcode: Opcode) -> Self {
        Instruction {
            opcode,
            cond: Condition::ALWAYS,
            flags: FlagEffects::empty(),
            dst: None,
            dst_effect: OperandEffect::default(),
            src: None,
            src_effect: OperandEffect::default(),
            src2: None,
            aux: Aux::None,
            line: None,
            volatile: false,
        }
    }

    pub fn with_dst(mut self, dst: Operand) -> Self {
        self.dst = Some(dst);
        self
    }

    pub fn with_src(mut self, src: Operand) -> Self {
        self.src = Some(src);
        self
    }

    pub fn with_src2(mut self, src2: Operand) -> Self {
        self.src2 = Some(src2);
        self
    }

    pub fn with_cond(mut self, cond: Condition) -> Self {
        self.cond = cond;
        self
    }

    pub fn with_flags(mut self, flags: FlagEffects) -> Self {
        self.flags = flags;
        self
    }

    pub fn label() -> Self {
        let mut i = Instruction::new(Opcode::Label);
        i.aux = Aux::Label;
        i
    }

    pub fn dummy() -> Self {
        Instruction::new(Opcode::Dummy)
    }

    /// Per section 3's Lifecycle: a `DUMMY` opcode or a `Never` condition
    /// makes an instruction a no-op for liveness purposes.
    pub fn is_effectively_dead(&self) -> bool {
        self.opcode == Opcode::Dummy || self.cond.is_never()
    }

    pub fn is_label(&self) -> bool {
        self.opcode.is_label()
    }

    /// Mark this instruction's condition unsatisfiable, the idiom used
    /// throughout section 4.3 ("the instruction's condition is set to
    /// `Never` (equivalent to deletion)").
    pub fn kill(&mut self) {
        self.cond = Condition::NEVER;
    }

    pub fn jump_target(&self) -> Option<Inst> {
        match self.aux {
            Aux::JumpTarget(t) => Some(t),
            _ => None,
        }
    }

    pub fn set_jump_target(&mut self, target: Inst) {
        self.aux = Aux::JumpTarget(target);
    }

    pub fn callee(&self) -> Option<FuncRef> {
        match self.aux {
            Aux::Callee(f) => Some(f),
            _ => None,
        }
    }
}
