//! A tiny fluent builder for assembling a [`Function`] by opcode mnemonic
//! in integration tests, instead of spelling out `Instruction` literals at
//! every call site.

use p2asm_opt::ir::condcodes::Condition;
use p2asm_opt::ir::function::CallConv;
use p2asm_opt::ir::opcode::FlagEffects;
use p2asm_opt::ir::operand::RegClass;
use p2asm_opt::ir::{Function, Inst, Instruction, Opcode, Operand};

pub struct IrBuilder {
    func: Function,
    next_cond: Condition,
}

impl IrBuilder {
    pub fn new(name: &str) -> Self {
        IrBuilder { func: Function::new(name, CallConv::Fast), next_cond: Condition::ALWAYS }
    }

    pub fn reg(name: &str) -> Operand {
        Operand::reg(RegClass::Local, name)
    }

    /// A result-class register, live at every `ret` regardless of whether
    /// anything in the test function reads it back — useful for asserting
    /// on a value that "escapes" without having to thread a real use.
    pub fn result_reg(name: &str) -> Operand {
        Operand::reg(RegClass::Result, name)
    }

    pub fn imm(v: i64) -> Operand {
        Operand::imm(v)
    }

    /// The next pushed instruction carries this execution condition
    /// instead of `ALWAYS`; reset after one push, mirroring how a `cmp`'s
    /// `if_e`/`if_ne` prefix governs only the following line of PASM.
    pub fn cond(mut self, c: Condition) -> Self {
        self.next_cond = c;
        self
    }

    fn push(&mut self, inst: Instruction) -> Inst {
        let mut inst = inst;
        inst.cond = self.next_cond;
        self.next_cond = Condition::ALWAYS;
        self.func.push(inst)
    }

    pub fn mov(mut self, dst: Operand, src: Operand) -> Self {
        self.push(Instruction::new(Opcode::Mov).with_dst(dst).with_src(src));
        self
    }

    pub fn add(mut self, dst: Operand, src: Operand) -> Self {
        self.push(Instruction::new(Opcode::Add).with_dst(dst).with_src(src));
        self
    }

    pub fn sub(mut self, dst: Operand, src: Operand) -> Self {
        self.push(Instruction::new(Opcode::Sub).with_dst(dst).with_src(src));
        self
    }

    pub fn cmp_wz(mut self, a: Operand, b: Operand) -> Self {
        self.push(Instruction::new(Opcode::Cmp).with_dst(a).with_src(b).with_flags(FlagEffects::WZ));
        self
    }

    pub fn shl(mut self, dst: Operand, amount: Operand) -> Self {
        self.push(Instruction::new(Opcode::Shl).with_dst(dst).with_src(amount));
        self
    }

    pub fn shr(mut self, dst: Operand, amount: Operand) -> Self {
        self.push(Instruction::new(Opcode::Shr).with_dst(dst).with_src(amount));
        self
    }

    pub fn qmul(mut self, a: Operand, b: Operand) -> Self {
        self.push(Instruction::new(Opcode::QMul).with_dst(a).with_src(b));
        self
    }

    pub fn getqx(mut self, dst: Operand) -> Self {
        self.push(Instruction::new(Opcode::GetQx).with_dst(dst));
        self
    }

    pub fn getqy(mut self, dst: Operand) -> Self {
        self.push(Instruction::new(Opcode::GetQy).with_dst(dst));
        self
    }

    pub fn djnz(mut self, counter: Operand, target: Inst) -> Self {
        let inst = self.push(Instruction::new(Opcode::Djnz).with_dst(counter));
        self.func.set_jump_target(inst, target);
        self
    }

    /// Push a label and return its `Inst` so a later jump/branch can
    /// target it.
    pub fn label(mut self) -> (Self, Inst) {
        let l = self.push(Instruction::label());
        (self, l)
    }

    pub fn jmp(mut self, target: Inst) -> Self {
        let inst = self.push(Instruction::new(Opcode::Jmp));
        self.func.set_jump_target(inst, target);
        self
    }

    /// Push an unresolved jump, for a branch whose target label comes
    /// later in program order; returns its `Inst` so [`Self::resolve`]
    /// can attach the target once it's known.
    pub fn jmp_fwd(mut self) -> (Self, Inst) {
        let inst = self.push(Instruction::new(Opcode::Jmp));
        (self, inst)
    }

    pub fn resolve(mut self, jump: Inst, target: Inst) -> Self {
        self.func.set_jump_target(jump, target);
        self
    }

    pub fn ret(mut self) -> Self {
        self.push(Instruction::new(Opcode::Ret));
        self
    }

    pub fn finish(self) -> Function {
        self.func
    }
}

/// Render a function's instructions as a compact mnemonic listing (one
/// opcode per line, `dst,src` pairs joined by their `Display` impl) for
/// assertions that read like the PASM the optimizer is meant to produce.
pub fn listing(func: &Function) -> Vec<String> {
    func.iter()
        .map(|i| {
            let data = func.data(i);
            if data.is_label() {
                return "label:".to_string();
            }
            let mut line = format!("{:?}", data.opcode);
            if let Some(d) = &data.dst {
                line.push_str(&format!(" {d}"));
            }
            if let Some(s) = &data.src {
                line.push_str(&format!(",{s}"));
            }
            if let Some(s2) = &data.src2 {
                line.push_str(&format!(",{s2}"));
            }
            line
        })
        .collect()
}
