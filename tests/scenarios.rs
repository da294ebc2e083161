//! End-to-end scenarios run through the full pass driver, each checking
//! one concrete before/after rewrite rather than a single pass in
//! isolation.
//!
//! Every scenario routes its "interesting" value through a result-class
//! register and ends with a `ret`, since only that class is treated as
//! live at a return regardless of whether anything downstream reads it
//! back — otherwise DCE would sweep away the very rewrite being tested.

mod support;

use p2asm_opt::config::{CompilerConfig, OptimizeFlags, TargetArch};
use p2asm_opt::ir::condcodes::Condition;
use p2asm_opt::ir::function::CallConv;
use p2asm_opt::ir::operand::RegClass;
use p2asm_opt::ir::{Function, Instruction, Opcode, Operand};
use p2asm_opt::{optimize_function, optimize_module, Module};
use support::{listing, IrBuilder};

fn reg(name: &str) -> Operand {
    IrBuilder::reg(name)
}

fn result(name: &str) -> Operand {
    IrBuilder::result_reg(name)
}

fn imm(v: i64) -> Operand {
    IrBuilder::imm(v)
}

// `mov r1,r2` can only be forward-substituted and then dropped once
// something proves `r2`'s value stops mattering to `r1`'s remaining
// uses before the function returns — here, `r2` itself getting
// overwritten by `mov r2,r5`. A mov with no such downstream redefinition
// (like that second one) is never provably safe to erase this way, since
// nothing rules out the caller observing the register's value at return.
#[test]
fn s1_redundant_move_is_forward_substituted_once_its_source_is_overwritten() {
    let mut func = IrBuilder::new("s1")
        .mov(reg("r1"), reg("r2"))
        .add(result("r3"), reg("r1"))
        .mov(reg("r2"), reg("r5"))
        .add(result("r4"), reg("r2"))
        .ret()
        .finish();
    let config = CompilerConfig::default();
    optimize_function(&mut func, &config).unwrap();
    assert_eq!(listing(&func), vec!["Add r3,r2", "Mov r2,r5", "Add r4,r2", "Ret"]);
}

#[test]
fn s2_constant_compare_propagates_through_the_mov() {
    let mut func = IrBuilder::new("s2")
        .mov(reg("r1"), imm(0))
        .cmp_wz(reg("r2"), reg("r1"))
        .cond(Condition::IF_E)
        .mov(result("r3"), imm(1))
        .ret()
        .finish();
    let config = CompilerConfig::default();
    optimize_function(&mut func, &config).unwrap();
    assert_eq!(listing(&func), vec!["Cmp r2,#0", "Mov r3,#1", "Ret"]);
}

#[test]
fn s3_consecutive_adds_on_the_same_register_coalesce() {
    let mut func = IrBuilder::new("s3").add(result("sp"), imm(4)).add(result("sp"), imm(8)).ret().finish();
    let config = CompilerConfig::default();
    optimize_function(&mut func, &config).unwrap();
    assert_eq!(listing(&func), vec!["Add sp,#12", "Ret"]);
}

#[test]
fn s4_shl_shr_pair_becomes_zerox_on_p2_but_not_p1() {
    let mut p2 = IrBuilder::new("s4").shl(result("r"), imm(24)).shr(result("r"), imm(24)).ret().finish();
    let config_p2 = CompilerConfig::new(TargetArch::P2, OptimizeFlags::default());
    optimize_function(&mut p2, &config_p2).unwrap();
    assert_eq!(listing(&p2), vec!["ZeroX r,#7", "Ret"]);

    let mut p1 = IrBuilder::new("s4_p1").shl(result("r"), imm(24)).shr(result("r"), imm(24)).ret().finish();
    let config_p1 = CompilerConfig::new(TargetArch::P1, OptimizeFlags::default());
    optimize_function(&mut p1, &config_p1).unwrap();
    assert_eq!(listing(&p1), vec!["Shl r,#24", "Shr r,#24", "Ret"]);
}

#[test]
fn s5_constant_cordic_qmul_folds_both_halves() {
    let mut func = IrBuilder::new("s5").qmul(imm(3), imm(5)).getqx(result("r1")).getqy(result("r2")).ret().finish();
    let config = CompilerConfig::new(TargetArch::P2, OptimizeFlags::default() | OptimizeFlags::CORDIC_REORDER);
    optimize_function(&mut func, &config).unwrap();
    assert_eq!(listing(&func), vec!["Mov r1,#15", "Mov r2,#0", "Ret"]);
}

#[test]
fn s6_djnz_loop_becomes_rep_on_p2() {
    let mut func = Function::new("s6", CallConv::Fast);
    let top = func.push(Instruction::label());
    func.push(Instruction::new(Opcode::Add).with_dst(Operand::reg(RegClass::Result, "acc")).with_src(Operand::imm(1)));
    let djnz = func.push(Instruction::new(Opcode::Djnz).with_dst(Operand::reg(RegClass::Local, "ctr")));
    func.set_jump_target(djnz, top);
    func.push(Instruction::new(Opcode::Ret));

    let config = CompilerConfig::new(TargetArch::P2, OptimizeFlags::default());
    optimize_function(&mut func, &config).unwrap();
    assert_eq!(listing(&func), vec!["Repeat", "Add acc,#1", "RepeatEnd ctr", "Ret"]);
    let top_data = func.data(top);
    assert_eq!(top_data.opcode, Opcode::Repeat);
}

#[test]
fn s7_short_forward_branch_is_conditionalized() {
    let mut func = Function::new("s7", CallConv::Fast);
    func.push(Instruction::new(Opcode::Cmp).with_dst(Operand::reg(RegClass::Local, "a")).with_src(Operand::reg(RegClass::Local, "b")).with_flags(p2asm_opt::ir::opcode::FlagEffects::WZ));
    let jmp = func.push(Instruction::new(Opcode::Jmp).with_cond(Condition::IF_NE));
    func.push(Instruction::new(Opcode::Add).with_dst(Operand::reg(RegClass::Local, "r")).with_src(Operand::imm(1)));
    func.push(Instruction::new(Opcode::Mov).with_dst(Operand::reg(RegClass::Result, "r2")).with_src(Operand::reg(RegClass::Local, "r")));
    let label = func.push(Instruction::label());
    func.set_jump_target(jmp, label);
    func.push(Instruction::new(Opcode::Ret));

    let config = CompilerConfig::new(TargetArch::P2, OptimizeFlags::default());
    optimize_function(&mut func, &config).unwrap();

    let lines = listing(&func);
    assert!(!lines.iter().any(|l| l.starts_with("Jmp")));
    assert!(lines.iter().any(|l| l.starts_with("Add r,")));
    assert!(lines.iter().any(|l| l.starts_with("Mov r2,")));
    assert_eq!(func.data(func.iter().nth(1).unwrap()).cond, Condition::IF_E);
    assert_eq!(func.data(func.iter().nth(2).unwrap()).cond, Condition::IF_E);
}

#[test]
fn s8_single_instruction_callee_is_inlined_at_its_only_call_site() {
    let mut module = Module::new();

    let mut callee = Function::new("double", CallConv::Fast);
    callee.push(Instruction::new(Opcode::Shl).with_dst(Operand::reg(RegClass::Result, "ret")).with_src(Operand::imm(1)));
    callee.push(Instruction::new(Opcode::Ret));
    callee.call_site_counts.insert("main_caller".to_string(), 1);
    module.add(callee);

    let mut caller = Function::new("main_caller", CallConv::Fast);
    caller.push(Instruction::new(Opcode::Call).with_dst(Operand::cog_label("double")));
    caller.push(Instruction::new(Opcode::Ret));
    let caller_ref = module.add(caller);

    let config = CompilerConfig {
        optimize: OptimizeFlags::INLINE_SMALLFUNCS | OptimizeFlags::DEADCODE,
        ..CompilerConfig::new(TargetArch::P2, OptimizeFlags::INLINE_SMALLFUNCS)
    };
    optimize_module(&mut module, &config).unwrap();

    let lines = listing(module.get(caller_ref));
    assert!(!lines.iter().any(|l| l.starts_with("Call")));
    assert!(lines.iter().any(|l| l.starts_with("Shl")));
}
