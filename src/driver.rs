//! The pass driver (section 4.8): sequences every local pass into a
//! fixed-point loop per function, then the module-wide inliner and
//! F-cache promoter.
//!
//! Grounded in `cranelift-codegen`'s `Context::compile`: each stage is
//! wrapped in the `timing` module's scope guard and logged at `trace!`
//! with the function name, pass name, and whether it changed anything.

use crate::config::{CompilerConfig, OptimizeFlags, TargetArch};
use crate::cordic;
use crate::error::OptError;
use crate::fcache;
use crate::inline::{self, Module};
use crate::ir::Function;
use crate::passes;
use crate::peephole;
use crate::timing;

/// A round that runs more than this many times before converging is
/// logged at `debug!` as a possible sign of a pass cycling passes against
/// each other; it is not treated as an error.
const SLOW_CONVERGENCE_ROUNDS: u32 = 8;

macro_rules! run_pass {
    ($func:expr, $changed:expr, $name:literal, $body:expr) => {{
        let did_change = $body;
        log::trace!("{}: {} changed={}", $func.name, $name, did_change);
        $changed |= did_change;
    }};
}

/// One pass over the repeating local-optimization round (section 4.8,
/// step 2). Returns whether anything changed.
fn local_round(func: &mut Function, config: &CompilerConfig) -> bool {
    func.renumber();
    func.rebuild_label_jumps();

    let mut changed = false;
    if config.enabled(OptimizeFlags::AGGRESSIVE_MEM) {
        run_pass!(func, changed, "mem_merge", passes::mem_merge::run(func));
    }
    if config.enabled(OptimizeFlags::DEADCODE) {
        run_pass!(func, changed, "dce", passes::dce::run(func));
    }
    run_pass!(func, changed, "cogwrite", passes::cogwrite::run(func));
    run_pass!(func, changed, "assign_triangle", passes::assign_triangle::run(func));
    if config.enabled(OptimizeFlags::BASIC_REGS) {
        run_pass!(func, changed, "move_opt", passes::move_opt::run(func));
    }
    run_pass!(func, changed, "imm_canon", passes::addsub::canonicalize_immediates(func));
    if config.enabled(OptimizeFlags::CONST_PROPAGATE) {
        run_pass!(func, changed, "compare_opt", passes::compare_opt::run(func));
        run_pass!(func, changed, "const_prop", passes::const_prop::run(func));
    }
    run_pass!(func, changed, "addsub_coalesce", passes::addsub::coalesce(func));
    run_pass!(func, changed, "loop_hoist", passes::loop_hoist::hoist_loop_pointer_offsets(func));
    if config.enabled(OptimizeFlags::PEEPHOLE) {
        run_pass!(func, changed, "peephole", peephole::run(func, config.arch));
        run_pass!(func, changed, "p2_opts", config.arch == TargetArch::P2 && passes::p2_opts::run(func));
    }
    if config.enabled(OptimizeFlags::BRANCHES) {
        run_pass!(func, changed, "branch_hoist", passes::branch_hoist::run(func));
        run_pass!(func, changed, "short_branch", passes::short_branch::run(func, config.arch, config.enabled(OptimizeFlags::EXTRASMALL)));
    }
    run_pass!(func, changed, "incdec_hoist", passes::loop_hoist::hoist_incdec(func));
    run_pass!(func, changed, "jump_thread", passes::jump_thread::run(func));
    if config.enabled(OptimizeFlags::CORDIC_REORDER) {
        run_pass!(func, changed, "cordic_fold_and_clean", cordic::fold_and_clean(func));
    }
    changed
}

/// Run `local_round` to a fixed point, logging a warning-level note if
/// convergence takes an unusually long time.
fn converge(func: &mut Function, config: &CompilerConfig) {
    let mut rounds = 0u32;
    loop {
        rounds += 1;
        if !local_round(func, config) {
            break;
        }
        if rounds == SLOW_CONVERGENCE_ROUNDS {
            log::debug!("{}: still not converged after {} rounds", func.name, rounds);
        }
    }
}

/// Optimize one function in isolation: `OptimizeMulDiv`/`OptimizeLongfill`
/// once, then the repeating round, then the optional tail-call and CORDIC
/// pipelining stages, each re-entering the round if it moved anything,
/// and finally local-register reuse. Resource exhaustion is the only
/// condition that surfaces as `Err`; everything else that goes wrong
/// inside a pass is reported through [`crate::error`] and treated as "no
/// change" so the rest of the pipeline keeps going.
pub fn optimize_function(func: &mut Function, config: &CompilerConfig) -> Result<(), OptError> {
    let _t = timing::start(timing::Pass::None);

    let muldiv_changed = passes::muldiv::run(func);
    log::trace!("{}: muldiv changed={}", func.name, muldiv_changed);
    let longfill_changed = passes::longfill::run(func);
    log::trace!("{}: longfill changed={}", func.name, longfill_changed);

    converge(func, config);

    if config.enabled(OptimizeFlags::TAIL_CALLS) {
        let mut changed = passes::tailcall::run(func, config);
        while changed {
            converge(func, config);
            changed = passes::tailcall::run(func, config);
        }
    }

    if config.enabled(OptimizeFlags::CORDIC_REORDER) {
        loop {
            let moved = cordic::pipeline_reorder(func, config.arch);
            if !moved {
                break;
            }
            converge(func, config);
        }
    }

    if config.enabled(OptimizeFlags::LOCAL_REUSE) {
        passes::local_regs::run(func);
    }

    Ok(())
}

/// Module-wide stages: inlining/duplicate-merging and F-cache promotion
/// run once after every function has individually reached its local
/// fixed point, since both need whole-module context (call-site counts,
/// cross-function hashes) a single-function pass cannot see.
pub fn optimize_module(module: &mut Module, config: &CompilerConfig) -> Result<(), OptError> {
    let all_funcs: Vec<_> = module.iter().collect();

    for &func_ref in &all_funcs {
        optimize_function(module.get_mut(func_ref), config)?;
    }

    if config.enabled(OptimizeFlags::INLINE_SMALLFUNCS) || config.enabled(OptimizeFlags::INLINE_SINGLEUSE) {
        let mut changed = inline::run(module, config);
        while changed {
            for &func_ref in &all_funcs {
                converge(module.get_mut(func_ref), config);
            }
            changed = inline::run(module, config);
        }
    }

    if config.enabled(OptimizeFlags::MERGE_DUPLICATES) {
        inline::merge_duplicates(module, config);
    }

    if config.enabled(OptimizeFlags::AUTO_FCACHE) {
        for &func_ref in &all_funcs {
            fcache::run(module.get_mut(func_ref), config);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::function::CallConv;
    use crate::ir::operand::{Operand, RegClass};
    use crate::ir::{Instruction, Opcode};

    #[test]
    fn redundant_move_chain_converges_and_dce_cleans_up() {
        let mut f = Function::new("t", CallConv::Fast);
        f.push(Instruction::new(Opcode::Mov).with_dst(Operand::reg(RegClass::Local, "a")).with_src(Operand::imm(1)));
        f.push(Instruction::new(Opcode::Mov).with_dst(Operand::reg(RegClass::Local, "a")).with_src(Operand::imm(2)));
        let config = CompilerConfig::default();
        assert!(optimize_function(&mut f, &config).is_ok());
        assert_eq!(f.num_insts(), 1);
    }

    #[test]
    fn empty_function_optimizes_cleanly() {
        let mut f = Function::new("empty", CallConv::Fast);
        let config = CompilerConfig::default();
        assert!(optimize_function(&mut f, &config).is_ok());
        assert_eq!(f.num_insts(), 0);
    }

    #[test]
    fn module_inlining_runs_without_panicking() {
        let mut module = Module::new();
        let mut callee = Function::new("small", CallConv::Fast);
        callee.push(Instruction::new(Opcode::Mov).with_dst(Operand::reg(RegClass::Result, "r")).with_src(Operand::imm(1)));
        module.add(callee);

        let mut caller = Function::new("main", CallConv::Fast);
        caller.push(Instruction::new(Opcode::Call).with_dst(Operand::cog_label("small")));
        module.add(caller);

        let config = CompilerConfig {
            optimize: OptimizeFlags::INLINE_SMALLFUNCS | OptimizeFlags::DEADCODE,
            ..CompilerConfig::new(TargetArch::P2, OptimizeFlags::INLINE_SMALLFUNCS)
        };
        assert!(optimize_module(&mut module, &config).is_ok());
    }
}
