//! F-cache promotion (section 4.7): copy a small, hot, hub-resident loop
//! into a reserved cog-memory window at runtime so it executes at cog
//! speed instead of paying the hub-exec (LMM) penalty every iteration.
//!
//! This crate's `Instruction` carries a single `aux` slot, so the wire
//! format's two-label `FCACHE` (`src`=start label, `dst`=end label) is
//! represented structurally instead: the `Fcache` marker is spliced
//! immediately before the loop body and its `aux` is an
//! [`crate::ir::Aux::JumpTarget`] pointing at the freshly inserted
//! trailing label. The "start label" is simply whatever follows the
//! marker in program order — nothing needs to name it explicitly.

use crate::config::{CompilerConfig, OptimizeFlags, TargetArch};
use crate::inst_predicates::instr_size_longs;
use crate::ir::function::CallConv;
use crate::ir::opcode::Opcode;
use crate::ir::operand::OperandKind;
use crate::ir::{Function, Inst, Instruction};
use crate::timing;

/// Once `HubMode` appears, every following instruction is taken to live
/// in hub memory (this IR's LMM convention has no "switch back to cog"
/// pseudo-op in the table, matching the usual single hub section per
/// function).
fn reached_hub_mode(func: &Function, before: Inst) -> bool {
    let mut cur = func.iter().next();
    while let Some(i) = cur {
        if i == before {
            return false;
        }
        if func.data(i).opcode == Opcode::HubMode {
            return true;
        }
        cur = func.layout.next(i);
    }
    false
}

fn collect_body(func: &Function, label: Inst, back_edge: Inst) -> Option<Vec<Inst>> {
    let mut body = Vec::new();
    let mut cur = label;
    loop {
        body.push(cur);
        if cur == back_edge {
            return Some(body);
        }
        cur = func.layout.next(cur)?;
    }
}

fn is_known_helper_call(func: &Function, call: Inst) -> bool {
    matches!(
        func.data(call).dst.as_ref().map(|d| &d.kind),
        Some(OperandKind::ImmCogLabel(name)) if name.starts_with("builtin_mul_") || name.starts_with("builtin_div_") || name.starts_with("builtin_udiv_") || name.starts_with("builtin_rem_")
    )
}

/// All of section 4.7's eligibility checks except the size budget, which
/// the caller compares against the configured window separately.
fn body_is_eligible(func: &Function, body: &[Inst], label: Inst, back_edge: Inst) -> bool {
    let mut has_real_work = false;
    for &i in body {
        let data = func.data(i);
        if data.opcode == Opcode::Fcache {
            return false; // no nested F-cache
        }
        if data.opcode == Opcode::Call && !is_known_helper_call(func, i) {
            return false;
        }
        if data.opcode.is_jump() {
            match data.jump_target() {
                Some(target) if func.layout.in_range(target, label, back_edge) => {}
                _ if i == back_edge => {} // the loop's own back-edge, always in range
                _ => return false,        // forward-out branch
            }
        }
        if !data.opcode.is_pseudo() && !data.opcode.is_wait_class() {
            has_real_work = true;
        }
    }
    has_real_work
}

fn body_size_longs(func: &Function, body: &[Inst], arch: TargetArch) -> u32 {
    body.iter().map(|&i| instr_size_longs(func.data(i), arch)).sum()
}

/// Walk a candidate loop's predecessor instruction to see if the promoter
/// must anchor the `FCACHE` marker before a `REPEAT` wrapper instead of
/// directly before the label, so the counter setup rides inside the cache
/// too.
fn insertion_anchor(func: &Function, label: Inst) -> Inst {
    match func.layout.prev(label) {
        Some(p) if func.data(p).opcode == Opcode::Repeat => p,
        _ => label,
    }
}

pub fn run(func: &mut Function, config: &CompilerConfig) -> bool {
    let _t = timing::start(timing::Pass::Fcache);
    if !config.enabled(OptimizeFlags::AUTO_FCACHE) {
        return false;
    }
    let Some(window) = config.fcache.window_longs(config.arch) else {
        return false;
    };

    let mut changed = false;
    let labels: Vec<Inst> = func.iter().filter(|&i| func.data(i).is_label()).collect();

    for label in labels {
        if !func.layout.is_inserted(label) {
            continue;
        }
        let preds = func.label_jumps.jumps_to(label);
        if preds.len() != 1 {
            continue;
        }
        let back_edge = preds[0];
        if !func.layout.is_inserted(back_edge) || func.layout.cmp(back_edge, label) != std::cmp::Ordering::Greater {
            continue;
        }
        let back_data = func.data(back_edge);
        if !back_data.opcode.is_jump() || !back_data.cond.is_always() {
            continue;
        }
        if !reached_hub_mode(func, label) {
            continue;
        }
        let Some(body) = collect_body(func, label, back_edge) else { continue };
        if !body_is_eligible(func, &body, label, back_edge) {
            continue;
        }
        if body_size_longs(func, &body, config.arch) > window {
            continue;
        }

        let anchor = insertion_anchor(func, label);
        let marker = func.insert_before(Instruction::new(Opcode::Fcache), anchor);
        let end_label = func.insert_after(Instruction::label(), back_edge);
        func.set_jump_target(marker, end_label);
        changed = true;
    }

    if changed {
        merge_adjacent_regions(func);
    }
    changed
}

/// If one F-cache region's trailing label is immediately followed by
/// another region's marker, the two were adjacent loops sharing the same
/// cache window; drop the redundant end/start pair so the emitter treats
/// them as one contiguous region.
fn merge_adjacent_regions(func: &mut Function) -> bool {
    let mut changed = false;
    let markers: Vec<Inst> = func.iter().filter(|&i| func.data(i).opcode == Opcode::Fcache).collect();
    for marker in markers {
        if !func.layout.is_inserted(marker) {
            continue;
        }
        let Some(end_label) = func.data(marker).jump_target() else { continue };
        let Some(next) = func.layout.next(end_label) else { continue };
        if func.data(next).opcode != Opcode::Fcache {
            continue;
        }
        let Some(next_end) = func.data(next).jump_target() else { continue };
        func.remove_inst(end_label);
        func.remove_inst(next);
        func.set_jump_target(marker, next_end);
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FcacheConfig;
    use crate::ir::condcodes::Condition;
    use crate::ir::operand::Operand;

    fn small_hub_loop() -> Function {
        let mut f = Function::new("t", CallConv::Fast);
        f.push(Instruction::new(Opcode::HubMode));
        let label = f.push(Instruction::label());
        f.push(
            Instruction::new(Opcode::Add)
                .with_dst(Operand::reg(crate::ir::operand::RegClass::Local, "i"))
                .with_src(Operand::imm(1)),
        );
        let jmp = f.push(Instruction::new(Opcode::Jmp));
        f.set_jump_target(jmp, label);
        f
    }

    #[test]
    fn small_hub_loop_gets_fcache_bracket() {
        let mut f = small_hub_loop();
        let config = CompilerConfig { fcache: FcacheConfig::auto(TargetArch::P2), ..CompilerConfig::new(TargetArch::P2, OptimizeFlags::AUTO_FCACHE) };
        assert!(run(&mut f, &config));
        assert!(f.iter().any(|i| f.data(i).opcode == Opcode::Fcache));
    }

    #[test]
    fn disabled_without_auto_fcache_flag() {
        let mut f = small_hub_loop();
        let config = CompilerConfig::new(TargetArch::P2, OptimizeFlags::empty());
        assert!(!run(&mut f, &config));
    }

    #[test]
    fn cog_only_loop_is_not_promoted() {
        let mut f = Function::new("t", CallConv::Fast);
        let label = f.push(Instruction::label());
        f.push(
            Instruction::new(Opcode::Add)
                .with_dst(Operand::reg(crate::ir::operand::RegClass::Local, "i"))
                .with_src(Operand::imm(1)),
        );
        let jmp = f.push(Instruction::new(Opcode::Jmp).with_cond(Condition::IF_NZ));
        f.set_jump_target(jmp, label);
        let config = CompilerConfig::new(TargetArch::P2, OptimizeFlags::AUTO_FCACHE);
        assert!(!run(&mut f, &config));
    }
}
