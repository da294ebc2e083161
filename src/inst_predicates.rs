//! Pure predicates over single instructions and operand pairs, shared by
//! every analysis and pass (section 4.1).
//!
//! Grounded in `cranelift-codegen`'s `inst_predicates.rs` (which answers
//! "does this instruction have a side effect?" for its own IR) generalized
//! to the much larger predicate surface this IR needs: readers/writers of
//! the destination operand, structural use/def matching, branch/prefix/
//! CORDIC classification, and the two architectural predicates
//! (`instr_min_cycles`, `instr_size_longs`) neither Cranelift nor its IR
//! model has an analogue for.

use crate::config::TargetArch;
use crate::ir::condcodes::Condition;
use crate::ir::instruction::Instruction;
use crate::ir::opcode::Opcode;
use crate::ir::operand::Operand;

/// Opcodes that only ever write their destination, never read it first.
fn is_move_like_writer(op: Opcode) -> bool {
    matches!(
        op,
        Opcode::Mov
            | Opcode::Neg
            | Opcode::Abs
            | Opcode::Not
            | Opcode::Ones
            | Opcode::RdByte
            | Opcode::RdWord
            | Opcode::RdLong
            | Opcode::GetQx
            | Opcode::GetQy
            | Opcode::GetCt
            | Opcode::Getbyte
            | Opcode::Getword
            | Opcode::Getnib
            | Opcode::WrC
            | Opcode::WrNc
            | Opcode::WrZ
            | Opcode::WrNz
            | Opcode::Decod
            | Opcode::Encod
            | Opcode::BMask
            | Opcode::RdPin
    )
}

/// Does this instruction read its destination operand before writing it?
pub fn reads_dst(i: &Instruction) -> bool {
    if is_move_like_writer(i.opcode) {
        return false;
    }
    match i.opcode {
        Opcode::MuxC | Opcode::MuxZ => {
            // `muxc x, #-1` overwrites x unconditionally; any other source
            // combines with the existing value of x.
            !matches!(i.src.as_ref().and_then(Operand::as_imm_int), Some(-1))
        }
        Opcode::SubX | Opcode::SubSx => {
            // Self-subtract-with-borrow (`subx x,x`) is a pure zero/borrow
            // write and does not need the prior value of x.
            match (&i.dst, &i.src) {
                (Some(d), Some(s)) => !d.same_register(s),
                _ => true,
            }
        }
        _ => true,
    }
}

/// Pure sinks: opcodes whose "destination" operand is never a write target.
fn is_pure_sink(op: Opcode) -> bool {
    matches!(
        op,
        Opcode::WrLong
            | Opcode::WrWord
            | Opcode::WrByte
            | Opcode::QDiv
            | Opcode::QMul
            | Opcode::QFrac
            | Opcode::QRotate
            | Opcode::QSqrt
            | Opcode::QVector
            | Opcode::QLog
            | Opcode::QExp
            | Opcode::DrvC
            | Opcode::DrvNc
            | Opcode::DrvZ
            | Opcode::DrvNz
            | Opcode::DrvH
            | Opcode::DrvL
            | Opcode::SetQ
            | Opcode::SetQ2
            | Opcode::TestB
            | Opcode::TestBn
            | Opcode::LockTry
    )
}

/// Instructions whose destination write is conditional on the `WR` flag
/// rather than on being written by default.
fn writes_dst_only_with_wr(op: Opcode) -> bool {
    matches!(
        op,
        Opcode::Cmp
            | Opcode::CmpS
            | Opcode::Test
            | Opcode::TestN
            | Opcode::Push
            | Opcode::LockRet
            | Opcode::LockSet
            | Opcode::LockClr
    )
}

/// Does this instruction actually commit a value to its destination
/// operand?
pub fn sets_dst(i: &Instruction) -> bool {
    if is_pure_sink(i.opcode) {
        return false;
    }
    if writes_dst_only_with_wr(i.opcode) {
        return i.flags.contains(crate::ir::opcode::FlagEffects::WR);
    }
    !i.flags.contains(crate::ir::opcode::FlagEffects::NR)
}

/// Does `i` read the register `op` names, structurally (looking through
/// subregisters, per [`Operand::same_register`])?
pub fn uses(i: &Instruction, op: &Operand) -> bool {
    let reads_an_operand = |slot: &Option<Operand>| slot.as_ref().is_some_and(|o| o.same_register(op));
    if reads_an_operand(&i.src) || reads_an_operand(&i.src2) {
        return true;
    }
    if reads_dst(i) && i.dst.as_ref().is_some_and(|d| d.same_register(op)) {
        return true;
    }
    false
}

/// Does `i` write the register `op` names? `MovD` targeting a cog label
/// that happens to alias `op`'s symbol counts too, mirroring the reference
/// implementation's name-resolution quirk for jump-target registers.
pub fn modifies(i: &Instruction, op: &Operand) -> bool {
    if i.opcode == Opcode::MovD {
        if let (
            Some(crate::ir::operand::OperandKind::ImmCogLabel(label)),
            crate::ir::operand::OperandKind::Reg(_, name),
        ) = (i.dst.as_ref().map(|d| &d.kind), &op.kind)
        {
            if label == name {
                return true;
            }
        }
    }
    sets_dst(i) && i.dst.as_ref().is_some_and(|d| d.same_register(op))
}

pub fn is_branch(i: &Instruction) -> bool {
    i.opcode.is_branch()
}

pub fn is_jump(i: &Instruction) -> bool {
    i.opcode.is_jump()
}

pub fn is_prefix(i: &Instruction) -> bool {
    i.opcode.is_prefix()
}

pub fn is_cordic_command(i: &Instruction) -> bool {
    i.opcode.is_cordic_command()
}

pub fn is_cordic_get(i: &Instruction) -> bool {
    i.opcode.is_cordic_get()
}

pub fn is_commutative(i: &Instruction) -> bool {
    i.opcode.is_commutative()
}

fn is_muldiv_helper_name(name: &str) -> bool {
    name.starts_with("builtin_mul_") || name.starts_with("builtin_div_") || name.starts_with("builtin_udiv_") || name.starts_with("builtin_rem_")
}

/// Is `i` a call to one of the multiply/divide runtime helpers — the only
/// callees whose calling convention bypasses `Arg`-class registers
/// entirely in favor of the `muldiva`/`muldivb` hardware pair, and whose
/// `Result`-class registers a caller's value therefore survives?
pub fn is_muldiv_helper_call(i: &Instruction) -> bool {
    i.opcode == Opcode::Call
        && matches!(i.dst.as_ref().map(|d| &d.kind), Some(crate::ir::operand::OperandKind::ImmCogLabel(name)) if is_muldiv_helper_name(name))
}

/// Which flag bits `c` actually inspects.
pub fn flags_used_by_cond(c: Condition) -> (bool, bool) {
    (c.reads_c(), c.reads_z())
}

/// True iff `inner` only ever fires when `outer` would too.
pub fn cond_is_subset(outer: Condition, inner: Condition) -> bool {
    inner.is_subset_of(outer)
}

pub fn invert_cond(c: Condition) -> Condition {
    c.invert()
}

/// Does this operand need an `AUGS`/`AUGD` prefix word on P2 (immediates
/// that don't fit the instruction's 9-bit immediate field)?
fn needs_augment(op: &Operand, arch: TargetArch) -> bool {
    if arch != TargetArch::P2 {
        return false;
    }
    matches!(op.as_imm_int(), Some(v) if !(0..=511).contains(&v))
}

/// Fixed per-opcode lower-bound cycle counts (P2 clocks), plus 2 for every
/// operand that needs augmenting. These are heuristic approximations of
/// the reference implementation's lookup table, accurate enough to drive
/// the F-cache sizer and CORDIC reorderer, never load-bearing for
/// correctness.
pub fn instr_min_cycles(i: &Instruction, arch: TargetArch) -> u32 {
    let mut base = if i.opcode.is_pseudo() {
        0
    } else if i.opcode.is_memory() {
        9
    } else if i.opcode.is_branch() {
        4
    } else if i.opcode.is_cordic_command() || i.opcode.is_cordic_get() {
        if i.opcode.is_cordic_get() {
            2
        } else {
            8
        }
    } else if i.opcode.is_hardware_touch() {
        7
    } else {
        2
    };
    for op in [&i.dst, &i.src, &i.src2].into_iter().flatten() {
        if needs_augment(op, arch) {
            base += 2;
        }
    }
    base
}

/// Size, in longs, this instruction occupies in the emitted code stream.
/// The primitive the F-cache promoter (section 4.7) sizes loop bodies
/// with.
pub fn instr_size_longs(i: &Instruction, arch: TargetArch) -> u32 {
    if i.opcode.is_pseudo() {
        return match i.opcode {
            Opcode::StringData => i
                .src
                .as_ref()
                .and_then(|s| match &s.kind {
                    crate::ir::operand::OperandKind::ImmString(b)
                    | crate::ir::operand::OperandKind::ImmBinary(b) => Some(b.len() as u32),
                    _ => None,
                })
                .map_or(0, |n| n.div_ceil(4)),
            Opcode::LabeledBlob => 1,
            _ => 0,
        };
    }
    let mut size = 1;
    for op in [&i.dst, &i.src, &i.src2].into_iter().flatten() {
        if needs_augment(op, arch) {
            size += 1;
        }
    }
    size
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::condcodes::Condition;
    use crate::ir::operand::RegClass;

    #[test]
    fn move_does_not_read_dst() {
        let i = Instruction::new(Opcode::Mov)
            .with_dst(Operand::reg(RegClass::Local, "a"))
            .with_src(Operand::reg(RegClass::Local, "b"));
        assert!(!reads_dst(&i));
    }

    #[test]
    fn add_reads_dst() {
        let i = Instruction::new(Opcode::Add)
            .with_dst(Operand::reg(RegClass::Local, "a"))
            .with_src(Operand::reg(RegClass::Local, "b"));
        assert!(reads_dst(&i));
    }

    #[test]
    fn cmp_sets_dst_only_with_wr() {
        let i = Instruction::new(Opcode::Cmp)
            .with_dst(Operand::reg(RegClass::Local, "a"))
            .with_src(Operand::reg(RegClass::Local, "b"));
        assert!(!sets_dst(&i));
        let i = i.with_flags(crate::ir::opcode::FlagEffects::WR);
        assert!(sets_dst(&i));
    }

    #[test]
    fn uses_looks_through_subreg() {
        let base = Operand::reg(RegClass::Local, "x");
        let sub = Operand::sub_reg(base.clone(), 1);
        let i = Instruction::new(Opcode::Add)
            .with_dst(Operand::reg(RegClass::Local, "y"))
            .with_src(sub);
        assert!(uses(&i, &base));
    }

    #[test]
    fn cond_subset_matches_condition_lattice() {
        assert!(cond_is_subset(Condition::IF_C_OR_Z, Condition::IF_Z));
        assert_eq!(invert_cond(Condition::ALWAYS), Condition::NEVER);
    }
}
