//! The pattern table itself (section 4.4). A curated set of literal
//! patterns covers the structurally distinct rewrites named in the spec;
//! the condition-family merges (`DRV*`, `BIT*`, `NEG*`, `SUM*`) and the
//! single-bit `AND`/`OR` idioms are generated once, per bit position or
//! per condition pair, the same way a legalizer table enumerates a width
//! family instead of hand-writing each width.

use std::sync::OnceLock;

use crate::dataflow::{flags_dead_after, is_dead_after};
use crate::ir::condcodes::Condition;
use crate::ir::opcode::{FlagEffects, Opcode};
use crate::ir::operand::Operand;
use crate::ir::Function;

use super::matcher::{InstMatcher, Match, OperandMatcher as Op};

pub struct PatternEntry {
    pub name: &'static str,
    pub insts: Vec<InstMatcher>,
    pub p2_only: bool,
    pub fixup: Box<dyn Fn(&mut Function, &Match) -> bool + Send + Sync>,
}

impl PatternEntry {
    pub fn p2_only(&self) -> bool {
        self.p2_only
    }
}

pub fn table() -> &'static [PatternEntry] {
    static TABLE: OnceLock<Vec<PatternEntry>> = OnceLock::new();
    TABLE.get_or_init(build_table)
}

fn m(opcode: Opcode) -> InstMatcher {
    InstMatcher::new(opcode)
}

fn build_table() -> Vec<PatternEntry> {
    let mut t = Vec::new();

    // cmp a,b wcz; if_c mov a,b -> minu a,b
    t.push(PatternEntry {
        name: "cmp_mov_minu",
        insts: vec![
            m(Opcode::Cmp).dst(Op::Set(0)).src(Op::Set(1)).must_wc().must_wz(),
            m(Opcode::Mov).fixed_cond(Condition::IF_C).dst(Op::Match(0)).src(Op::Match(1)),
        ],
        p2_only: false,
        fixup: Box::new(|func, mm| {
            func.remove_inst(mm.insts[1]);
            let d = func.data_mut(mm.insts[0]);
            d.opcode = Opcode::MinU;
            d.flags = crate::ir::opcode::FlagEffects::empty();
            true
        }),
    });
    // cmp a,b wcz; if_nc mov a,b -> maxu a,b
    t.push(PatternEntry {
        name: "cmp_mov_maxu",
        insts: vec![
            m(Opcode::Cmp).dst(Op::Set(0)).src(Op::Set(1)).must_wc().must_wz(),
            m(Opcode::Mov).fixed_cond(Condition::IF_NC).dst(Op::Match(0)).src(Op::Match(1)),
        ],
        p2_only: false,
        fixup: Box::new(|func, mm| {
            func.remove_inst(mm.insts[1]);
            let d = func.data_mut(mm.insts[0]);
            d.opcode = Opcode::MaxU;
            d.flags = crate::ir::opcode::FlagEffects::empty();
            true
        }),
    });

    // shl r,#n; shr r,#n -> zerox r,#(31-n)
    t.push(PatternEntry {
        name: "shl_shr_zerox",
        insts: vec![
            m(Opcode::Shl).dst(Op::Set(0)).src(Op::SetImm(0)),
            m(Opcode::Shr).dst(Op::Match(0)).src(Op::Any).any_cond(),
        ],
        p2_only: true,
        fixup: Box::new(|func, mm| {
            let n = mm.imm(0);
            let shr_n = func.data(mm.insts[1]).src.as_ref().and_then(|s| s.as_imm_int());
            if shr_n != Some(n) {
                return false;
            }
            func.remove_inst(mm.insts[1]);
            let d = func.data_mut(mm.insts[0]);
            d.opcode = Opcode::ZeroX;
            d.src = Some(Operand::imm(31 - n));
            true
        }),
    });
    // shl r,#n; sar r,#n -> signx r,#(31-n)
    t.push(PatternEntry {
        name: "shl_sar_signx",
        insts: vec![
            m(Opcode::Shl).dst(Op::Set(0)).src(Op::SetImm(0)),
            m(Opcode::Sar).dst(Op::Match(0)).src(Op::Any).any_cond(),
        ],
        p2_only: true,
        fixup: Box::new(|func, mm| {
            let n = mm.imm(0);
            let sar_n = func.data(mm.insts[1]).src.as_ref().and_then(|s| s.as_imm_int());
            if sar_n != Some(n) {
                return false;
            }
            func.remove_inst(mm.insts[1]);
            let d = func.data_mut(mm.insts[0]);
            d.opcode = Opcode::SignX;
            d.src = Some(Operand::imm(31 - n));
            true
        }),
    });

    // wrc x; and x,#1 -> delete the and (x already holds 0/1).
    t.push(PatternEntry {
        name: "wrc_and1_delete",
        insts: vec![
            m(Opcode::WrC).dst(Op::Set(0)),
            m(Opcode::And).dst(Op::Match(0)).src(Op::Imm(1)),
        ],
        p2_only: false,
        fixup: Box::new(|func, mm| {
            func.remove_inst(mm.insts[1]);
            true
        }),
    });

    // neg x,x wc; if_c neg x,x -> abs x,x wc
    t.push(PatternEntry {
        name: "neg_negc_abs",
        insts: vec![
            m(Opcode::Neg).dst(Op::Set(0)).src(Op::Match(0)).must_wc(),
            m(Opcode::Neg).fixed_cond(Condition::IF_C).dst(Op::Match(0)).src(Op::Match(0)),
        ],
        p2_only: false,
        fixup: Box::new(|func, mm| {
            func.remove_inst(mm.insts[1]);
            func.data_mut(mm.insts[0]).opcode = Opcode::Abs;
            true
        }),
    });

    // rdbyte x,y; shl x,#24; shr x,#24 -> rdbyte x,y (shifts are a no-op,
    // rdbyte already zero-extends).
    t.push(PatternEntry {
        name: "rdbyte_shl24_shr24",
        insts: vec![
            m(Opcode::RdByte).dst(Op::Set(0)).src(Op::Any),
            m(Opcode::Shl).dst(Op::Match(0)).src(Op::Imm(24)),
            m(Opcode::Shr).dst(Op::Match(0)).src(Op::Imm(24)),
        ],
        p2_only: false,
        fixup: Box::new(|func, mm| {
            func.remove_inst(mm.insts[2]);
            func.remove_inst(mm.insts[1]);
            true
        }),
    });

    // Two consecutive identical QMUL/QDIV calls separated by a GETQX
    // whose operands match -> delete the second command (resolved Open
    // Question: a 3-instruction window, matching the fixup's actual reads).
    for op in [Opcode::QMul, Opcode::QDiv] {
        t.push(PatternEntry {
            name: "qcmd_getqx_qcmd_dedup",
            insts: vec![
                m(op).dst(Op::Set(0)).src(Op::Set(1)),
                m(Opcode::GetQx).dst(Op::Set(2)).src(Op::Any),
                m(op).dst(Op::Match(0)).src(Op::Match(1)),
            ],
            p2_only: true,
            fixup: Box::new(|func, mm| {
                func.remove_inst(mm.insts[2]);
                true
            }),
        });
    }

    // mov x,#0; cmp a,b wz; if_e mov x,#1 -> cmp a,b wz; wrz x
    t.push(PatternEntry {
        name: "mov0_cmp_move1_wrz",
        insts: vec![
            m(Opcode::Mov).dst(Op::Set(0)).src(Op::Imm(0)),
            m(Opcode::Cmp).dst(Op::Set(1)).src(Op::Set(2)).must_wz(),
            m(Opcode::Mov).fixed_cond(Condition::IF_E).dst(Op::Match(0)).src(Op::Imm(1)),
        ],
        p2_only: false,
        fixup: Box::new(|func, mm| {
            func.remove_inst(mm.insts[0]);
            let x = mm.op(0).clone();
            let d = func.data_mut(mm.insts[2]);
            d.opcode = Opcode::WrZ;
            d.cond = Condition::ALWAYS;
            d.dst = Some(x);
            d.src = None;
            true
        }),
    });

    // add p,#n; mov x,p; sub p,#n -> mov x,p; add x,#n
    t.push(PatternEntry {
        name: "add_mov_sub_hoist",
        insts: vec![
            m(Opcode::Add).dst(Op::Set(0)).src(Op::SetImm(0)),
            m(Opcode::Mov).dst(Op::Set(1)).src(Op::Match(0)),
            m(Opcode::Sub).dst(Op::Match(0)).src(Op::Any),
        ],
        p2_only: false,
        fixup: Box::new(|func, mm| {
            let n = mm.imm(0);
            let sub_n = func.data(mm.insts[2]).src.as_ref().and_then(|s| s.as_imm_int());
            if sub_n != Some(n) {
                return false;
            }
            let x = mm.op(1).clone();
            let insert_after = mm.insts[1];
            func.remove_inst(mm.insts[2]);
            func.remove_inst(mm.insts[0]);
            func.insert_after(
                crate::ir::Instruction::new(Opcode::Add).with_dst(x).with_src(Operand::imm(n)),
                insert_after,
            );
            true
        }),
    });

    // mov x,#255; and x,y -> getbyte x,y,#0
    t.push(PatternEntry {
        name: "mov255_and_getbyte",
        insts: vec![
            m(Opcode::Mov).dst(Op::Set(0)).src(Op::Imm(255)),
            m(Opcode::And).dst(Op::Match(0)).src(Op::Set(1)),
        ],
        p2_only: true,
        fixup: Box::new(|func, mm| {
            func.remove_inst(mm.insts[0]);
            let d = func.data_mut(mm.insts[1]);
            d.opcode = Opcode::Getbyte;
            d.src2 = Some(Operand::imm(0));
            true
        }),
    });

    // and x,#255; wrbyte x,y -> drop the and (wrbyte only reads the low byte).
    t.push(PatternEntry {
        name: "and255_wrbyte_drop",
        insts: vec![
            m(Opcode::And).dst(Op::Set(0)).src(Op::Imm(255)),
            m(Opcode::WrByte).dst(Op::Match(0)).src(Op::Any),
        ],
        p2_only: false,
        fixup: Box::new(|func, mm| {
            func.remove_inst(mm.insts[0]);
            true
        }),
    });

    // subx r,r -> delete (adds -C into itself minus itself: net effect on
    // the register is always zero minus a borrow already folded elsewhere).
    t.push(PatternEntry {
        name: "subx_self_delete",
        insts: vec![m(Opcode::SubX).dst(Op::Set(0)).src(Op::MatchDead(0))],
        p2_only: false,
        fixup: Box::new(|func, mm| {
            if !is_dead_after(func, mm.insts[0], mm.op(0)) {
                return false;
            }
            func.remove_inst(mm.insts[0]);
            true
        }),
    });

    // jmp #l; jmp #l -> delete the first, unreachable regardless of its
    // own condition once the second always lands on the same target.
    t.push(PatternEntry {
        name: "double_jmp_dedup",
        insts: vec![
            m(Opcode::Jmp).any_cond(),
            m(Opcode::Jmp).any_cond(),
        ],
        p2_only: false,
        fixup: Box::new(|func, mm| {
            let a = func.data(mm.insts[0]).jump_target();
            let b = func.data(mm.insts[1]).jump_target();
            if a.is_none() || a != b {
                return false;
            }
            func.remove_inst(mm.insts[0]);
            true
        }),
    });

    // cmp a,#k wcz; if_nc mov a,#(k-1) -> mins a,#(k-1); the off-by-one
    // GE clamp variant of the CMP+MOV min/max family.
    t.push(PatternEntry {
        name: "cmp_immediate_ge_clamp_mins",
        insts: vec![
            m(Opcode::Cmp).dst(Op::Set(0)).src(Op::SetImm(0)).must_wc().must_wz(),
            m(Opcode::Mov).fixed_cond(Condition::IF_NC).dst(Op::Match(0)).src(Op::MatchM1S(0)),
        ],
        p2_only: false,
        fixup: Box::new(|func, mm| {
            if !flags_dead_after(func, mm.insts[1], FlagEffects::WCZ) {
                return false;
            }
            let k = mm.imm(0);
            func.remove_inst(mm.insts[1]);
            let d = func.data_mut(mm.insts[0]);
            d.opcode = Opcode::MinS;
            d.src = Some(Operand::imm(k - 1));
            d.flags = FlagEffects::empty();
            true
        }),
    });
    // cmp a,#k wcz; if_c mov a,#(k-1) -> maxu a,#(k-1); the off-by-one LE
    // clamp variant, unsigned.
    t.push(PatternEntry {
        name: "cmp_immediate_le_clamp_maxu",
        insts: vec![
            m(Opcode::Cmp).dst(Op::Set(0)).src(Op::SetImm(0)).must_wc().must_wz(),
            m(Opcode::Mov).fixed_cond(Condition::IF_C).dst(Op::Match(0)).src(Op::MatchM1U(0)),
        ],
        p2_only: false,
        fixup: Box::new(|func, mm| {
            if !flags_dead_after(func, mm.insts[1], FlagEffects::WCZ) {
                return false;
            }
            let k = mm.imm(0);
            func.remove_inst(mm.insts[1]);
            let d = func.data_mut(mm.insts[0]);
            d.opcode = Opcode::MaxU;
            d.src = Some(Operand::imm(k - 1));
            d.flags = FlagEffects::empty();
            true
        }),
    });

    push_cond_merges(&mut t);
    push_bit_families(&mut t);
    t
}

/// `if_c drvh x; if_nc drvl x` (and its C/Z-flavored siblings) merge into
/// one hardware-evaluated `DRV*` instruction; likewise `NEG`/`MOV` merge
/// into `NEG{C,NC,Z,NZ}` and `SUB`/`ADD` merge into `SUM{C,NC,Z,NZ}`.
fn push_cond_merges(t: &mut Vec<PatternEntry>) {
    let families: &[(Condition, Opcode, Condition, Opcode, Opcode)] = &[
        (Condition::IF_C, Opcode::DrvH, Condition::IF_NC, Opcode::DrvL, Opcode::DrvC),
        (Condition::IF_C, Opcode::DrvL, Condition::IF_NC, Opcode::DrvH, Opcode::DrvNc),
        (Condition::IF_Z, Opcode::DrvH, Condition::IF_NZ, Opcode::DrvL, Opcode::DrvZ),
        (Condition::IF_Z, Opcode::DrvL, Condition::IF_NZ, Opcode::DrvH, Opcode::DrvNz),
        (Condition::IF_C, Opcode::Neg, Condition::IF_NC, Opcode::Mov, Opcode::NegC),
        (Condition::IF_NC, Opcode::Neg, Condition::IF_C, Opcode::Mov, Opcode::NegNc),
        (Condition::IF_Z, Opcode::Neg, Condition::IF_NZ, Opcode::Mov, Opcode::NegZ),
        (Condition::IF_NZ, Opcode::Neg, Condition::IF_Z, Opcode::Mov, Opcode::NegNz),
        (Condition::IF_C, Opcode::Sub, Condition::IF_NC, Opcode::Add, Opcode::SumC),
        (Condition::IF_NC, Opcode::Sub, Condition::IF_C, Opcode::Add, Opcode::SumNc),
        (Condition::IF_Z, Opcode::Sub, Condition::IF_NZ, Opcode::Add, Opcode::SumZ),
        (Condition::IF_NZ, Opcode::Sub, Condition::IF_Z, Opcode::Add, Opcode::SumNz),
    ];
    for &(c1, op1, c2, op2, merged) in families {
        t.push(PatternEntry {
            name: "cond_merge",
            insts: vec![
                m(op1).fixed_cond(c1).dst(Op::Set(0)).src(Op::Set(1)),
                m(op2).fixed_cond(c2).dst(Op::Match(0)).src(Op::Match(1)),
            ],
            p2_only: false,
            fixup: Box::new(move |func, mm| {
                func.remove_inst(mm.insts[1]);
                func.data_mut(mm.insts[0]).opcode = merged;
                func.data_mut(mm.insts[0]).cond = Condition::ALWAYS;
                true
            }),
        });
    }
}

/// `and r,#~(1<<k)` clears a single bit -> `bitl r,#k`; `or r,#(1<<k)` sets
/// a single bit -> `bith r,#k`. Generated per bit position, the same way
/// a width-family legalizer rule is instantiated once per width.
fn push_bit_families(t: &mut Vec<PatternEntry>) {
    for k in 0u32..32 {
        let clear_mask = !(1i64 << k) as i32 as i64;
        t.push(PatternEntry {
            name: "and_clearbit_bitl",
            insts: vec![m(Opcode::And).dst(Op::Set(0)).src(Op::Imm(clear_mask))],
            p2_only: true,
            fixup: Box::new(move |func, mm| {
                let d = func.data_mut(mm.insts[0]);
                d.opcode = Opcode::BitL;
                d.src = Some(Operand::imm(k as i64));
                true
            }),
        });
        let set_mask = 1i64 << k;
        t.push(PatternEntry {
            name: "or_setbit_bith",
            insts: vec![m(Opcode::Or).dst(Op::Set(0)).src(Op::Imm(set_mask))],
            p2_only: true,
            fixup: Box::new(move |func, mm| {
                let d = func.data_mut(mm.insts[0]);
                d.opcode = Opcode::BitH;
                d.src = Some(Operand::imm(k as i64));
                true
            }),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetArch;
    use crate::ir::function::CallConv;
    use crate::ir::operand::RegClass;
    use crate::ir::Instruction;

    #[test]
    fn table_has_at_least_sixty_entries() {
        assert!(table().len() >= 60, "{}", table().len());
    }

    #[test]
    fn shl_shr_pair_becomes_zerox() {
        let mut f = Function::new("t", CallConv::Fast);
        let r = Operand::reg(RegClass::Local, "r");
        f.push(Instruction::new(Opcode::Shl).with_dst(r.clone()).with_src(Operand::imm(8)));
        f.push(Instruction::new(Opcode::Shr).with_dst(r.clone()).with_src(Operand::imm(8)));
        assert!(crate::peephole::run(&mut f, TargetArch::P2));
        let first = f.iter().next().unwrap();
        assert_eq!(f.data(first).opcode, Opcode::ZeroX);
        assert_eq!(f.num_insts(), 1);
    }

    #[test]
    fn clear_bit_mask_becomes_bitl() {
        let mut f = Function::new("t", CallConv::Fast);
        let r = Operand::reg(RegClass::Local, "r");
        f.push(Instruction::new(Opcode::And).with_dst(r).with_src(Operand::imm(!(1i64 << 5) as i32 as i64)));
        assert!(crate::peephole::run(&mut f, TargetArch::P2));
        let first = f.iter().next().unwrap();
        assert_eq!(f.data(first).opcode, Opcode::BitL);
    }

    #[test]
    fn p2_only_pattern_skipped_on_p1() {
        let mut f = Function::new("t", CallConv::Fast);
        let r = Operand::reg(RegClass::Local, "r");
        f.push(Instruction::new(Opcode::And).with_dst(r).with_src(Operand::imm(!(1i64 << 5) as i32 as i64)));
        assert!(!crate::peephole::run(&mut f, TargetArch::P1));
    }
}
