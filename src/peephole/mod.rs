//! The declarative peephole engine (section 4.4): a table of short
//! instruction-window patterns, each paired with a fixup, matched against
//! a sliding window over the instruction list.

pub mod matcher;
pub mod patterns;

use crate::config::TargetArch;
use crate::ir::{Function, Inst};
use crate::timing;

/// Try every pattern against every window start, in table order; at most
/// one pattern fires per window (section 8, invariant 7: pattern
/// determinism — independent of match order beyond "table order, first
/// match wins").
pub fn run(func: &mut Function, arch: TargetArch) -> bool {
    let _t = timing::start(timing::Pass::Peephole);
    let mut changed = false;
    let starts: Vec<Inst> = func.iter().collect();
    for start in starts {
        if !func.layout.is_inserted(start) {
            continue;
        }
        for entry in patterns::table() {
            if entry.p2_only() && arch != TargetArch::P2 {
                continue;
            }
            if let Some(caps) = matcher::try_match(func, start, &entry.insts) {
                if (entry.fixup)(func, &caps) {
                    changed = true;
                    break;
                }
            }
        }
    }
    changed
}
