//! Simple-assignment triangle: `mov T,A; op T,B; mov A,T` with `T` dead
//! thereafter collapses to `op A,B` (section 4.3).

use crate::dataflow::is_dead_after;
use crate::ir::{Function, Inst, Opcode};
use crate::timing;

pub fn run(func: &mut Function) -> bool {
    let _t = timing::start(timing::Pass::AssignTriangle);
    let mut changed = false;
    let insts: Vec<Inst> = func.iter().collect();

    for first in insts {
        if !func.layout.is_inserted(first) {
            continue;
        }
        let d0 = func.data(first).clone();
        if d0.opcode != Opcode::Mov || !d0.cond.is_always() {
            continue;
        }
        let (Some(t), Some(a)) = (d0.dst.clone(), d0.src.clone()) else { continue };

        let Some(mid) = func.layout.next(first) else { continue };
        let d1 = func.data(mid).clone();
        if d1.is_label() || d1.opcode.is_branch() || !d1.cond.is_always() {
            continue;
        }
        if !d1.dst.as_ref().is_some_and(|d| d.same_register(&t)) {
            continue;
        }

        let Some(last) = func.layout.next(mid) else { continue };
        let d2 = func.data(last).clone();
        if d2.opcode != Opcode::Mov || !d2.cond.is_always() {
            continue;
        }
        let (Some(d2dst), Some(d2src)) = (&d2.dst, &d2.src) else { continue };
        if !d2dst.same_register(&a) || !d2src.same_register(&t) {
            continue;
        }
        if !is_dead_after(func, last, &t) {
            continue;
        }

        func.data_mut(mid).dst = Some(a);
        func.remove_inst(first);
        func.remove_inst(last);
        changed = true;
    }
    changed
}
