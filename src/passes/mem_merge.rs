//! Memory read/write merging (section 4.3).

use crate::ir::opcode::Opcode;
use crate::ir::{Function, Inst};
use crate::timing;

pub fn run(func: &mut Function) -> bool {
    let _t = timing::start(timing::Pass::MemMerge);
    let mut changed = false;
    let insts: Vec<Inst> = func.iter().collect();

    for inst in insts {
        if !func.layout.is_inserted(inst) {
            continue;
        }
        let data = func.data(inst).clone();
        if !data.opcode.is_memory_read() || !data.cond.is_always() {
            continue;
        }
        let Some(next) = func.layout.next(inst) else { continue };
        let ndata = func.data(next).clone();

        // Two reads of the same address collapse to one read plus a move.
        if ndata.opcode == data.opcode && ndata.cond.is_always() && ndata.src.as_ref().zip(data.src.as_ref()).is_some_and(|(a, b)| a == b) {
            if let (Some(d0), Some(d1)) = (&data.dst, &ndata.dst) {
                if !d0.same_register(d1) {
                    let d1 = d1.clone();
                    let d = func.data_mut(next);
                    d.opcode = Opcode::Mov;
                    d.src = data.dst.clone();
                    d.dst = Some(d1);
                    changed = true;
                    continue;
                }
            }
        }

        // A narrow read followed by an and-with-full-mask is a no-op and.
        if ndata.opcode == Opcode::And && ndata.cond.is_always() {
            if let Some(mask) = ndata.src.as_ref().and_then(|s| s.as_imm_int()) {
                let full = match data.opcode {
                    Opcode::RdByte => 0xff,
                    Opcode::RdWord => 0xffff,
                    _ => 0,
                };
                if full != 0 && mask == full && ndata.dst.as_ref().is_some_and(|d| data.dst.as_ref().is_some_and(|dd| dd.same_register(d))) {
                    func.remove_inst(next);
                    changed = true;
                }
            }
        }
    }
    changed
}
