//! A cursor for walking and editing a function's instruction list.
//!
//! Grounded in `cranelift-codegen`'s `cursor.rs`, trimmed to this crate's
//! flat (block-less) layout: there is only ever `Nowhere`/`At(Inst)`, never
//! `Before(Block)`/`After(Block)`, since the IR has no block structure
//! (section 1).

use crate::ir::{Function, Inst, Instruction};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CursorPosition {
    /// Not pointing anywhere; `next_inst`/`insert_*` do nothing.
    Nowhere,
    /// Positioned at an existing instruction. New instructions are
    /// inserted immediately *before* it unless noted otherwise.
    At(Inst),
}

/// A cursor over one function's instruction list, tracking the current
/// source line so newly built instructions inherit it automatically.
pub struct FuncCursor<'f> {
    pub func: &'f mut Function,
    pos: CursorPosition,
    line: Option<u32>,
}

impl<'f> FuncCursor<'f> {
    pub fn new(func: &'f mut Function) -> Self {
        FuncCursor { func, pos: CursorPosition::Nowhere, line: None }
    }

    pub fn with_line(mut self, line: Option<u32>) -> Self {
        self.line = line;
        self
    }

    pub fn at_position(mut self, pos: CursorPosition) -> Self {
        self.pos = pos;
        self
    }

    pub fn at(mut self, inst: Inst) -> Self {
        self.pos = CursorPosition::At(inst);
        self
    }

    pub fn position(&self) -> CursorPosition {
        self.pos
    }

    pub fn set_position(&mut self, pos: CursorPosition) {
        self.pos = pos;
    }

    pub fn goto_top(&mut self) {
        self.pos = match self.func.layout.head() {
            Some(h) => CursorPosition::At(h),
            None => CursorPosition::Nowhere,
        };
    }

    pub fn goto_bottom(&mut self) {
        self.pos = match self.func.layout.tail() {
            Some(t) => CursorPosition::At(t),
            None => CursorPosition::Nowhere,
        };
    }

    /// Current instruction, if any.
    pub fn current(&self) -> Option<Inst> {
        match self.pos {
            CursorPosition::At(i) => Some(i),
            CursorPosition::Nowhere => None,
        }
    }

    /// Advance to the next instruction, returning it, or `None` at the
    /// end of the list (leaving the cursor at `Nowhere`).
    pub fn next_inst(&mut self) -> Option<Inst> {
        let cur = self.current()?;
        match self.func.layout.next(cur) {
            Some(n) => {
                self.pos = CursorPosition::At(n);
                Some(n)
            }
            None => {
                self.pos = CursorPosition::Nowhere;
                None
            }
        }
    }

    pub fn prev_inst(&mut self) -> Option<Inst> {
        let cur = self.current()?;
        match self.func.layout.prev(cur) {
            Some(p) => {
                self.pos = CursorPosition::At(p);
                Some(p)
            }
            None => {
                self.pos = CursorPosition::Nowhere;
                None
            }
        }
    }

    fn stamp(&self, mut inst: Instruction) -> Instruction {
        if inst.line.is_none() {
            inst.line = self.line;
        }
        inst
    }

    /// Insert `inst` before the cursor's current instruction, or append it
    /// to the end of the list if the cursor is `Nowhere`. Returns the new
    /// instruction's reference; the cursor does not move.
    pub fn insert(&mut self, inst: Instruction) -> Inst {
        let inst = self.stamp(inst);
        match self.current() {
            Some(at) => self.func.insert_before(inst, at),
            None => self.func.push(inst),
        }
    }

    /// Insert `inst` immediately after the cursor's current instruction.
    pub fn insert_after(&mut self, inst: Instruction) -> Inst {
        let inst = self.stamp(inst);
        match self.current() {
            Some(at) => self.func.insert_after(inst, at),
            None => self.func.push(inst),
        }
    }

    /// Remove the current instruction and advance to the one that used to
    /// follow it.
    pub fn remove_inst(&mut self) -> Option<Inst> {
        let cur = self.current()?;
        let next = self.func.layout.next(cur);
        self.func.remove_inst(cur);
        self.pos = match next {
            Some(n) => CursorPosition::At(n),
            None => CursorPosition::Nowhere,
        };
        Some(cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CallConv, Opcode};

    #[test]
    fn insert_before_and_walk() {
        let mut f = Function::new("t", CallConv::Fast);
        let a = f.push(Instruction::new(Opcode::Mov));
        let mut cur = FuncCursor::new(&mut f).at(a);
        cur.insert(Instruction::new(Opcode::Add));
        cur.goto_top();
        assert_eq!(cur.func.opcode(cur.current().unwrap()), Opcode::Add);
        cur.next_inst();
        assert_eq!(cur.func.opcode(cur.current().unwrap()), Opcode::Mov);
    }

    #[test]
    fn remove_inst_advances() {
        let mut f = Function::new("t", CallConv::Fast);
        let a = f.push(Instruction::new(Opcode::Mov));
        let b = f.push(Instruction::new(Opcode::Add));
        let mut cur = FuncCursor::new(&mut f).at(a);
        let removed = cur.remove_inst();
        assert_eq!(removed, Some(a));
        assert_eq!(cur.current(), Some(b));
    }
}
