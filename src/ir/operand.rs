//! Operands.
//!
//! The reference implementation encodes a subregister or a memory reference
//! by reinterpreting an operand's `name` field as a pointer to a "parent"
//! operand. Per `DESIGN.md`'s Subregisters note, this crate instead gives
//! `SubReg` and the two `MemRef` kinds an explicit, owned `parent`/`base`
//! payload, so `uses`/`modifies`/`same_register` can look through them with
//! ordinary structural recursion instead of pointer-chasing.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// A cheap-to-clone interned-ish name. Real interning lives in the
/// frontend's global symbol tables (out of scope here, per `DESIGN.md`'s
/// Global mutable state note); the optimizer only ever needs to clone and
/// compare these.
pub type Symbol = Rc<str>;

/// Which register namespace a `Reg` operand lives in.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum RegClass {
    /// A module-global register (`RegReg` in the source model).
    Global,
    /// Callee-visible local, recycled by local-register reuse.
    Local,
    /// Callee-visible compiler temporary.
    Temp,
    /// Incoming argument slot.
    Arg,
    /// Outgoing result slot.
    Result,
}

/// Access width of a memory reference or subregister, in bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Size {
    Byte,
    Word,
    Long,
}

impl Size {
    pub fn bytes(self) -> u32 {
        match self {
            Size::Byte => 1,
            Size::Word => 2,
            Size::Long => 4,
        }
    }

    /// The bitmask a full-width read/write of this size covers, used by
    /// the read/write-merging pass's "and-with-full-mask is a no-op" check.
    pub fn full_mask(self) -> u32 {
        match self {
            Size::Byte => 0xff,
            Size::Word => 0xffff,
            Size::Long => 0xffff_ffff,
        }
    }
}

/// The tagged operand kinds from the data model (section 3). `used` and
/// `size` are carried on [`Operand`] itself, not per-kind, matching "a
/// usage refcount, and a size in bytes" applying uniformly.
#[derive(Clone, Debug)]
pub enum OperandKind {
    ImmInt(i64),
    ImmCogLabel(Symbol),
    ImmHubLabel(Symbol),
    ImmString(Rc<[u8]>),
    /// `$ ± n`, resolved later to a generated label by the text emitter.
    ImmPcRelative(i32),
    ImmBinary(Rc<[u8]>),
    Reg(RegClass, Symbol),
    /// A named hardware register (`ptra`, `pa`, `cnt`, ...).
    RegHw(Symbol),
    RegHubPtr(Symbol),
    RegCogPtr(Symbol),
    /// View into `parent` at long-index `offset` (`name`/`val` in the
    /// source model).
    SubReg { parent: Box<Operand>, offset: u32 },
    HubMemRef { base: Box<Operand>, offset: i32, size: Size },
    CogMemRef { base: Box<Operand>, offset: i32, size: Size },
    StringDef(Symbol, Rc<[u8]>),
}

/// A single operand: kind, a usage refcount, and a size in bytes.
#[derive(Clone, Debug)]
pub struct Operand {
    pub kind: OperandKind,
    used: Cell<u32>,
    pub size_bytes: u8,
}

impl Operand {
    pub fn new(kind: OperandKind, size_bytes: u8) -> Self {
        Operand { kind, used: Cell::new(0), size_bytes }
    }

    pub fn imm(v: i64) -> Self {
        Operand::new(OperandKind::ImmInt(v), 4)
    }

    pub fn reg(class: RegClass, name: impl Into<Symbol>) -> Self {
        Operand::new(OperandKind::Reg(class, name.into()), 4)
    }

    pub fn hw(name: impl Into<Symbol>) -> Self {
        Operand::new(OperandKind::RegHw(name.into()), 4)
    }

    pub fn cog_label(name: impl Into<Symbol>) -> Self {
        Operand::new(OperandKind::ImmCogLabel(name.into()), 4)
    }

    pub fn hub_label(name: impl Into<Symbol>) -> Self {
        Operand::new(OperandKind::ImmHubLabel(name.into()), 4)
    }

    pub fn sub_reg(parent: Operand, offset: u32) -> Self {
        Operand::new(
            OperandKind::SubReg { parent: Box::new(parent), offset },
            4,
        )
    }

    pub fn hub_mem(base: Operand, offset: i32, size: Size) -> Self {
        Operand::new(
            OperandKind::HubMemRef { base: Box::new(base), offset, size },
            size.bytes() as u8,
        )
    }

    pub fn cog_mem(base: Operand, offset: i32, size: Size) -> Self {
        Operand::new(
            OperandKind::CogMemRef { base: Box::new(base), offset, size },
            size.bytes() as u8,
        )
    }

    /// Bump the usage refcount; called whenever a structural query matches
    /// this operand against a use/def site, mirroring the source model's
    /// per-operand `used` counter.
    pub fn mark_used(&self) {
        self.used.set(self.used.get() + 1);
    }

    pub fn use_count(&self) -> u32 {
        self.used.get()
    }

    pub fn is_immediate(&self) -> bool {
        matches!(
            self.kind,
            OperandKind::ImmInt(_)
                | OperandKind::ImmCogLabel(_)
                | OperandKind::ImmHubLabel(_)
                | OperandKind::ImmString(_)
                | OperandKind::ImmPcRelative(_)
                | OperandKind::ImmBinary(_)
        )
    }

    pub fn is_register(&self) -> bool {
        matches!(
            self.kind,
            OperandKind::Reg(..)
                | OperandKind::RegHw(_)
                | OperandKind::RegHubPtr(_)
                | OperandKind::RegCogPtr(_)
                | OperandKind::SubReg { .. }
        )
    }

    pub fn is_hardware(&self) -> bool {
        matches!(self.kind, OperandKind::RegHw(_))
    }

    pub fn is_memory_ref(&self) -> bool {
        matches!(self.kind, OperandKind::HubMemRef { .. } | OperandKind::CogMemRef { .. })
    }

    pub fn is_local_or_arg(&self) -> bool {
        matches!(
            self.kind,
            OperandKind::Reg(RegClass::Local | RegClass::Arg | RegClass::Temp, _)
        )
    }

    pub fn is_result(&self) -> bool {
        matches!(self.kind, OperandKind::Reg(RegClass::Result, _))
    }

    pub fn as_imm_int(&self) -> Option<i64> {
        match self.kind {
            OperandKind::ImmInt(v) => Some(v),
            _ => None,
        }
    }

    /// The register this operand ultimately reads/writes through, looking
    /// past any `SubReg` wrapper — used by "subregister parents compared
    /// by base" structural matches.
    pub fn base_register(&self) -> &Operand {
        match &self.kind {
            OperandKind::SubReg { parent, .. } => parent.base_register(),
            _ => self,
        }
    }

    /// Structural "same underlying register" comparison that looks through
    /// subregisters and compares by base, per section 4.1's `uses`/`modifies`.
    pub fn same_register(&self, other: &Operand) -> bool {
        match (&self.kind, &other.kind) {
            (OperandKind::Reg(ca, na), OperandKind::Reg(cb, nb)) => ca == cb && na == nb,
            (OperandKind::RegHw(a), OperandKind::RegHw(b)) => a == b,
            (OperandKind::RegHubPtr(a), OperandKind::RegHubPtr(b)) => a == b,
            (OperandKind::RegCogPtr(a), OperandKind::RegCogPtr(b)) => a == b,
            (OperandKind::SubReg { .. }, _) | (_, OperandKind::SubReg { .. }) => {
                self.base_register().same_register(other.base_register())
                    && self.sub_offset() == other.sub_offset()
            }
            _ => false,
        }
    }

    /// True if `self` and `other` name the same base register, ignoring
    /// subregister offset — used when a whole-register write must be
    /// treated as killing every subregister view of it.
    pub fn overlaps_register(&self, other: &Operand) -> bool {
        self.is_register() && other.is_register() && self.base_register().same_register(other.base_register())
    }

    fn sub_offset(&self) -> Option<u32> {
        match &self.kind {
            OperandKind::SubReg { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

impl PartialEq for Operand {
    fn eq(&self, other: &Self) -> bool {
        use OperandKind::*;
        match (&self.kind, &other.kind) {
            (ImmInt(a), ImmInt(b)) => a == b,
            (ImmCogLabel(a), ImmCogLabel(b)) => a == b,
            (ImmHubLabel(a), ImmHubLabel(b)) => a == b,
            (ImmString(a), ImmString(b)) => a == b,
            (ImmPcRelative(a), ImmPcRelative(b)) => a == b,
            (ImmBinary(a), ImmBinary(b)) => a == b,
            (Reg(ca, na), Reg(cb, nb)) => ca == cb && na == nb,
            (RegHw(a), RegHw(b)) => a == b,
            (RegHubPtr(a), RegHubPtr(b)) => a == b,
            (RegCogPtr(a), RegCogPtr(b)) => a == b,
            (SubReg { parent: pa, offset: oa }, SubReg { parent: pb, offset: ob }) => {
                oa == ob && pa == pb
            }
            (
                HubMemRef { base: ba, offset: oa, size: sa },
                HubMemRef { base: bb, offset: ob, size: sb },
            ) => oa == ob && sa == sb && ba == bb,
            (
                CogMemRef { base: ba, offset: oa, size: sa },
                CogMemRef { base: bb, offset: ob, size: sb },
            ) => oa == ob && sa == sb && ba == bb,
            (StringDef(na, _), StringDef(nb, _)) => na == nb,
            _ => false,
        }
    }
}
impl Eq for Operand {}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OperandKind::ImmInt(v) => write!(f, "#{v}"),
            OperandKind::ImmCogLabel(n) | OperandKind::ImmHubLabel(n) => write!(f, "#{n}"),
            OperandKind::ImmString(_) => write!(f, "<string>"),
            OperandKind::ImmPcRelative(n) => write!(f, "$+{n}"),
            OperandKind::ImmBinary(_) => write!(f, "<blob>"),
            OperandKind::Reg(_, n) => write!(f, "{n}"),
            OperandKind::RegHw(n) => write!(f, "{n}"),
            OperandKind::RegHubPtr(n) | OperandKind::RegCogPtr(n) => write!(f, "@{n}"),
            OperandKind::SubReg { parent, offset } => write!(f, "{parent}+{offset}"),
            OperandKind::HubMemRef { base, offset, .. } => write!(f, "hub[{base}+{offset}]"),
            OperandKind::CogMemRef { base, offset, .. } => write!(f, "cog[{base}+{offset}]"),
            OperandKind::StringDef(n, _) => write!(f, "{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_register_ignores_subreg_offset_difference_is_tracked() {
        let base = Operand::reg(RegClass::Local, "x");
        let a = Operand::sub_reg(base.clone(), 0);
        let b = Operand::sub_reg(base.clone(), 1);
        assert!(a.overlaps_register(&b));
        assert!(!a.same_register(&b));
        assert!(a.same_register(&Operand::sub_reg(base, 0)));
    }

    #[test]
    fn use_count_accumulates() {
        let op = Operand::reg(RegClass::Local, "y");
        assert_eq!(op.use_count(), 0);
        op.mark_used();
        op.mark_used();
        assert_eq!(op.use_count(), 2);
    }
}
