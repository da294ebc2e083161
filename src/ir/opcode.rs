//! Opcodes and flag-effect bits.

use bitflags::bitflags;
use core::fmt;

bitflags! {
    /// Flag-effect bits an instruction can carry. `WC`/`WZ` request the
    /// hardware update C/Z from the instruction's natural result; `WCZ` is
    /// shorthand for both. `WR`/`NR` override whether the result is written
    /// back (used by `CMP`-family and `LOCK*` instructions, which otherwise
    /// default to "write"/"don't write" respectively). `ANDC`/`ORC`/`XORC`
    /// (and their `Z` counterparts) combine the natural flag result with the
    /// flag's previous value instead of overwriting it.
    #[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
    pub struct FlagEffects: u16 {
        const WC    = 0b0000_0000_0001;
        const WZ    = 0b0000_0000_0010;
        const WCZ   = Self::WC.bits() | Self::WZ.bits();
        const WR    = 0b0000_0000_0100;
        const NR    = 0b0000_0000_1000;
        const ANDC  = 0b0000_0001_0000;
        const ORC   = 0b0000_0010_0000;
        const XORC  = 0b0000_0100_0000;
        const ANDZ  = 0b0000_1000_0000;
        const ORZ   = 0b0001_0000_0000;
        const XORZ  = 0b0010_0000_0000;
    }
}

impl FlagEffects {
    /// Does this instruction write C at all, whether plainly or combined?
    pub fn writes_c(self) -> bool {
        self.intersects(Self::WC | Self::ANDC | Self::ORC | Self::XORC)
    }

    /// Does this instruction write Z at all, whether plainly or combined?
    pub fn writes_z(self) -> bool {
        self.intersects(Self::WZ | Self::ANDZ | Self::ORZ | Self::XORZ)
    }

    /// True for the plain (non-combining) `WC`/`WZ`/`WCZ` forms, where the
    /// resulting flag value is fully determined by the instruction's result
    /// and not by the flag's previous value.
    pub fn writes_c_unconditionally(self) -> bool {
        self.contains(Self::WC) && !self.intersects(Self::ANDC | Self::ORC | Self::XORC)
    }

    pub fn writes_z_unconditionally(self) -> bool {
        self.contains(Self::WZ) && !self.intersects(Self::ANDZ | Self::ORZ | Self::XORZ)
    }
}

/// Per-operand effect bits, passed to the text emitter verbatim.
bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
    pub struct OperandEffects: u16 {
        const NONE        = 0;
        const PREINC      = 0b0000_0001;
        const PREDEC      = 0b0000_0010;
        const POSTINC     = 0b0000_0100;
        const POSTDEC     = 0b0000_1000;
        const FORCEHUB    = 0b0001_0000;
        const FORCEABS    = 0b0010_0000;
        const NOIMM       = 0b0100_0000;
        const DUMMY_ZERO  = 0b1000_0000;
    }
}

/// Opcode space. Pseudo-ops the text emitter recognizes verbatim are
/// interleaved with real machine opcodes; `Instruction::is_pseudo` tells
/// them apart.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[non_exhaustive]
pub enum Opcode {
    // --- data movement ---
    Mov,
    MovS,
    MovD,
    Neg,
    NegC,
    NegNc,
    NegZ,
    NegNz,
    Abs,
    Not,
    Ones,

    // --- arithmetic / logic ---
    Add,
    AddX,
    Sub,
    SubX,
    SubSx,
    And,
    AndN,
    Or,
    Xor,
    Shl,
    Shr,
    Sar,
    Rcl,
    Rcr,
    ZeroX,
    SignX,
    Decod,
    Encod,
    BMask,
    BitH,
    BitL,
    BitC,
    BitNc,
    BitNot,
    TestB,
    TestBn,
    Cmp,
    CmpS,
    Test,
    TestN,
    MaxS,
    MaxU,
    MinS,
    MinU,
    MuxC,
    MuxZ,
    SumC,
    SumNc,
    SumZ,
    SumNz,
    DrvC,
    DrvNc,
    DrvZ,
    DrvNz,
    DrvH,
    DrvL,
    AddCt1,
    Getbyte,
    Getword,
    Getnib,
    Setbyte,
    Setword,
    WrC,
    WrNc,
    WrZ,
    WrNz,

    // --- memory ---
    RdByte,
    RdWord,
    RdLong,
    WrByte,
    WrWord,
    WrLong,
    SetQ,
    SetQ2,
    Push,

    // --- control flow ---
    Jmp,
    Call,
    Ret,
    Djnz,
    JmpRel,
    TJz,
    TJnz,

    // --- CORDIC ---
    QMul,
    QDiv,
    QFrac,
    QRotate,
    QSqrt,
    QVector,
    QLog,
    QExp,
    GetQx,
    GetQy,

    // --- hardware / system ---
    GetCt,
    RdPin,
    HubSet,
    CogStop,
    WaitCnt,
    WaitPEq,
    LockTry,
    LockRet,
    LockSet,
    LockClr,

    // --- pseudo-ops consumed by the text emitter ---
    Label,
    Comment,
    Dummy,
    Const,
    Literal,
    Byte,
    Word,
    Long,
    StringData,
    Reserve,
    ReserveH,
    AlignL,
    Org,
    OrgF,
    OrgH,
    Fit,
    Fcache,
    LabeledBlob,
    Live,
    Repeat,
    RepeatEnd,
    HubMode,
    Compress3,
    Break,
}

impl Opcode {
    /// True for pseudo-ops that carry no architectural semantics of their
    /// own and are opaque to every dataflow query (they are neither reads
    /// nor writes of any register).
    pub fn is_pseudo(self) -> bool {
        matches!(
            self,
            Opcode::Label
                | Opcode::Comment
                | Opcode::Dummy
                | Opcode::Const
                | Opcode::Literal
                | Opcode::Byte
                | Opcode::Word
                | Opcode::Long
                | Opcode::StringData
                | Opcode::Reserve
                | Opcode::ReserveH
                | Opcode::AlignL
                | Opcode::Org
                | Opcode::OrgF
                | Opcode::OrgH
                | Opcode::Fit
                | Opcode::Fcache
                | Opcode::LabeledBlob
                | Opcode::Live
                | Opcode::Repeat
                | Opcode::RepeatEnd
                | Opcode::HubMode
                | Opcode::Compress3
                | Opcode::Break
        )
    }

    pub fn is_label(self) -> bool {
        matches!(self, Opcode::Label)
    }

    pub fn is_call(self) -> bool {
        matches!(self, Opcode::Call)
    }

    pub fn is_return(self) -> bool {
        matches!(self, Opcode::Ret)
    }

    pub fn is_jump(self) -> bool {
        matches!(self, Opcode::Jmp | Opcode::Djnz | Opcode::JmpRel | Opcode::TJz | Opcode::TJnz)
    }

    pub fn is_branch(self) -> bool {
        self.is_jump() || self.is_call()
    }

    pub fn is_cordic_command(self) -> bool {
        matches!(
            self,
            Opcode::QMul
                | Opcode::QDiv
                | Opcode::QFrac
                | Opcode::QRotate
                | Opcode::QSqrt
                | Opcode::QVector
                | Opcode::QLog
                | Opcode::QExp
        )
    }

    pub fn is_cordic_get(self) -> bool {
        matches!(self, Opcode::GetQx | Opcode::GetQy)
    }

    pub fn is_prefix(self) -> bool {
        matches!(self, Opcode::SetQ | Opcode::SetQ2)
    }

    pub fn is_memory(self) -> bool {
        matches!(
            self,
            Opcode::RdByte
                | Opcode::RdWord
                | Opcode::RdLong
                | Opcode::WrByte
                | Opcode::WrWord
                | Opcode::WrLong
        )
    }

    pub fn is_memory_read(self) -> bool {
        matches!(self, Opcode::RdByte | Opcode::RdWord | Opcode::RdLong)
    }

    pub fn is_memory_write(self) -> bool {
        matches!(self, Opcode::WrByte | Opcode::WrWord | Opcode::WrLong)
    }

    pub fn is_hardware_touch(self) -> bool {
        matches!(
            self,
            Opcode::HubSet
                | Opcode::CogStop
                | Opcode::WaitCnt
                | Opcode::WaitPEq
                | Opcode::LockTry
                | Opcode::LockRet
                | Opcode::LockSet
                | Opcode::LockClr
                | Opcode::RdPin
                | Opcode::GetCt
        )
    }

    pub fn is_wait_class(self) -> bool {
        matches!(self, Opcode::WaitCnt | Opcode::WaitPEq)
    }

    pub fn is_lock_class(self) -> bool {
        matches!(
            self,
            Opcode::LockTry | Opcode::LockRet | Opcode::LockSet | Opcode::LockClr
        )
    }

    /// Flags-family opcodes whose behavior is selected by the live C (or Z)
    /// flag rather than by the instruction's own execution condition.
    pub fn is_flag_conditional_alu(self) -> bool {
        matches!(
            self,
            Opcode::MuxC
                | Opcode::MuxZ
                | Opcode::SumC
                | Opcode::SumNc
                | Opcode::SumZ
                | Opcode::SumNz
                | Opcode::DrvC
                | Opcode::DrvNc
                | Opcode::DrvZ
                | Opcode::DrvNz
                | Opcode::NegC
                | Opcode::NegNc
                | Opcode::NegZ
                | Opcode::NegNz
                | Opcode::BitC
                | Opcode::BitNc
        )
    }

    /// True for ops that are pure (no side effect beyond their destination
    /// write and declared flag effects) and therefore foldable/removable
    /// when dead, per section 4.3's dead-code pass.
    pub fn is_pure_alu(self) -> bool {
        !self.is_pseudo()
            && !self.is_branch()
            && !self.is_memory()
            && !self.is_hardware_touch()
            && !self.is_cordic_command()
            && !self.is_cordic_get()
            && !matches!(self, Opcode::Push | Opcode::SetQ | Opcode::SetQ2)
    }

    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            Opcode::Add | Opcode::And | Opcode::Or | Opcode::Xor | Opcode::MaxS | Opcode::MaxU | Opcode::MinS | Opcode::MinU
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
