//! Configuration consumed (never defined) by the optimizer (section 6).

use bitflags::bitflags;

bitflags! {
    /// Per-pass enable bits, straight off the `-O` bitmap the surrounding
    /// compiler driver builds.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct OptimizeFlags: u32 {
        const BASIC_REGS          = 1 << 0;
        const CONST_PROPAGATE     = 1 << 1;
        const PEEPHOLE            = 1 << 2;
        const BRANCHES            = 1 << 3;
        const TAIL_CALLS          = 1 << 4;
        const CORDIC_REORDER      = 1 << 5;
        const LOCAL_REUSE         = 1 << 6;
        const DEADCODE            = 1 << 7;
        const EXPERIMENTAL        = 1 << 8;
        const AGGRESSIVE_MEM      = 1 << 9;
        const REMOVE_HUB_BSS      = 1 << 10;
        const AUTO_FCACHE         = 1 << 11;
        const MERGE_DUPLICATES    = 1 << 12;
        const INLINE_SMALLFUNCS   = 1 << 13;
        const INLINE_SINGLEUSE    = 1 << 14;
        const REMOVE_UNUSED_FUNCS = 1 << 15;
        const EXTRASMALL          = 1 << 16;
        const FASTASM             = 1 << 17;
    }
}

impl Default for OptimizeFlags {
    /// `-O1`-equivalent default: the safe, always-beneficial passes.
    fn default() -> Self {
        OptimizeFlags::BASIC_REGS
            | OptimizeFlags::CONST_PROPAGATE
            | OptimizeFlags::PEEPHOLE
            | OptimizeFlags::BRANCHES
            | OptimizeFlags::DEADCODE
    }
}

/// Which member of the Propeller family code is being generated for; a
/// handful of passes (F-cache sizing, CORDIC pipelining) branch on this.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TargetArch {
    P1,
    P2,
}

impl TargetArch {
    pub fn default_fcache_longs(self) -> u32 {
        match self {
            TargetArch::P1 => 96,
            TargetArch::P2 => 128,
        }
    }
}

/// F-cache promoter sizing knobs (section 4.7).
#[derive(Clone, Copy, Debug)]
pub struct FcacheConfig {
    /// Window size in longs. `None` disables the promoter; `Some(0)` is
    /// treated the same as the target's architectural default ("auto").
    pub size_longs: Option<u32>,
}

impl FcacheConfig {
    pub fn disabled() -> Self {
        FcacheConfig { size_longs: None }
    }

    pub fn auto(arch: TargetArch) -> Self {
        FcacheConfig { size_longs: Some(arch.default_fcache_longs()) }
    }

    pub fn window_longs(&self, arch: TargetArch) -> Option<u32> {
        self.size_longs.map(|n| if n == 0 { arch.default_fcache_longs() } else { n })
    }
}

/// Everything a pass needs to know about the surrounding build, bundled so
/// every pass entry point takes one shared reference instead of a grab bag
/// of loose booleans (section 6: "the crate... expose[s] a small `config`
/// module... bundled into a `CompilerConfig`").
#[derive(Clone, Debug)]
pub struct CompilerConfig {
    pub arch: TargetArch,
    pub optimize: OptimizeFlags,
    pub fcache: FcacheConfig,
    /// P1 instruction-stream compression ("`compress`" in section 6).
    pub compress: bool,
}

impl CompilerConfig {
    pub fn new(arch: TargetArch, optimize: OptimizeFlags) -> Self {
        CompilerConfig {
            fcache: FcacheConfig::auto(arch),
            arch,
            optimize,
            compress: false,
        }
    }

    pub fn enabled(&self, flag: OptimizeFlags) -> bool {
        self.optimize.contains(flag)
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig::new(TargetArch::P2, OptimizeFlags::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_fcache_tracks_architecture() {
        let p1 = FcacheConfig::auto(TargetArch::P1);
        let p2 = FcacheConfig::auto(TargetArch::P2);
        assert_eq!(p1.window_longs(TargetArch::P1), Some(96));
        assert_eq!(p2.window_longs(TargetArch::P2), Some(128));
    }

    #[test]
    fn disabled_fcache_has_no_window() {
        assert_eq!(FcacheConfig::disabled().window_longs(TargetArch::P2), None);
    }

    #[test]
    fn default_config_enables_basic_passes_only() {
        let cfg = CompilerConfig::default();
        assert!(cfg.enabled(OptimizeFlags::DEADCODE));
        assert!(!cfg.enabled(OptimizeFlags::INLINE_SMALLFUNCS));
    }
}
