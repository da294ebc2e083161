//! Pass-timing instrumentation, gated by the `timing` feature.
//!
//! Adapted from `cranelift-codegen`'s `default_profiler.rs`: a thread-local
//! stack of start times plus a small enum naming each pass, instead of that
//! crate's build.rs-generated, pluggable `Profiler` trait — this crate has
//! a fixed, small pass list and only ever wants the default profiler.

#[cfg(feature = "timing")]
mod enabled {
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::fmt;
    use std::time::{Duration, Instant};

    /// Every pass that can report "time spent".
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    pub enum Pass {
        None,
        ConstProp,
        MoveOpt,
        CompareOpt,
        AddSubCoalesce,
        ImmCanon,
        Dce,
        ShortBranch,
        LoopHoist,
        IncDecHoist,
        CogwriteFusion,
        AssignTriangle,
        JumpThread,
        Longfill,
        MemMerge,
        Peephole,
        BranchHoist,
        LocalRegs,
        MulDiv,
        TailCall,
        CordicReorder,
        Inline,
        Fcache,
    }

    impl fmt::Display for Pass {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            fmt::Debug::fmt(self, f)
        }
    }

    thread_local! {
        static CURRENT: Cell<Pass> = const { Cell::new(Pass::None) };
        static TOTALS: RefCell<HashMap<Pass, Duration>> = RefCell::new(HashMap::new());
    }

    /// A running timer for one pass invocation. Ends (and records) when
    /// dropped.
    pub struct TimingToken {
        start: Instant,
        pass: Pass,
        prev: Pass,
    }

    impl Drop for TimingToken {
        fn drop(&mut self) {
            let elapsed = self.start.elapsed();
            CURRENT.with(|c| c.set(self.prev));
            TOTALS.with(|t| *t.borrow_mut().entry(self.pass).or_default() += elapsed);
            log::trace!("timing: ending {} after {:?}", self.pass, elapsed);
        }
    }

    /// Start timing `pass`; the returned guard ends it on drop. Passes may
    /// nest (e.g. a pattern fire inside the peephole driver).
    #[must_use]
    pub fn start(pass: Pass) -> TimingToken {
        let prev = CURRENT.with(|c| c.replace(pass));
        log::trace!("timing: starting {} (during {})", pass, prev);
        TimingToken { start: Instant::now(), pass, prev }
    }

    /// Snapshot accumulated totals for the current thread and reset them.
    pub fn take_current() -> HashMap<Pass, Duration> {
        TOTALS.with(|t| std::mem::take(&mut *t.borrow_mut()))
    }
}

#[cfg(not(feature = "timing"))]
mod disabled {
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    pub enum Pass {
        None,
        ConstProp,
        MoveOpt,
        CompareOpt,
        AddSubCoalesce,
        ImmCanon,
        Dce,
        ShortBranch,
        LoopHoist,
        IncDecHoist,
        CogwriteFusion,
        AssignTriangle,
        JumpThread,
        Longfill,
        MemMerge,
        Peephole,
        BranchHoist,
        LocalRegs,
        MulDiv,
        TailCall,
        CordicReorder,
        Inline,
        Fcache,
    }

    pub struct TimingToken;

    #[inline]
    #[must_use]
    pub fn start(_pass: Pass) -> TimingToken {
        TimingToken
    }
}

#[cfg(feature = "timing")]
pub use enabled::*;
#[cfg(not(feature = "timing"))]
pub use disabled::*;
