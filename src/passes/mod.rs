//! Local and whole-function optimization passes (section 4.3).
//!
//! Every pass here is a free function over `&mut Function` returning
//! whether it changed anything, matching the "changed: bool" convention
//! the driver's fixed-point loop (section 4.8) relies on. `apply_condition`
//! is the shared primitive several other passes call into rather than a
//! pass in its own right, so it isn't wired into the driver's pass list.

pub mod addsub;
pub mod apply_condition;
pub mod assign_triangle;
pub mod branch_hoist;
pub mod cogwrite;
pub mod compare_opt;
pub mod const_prop;
pub mod dce;
pub mod jump_thread;
pub mod local_regs;
pub mod longfill;
pub mod loop_hoist;
pub mod mem_merge;
pub mod move_opt;
pub mod muldiv;
pub mod p2_opts;
pub mod short_branch;
pub mod tailcall;

pub use apply_condition::apply_condition_after;
