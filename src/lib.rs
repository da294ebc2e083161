//! An IR optimization engine for a Parallax Propeller P1/P2 assembly
//! backend: a flat, block-less instruction list plus the dataflow
//! queries, local rewrite passes, module-wide inliner, and F-cache
//! promoter that turn it into tighter cog/LMM code.
//!
//! The entry points most callers want are [`driver::optimize_function`]
//! for a single function and [`driver::optimize_module`] once every
//! function in a compilation unit has been built, so the inliner and
//! duplicate-function merger can see call sites across function
//! boundaries.

pub mod config;
pub mod cordic;
pub mod cursor;
pub mod dataflow;
pub mod driver;
pub mod error;
pub mod fcache;
pub mod inline;
pub mod inst_predicates;
pub mod ir;
pub mod passes;
pub mod peephole;
pub mod timing;

pub use config::{CompilerConfig, OptimizeFlags, TargetArch};
pub use driver::{optimize_function, optimize_module};
pub use error::OptError;
pub use inline::Module;
pub use ir::Function;
