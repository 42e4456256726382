//! Flow-sensitive abstract interpreter for bytecode blocks.
//!
//! [`run`] symbolically executes one block over the [`Type`](bcopt_types::Type)
//! lattice, reporting successor states through a propagation callback and
//! summarizing each instruction in [`StepFlags`] and the block in
//! [`RunFlags`]. [`FuncAnalyzer`] drives `run` over a whole function until the
//! block entry states reach a fixpoint.

mod analyze;
mod builtins;
mod collect;
mod context;
mod dispatch;
mod env;
mod error;
mod flags;
mod index;
mod interp;
mod options;
mod state;

pub use analyze::{FuncAnalysis, FuncAnalyzer};
pub use builtins::{can_emit_builtin, const_fold, finish_builtin, handle_function_exists};
pub use collect::CollectedInfo;
pub use context::Context;
pub use dispatch::default_dispatch;
pub use env::{Env, PropagateFn};
pub use error::AnalyzeError;
pub use flags::{
    LocalSet, MAX_TRACKED_CLS_REF_SLOTS, MAX_TRACKED_LOCALS, RunFlags, StepFlags,
    UsedLocalStatics,
};
pub use index::{Index, ResolvedFunc};
pub use interp::{DispatchFn, Interp, run, run_with, step, this_type};
pub use options::Options;
pub use state::{StackElem, State};
