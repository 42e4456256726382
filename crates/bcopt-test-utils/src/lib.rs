pub mod lattice;

#[cfg(feature = "interp")]
pub mod fixture;

#[cfg(feature = "interp")]
pub use fixture::{
    BlockRun, PropagateLog, Propagation, builtin, program_with, run_block, user_func,
};
