pub use bcopt_interp as interp;
pub use bcopt_ir as ir;
pub use bcopt_types as types;

pub mod prelude {
    pub use bcopt_interp::{
        AnalyzeError, FuncAnalysis, FuncAnalyzer, Index, Options, RunFlags, State, StepFlags,
    };
    pub use bcopt_ir::*;
    pub use bcopt_types::*;
}
